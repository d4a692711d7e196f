pub mod db;
pub mod game;
pub mod play;
pub mod redemption;
pub mod shipping;

pub use db::{handle_db_command, DbCommands};
pub use game::{handle_game_command, GameCommands};
pub use play::{handle_play_command, PlayCommands};
pub use redemption::{handle_redemption_command, RedemptionCommands};
pub use shipping::{handle_shipping_command, ShippingCommands};
