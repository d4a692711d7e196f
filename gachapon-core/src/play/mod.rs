//! Prize draw and finalization for verified plays.

pub mod finalizer;

pub use finalizer::PlayFinalizer;
