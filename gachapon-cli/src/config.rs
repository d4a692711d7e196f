use gachapon_core::{ProtocolConfig, Result};
use std::path::{Path, PathBuf};

pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gachapon")
}

/// Protocol settings live next to the database as `gachapon.json`.
/// Defaults apply when the file is absent.
pub fn load_protocol_config(data_dir: &Path) -> Result<ProtocolConfig> {
    let path = data_dir.join("gachapon.json");
    let config: ProtocolConfig = if path.exists() {
        let raw = std::fs::read_to_string(&path)?;
        serde_json::from_str(&raw)?
    } else {
        ProtocolConfig::default()
    };
    config.validate()?;
    Ok(config)
}
