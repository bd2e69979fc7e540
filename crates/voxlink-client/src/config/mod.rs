//! Engine config loader (strict parsing).

pub mod schema;

use std::fs;

use voxlink_core::error::{Result, VoxlinkError};

pub use schema::{AudioSection, ClientSection, HubSection, VoxlinkConfig};

pub fn load_from_file(path: &str) -> Result<VoxlinkConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| VoxlinkError::InvalidConfig(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<VoxlinkConfig> {
    let cfg: VoxlinkConfig = serde_yaml::from_str(s)
        .map_err(|e| VoxlinkError::InvalidConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
