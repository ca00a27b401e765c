//! Plugin config loader (strict parsing).

pub mod schema;

use std::fs;

use plugwire_core::error::{PlugwireError, Result};

pub use schema::{DispatchSection, LogSection, PluginConfig, PluginSection, TransportSection};

/// Environment variable naming the YAML config file.
pub const CONFIG_ENV: &str = "PLUGWIRE_CONFIG";

pub fn load_from_file(path: &str) -> Result<PluginConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| PlugwireError::Config(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<PluginConfig> {
    let cfg: PluginConfig = serde_yaml::from_str(s)
        .map_err(|e| PlugwireError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load from the file named by `PLUGWIRE_CONFIG`, or defaults when unset.
pub fn load_from_env() -> Result<PluginConfig> {
    match std::env::var(CONFIG_ENV) {
        Ok(path) if !path.is_empty() => load_from_file(&path),
        _ => Ok(PluginConfig::default()),
    }
}
