use serde::Deserialize;
use tracing::Level;

use plugwire_core::error::{PlugwireError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginConfig {
    pub version: u32,

    #[serde(default)]
    pub plugin: PluginSection,

    #[serde(default)]
    pub transport: TransportSection,

    #[serde(default)]
    pub dispatch: DispatchSection,

    #[serde(default)]
    pub log: LogSection,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            version: 1,
            plugin: PluginSection::default(),
            transport: TransportSection::default(),
            dispatch: DispatchSection::default(),
            log: LogSection::default(),
        }
    }
}

impl PluginConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(PlugwireError::UnsupportedVersion);
        }

        self.plugin.validate()?;
        self.transport.validate()?;
        self.dispatch.validate()?;
        self.log.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginSection {
    #[serde(default = "default_name")]
    pub name: String,
}

impl Default for PluginSection {
    fn default() -> Self {
        Self {
            name: default_name(),
        }
    }
}

impl PluginSection {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(PlugwireError::Config("plugin.name must not be empty".into()));
        }
        Ok(())
    }
}

fn default_name() -> String {
    "plugwire".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportSection {
    /// Read buffer size for one physical chunk.
    #[serde(default = "default_read_chunk_bytes")]
    pub read_chunk_bytes: usize,

    /// Outbound frames are written in segments of this size.
    #[serde(default = "default_write_chunk_bytes")]
    pub write_chunk_bytes: usize,

    /// Largest accepted frame payload, both directions.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            read_chunk_bytes: default_read_chunk_bytes(),
            write_chunk_bytes: default_write_chunk_bytes(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl TransportSection {
    pub fn validate(&self) -> Result<()> {
        if !(512..=1_048_576).contains(&self.read_chunk_bytes) {
            return Err(PlugwireError::Config(
                "transport.read_chunk_bytes must be between 512 and 1048576".into(),
            ));
        }
        if !(1..=65_536).contains(&self.write_chunk_bytes) {
            return Err(PlugwireError::Config(
                "transport.write_chunk_bytes must be between 1 and 65536".into(),
            ));
        }
        if !(1024..=u32::MAX as usize).contains(&self.max_frame_bytes) {
            return Err(PlugwireError::Config(
                "transport.max_frame_bytes must be between 1024 and 4294967295".into(),
            ));
        }
        Ok(())
    }
}

fn default_read_chunk_bytes() -> usize {
    8192
}
fn default_write_chunk_bytes() -> usize {
    1024
}
fn default_max_frame_bytes() -> usize {
    16 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchSection {
    /// Answer requests with no matching route with an error response.
    #[serde(default)]
    pub reply_unroutable: bool,

    /// Register the built-in `/plugin.metrics` route.
    #[serde(default)]
    pub expose_metrics: bool,

    /// Default expiry for outbound requests awaiting a response.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            reply_unroutable: false,
            expose_metrics: false,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl DispatchSection {
    pub fn validate(&self) -> Result<()> {
        if !(100..=600_000).contains(&self.request_timeout_ms) {
            return Err(PlugwireError::Config(
                "dispatch.request_timeout_ms must be between 100 and 600000".into(),
            ));
        }
        Ok(())
    }
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    /// Mirror log events to the host as `/log.create` requests.
    #[serde(default)]
    pub forward_to_host: bool,

    #[serde(default = "default_forward_level")]
    pub forward_level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            forward_to_host: false,
            forward_level: default_forward_level(),
        }
    }
}

impl LogSection {
    pub fn validate(&self) -> Result<()> {
        self.level().map(|_| ())
    }

    /// Parsed `forward_level`.
    pub fn level(&self) -> Result<Level> {
        self.forward_level.parse::<Level>().map_err(|_| {
            PlugwireError::Config(format!(
                "log.forward_level must be one of trace|debug|info|warn|error, got {:?}",
                self.forward_level
            ))
        })
    }
}

fn default_forward_level() -> String {
    "info".into()
}
