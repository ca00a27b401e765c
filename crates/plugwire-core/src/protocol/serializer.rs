//! Serializer contract used by the frame codec.
//!
//! `encode` must be deterministic and must not add a length header of its
//! own (the frame codec does that). `decode` fails with `MalformedPayload`
//! when the bytes are not a valid encoding. Any serde-backed binary or text
//! format satisfying this is substitutable.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PlugwireError, Result};

pub trait Serializer: Clone + Send + Sync + 'static {
    /// Short format name, used in logs.
    fn name(&self) -> &'static str;

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// JSON serializer backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value)
            .map_err(|e| PlugwireError::Internal(format!("json encode failed: {e}")))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes)
            .map_err(|e| PlugwireError::MalformedPayload(format!("invalid envelope json: {e}")))
    }
}
