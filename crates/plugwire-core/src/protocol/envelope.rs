//! Envelope: the application-level message unit.
//!
//! An envelope is either a [`Request`] (has a non-empty `path`, never an
//! `error`) or a [`Response`] (no `path`, optional `error`). The split is
//! structural: there is no way to build a request without a path, and a wire
//! value violating it fails to decode.
//!
//! Wire shape (field order, absent fields omitted):
//! `path?`, `correlation`, `channel?`, `payload?`, `error?`.

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{PlugwireError, Result};
use crate::protocol::channel::Channel;

/// Generate a fresh correlation id.
pub fn new_correlation() -> String {
    Uuid::new_v4().to_string()
}

/// Request envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Request<T = Value> {
    path: String,
    correlation: String,
    channel: Option<Channel>,
    payload: Option<T>,
}

impl<T> Request<T> {
    /// Build a request for `path` with a freshly generated correlation id.
    ///
    /// Fails with `MalformedPayload` when `path` is empty.
    pub fn new(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        if path.is_empty() {
            return Err(PlugwireError::MalformedPayload(
                "request path must not be empty".into(),
            ));
        }
        Ok(Self {
            path,
            correlation: new_correlation(),
            channel: None,
            payload: None,
        })
    }

    pub fn with_correlation(mut self, correlation: impl Into<String>) -> Self {
        self.correlation = correlation.into();
        self
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_payload(mut self, payload: T) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn correlation(&self) -> &str {
        &self.correlation
    }

    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<T> {
        self.payload
    }
}

impl Request<Value> {
    /// Attach any serializable value as payload.
    pub fn with_json<S: Serialize>(self, payload: &S) -> Result<Self> {
        let value = serde_json::to_value(payload)
            .map_err(|e| PlugwireError::Internal(format!("payload encode failed: {e}")))?;
        Ok(self.with_payload(value))
    }

    /// Decode the payload into a concrete shape. An absent payload decodes
    /// as `null`, so `Option<_>` and `()` targets accept it.
    pub fn payload_as<P: DeserializeOwned>(&self) -> Result<P> {
        decode_value(self.payload.as_ref())
    }
}

/// Response envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct Response<T = Value> {
    correlation: String,
    channel: Option<Channel>,
    payload: Option<T>,
    error: Option<String>,
}

impl<T> Response<T> {
    pub fn new(correlation: impl Into<String>) -> Self {
        Self {
            correlation: correlation.into(),
            channel: None,
            payload: None,
            error: None,
        }
    }

    /// Empty response addressed to `request`: echoes its correlation and channel.
    pub fn to<R>(request: &Request<R>) -> Self {
        Self {
            correlation: request.correlation.clone(),
            channel: request.channel.clone(),
            payload: None,
            error: None,
        }
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn with_payload(mut self, payload: T) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn correlation(&self) -> &str {
        &self.correlation
    }

    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    pub fn payload(&self) -> Option<&T> {
        self.payload.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// `Err(description)` when the peer reported a failure.
    pub fn into_result(self) -> std::result::Result<Option<T>, String> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.payload),
        }
    }
}

impl Response<Value> {
    pub fn payload_as<P: DeserializeOwned>(&self) -> Result<P> {
        decode_value(self.payload.as_ref())
    }
}

fn decode_value<P: DeserializeOwned>(value: Option<&Value>) -> Result<P> {
    let value = value.cloned().unwrap_or(Value::Null);
    serde_json::from_value(value)
        .map_err(|e| PlugwireError::MalformedPayload(format!("payload shape mismatch: {e}")))
}

/// Either kind of envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope<T = Value> {
    Request(Request<T>),
    Response(Response<T>),
}

impl<T> Envelope<T> {
    pub fn correlation(&self) -> &str {
        match self {
            Envelope::Request(r) => r.correlation(),
            Envelope::Response(r) => r.correlation(),
        }
    }

    pub fn channel(&self) -> Option<&Channel> {
        match self {
            Envelope::Request(r) => r.channel(),
            Envelope::Response(r) => r.channel(),
        }
    }

    /// Request path; `None` for responses.
    pub fn path(&self) -> Option<&str> {
        match self {
            Envelope::Request(r) => Some(r.path()),
            Envelope::Response(_) => None,
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, Envelope::Request(_))
    }

    pub fn is_response(&self) -> bool {
        matches!(self, Envelope::Response(_))
    }
}

impl<T> From<Request<T>> for Envelope<T> {
    fn from(value: Request<T>) -> Self {
        Envelope::Request(value)
    }
}

impl<T> From<Response<T>> for Envelope<T> {
    fn from(value: Response<T>) -> Self {
        Envelope::Response(value)
    }
}

// --------------------
// Wire representation
// --------------------

#[derive(Serialize)]
struct WireRef<'a, T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
    correlation: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<&'a Channel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

/// Permissive decode target; `Envelope::try_from` enforces the kind invariant.
#[derive(Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct WireEnvelope<T> {
    path: Option<String>,
    correlation: String,
    channel: Option<Channel>,
    #[serde(default, deserialize_with = "present")]
    payload: Option<T>,
    error: Option<String>,
}

/// A payload key that is present is `Some`, even when its value is `null`.
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl<T> TryFrom<WireEnvelope<T>> for Envelope<T> {
    type Error = PlugwireError;

    fn try_from(wire: WireEnvelope<T>) -> Result<Self> {
        let WireEnvelope {
            path,
            correlation,
            channel,
            payload,
            error,
        } = wire;

        match path {
            Some(path) => {
                if path.is_empty() {
                    return Err(PlugwireError::MalformedPayload(
                        "request path must not be empty".into(),
                    ));
                }
                if error.is_some() {
                    return Err(PlugwireError::MalformedPayload(
                        "request must not carry an error".into(),
                    ));
                }
                Ok(Envelope::Request(Request {
                    path,
                    correlation,
                    channel,
                    payload,
                }))
            }
            None => Ok(Envelope::Response(Response {
                correlation,
                channel,
                payload,
                error,
            })),
        }
    }
}

impl<T: Serialize> Serialize for Envelope<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let wire = match self {
            Envelope::Request(r) => WireRef {
                path: Some(r.path.as_str()),
                correlation: r.correlation.as_str(),
                channel: r.channel.as_ref(),
                payload: r.payload.as_ref(),
                error: None,
            },
            Envelope::Response(r) => WireRef {
                path: None,
                correlation: r.correlation.as_str(),
                channel: r.channel.as_ref(),
                payload: r.payload.as_ref(),
                error: r.error.as_deref(),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Envelope<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let wire = WireEnvelope::<T>::deserialize(deserializer)?;
        Envelope::try_from(wire).map_err(D::Error::custom)
    }
}
