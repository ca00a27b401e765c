//! plugwire core: envelope types, serializer contract, frame codec, and errors.
//!
//! This crate defines the wire-level contracts shared by the plugin runtime
//! and any host-side tooling. It carries no async runtime dependency so the
//! codec can be driven from any byte source.
//!
//! # Wire format
//! ```text
//! frame := length(u32, big-endian) || payload(length bytes, serialized Envelope)
//! ```
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. Malformed input is
//! reported as `PlugwireError` and never takes the stream down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ErrorCode, PlugwireError, Result};
pub use protocol::{
    Channel, ChannelType, Envelope, FrameCodec, FrameEncoder, JsonSerializer, Request, Response,
    Serializer,
};
