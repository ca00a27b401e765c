//! Protocol modules.
//!
//! - `envelope`: request/response message unit and its wire validation.
//! - `channel`: advisory conversation metadata.
//! - `serializer`: opaque value <-> bytes contract.
//! - `frame`: length-delimited streaming codec.
//!
//! All parsers are panic-free: malformed input is reported as
//! `PlugwireError` instead of panicking or indexing raw buffers.

pub mod channel;
pub mod envelope;
pub mod frame;
pub mod serializer;

pub use channel::{Channel, ChannelType};
pub use envelope::{new_correlation, Envelope, Request, Response};
pub use frame::{segments, FrameCodec, FrameEncoder, Segments, FRAME_HEADER_LEN, WRITE_SEGMENT_LEN};
pub use serializer::{JsonSerializer, Serializer};
