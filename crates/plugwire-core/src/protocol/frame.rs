//! Length-delimited streaming frame codec (panic-free).
//!
//! ```text
//! frame := length(u32, big-endian) || payload(length bytes)
//! ```
//!
//! Decoding is incremental: bytes are fed as they arrive, in chunks of any
//! size, and each call extracts **at most one** frame. Callers that may hold
//! several complete frames in the buffer drain them with
//! [`FrameCodec::next_buffered`] until it yields `None`.
//!
//! Parsing rules:
//! - Never index the buffer; use `Buf` and length checks.
//! - A frame whose payload fails to decode is consumed before the error is
//!   returned, so the next frame starts on a clean boundary.

use std::marker::PhantomData;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{PlugwireError, Result};
use crate::protocol::envelope::Envelope;
use crate::protocol::serializer::{JsonSerializer, Serializer};

/// Size of the big-endian length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Default outbound write segment size.
pub const WRITE_SEGMENT_LEN: usize = 1024;

/// Stateless outbound half of the codec. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct FrameEncoder<S = JsonSerializer> {
    serializer: S,
    max_frame_len: Option<usize>,
}

impl<S: Serializer> FrameEncoder<S> {
    pub fn new(serializer: S) -> Self {
        Self {
            serializer,
            max_frame_len: None,
        }
    }

    pub fn with_max_frame_len(mut self, max: usize) -> Self {
        self.max_frame_len = Some(max);
        self
    }

    /// Serialize `envelope` and prepend its 4-byte big-endian length.
    pub fn encode<T: Serialize>(&self, envelope: &Envelope<T>) -> Result<Bytes> {
        let body = self.serializer.encode(envelope)?;
        let len = body.len();

        let max = self.max_frame_len.unwrap_or(u32::MAX as usize);
        if len > max {
            return Err(PlugwireError::FrameTooLarge { len, max });
        }
        let prefix = u32::try_from(len).map_err(|_| PlugwireError::FrameTooLarge {
            len,
            max: u32::MAX as usize,
        })?;

        let mut out = BytesMut::with_capacity(FRAME_HEADER_LEN + len);
        out.put_u32(prefix);
        out.put_slice(&body);
        Ok(out.freeze())
    }

    pub fn serializer(&self) -> &S {
        &self.serializer
    }
}

/// Streaming codec: accumulation buffer plus the length of the frame
/// currently being assembled, if any.
///
/// The decode state is owned exclusively; share the codec between tasks only
/// behind a single owner (one read task) or a lock.
#[derive(Debug)]
pub struct FrameCodec<S = JsonSerializer, T = Value> {
    encoder: FrameEncoder<S>,
    buffer: BytesMut,
    expected_len: Option<usize>,
    /// Set once an oversized header was read; the stream is unusable after.
    oversized: Option<(usize, usize)>,
    _payload: PhantomData<fn() -> T>,
}

impl Default for FrameCodec<JsonSerializer, Value> {
    fn default() -> Self {
        Self::new(JsonSerializer)
    }
}

impl<S: Serializer, T> FrameCodec<S, T> {
    pub fn new(serializer: S) -> Self {
        Self {
            encoder: FrameEncoder::new(serializer),
            buffer: BytesMut::new(),
            expected_len: None,
            oversized: None,
            _payload: PhantomData,
        }
    }

    /// Reject frames declaring more than `max` payload bytes, both ways.
    ///
    /// An oversized inbound header cannot be skipped safely, so it is a fatal
    /// `FrameTooLarge` error rather than a dropped frame.
    pub fn with_max_frame_len(mut self, max: usize) -> Self {
        self.encoder = self.encoder.with_max_frame_len(max);
        self
    }

    /// Outbound half, for senders that do not own the decode state.
    pub fn encoder(&self) -> FrameEncoder<S> {
        self.encoder.clone()
    }

    /// Bytes buffered but not yet consumed (excluding a parsed header).
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether a header has been read and its payload is still incomplete.
    pub fn is_mid_frame(&self) -> bool {
        self.expected_len.is_some()
    }

    pub fn encode(&self, envelope: &Envelope<T>) -> Result<Bytes>
    where
        T: Serialize,
    {
        self.encoder.encode(envelope)
    }
}

impl<S: Serializer, T: DeserializeOwned> FrameCodec<S, T> {
    /// Append `chunk` and try to extract one frame.
    ///
    /// - `Ok(Some(_))`: one frame completed; more may remain buffered.
    /// - `Ok(None)`: not enough bytes yet (or `chunk` was empty).
    /// - `Err(MalformedPayload)`: a complete frame was dropped; the stream
    ///   is still in sync and decoding may continue.
    /// - `Err(FrameTooLarge)`: fatal. Its header is already consumed, so the
    ///   codec stays failed and every later call returns the same error.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Option<Envelope<T>>> {
        if let Some((len, max)) = self.oversized {
            return Err(PlugwireError::FrameTooLarge { len, max });
        }
        if chunk.is_empty() {
            return Ok(None);
        }
        self.buffer.extend_from_slice(chunk);
        self.next_buffered()
    }

    /// Extract one frame from already buffered bytes without appending.
    pub fn next_buffered(&mut self) -> Result<Option<Envelope<T>>> {
        if let Some((len, max)) = self.oversized {
            return Err(PlugwireError::FrameTooLarge { len, max });
        }
        let expected = match self.expected_len {
            Some(len) => len,
            None => {
                if self.buffer.remaining() < FRAME_HEADER_LEN {
                    return Ok(None);
                }
                let len = self.buffer.get_u32() as usize;
                if let Some(max) = self.encoder.max_frame_len {
                    if len > max {
                        self.oversized = Some((len, max));
                        self.buffer.clear();
                        return Err(PlugwireError::FrameTooLarge { len, max });
                    }
                }
                self.expected_len = Some(len);
                len
            }
        };

        if self.buffer.remaining() < expected {
            return Ok(None);
        }

        let payload = self.buffer.split_to(expected).freeze();
        self.expected_len = None;
        tracing::trace!(len = expected, rest = self.buffer.len(), "frame complete");

        self.encoder.serializer.decode::<Envelope<T>>(&payload).map(Some)
    }
}

/// Split an encoded frame into write segments of `size` bytes; the last
/// segment may be shorter. A `size` of zero is treated as one.
pub fn segments(frame: Bytes, size: usize) -> Segments {
    Segments {
        rest: frame,
        size: size.max(1),
    }
}

/// Iterator returned by [`segments`]. Segments share the frame's storage.
#[derive(Debug)]
pub struct Segments {
    rest: Bytes,
    size: usize,
}

impl Iterator for Segments {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.rest.is_empty() {
            return None;
        }
        let take = self.size.min(self.rest.len());
        Some(self.rest.split_to(take))
    }
}
