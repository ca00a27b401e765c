//! Stream adapter: duplex byte pipe <-> envelopes.
//!
//! Responsibilities:
//! - Read physical chunks, feed each one to the codec exactly once, then
//!   drain every frame already buffered before reading again
//! - Deliver decoded envelopes to subscribers in arrival order
//! - Encode outbound envelopes and write them in fixed-size segments
//!
//! Malformed frames are logged and counted, never delivered. An oversized
//! frame header or a read failure ends the stream with an error.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use plugwire_core::error::{PlugwireError, Result};
use plugwire_core::protocol::{segments, WRITE_SEGMENT_LEN};
use plugwire_core::{Envelope, FrameCodec, FrameEncoder, JsonSerializer, Serializer};

use crate::obs::metrics::{kind_label, PluginMetrics};

pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Callback invoked on the read task for every decoded envelope.
pub type Subscriber = Box<dyn Fn(&Envelope) + Send + Sync>;

const DEFAULT_READ_CHUNK: usize = 8192;

/// Cloneable outbound half. Writes are serialized by an async mutex so
/// segments of different frames never interleave.
pub struct Outbound<S = JsonSerializer> {
    sink: Arc<Mutex<BoxWriter>>,
    encoder: FrameEncoder<S>,
    segment_len: usize,
    metrics: Arc<PluginMetrics>,
}

impl<S: Serializer> Clone for Outbound<S> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
            encoder: self.encoder.clone(),
            segment_len: self.segment_len,
            metrics: self.metrics.clone(),
        }
    }
}

impl<S: Serializer> Outbound<S> {
    /// Encode, write every segment in order, then flush.
    ///
    /// Completion means the bytes were handed to the sink; nothing is known
    /// about the peer having read them.
    pub async fn send<T: Serialize>(&self, envelope: &Envelope<T>) -> Result<()> {
        let frame = self.encoder.encode(envelope)?;
        let len = frame.len();

        let mut sink = self.sink.lock().await;
        for segment in segments(frame, self.segment_len) {
            if let Err(e) = sink.write_all(&segment).await {
                return Err(self.sink_failed("write", e));
            }
        }
        if let Err(e) = sink.flush().await {
            return Err(self.sink_failed("flush", e));
        }
        drop(sink);

        self.metrics.frames_out.inc(&[("kind", kind_label(envelope))]);
        tracing::trace!(len, correlation = envelope.correlation(), "frame written");
        Ok(())
    }

    /// Flush and close the sink.
    pub async fn shutdown(&self) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.shutdown()
            .await
            .map_err(|e| self.sink_failed("shutdown", e))
    }

    pub fn segment_len(&self) -> usize {
        self.segment_len
    }

    fn sink_failed(&self, op: &str, e: std::io::Error) -> PlugwireError {
        self.metrics.sink_errors.inc(&[("op", op)]);
        PlugwireError::SinkUnavailable(format!("{op} failed: {e}"))
    }
}

/// Owns the inbound byte source and the codec state.
///
/// Exactly one task drives the read side; the codec is never shared.
pub struct StreamAdapter<S = JsonSerializer> {
    reader: BoxReader,
    codec: FrameCodec<S, Value>,
    read_buf: Vec<u8>,
    outbound: Outbound<S>,
    subscribers: Vec<Subscriber>,
    metrics: Arc<PluginMetrics>,
}

impl StreamAdapter<JsonSerializer> {
    /// Adapter over the process stdin/stdout.
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout(), FrameCodec::default())
    }
}

impl<S: Serializer> StreamAdapter<S> {
    pub fn new<R, W>(reader: R, writer: W, codec: FrameCodec<S, Value>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let metrics = Arc::new(PluginMetrics::default());
        let outbound = Outbound {
            sink: Arc::new(Mutex::new(Box::new(writer) as BoxWriter)),
            encoder: codec.encoder(),
            segment_len: WRITE_SEGMENT_LEN,
            metrics: metrics.clone(),
        };
        Self {
            reader: Box::new(reader),
            codec,
            read_buf: vec![0u8; DEFAULT_READ_CHUNK],
            outbound,
            subscribers: Vec::new(),
            metrics,
        }
    }

    /// Upper bound of a single read.
    pub fn with_read_chunk(mut self, bytes: usize) -> Self {
        self.read_buf = vec![0u8; bytes.max(1)];
        self
    }

    /// Outbound write segment size.
    pub fn with_write_chunk(mut self, bytes: usize) -> Self {
        self.outbound.segment_len = bytes.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<PluginMetrics>) -> Self {
        self.outbound.metrics = metrics.clone();
        self.metrics = metrics;
        self
    }

    /// Register a callback for every decoded envelope.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.subscribers.push(Box::new(callback));
    }

    pub fn outbound(&self) -> Outbound<S> {
        self.outbound.clone()
    }

    pub async fn send<T: Serialize>(&self, envelope: &Envelope<T>) -> Result<()> {
        self.outbound.send(envelope).await
    }

    /// Pull the next envelope, reading more bytes only when nothing complete
    /// is buffered. `Ok(None)` at end of input.
    pub async fn next_envelope(&mut self) -> Result<Option<Envelope>> {
        loop {
            if let Some(env) = self.drain_one()? {
                return Ok(Some(env));
            }

            let n = match self.reader.read(&mut self.read_buf).await {
                Ok(n) => n,
                Err(e) => return Err(PlugwireError::Internal(format!("read failed: {e}"))),
            };
            if n == 0 {
                if self.codec.buffered_len() > 0 || self.codec.is_mid_frame() {
                    tracing::warn!(
                        buffered = self.codec.buffered_len(),
                        "input closed inside a frame; trailing bytes dropped"
                    );
                }
                return Ok(None);
            }
            tracing::trace!(n, "chunk read");

            match self.codec.feed(&self.read_buf[..n]) {
                Ok(Some(env)) => return Ok(Some(self.accept(env))),
                Ok(None) => {}
                Err(e) if e.is_recoverable() => self.reject(&e),
                Err(e) => return Err(e),
            }
        }
    }

    /// Push mode: deliver every envelope to the subscribers until end of
    /// input.
    pub async fn run(mut self) -> Result<()> {
        while let Some(env) = self.next_envelope().await? {
            for subscriber in &self.subscribers {
                subscriber(&env);
            }
        }
        tracing::debug!("input closed");
        Ok(())
    }

    /// One already-buffered frame, skipping malformed ones.
    fn drain_one(&mut self) -> Result<Option<Envelope>> {
        loop {
            match self.codec.next_buffered() {
                Ok(Some(env)) => return Ok(Some(self.accept(env))),
                Ok(None) => return Ok(None),
                Err(e) if e.is_recoverable() => self.reject(&e),
                Err(e) => return Err(e),
            }
        }
    }

    fn accept(&self, env: Envelope) -> Envelope {
        self.metrics.frames_in.inc(&[("kind", kind_label(&env))]);
        tracing::trace!(correlation = env.correlation(), path = env.path(), "envelope decoded");
        env
    }

    fn reject(&self, e: &PlugwireError) {
        self.metrics.malformed_frames.inc(&[]);
        tracing::warn!(code = e.code().as_str(), error = %e, "malformed frame dropped");
    }
}
