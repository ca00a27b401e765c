//! Outbound requests and response correlation.
//!
//! Every outbound envelope goes through the outbox, a queue drained by the
//! plugin's writer task. `post` registers the request's correlation id in the
//! pending map before queueing it; the read side completes the entry when the
//! matching response arrives.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use plugwire_core::error::{PlugwireError, Result};
use plugwire_core::{Envelope, Request, Response};

use crate::obs::metrics::PluginMetrics;

/// Sending half of the outbound queue.
pub type Outbox = mpsc::UnboundedSender<Envelope>;

/// Waiter slot; the token tells reposts of the same correlation apart.
type Waiter = (u64, oneshot::Sender<Response>);

struct Shared {
    outbox: Outbox,
    pending: DashMap<String, Waiter>,
    next_token: AtomicU64,
    closed: AtomicBool,
    default_timeout: Duration,
    metrics: Arc<PluginMetrics>,
}

/// Cheap to clone; all clones share the pending map.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    pub fn new(outbox: Outbox, default_timeout: Duration, metrics: Arc<PluginMetrics>) -> Self {
        Self {
            shared: Arc::new(Shared {
                outbox,
                pending: DashMap::new(),
                next_token: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                default_timeout,
                metrics,
            }),
        }
    }

    pub fn outbox(&self) -> Outbox {
        self.shared.outbox.clone()
    }

    /// Queue an envelope without waiting for any answer.
    pub fn send(&self, envelope: impl Into<Envelope>) -> Result<()> {
        self.shared
            .outbox
            .send(envelope.into())
            .map_err(|_| PlugwireError::SinkUnavailable("outbox closed".into()))
    }

    /// Queue `request` and return a future resolving to its response.
    ///
    /// Dropping the returned future forgets the request; a late response is
    /// then dropped as an orphan.
    pub fn post(&self, request: Request) -> Result<PendingResponse> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(PlugwireError::ConnectionClosed);
        }

        let correlation = request.correlation().to_string();
        let (tx, rx) = oneshot::channel();
        let token = self.shared.next_token.fetch_add(1, Ordering::Relaxed);
        match self.shared.pending.entry(correlation.clone()) {
            Entry::Occupied(_) => {
                return Err(PlugwireError::Internal(format!(
                    "correlation {correlation} already pending"
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert((token, tx));
            }
        }

        let pending = PendingResponse {
            correlation,
            token,
            rx,
            shared: self.shared.clone(),
        };
        self.send(request)?;
        Ok(pending)
    }

    /// `post` with an expiry; the pending entry is removed on timeout.
    pub async fn post_timeout(&self, request: Request, timeout: Duration) -> Result<Response> {
        let pending = self.post(request)?;
        tokio::time::timeout(timeout, pending)
            .await
            .map_err(|_| PlugwireError::Timeout)?
    }

    /// `post` with the configured default timeout.
    pub async fn request(&self, request: Request) -> Result<Response> {
        self.post_timeout(request, self.shared.default_timeout).await
    }

    /// Hand an inbound response to whoever is waiting on its correlation.
    /// Returns `false` when nobody is.
    pub fn complete(&self, response: Response) -> bool {
        match self.shared.pending.remove(response.correlation()) {
            Some((_, (_, tx))) => {
                // the waiter may have given up in the meantime
                let _ = tx.send(response);
                true
            }
            None => {
                self.shared.metrics.orphan_responses.inc(&[]);
                tracing::debug!(
                    correlation = response.correlation(),
                    "response without pending request dropped"
                );
                false
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        self.shared.pending.len()
    }

    /// Fail every waiter with `ConnectionClosed` and refuse new posts.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
        let dropped = self.shared.pending.len();
        self.shared.pending.clear();
        if dropped > 0 {
            tracing::debug!(dropped, "pending requests abandoned");
        }
    }
}

/// Response future returned by [`Client::post`].
pub struct PendingResponse {
    correlation: String,
    token: u64,
    rx: oneshot::Receiver<Response>,
    shared: Arc<Shared>,
}

impl PendingResponse {
    pub fn correlation(&self) -> &str {
        &self.correlation
    }
}

impl Future for PendingResponse {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.map_err(|_| PlugwireError::ConnectionClosed))
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        let token = self.token;
        self.shared
            .pending
            .remove_if(&self.correlation, |_, (t, _)| *t == token);
    }
}
