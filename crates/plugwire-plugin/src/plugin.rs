//! Plugin runtime: wires the stream adapter, router, dispatcher and client
//! into one process-level object.
//!
//! Lifecycle:
//! 1. `Plugin::new` / `Plugin::stdio`
//! 2. `initialize` waits for the host's `/initialize` request
//! 3. `route` / `route_typed` / `subscribe`
//! 4. `run` until the host closes the input

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Notify};

use plugwire_core::error::{PlugwireError, Result};
use plugwire_core::{Envelope, FrameCodec, Request, Response};

use crate::client::Client;
use crate::config::PluginConfig;
use crate::dispatch::Dispatcher;
use crate::obs::metrics::PluginMetrics;
use crate::routing::{Handler, HandlerError, HandlerResult, Incoming, RouteId, Router};
use crate::transport::{Outbound, StreamAdapter};

/// Path of the host's handshake request.
pub const INITIALIZE_PATH: &str = "/initialize";

/// Path of the built-in metrics route.
pub const METRICS_PATH: &str = "/plugin.metrics";

#[derive(Deserialize)]
struct InitializePayload<C> {
    config: C,
}

pub struct Plugin {
    cfg: Arc<PluginConfig>,
    adapter: StreamAdapter,
    router: Router,
    client: Client,
    outbox_rx: mpsc::UnboundedReceiver<Envelope>,
    metrics: Arc<PluginMetrics>,
}

impl Plugin {
    pub fn new<R, W>(reader: R, writer: W, cfg: PluginConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let metrics = Arc::new(PluginMetrics::default());
        let t = &cfg.transport;
        let codec: FrameCodec = FrameCodec::default().with_max_frame_len(t.max_frame_bytes);
        let adapter = StreamAdapter::new(reader, writer, codec)
            .with_read_chunk(t.read_chunk_bytes)
            .with_write_chunk(t.write_chunk_bytes)
            .with_metrics(metrics.clone());

        let (outbox, outbox_rx) = mpsc::unbounded_channel();
        let client = Client::new(
            outbox,
            Duration::from_millis(cfg.dispatch.request_timeout_ms),
            metrics.clone(),
        );

        let mut router = Router::new();
        if cfg.dispatch.expose_metrics {
            let handler = MetricsHandler {
                metrics: metrics.clone(),
                client: client.clone(),
            };
            if let Err(e) = router.register(METRICS_PATH, handler) {
                tracing::warn!(error = %e, "metrics route not registered");
            }
        }

        tracing::info!(plugin = %cfg.plugin.name, "plugin created");
        Self {
            cfg: Arc::new(cfg),
            adapter,
            router,
            client,
            outbox_rx,
            metrics,
        }
    }

    /// Plugin speaking over the process stdin/stdout.
    pub fn stdio(cfg: PluginConfig) -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout(), cfg)
    }

    pub fn config(&self) -> &PluginConfig {
        &self.cfg
    }

    pub fn metrics(&self) -> Arc<PluginMetrics> {
        self.metrics.clone()
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn route<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<RouteId> {
        self.router.register(pattern, handler)
    }

    pub fn route_typed<P, R, F, Fut>(&mut self, pattern: &str, f: F) -> Result<RouteId>
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P, Incoming) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
    {
        self.router.route_typed(pattern, f)
    }

    /// Observe every inbound envelope (requests and responses) on the read
    /// task, before it is dispatched.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.adapter.subscribe(callback);
    }

    /// Wait for the host's `/initialize` request, answer it, and return the
    /// plugin specific config it carries as `{ "config": C }`.
    ///
    /// Requests arriving earlier are discarded; responses still complete
    /// pending posts.
    pub async fn initialize<C: DeserializeOwned>(&mut self) -> Result<C> {
        let outbound = self.adapter.outbound();
        loop {
            let Some(env) = self.adapter.next_envelope().await? else {
                return Err(PlugwireError::ConnectionClosed);
            };
            let request = match env {
                Envelope::Response(r) => {
                    self.client.complete(r);
                    continue;
                }
                Envelope::Request(r) if r.path() != INITIALIZE_PATH => {
                    tracing::debug!(path = r.path(), "request before initialize discarded");
                    continue;
                }
                Envelope::Request(r) => r,
            };

            let reply: Response = Response::to(&request);
            return match request.payload_as::<InitializePayload<C>>() {
                Ok(init) => {
                    outbound.send(&Envelope::from(reply)).await?;
                    tracing::info!(plugin = %self.cfg.plugin.name, "initialized");
                    Ok(init.config)
                }
                Err(e) => {
                    outbound.send(&Envelope::from(reply.with_error(&e))).await?;
                    Err(e)
                }
            };
        }
    }

    /// Serve until the host closes the input.
    ///
    /// On end of input the dispatcher finishes every queued request, the
    /// writer flushes every queued frame, then the sink is closed.
    pub async fn run(self) -> Result<()> {
        let Plugin {
            cfg,
            mut adapter,
            router,
            client,
            outbox_rx,
            metrics,
        } = self;

        let outbound = adapter.outbound();
        let shutdown = Arc::new(Notify::new());
        let writer = tokio::spawn(write_loop(outbound.clone(), outbox_rx, shutdown.clone()));

        let (req_tx, req_rx) = mpsc::unbounded_channel::<Request>();
        let dispatcher = Dispatcher::new(router, client.outbox(), metrics)
            .with_reply_unroutable(cfg.dispatch.reply_unroutable);
        let dispatch = tokio::spawn(dispatcher.run(req_rx));

        let inbound = client.clone();
        adapter.subscribe(move |env: &Envelope| match env {
            Envelope::Request(r) => {
                if req_tx.send(r.clone()).is_err() {
                    tracing::warn!(path = r.path(), "dispatcher gone; request dropped");
                }
            }
            Envelope::Response(r) => {
                inbound.complete(r.clone());
            }
        });

        tracing::info!(plugin = %cfg.plugin.name, "plugin running");
        // dropping the adapter closes the dispatcher queue
        let read = adapter.run().await;
        if let Err(e) = &read {
            tracing::error!(code = e.code().as_str(), error = %e, "read loop failed");
        }

        client.close();
        if let Err(e) = dispatch.await {
            tracing::error!(error = %e, "dispatcher task failed");
        }
        shutdown.notify_one();
        if let Err(e) = writer.await {
            tracing::error!(error = %e, "writer task failed");
        }
        if let Err(e) = outbound.shutdown().await {
            tracing::debug!(error = %e, "sink shutdown failed");
        }

        tracing::info!(plugin = %cfg.plugin.name, "plugin stopped");
        read
    }
}

async fn write_loop(
    outbound: Outbound,
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    shutdown: Arc<Notify>,
) {
    loop {
        tokio::select! {
            biased;
            next = rx.recv() => match next {
                Some(env) => write_one(&outbound, &env).await,
                None => return,
            },
            _ = shutdown.notified() => break,
        }
    }
    while let Ok(env) = rx.try_recv() {
        write_one(&outbound, &env).await;
    }
}

async fn write_one(outbound: &Outbound, env: &Envelope) {
    if let Err(e) = outbound.send(env).await {
        tracing::error!(
            code = e.code().as_str(),
            correlation = env.correlation(),
            error = %e,
            "frame not written"
        );
    }
}

/// Built-in `/plugin.metrics` route: answers with the Prometheus text.
struct MetricsHandler {
    metrics: Arc<PluginMetrics>,
    client: Client,
}

#[async_trait]
impl Handler for MetricsHandler {
    async fn call(&self, _incoming: Incoming) -> HandlerResult {
        let pending = self.client.pending_len() as u64;
        let text = self
            .metrics
            .render(&[("plugwire_pending_requests", pending)]);
        Ok(Some(text.into()))
    }
}
