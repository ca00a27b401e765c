use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures_util::FutureExt;
use tokio::sync::mpsc;

use plugwire_core::error::PlugwireError;
use plugwire_core::{Request, Response};

use crate::client::Outbox;
use crate::obs::metrics::PluginMetrics;
use crate::routing::Router;

/// How one request was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Handler returned a value; a response carrying it was queued.
    Replied,
    /// Handler returned nothing; no response.
    Silent,
    /// Handler failed or panicked; an error response was queued.
    Failed(String),
    /// No route matched.
    Unroutable,
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Replied => "replied",
            Outcome::Silent => "silent",
            Outcome::Failed(_) => "failed",
            Outcome::Unroutable => "unroutable",
        }
    }
}

/// Turns inbound requests into handler calls and handler results into
/// response envelopes.
///
/// Requests are handled one at a time in arrival order. A failing or
/// panicking handler only affects its own request.
pub struct Dispatcher {
    router: Router,
    outbox: Outbox,
    metrics: Arc<PluginMetrics>,
    reply_unroutable: bool,
}

impl Dispatcher {
    pub fn new(router: Router, outbox: Outbox, metrics: Arc<PluginMetrics>) -> Self {
        Self {
            router,
            outbox,
            metrics,
            reply_unroutable: false,
        }
    }

    /// Answer unroutable requests with an error response instead of
    /// dropping them.
    pub fn with_reply_unroutable(mut self, on: bool) -> Self {
        self.reply_unroutable = on;
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Consume requests until every sender is gone.
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<Request>) {
        while let Some(request) = rx.recv().await {
            self.dispatch(request).await;
        }
        tracing::debug!("dispatcher drained");
    }

    pub async fn dispatch(&self, request: Request) -> Outcome {
        let started = Instant::now();
        let path = request.path().to_string();
        let reply: Response = Response::to(&request);

        let called = AssertUnwindSafe(self.router.call(&path, request))
            .catch_unwind()
            .await;

        let outcome = match called {
            Ok(Some(Ok(Some(value)))) => {
                self.respond(reply.with_payload(value));
                Outcome::Replied
            }
            Ok(Some(Ok(None))) => Outcome::Silent,
            Ok(Some(Err(e))) => {
                self.metrics.handler_failures.inc(&[("reason", "error")]);
                tracing::warn!(
                    path = %path,
                    correlation = reply.correlation(),
                    error = %e,
                    "handler failed"
                );
                self.respond(reply.with_error(e.message()));
                Outcome::Failed(e.message().to_string())
            }
            Err(panic) => {
                let msg = format!("handler panicked: {}", panic_message(panic.as_ref()));
                self.metrics.handler_failures.inc(&[("reason", "panic")]);
                tracing::error!(path = %path, correlation = reply.correlation(), "{msg}");
                self.respond(reply.with_error(&msg));
                Outcome::Failed(msg)
            }
            Ok(None) => {
                self.metrics.unroutable.inc(&[]);
                let err = PlugwireError::Unroutable(path.clone());
                tracing::warn!(
                    path = %path,
                    correlation = reply.correlation(),
                    code = err.code().as_str(),
                    "no route"
                );
                if self.reply_unroutable {
                    self.respond(reply.with_error(&err));
                }
                Outcome::Unroutable
            }
        };

        self.metrics
            .dispatch_duration
            .observe(&[("outcome", outcome.label())], started.elapsed());
        outcome
    }

    fn respond(&self, response: Response) {
        if self.outbox.send(response.into()).is_err() {
            tracing::warn!("outbox closed; response dropped");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
