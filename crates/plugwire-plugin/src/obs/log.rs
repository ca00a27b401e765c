//! Tracing setup and host log forwarding.
//!
//! Human-readable logs go to stderr through the `fmt` layer. When enabled,
//! [`HostLogLayer`] additionally mirrors events to the host as `/log.create`
//! requests with payload `{level, message, target}`. Events emitted by the
//! plugwire crates themselves are never forwarded, otherwise sending a log
//! request could log and feed itself.

use std::fmt::{self, Write as _};
use std::sync::{Arc, OnceLock};

use serde_json::json;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tfmt, EnvFilter, Layer};

use plugwire_core::error::{PlugwireError, Result};
use plugwire_core::Request;

use crate::client::Outbox;
use crate::config::LogSection;

/// Path of forwarded log requests.
pub const LOG_PATH: &str = "/log.create";

const OWN_TARGETS: [&str; 2] = ["plugwire_core", "plugwire_plugin"];

/// Late-bound destination for forwarded events. The subscriber is installed
/// before the plugin (and its outbox) exists.
#[derive(Clone, Default)]
pub struct HostLogSink {
    outbox: Arc<OnceLock<Outbox>>,
}

impl HostLogSink {
    /// Bind the outbox; only the first call has an effect.
    pub fn attach(&self, outbox: Outbox) -> bool {
        self.outbox.set(outbox).is_ok()
    }

    pub fn is_attached(&self) -> bool {
        self.outbox.get().is_some()
    }
}

pub struct HostLogLayer {
    sink: HostLogSink,
    level: Level,
}

impl HostLogLayer {
    pub fn new(sink: HostLogSink, level: Level) -> Self {
        Self { sink, level }
    }
}

impl<S: Subscriber> Layer<S> for HostLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > self.level {
            return;
        }
        let target = meta.target();
        if OWN_TARGETS.iter().any(|own| target.starts_with(own)) {
            return;
        }
        let Some(outbox) = self.sink.outbox.get() else {
            return;
        };

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let payload = json!({
            "level": meta.level().to_string().to_lowercase(),
            "message": visitor.finish(),
            "target": target,
        });
        let Ok(request) = Request::new(LOG_PATH) else {
            return;
        };
        // a closed outbox means the plugin is stopping
        let _ = outbox.send(request.with_payload(payload).into());
    }
}

/// `message` first, then `key=value` for the remaining fields.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields
        } else {
            format!("{} {}", self.message, self.fields)
        }
    }

    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}

/// Install the global subscriber: `fmt` to stderr filtered by `RUST_LOG`,
/// plus the host forwarding layer when `log.forward_to_host` is set.
///
/// Returns the sink to attach once the plugin's outbox exists.
pub fn init_tracing(cfg: &LogSection) -> Result<HostLogSink> {
    let sink = HostLogSink::default();
    let host = if cfg.forward_to_host {
        Some(HostLogLayer::new(sink.clone(), cfg.level()?))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(
            tfmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::from_default_env()),
        )
        .with(host)
        .try_init()
        .map_err(|e| PlugwireError::Internal(format!("tracing init failed: {e}")))?;

    Ok(sink)
}
