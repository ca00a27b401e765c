//! Echo plugin.
//!
//! Speaks the plugwire protocol over stdin/stdout:
//! - `/other`: answers with the string payload plus a suffix
//! - `/message`: logged, no answer
//! - `/users/:id`: answers with the parsed id
//!
//! Config file from `PLUGWIRE_CONFIG`; logs on stderr, filtered by `RUST_LOG`.

use serde::Deserialize;
use serde_json::{json, Value};

use plugwire_core::Result;
use plugwire_plugin::{config, obs, HandlerError, HandlerResult, Incoming, Plugin};

/// Plugin specific config sent by the host in `/initialize`.
#[derive(Debug, Default, Deserialize)]
struct EchoConfig {
    #[serde(default)]
    suffix: Option<String>,
}

async fn on_message(incoming: Incoming) -> HandlerResult {
    let channel = incoming.request.channel().map(|c| c.id.clone());
    let text = incoming.payload_as::<Value>()?;
    tracing::info!(?channel, %text, "message received");
    Ok(None)
}

async fn on_user(incoming: Incoming) -> HandlerResult {
    let id: u64 = incoming.params.parse("id")?;
    Ok(Some(json!({ "id": id })))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = config::load_from_env()?;
    let host_log = obs::init_tracing(&cfg.log)?;

    let mut plugin = Plugin::stdio(cfg);
    host_log.attach(plugin.client().outbox());

    let echo: EchoConfig = plugin.initialize().await?;
    let suffix = echo.suffix.unwrap_or_else(|| "!".to_string());

    plugin.route_typed("/other", move |text: String, _incoming: Incoming| {
        let reply = format!("{text}{suffix}");
        async move { Ok::<_, HandlerError>(reply) }
    })?;
    plugin.route("/message", on_message)?;
    plugin.route("/users/:id", on_user)?;

    plugin.run().await
}
