//! Whole plugin runtime driven by a fake host over an in-memory pipe.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{duplex, split, AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

use plugwire_core::{Envelope, ErrorCode, FrameCodec, Request, Response};
use plugwire_plugin::{
    HandlerError, HandlerResult, Incoming, Plugin, PluginConfig, INITIALIZE_PATH, METRICS_PATH,
};

/// Host side of the pipe.
struct Host {
    read: ReadHalf<DuplexStream>,
    write: WriteHalf<DuplexStream>,
    codec: FrameCodec,
    buf: Vec<u8>,
}

impl Host {
    async fn send(&mut self, env: impl Into<Envelope>) {
        let frame = self.codec.encode(&env.into()).unwrap();
        self.write.write_all(&frame).await.unwrap();
    }

    async fn request(&mut self, path: &str, correlation: &str, payload: Value) {
        let req = Request::<Value>::new(path)
            .unwrap()
            .with_correlation(correlation)
            .with_payload(payload);
        self.send(req).await;
    }

    /// Next envelope from the plugin; `None` once it closed its output.
    async fn recv(&mut self) -> Option<Envelope> {
        loop {
            if let Some(env) = self.codec.next_buffered().unwrap() {
                return Some(env);
            }
            let n = tokio::time::timeout(Duration::from_secs(5), self.read.read(&mut self.buf))
                .await
                .expect("plugin answered in time")
                .unwrap();
            if n == 0 {
                return None;
            }
            if let Some(env) = self.codec.feed(&self.buf[..n]).unwrap() {
                return Some(env);
            }
        }
    }

    async fn recv_response(&mut self) -> Response {
        match self.recv().await {
            Some(Envelope::Response(r)) => r,
            other => panic!("expected response, got {other:?}"),
        }
    }

    async fn initialize(&mut self, config: Value) {
        self.request(INITIALIZE_PATH, "init", json!({ "config": config })).await;
        let resp = self.recv_response().await;
        assert_eq!(resp.correlation(), "init");
        assert!(!resp.is_error(), "{:?}", resp.error());
        assert!(resp.payload().is_none());
    }

    async fn close(&mut self) {
        self.write.shutdown().await.unwrap();
    }
}

fn pipe(cfg: PluginConfig) -> (Plugin, Host) {
    let (plugin_io, host_io) = duplex(64 * 1024);
    let (pr, pw) = split(plugin_io);
    let (hr, hw) = split(host_io);
    let host = Host {
        read: hr,
        write: hw,
        codec: FrameCodec::default(),
        buf: vec![0u8; 4096],
    };
    (Plugin::new(pr, pw, cfg), host)
}

async fn other(incoming: Incoming) -> HandlerResult {
    let text: String = incoming.payload_as()?;
    Ok(Some(json!(format!("{text}!"))))
}

async fn explode(_incoming: Incoming) -> HandlerResult {
    panic!("handler exploded")
}

fn echo_plugin(cfg: PluginConfig) -> (Plugin, Host) {
    let (mut plugin, host) = pipe(cfg);
    plugin.route("/other", other).unwrap();
    plugin
        .route("/message", |_incoming: Incoming| async move { Ok(None) })
        .unwrap();
    plugin
        .route("/boom", |_incoming: Incoming| async move {
            Err(HandlerError::new("boom failed"))
        })
        .unwrap();
    plugin.route("/panic", explode).unwrap();
    (plugin, host)
}

fn serve(mut plugin: Plugin) -> JoinHandle<plugwire_core::Result<()>> {
    tokio::spawn(async move {
        let _: Value = plugin.initialize().await?;
        plugin.run().await
    })
}

#[tokio::test]
async fn other_round_trip() {
    let (plugin, mut host) = echo_plugin(PluginConfig::default());
    let task = serve(plugin);
    host.initialize(json!({})).await;

    host.request("/other", "C1", json!("hi")).await;
    let got = host.recv().await.unwrap();
    let expected: Envelope = Response::new("C1").with_payload(json!("hi!")).into();
    assert_eq!(got, expected);

    let bytes = host.codec.encode(&got).unwrap();
    let body = br#"{"correlation":"C1","payload":"hi!"}"#;
    assert_eq!(&bytes[..4], &(body.len() as u32).to_be_bytes());
    assert_eq!(&bytes[4..], body);

    host.close().await;
    assert!(host.recv().await.is_none(), "plugin closes its output");
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn failures_are_isolated_and_silent_routes_stay_silent() {
    let (plugin, mut host) = echo_plugin(PluginConfig::default());
    let task = serve(plugin);
    host.initialize(json!(null)).await;

    host.request("/boom", "B", json!(null)).await;
    host.request("/nowhere", "N", json!(null)).await;
    host.request("/panic", "P", json!(null)).await;
    host.request("/message", "M", json!({ "text": "hello" })).await;
    host.request("/other", "O", json!("still alive")).await;

    let boom = host.recv_response().await;
    assert_eq!(boom.correlation(), "B");
    assert_eq!(boom.error(), Some("boom failed"));

    let panicked = host.recv_response().await;
    assert_eq!(panicked.correlation(), "P");
    assert!(panicked.error().unwrap().contains("handler exploded"));

    // nothing for /nowhere or /message
    let ok = host.recv_response().await;
    assert_eq!(ok.correlation(), "O");
    assert_eq!(ok.payload(), Some(&json!("still alive!")));

    host.close().await;
    assert!(host.recv().await.is_none());
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn channel_is_echoed_on_the_response() {
    let (plugin, mut host) = echo_plugin(PluginConfig::default());
    let task = serve(plugin);
    host.initialize(json!({})).await;

    let channel = plugwire_core::Channel::group("g1", "Developers").with_self_id("bot");
    let req = Request::<Value>::new("/other")
        .unwrap()
        .with_correlation("C2")
        .with_channel(channel.clone())
        .with_payload(json!("yo"));
    host.send(req).await;

    let resp = host.recv_response().await;
    assert_eq!(resp.channel(), Some(&channel));

    host.close().await;
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn unroutable_reply_when_enabled() {
    let mut cfg = PluginConfig::default();
    cfg.dispatch.reply_unroutable = true;
    let (plugin, mut host) = echo_plugin(cfg);
    let task = serve(plugin);
    host.initialize(json!({})).await;

    host.request("/nowhere", "N", json!(null)).await;
    let resp = host.recv_response().await;
    assert_eq!(resp.correlation(), "N");
    assert_eq!(resp.error(), Some("unroutable: /nowhere"));

    host.close().await;
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn requests_before_initialize_are_discarded() {
    let (plugin, mut host) = echo_plugin(PluginConfig::default());
    let task = serve(plugin);

    host.request("/other", "early", json!("x")).await;
    host.initialize(json!({})).await;
    host.request("/other", "late", json!("y")).await;

    let resp = host.recv_response().await;
    assert_eq!(resp.correlation(), "late");

    host.close().await;
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn initialize_decodes_plugin_config() {
    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct EchoConfig {
        suffix: String,
    }

    let (mut plugin, mut host) = pipe(PluginConfig::default());
    let task = tokio::spawn(async move { plugin.initialize::<EchoConfig>().await });

    host.initialize(json!({ "suffix": "?" })).await;
    let cfg = task.await.unwrap().unwrap();
    assert_eq!(cfg, EchoConfig { suffix: "?".into() });
}

#[tokio::test]
async fn initialize_with_bad_config_is_answered_with_an_error() {
    let (mut plugin, mut host) = pipe(PluginConfig::default());
    let task = tokio::spawn(async move { plugin.initialize::<u32>().await });

    host.request(INITIALIZE_PATH, "init", json!({ "config": "not a number" })).await;
    let resp = host.recv_response().await;
    assert!(resp.is_error());

    let err = task.await.unwrap().expect_err("bad config");
    assert_eq!(err.code(), ErrorCode::MalformedPayload);
}

#[tokio::test]
async fn eof_before_initialize() {
    let (mut plugin, mut host) = pipe(PluginConfig::default());
    host.close().await;
    let err = plugin.initialize::<Value>().await.expect_err("closed");
    assert_eq!(err.code(), ErrorCode::ConnectionClosed);
}

#[tokio::test]
async fn handler_can_call_back_into_the_host() {
    let (mut plugin, mut host) = pipe(PluginConfig::default());
    let client = plugin.client();
    plugin
        .route("/ask", move |incoming: Incoming| {
            let client = client.clone();
            async move {
                let question = Request::<Value>::new("/host.echo")?
                    .with_payload(incoming.request.payload().cloned().unwrap_or(Value::Null));
                let answer = client.request(question).await?;
                answer.into_result().map_err(HandlerError::new)
            }
        })
        .unwrap();
    let task = serve(plugin);
    host.initialize(json!({})).await;

    host.request("/ask", "A", json!("ping")).await;

    let callback = match host.recv().await {
        Some(Envelope::Request(r)) => r,
        other => panic!("expected a request from the plugin, got {other:?}"),
    };
    assert_eq!(callback.path(), "/host.echo");
    assert_eq!(callback.payload(), Some(&json!("ping")));
    host.send(Response::to(&callback).with_payload(json!("pong"))).await;

    let resp = host.recv_response().await;
    assert_eq!(resp.correlation(), "A");
    assert_eq!(resp.payload(), Some(&json!("pong")));

    host.close().await;
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn metrics_route_when_exposed() {
    let mut cfg = PluginConfig::default();
    cfg.dispatch.expose_metrics = true;
    let (plugin, mut host) = echo_plugin(cfg);
    let task = serve(plugin);
    host.initialize(json!({})).await;

    host.request("/other", "1", json!("a")).await;
    host.recv_response().await;
    host.request(METRICS_PATH, "m", json!(null)).await;

    let resp = host.recv_response().await;
    let text: String = resp.payload_as().unwrap();
    assert!(text.contains("plugwire_frames_in_total{kind=\"request\"}"), "{text}");
    assert!(text.contains("plugwire_pending_requests 0"), "{text}");

    host.close().await;
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn subscribers_observe_inbound_traffic() {
    let (mut plugin, mut host) = echo_plugin(PluginConfig::default());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    plugin.subscribe(move |env: &Envelope| {
        let _ = tx.send(env.correlation().to_string());
    });
    let task = serve(plugin);
    host.initialize(json!({})).await;

    host.request("/message", "s1", json!("x")).await;
    host.request("/other", "s2", json!("y")).await;
    host.recv_response().await;

    host.close().await;
    task.await.unwrap().unwrap();

    let mut seen = Vec::new();
    while let Ok(c) = rx.try_recv() {
        seen.push(c);
    }
    assert_eq!(seen, vec!["s1", "s2"]);
}

#[tokio::test]
async fn large_responses_cross_the_pipe_intact() {
    let mut cfg = PluginConfig::default();
    cfg.transport.write_chunk_bytes = 7;
    let (plugin, mut host) = echo_plugin(cfg);
    let task = serve(plugin);
    host.initialize(json!({})).await;

    let big = "z".repeat(100_000);
    host.request("/other", "big", json!(big)).await;
    let resp = host.recv_response().await;
    assert_eq!(resp.payload(), Some(&json!(format!("{big}!"))));

    host.close().await;
    task.await.unwrap().unwrap();
}
