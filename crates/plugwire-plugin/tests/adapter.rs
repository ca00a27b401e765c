//! Stream adapter over in-memory pipes.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{duplex, AsyncWrite, AsyncWriteExt};

use plugwire_core::{Envelope, ErrorCode, FrameCodec, Request, Response};
use plugwire_plugin::obs::PluginMetrics;
use plugwire_plugin::StreamAdapter;

/// Sink remembering the size of every write call.
#[derive(Clone, Default)]
struct RecordingSink {
    writes: Arc<Mutex<Vec<usize>>>,
}

impl AsyncWrite for RecordingSink {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.writes.lock().unwrap().push(buf.len());
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn json_codec() -> FrameCodec {
    FrameCodec::default()
}

fn frame(env: &Envelope) -> Vec<u8> {
    let codec: FrameCodec = FrameCodec::default();
    codec.encode(env).unwrap().to_vec()
}

fn req(path: &str, correlation: &str) -> Envelope {
    Request::<Value>::new(path)
        .unwrap()
        .with_correlation(correlation)
        .into()
}

#[tokio::test]
async fn burst_of_frames_is_drained_without_more_input() {
    let (mut host, plugin) = duplex(64 * 1024);
    let mut adapter = StreamAdapter::new(plugin, RecordingSink::default(), json_codec());

    let envs = vec![req("/a", "1"), req("/b", "2"), req("/c", "3")];
    let burst: Vec<u8> = envs.iter().flat_map(frame).collect();
    host.write_all(&burst).await.unwrap();

    // the host keeps the pipe open: every frame must come out of the
    // single chunk already read
    for expected in &envs {
        let got = tokio::time::timeout(Duration::from_secs(1), adapter.next_envelope())
            .await
            .expect("buffered frame delivered without new bytes")
            .unwrap()
            .unwrap();
        assert_eq!(&got, expected);
    }
}

#[tokio::test]
async fn malformed_frame_is_skipped_and_counted() {
    let (mut host, plugin) = duplex(64 * 1024);
    let metrics = Arc::new(PluginMetrics::default());
    let mut adapter = StreamAdapter::new(plugin, RecordingSink::default(), json_codec())
        .with_metrics(metrics.clone());

    let junk = b"not json";
    let mut bytes = (junk.len() as u32).to_be_bytes().to_vec();
    bytes.extend_from_slice(junk);
    bytes.extend(frame(&req("/ok", "7")));
    host.write_all(&bytes).await.unwrap();
    drop(host);

    let got = adapter.next_envelope().await.unwrap().unwrap();
    assert_eq!(got.correlation(), "7");
    assert!(adapter.next_envelope().await.unwrap().is_none());

    assert_eq!(metrics.malformed_frames.total(), 1);
    assert_eq!(metrics.frames_in.get(&[("kind", "request")]), 1);
}

#[tokio::test]
async fn tiny_reads_reassemble_frames() {
    let (mut host, plugin) = duplex(64 * 1024);
    let mut adapter = StreamAdapter::new(plugin, RecordingSink::default(), json_codec())
        .with_read_chunk(1);

    let env: Envelope = Request::new("/other")
        .unwrap()
        .with_correlation("C1")
        .with_payload(json!("hi"))
        .into();
    host.write_all(&frame(&env)).await.unwrap();
    drop(host);

    assert_eq!(adapter.next_envelope().await.unwrap(), Some(env));
    assert_eq!(adapter.next_envelope().await.unwrap(), None);
}

#[tokio::test]
async fn run_delivers_to_subscribers_in_order() {
    let (mut host, plugin) = duplex(64 * 1024);
    let mut adapter = StreamAdapter::new(plugin, RecordingSink::default(), json_codec());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    adapter.subscribe(move |env: &Envelope| {
        sink.lock().unwrap().push(env.correlation().to_string());
    });
    let count = Arc::new(Mutex::new(0usize));
    let counter = count.clone();
    adapter.subscribe(move |_env: &Envelope| {
        *counter.lock().unwrap() += 1;
    });

    let resp: Envelope = Response::new("r").with_payload(json!(1)).into();
    let mut bytes = frame(&req("/a", "1"));
    bytes.extend(frame(&resp));
    bytes.extend(frame(&req("/b", "2")));
    host.write_all(&bytes).await.unwrap();
    drop(host);

    adapter.run().await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["1", "r", "2"]);
    assert_eq!(*count.lock().unwrap(), 3);
}

#[tokio::test]
async fn oversized_header_ends_the_stream() {
    let (mut host, plugin) = duplex(1024);
    let codec: FrameCodec = FrameCodec::default().with_max_frame_len(1024);
    let mut adapter = StreamAdapter::new(plugin, RecordingSink::default(), codec);

    host.write_all(&[0x00, 0x10, 0x00, 0x00]).await.unwrap();
    let err = adapter.next_envelope().await.expect_err("fatal");
    assert_eq!(err.code(), ErrorCode::FrameTooLarge);
}

#[tokio::test]
async fn send_writes_fixed_size_segments() {
    let (_host, plugin) = duplex(1024);
    let sink = RecordingSink::default();
    let adapter = StreamAdapter::new(plugin, sink.clone(), json_codec());

    let codec: FrameCodec = FrameCodec::default();
    let skeleton: Envelope = Response::new("C1").with_payload(json!("")).into();
    let overhead = codec.encode(&skeleton).unwrap().len();
    let env: Envelope = Response::new("C1")
        .with_payload(json!("a".repeat(2500 - overhead)))
        .into();

    adapter.send(&env).await.unwrap();
    assert_eq!(*sink.writes.lock().unwrap(), vec![1024, 1024, 452]);

    sink.writes.lock().unwrap().clear();
    let out = adapter.outbound();
    out.send(&skeleton).await.unwrap();
    assert_eq!(sink.writes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn configured_write_chunk_is_honoured() {
    let (_host, plugin) = duplex(1024);
    let sink = RecordingSink::default();
    let adapter = StreamAdapter::new(plugin, sink.clone(), json_codec()).with_write_chunk(10);

    let env = req("/abc", "x");
    let len = frame(&env).len();
    adapter.send(&env).await.unwrap();

    let writes = sink.writes.lock().unwrap().clone();
    assert_eq!(writes.iter().sum::<usize>(), len);
    assert!(writes.iter().all(|w| *w <= 10));
    assert_eq!(writes.len(), len.div_ceil(10));
}

#[tokio::test]
async fn closed_sink_is_reported() {
    let (peer, plugin_side) = duplex(1024);
    let (reader, writer) = tokio::io::split(plugin_side);
    let metrics = Arc::new(PluginMetrics::default());
    let adapter = StreamAdapter::new(reader, writer, json_codec()).with_metrics(metrics.clone());
    drop(peer);

    let err = adapter.send(&req("/a", "1")).await.expect_err("peer gone");
    assert_eq!(err.code(), ErrorCode::SinkUnavailable);
    assert_eq!(metrics.sink_errors.total(), 1);
    assert_eq!(metrics.frames_out.total(), 0);
}
