//! Frame vector tests: decode wire bytes, check shape, re-encode.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use plugwire_core::{Envelope, FrameCodec};

use vector_loader::load;

const OK_VECTORS: [&str; 5] = [
    "request_other.json",
    "request_channel.json",
    "request_no_payload.json",
    "response_ok.json",
    "response_error.json",
];

const BAD_VECTORS: [&str; 5] = [
    "bad_request_with_error.json",
    "bad_empty_path.json",
    "bad_missing_correlation.json",
    "bad_not_json.json",
    "bad_channel_type.json",
];

#[test]
fn ok_vectors_decode_and_reencode_identically() {
    for f in OK_VECTORS {
        let v = load(f);
        let raw = v.frame();
        let ex = v.expect.as_ref().expect("missing expect block");
        let ctx = &v.description;

        let mut codec: FrameCodec = FrameCodec::default();
        let env = codec
            .feed(&raw)
            .unwrap_or_else(|e| panic!("vector={ctx} err={e}"))
            .expect("expected a complete frame");

        assert_eq!(env.correlation(), ex.correlation, "vector={ctx}");
        assert_eq!(env.path(), ex.path.as_deref(), "vector={ctx}");

        match (&env, ex.kind.as_str()) {
            (Envelope::Request(r), "request") => {
                assert_eq!(r.payload(), ex.payload.as_ref(), "vector={ctx}");
            }
            (Envelope::Response(r), "response") => {
                assert_eq!(r.payload(), ex.payload.as_ref(), "vector={ctx}");
                assert_eq!(r.error(), ex.error.as_deref(), "vector={ctx}");
            }
            (other, kind) => panic!("vector={ctx} expected {kind}, got {other:?}"),
        }

        let channel = env.channel().map(|c| serde_json::to_value(c).unwrap());
        assert_eq!(channel, ex.channel, "vector={ctx}");

        assert_eq!(codec.buffered_len(), 0, "vector={ctx}");
        assert!(!codec.is_mid_frame(), "vector={ctx}");

        let reencoded = codec.encode(&env).unwrap();
        assert_eq!(reencoded.as_ref(), raw.as_slice(), "vector={ctx}");
    }
}

#[test]
fn bad_vectors_are_rejected_and_consumed() {
    for f in BAD_VECTORS {
        let v = load(f);
        let code = v.error_code.as_deref().expect("missing error_code");
        let ctx = &v.description;

        let mut codec: FrameCodec = FrameCodec::default();
        let err = codec.feed(&v.frame()).expect_err("expected malformed frame");
        assert_eq!(err.code().as_str(), code, "vector={ctx}");
        assert!(err.is_recoverable(), "vector={ctx}");

        // the offending frame is gone
        assert_eq!(codec.buffered_len(), 0, "vector={ctx}");
        assert!(!codec.is_mid_frame(), "vector={ctx}");
    }
}
