//! End-to-end behavior of the request dump middleware in front of a
//! recording downstream service.

mod helpers;

use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, UPGRADE};
use http::{Method, Request};
use reqdump_core::dump::body_section;
use reqdump_core::{CaptureError, DumpConfig, DumpError, MemorySink, MethodFilter};
use reqdump_proxy::{DumpOutcome, ForwardBody, RequestDumpLayer};
use tower::{Layer, ServiceExt};

use helpers::{FailingBody, FailingSink, RecordingService, chunked, full};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn config(methods: &str, headers: bool, payload: bool) -> DumpConfig {
    DumpConfig {
        method_filter: MethodFilter::parse(methods),
        include_headers: headers,
        include_body: payload,
        ..DumpConfig::default()
    }
}

fn stack(config: DumpConfig) -> (RequestDumpLayer, MemorySink, RecordingService) {
    let sink = MemorySink::new();
    let layer = RequestDumpLayer::with_sink(config, Arc::new(sink.clone()));
    (layer, sink, RecordingService::new())
}

// ─────────────────────────────────────────────────────────────────────────────
// Method filter
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_filtered_method_is_forwarded_without_dump() {
    let (layer, sink, downstream) = stack(config("POST", true, true));
    let req = Request::get("/x").body(full("")).unwrap();

    layer.layer(downstream.clone()).oneshot(req).await.unwrap();

    assert!(sink.is_empty());
    let received = downstream.single();
    assert_eq!(received.method, Method::GET);
    assert_eq!(received.path, "/x");
    assert_eq!(received.body.unwrap(), Bytes::new());
}

#[tokio::test]
async fn test_method_filter_is_case_insensitive() {
    let (layer, sink, downstream) = stack(config(" post , put ", false, false));

    let svc = layer.layer(downstream.clone());
    svc.clone().oneshot(Request::post("/a").body(full("1")).unwrap()).await.unwrap();
    svc.clone().oneshot(Request::put("/b").body(full("2")).unwrap()).await.unwrap();
    svc.oneshot(Request::delete("/c").body(full("3")).unwrap()).await.unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert!(records[0].contains("HTTP POST /a"));
    assert!(records[1].contains("HTTP PUT /b"));
    assert_eq!(downstream.received().len(), 3);
}

#[tokio::test]
async fn test_empty_filter_dumps_every_method() {
    let (layer, sink, downstream) = stack(config("", false, false));
    let svc = layer.layer(downstream.clone());

    for method in [Method::GET, Method::POST, Method::PATCH, Method::OPTIONS] {
        let req = Request::builder().method(method).uri("/").body(full("")).unwrap();
        svc.clone().oneshot(req).await.unwrap();
    }

    assert_eq!(sink.len(), 4);
}

// ─────────────────────────────────────────────────────────────────────────────
// Record contents
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_post_with_query_minimal_record() {
    let (layer, sink, downstream) = stack(config("", false, false));
    let req = Request::post("/api?id=5")
        .header(CONTENT_TYPE, "application/json")
        .body(full(r#"{"a":1}"#))
        .unwrap();

    layer.layer(downstream.clone()).oneshot(req).await.unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert!(record.contains("  HTTP POST /api\n"));
    assert!(record.contains("  QUERY PARAMS: id=5\n"));
    assert!(!record.contains("HEADERS:"));
    assert_eq!(body_section(record), Some(""));

    let received = downstream.single();
    assert_eq!(received.query.as_deref(), Some("id=5"));
    assert_eq!(received.body.unwrap().as_ref(), br#"{"a":1}"#);
}

#[tokio::test]
async fn test_header_section_included() {
    let (layer, sink, downstream) = stack(config("", true, false));
    let req = Request::post("/h")
        .header("X-Test", "abc")
        .header(CONTENT_TYPE, "text/plain")
        .body(full("x"))
        .unwrap();

    layer.layer(downstream).oneshot(req).await.unwrap();

    let record = &sink.records()[0];
    assert!(record.contains("\nHEADERS:\n"));
    assert!(record.contains("\tx-test: abc\n"));
    assert!(record.contains("\tcontent-type: text/plain\n"));
}

#[tokio::test]
async fn test_header_section_omitted() {
    let (layer, sink, downstream) = stack(config("", false, true));
    let req = Request::post("/h").header("X-Test", "abc").body(full("x")).unwrap();

    layer.layer(downstream).oneshot(req).await.unwrap();

    let record = &sink.records()[0];
    assert!(!record.contains("HEADERS:"));
    assert!(!record.contains("x-test"));
}

#[tokio::test]
async fn test_payload_section() {
    let (layer, sink, downstream) = stack(config("", false, true));
    let req = Request::post("/p").body(full("hello")).unwrap();

    layer.layer(downstream.clone()).oneshot(req).await.unwrap();

    assert_eq!(body_section(&sink.records()[0]), Some("hello"));
    assert_eq!(downstream.single().body.unwrap().as_ref(), b"hello");
}

#[tokio::test]
async fn test_multi_frame_body_is_reassembled() {
    let (layer, sink, downstream) = stack(config("", false, true));
    let req = Request::post("/stream").body(chunked(&["hel", "lo ", "world"])).unwrap();

    layer.layer(downstream.clone()).oneshot(req).await.unwrap();

    assert_eq!(body_section(&sink.records()[0]), Some("hello world"));
    assert_eq!(downstream.single().body.unwrap().as_ref(), b"hello world");
}

// ─────────────────────────────────────────────────────────────────────────────
// Failure paths
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_read_failure_forwards_empty_body() {
    let (layer, sink, downstream) = stack(config("", true, true));
    let req = Request::post("/upload")
        .header(CONTENT_LENGTH, "64")
        .body(FailingBody::after(b"partial"))
        .unwrap();

    layer.layer(downstream.clone()).oneshot(req).await.unwrap();

    assert!(sink.is_empty());
    let received = downstream.single();
    assert_eq!(received.path, "/upload");
    assert_eq!(received.headers[CONTENT_LENGTH], "0");
    assert_eq!(received.body.unwrap(), Bytes::new());
}

#[tokio::test]
async fn test_read_failure_outcome() {
    let (layer, _sink, _) = stack(config("", false, false));
    let req = Request::post("/upload").body(FailingBody::after(b"abc")).unwrap();

    let (forwarded, outcome) = layer.intercept(req).await;

    match outcome {
        DumpOutcome::Failed(DumpError::Capture(CaptureError::Read { bytes_read, .. })) => {
            assert_eq!(bytes_read, 3)
        }
        other => panic!("expected read failure, got {other:?}"),
    }
    assert!(matches!(forwarded.body(), ForwardBody::Empty));
}

#[tokio::test]
async fn test_over_limit_stream_is_forwarded_intact() {
    let (layer, sink, downstream) = stack(DumpConfig {
        max_body_bytes: 6,
        include_body: true,
        ..DumpConfig::default()
    });
    let req = Request::post("/big").body(chunked(&["aaaa", "bbbb", "cccc"])).unwrap();

    layer.layer(downstream.clone()).oneshot(req).await.unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].contains("  HTTP POST /big\n"));
    assert_eq!(
        body_section(&records[0]),
        Some("(body not captured: exceeds 6 bytes)")
    );
    assert!(!records[0].contains("aaaa"));
    assert_eq!(downstream.single().body.unwrap().as_ref(), b"aaaabbbbcccc");
}

#[tokio::test]
async fn test_over_limit_record_honors_header_and_payload_flags() {
    let (layer, sink, _) = stack(DumpConfig {
        max_body_bytes: 4,
        include_headers: true,
        ..DumpConfig::default()
    });
    let req = Request::post("/upload?part=1")
        .header("X-Test", "abc")
        .body(full("0123456789"))
        .unwrap();

    let (_, outcome) = layer.intercept(req).await;

    assert!(matches!(outcome, DumpOutcome::DumpedWithoutBody { limit: 4 }));
    let record = &sink.records()[0];
    assert!(record.contains("  QUERY PARAMS: part=1\n"));
    assert!(record.contains("\tx-test: abc\n"));
    assert_eq!(body_section(record), Some(""));
}

#[tokio::test]
async fn test_over_limit_filtered_method_is_not_dumped() {
    let (layer, sink, downstream) = stack(DumpConfig {
        max_body_bytes: 4,
        method_filter: MethodFilter::parse("PUT"),
        ..DumpConfig::default()
    });
    let req = Request::post("/upload").body(full("0123456789")).unwrap();

    layer.layer(downstream.clone()).oneshot(req).await.unwrap();

    assert!(sink.is_empty());
    assert_eq!(downstream.single().body.unwrap().as_ref(), b"0123456789");
}

#[tokio::test]
async fn test_declared_over_limit_body_is_not_read() {
    let (layer, sink, _) = stack(DumpConfig {
        max_body_bytes: 10,
        ..DumpConfig::default()
    });
    let payload = "x".repeat(100);
    let req = Request::post("/big").body(full(payload.clone())).unwrap();

    let (forwarded, outcome) = layer.intercept(req).await;

    assert!(matches!(outcome, DumpOutcome::DumpedWithoutBody { limit: 10 }));
    assert_eq!(sink.len(), 1);
    let body = http_body_util::BodyExt::collect(forwarded.into_body())
        .await
        .unwrap()
        .to_bytes();
    assert_eq!(body, Bytes::from(payload));
}

#[tokio::test]
async fn test_sink_failure_still_forwards() {
    let layer = RequestDumpLayer::with_sink(config("", false, true), Arc::new(FailingSink));
    let downstream = RecordingService::new();
    let req = Request::post("/s").body(full("kept")).unwrap();

    let (forwarded, outcome) = layer.intercept(req).await;
    assert!(matches!(outcome, DumpOutcome::Failed(DumpError::Sink(_))));

    downstream.clone().oneshot(forwarded).await.unwrap();
    assert_eq!(downstream.single().body.unwrap().as_ref(), b"kept");
}

// ─────────────────────────────────────────────────────────────────────────────
// Bypass
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_bypasses_capture() {
    let (layer, sink, downstream) = stack(config("", true, true));
    let req = Request::builder()
        .method(Method::CONNECT)
        .uri("example.com:443")
        .body(full("tunnel bytes"))
        .unwrap();

    layer.layer(downstream.clone()).oneshot(req).await.unwrap();

    assert!(sink.is_empty());
    assert_eq!(downstream.single().body.unwrap().as_ref(), b"tunnel bytes");
}

#[tokio::test]
async fn test_upgrade_offer_is_dumped_and_forwarded() {
    let (layer, sink, downstream) = stack(DumpConfig::default());
    let req = Request::post("/api?id=5")
        .header(CONNECTION, "Upgrade, HTTP2-Settings")
        .header(UPGRADE, "h2c")
        .body(full(r#"{"a":1}"#))
        .unwrap();

    layer.layer(downstream.clone()).oneshot(req).await.unwrap();

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert!(records[0].contains("  HTTP POST /api\n"));
    assert!(records[0].contains("  QUERY PARAMS: id=5\n"));
    let received = downstream.single();
    assert_eq!(received.headers[UPGRADE], "h2c");
    assert_eq!(received.body.unwrap().as_ref(), br#"{"a":1}"#);
}

#[tokio::test]
async fn test_websocket_handshake_is_dumped() {
    let (layer, sink, _) = stack(config("GET", true, false));
    let req = Request::get("/ws")
        .header(CONNECTION, "Upgrade")
        .header(UPGRADE, "websocket")
        .body(full(""))
        .unwrap();

    let (forwarded, outcome) = layer.intercept(req).await;

    assert!(matches!(outcome, DumpOutcome::Dumped));
    assert!(matches!(forwarded.body(), ForwardBody::Replay(_)));
    assert!(sink.records()[0].contains("\tupgrade: websocket\n"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Concurrency
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_produce_whole_records() {
    let (layer, sink, downstream) = stack(config("", false, true));
    let svc = layer.layer(downstream.clone());

    let calls = (0..32).map(|i| {
        let svc = svc.clone();
        tokio::spawn(async move {
            let req = Request::post(format!("/req/{i}")).body(full(format!("body-{i}"))).unwrap();
            svc.oneshot(req).await.unwrap();
        })
    });
    for handle in futures_util::future::join_all(calls).await {
        handle.unwrap();
    }

    let records = sink.records();
    assert_eq!(records.len(), 32);
    for record in &records {
        let path = record
            .lines()
            .find_map(|l| l.strip_prefix("  HTTP POST /req/"))
            .unwrap();
        assert_eq!(body_section(record), Some(format!("body-{path}").as_str()));
    }
    assert_eq!(downstream.received().len(), 32);
}
