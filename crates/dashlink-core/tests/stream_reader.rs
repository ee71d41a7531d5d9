mod common;

use std::time::Duration;

use common::{http_client, Reply, SseServer};
use dashlink_core::stream::{RawLine, StreamEvent, StreamReader};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const RETRY: Duration = Duration::from_millis(50);

async fn next_event(rx: &mut mpsc::Receiver<StreamEvent>) -> StreamEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for stream event")
        .expect("reader hung up")
}

fn data(s: &str) -> StreamEvent {
    StreamEvent::Line(RawLine::Data(s.to_string()))
}

fn blank() -> StreamEvent {
    StreamEvent::Line(RawLine::Blank)
}

#[tokio::test]
async fn test_yields_lines_and_reconnects_after_clean_end() {
    let server = SseServer::start(vec![Reply::ok(
        ": hello\nevent: update\ndata: Simple1|5\n\ndata: Simple2|40\r\n\r\n",
    )])
    .await;
    let reader = StreamReader::with_client(http_client(), server.url()).with_retry_delay(RETRY);
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let handle = reader.spawn(tx, cancel.clone());

    let mut events = Vec::new();
    for _ in 0..6 {
        events.push(next_event(&mut rx).await);
    }
    assert_eq!(
        events,
        vec![
            StreamEvent::Connected,
            data("Simple1|5"),
            blank(),
            data("Simple2|40"),
            blank(),
            StreamEvent::Connected,
        ]
    );
    assert!(server.connections() >= 2);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_lines_split_across_chunks_are_reassembled() {
    let server = SseServer::start(vec![Reply::chunked(vec![
        "data: Simp",
        "le1|75.3%\nda",
        "ta: {|}Simple7|300\n",
        "\n",
    ])])
    .await;
    let reader = StreamReader::with_client(http_client(), server.url()).with_retry_delay(RETRY);
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let handle = reader.spawn(tx, cancel.clone());

    assert_eq!(next_event(&mut rx).await, StreamEvent::Connected);
    assert_eq!(next_event(&mut rx).await, data("Simple1|75.3%"));
    assert_eq!(next_event(&mut rx).await, data("{|}Simple7|300"));
    assert_eq!(next_event(&mut rx).await, blank());

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_error_status_is_retried() {
    let server = SseServer::start(vec![
        Reply::status("503 Service Unavailable", "maintenance"),
        Reply::ok("data: Simple1|1\n\n"),
    ])
    .await;
    let reader = StreamReader::with_client(http_client(), server.url()).with_retry_delay(RETRY);
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let handle = reader.spawn(tx, cancel.clone());

    assert_eq!(next_event(&mut rx).await, StreamEvent::Connected);
    assert_eq!(server.connections(), 2);
    assert_eq!(next_event(&mut rx).await, data("Simple1|1"));

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_stops_when_consumer_is_dropped() {
    let server = SseServer::start(vec![Reply::ok("data: Simple1|1\n\n")]).await;
    let reader = StreamReader::with_client(http_client(), server.url()).with_retry_delay(RETRY);
    let (tx, rx) = mpsc::channel(1);
    drop(rx);

    let handle = reader.spawn(tx, CancellationToken::new());
    let joined = tokio::time::timeout(Duration::from_secs(5), handle).await;
    assert!(joined.is_ok(), "reader kept running without a consumer");
}

#[tokio::test]
async fn test_invalid_utf8_line_keeps_connection() {
    let server = SseServer::start(vec![Reply::bytes(vec![
        &b"data: Simple2|60\xb0C\n\ndata: Simple1|50\n\n"[..],
    ])
    .held()])
    .await;
    let reader = StreamReader::with_client(http_client(), server.url()).with_retry_delay(RETRY);
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let handle = reader.spawn(tx, cancel.clone());

    let mut events = Vec::new();
    for _ in 0..5 {
        events.push(next_event(&mut rx).await);
    }
    assert_eq!(
        events,
        vec![
            StreamEvent::Connected,
            data("Simple2|60\u{FFFD}C"),
            blank(),
            data("Simple1|50"),
            blank(),
        ]
    );
    assert_eq!(server.connections(), 1);

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_silent_stream_is_reconnected_after_idle_timeout() {
    let server = SseServer::start(vec![Reply::ok("data: Simple1|5\n\n").held()]).await;
    let reader = StreamReader::with_client(http_client(), server.url())
        .with_retry_delay(RETRY)
        .with_idle_timeout(Some(Duration::from_millis(200)));
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let handle = reader.spawn(tx, cancel.clone());

    assert_eq!(next_event(&mut rx).await, StreamEvent::Connected);
    assert_eq!(next_event(&mut rx).await, data("Simple1|5"));
    assert_eq!(next_event(&mut rx).await, blank());
    assert_eq!(next_event(&mut rx).await, StreamEvent::Connected);
    assert_eq!(server.connections(), 2);

    cancel.cancel();
    handle.await.unwrap();
}
