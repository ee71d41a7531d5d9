#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashlink_core::device::{Connector, DeviceError, SerialLink, SerialSettings};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpListener;
use tokio::time::Instant;

/// One canned HTTP response, body sent in separate writes
#[derive(Clone)]
pub struct Reply {
    pub status: &'static str,
    pub chunks: Vec<&'static [u8]>,
    /// Keep the connection open after the last chunk
    pub hold: bool,
}

impl Reply {
    pub fn ok(body: &'static str) -> Self {
        Self::bytes(vec![body.as_bytes()])
    }

    pub fn chunked(chunks: Vec<&'static str>) -> Self {
        Self::bytes(chunks.into_iter().map(str::as_bytes).collect())
    }

    pub fn bytes(chunks: Vec<&'static [u8]>) -> Self {
        Self {
            status: "200 OK",
            chunks,
            hold: false,
        }
    }

    pub fn status(status: &'static str, body: &'static str) -> Self {
        Self {
            status,
            chunks: vec![body.as_bytes()],
            hold: false,
        }
    }

    pub fn held(mut self) -> Self {
        self.hold = true;
        self
    }
}

/// Minimal event-stream server. Connection `n` gets `replies[n]`, the last
/// reply repeats. Every response is close-delimited.
pub struct SseServer {
    addr: std::net::SocketAddr,
    connections: Arc<AtomicUsize>,
}

impl SseServer {
    pub async fn start(replies: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connections);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let reply = replies[n.min(replies.len() - 1)].clone();

                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }

                    let head = format!(
                        "HTTP/1.1 {}\r\nContent-Type: text/event-stream\r\n\
                         Cache-Control: no-cache\r\nConnection: close\r\n\r\n",
                        reply.status
                    );
                    if socket.write_all(head.as_bytes()).await.is_err() {
                        return;
                    }
                    for chunk in reply.chunks {
                        if socket.write_all(chunk).await.is_err() {
                            return;
                        }
                        let _ = socket.flush().await;
                        tokio::time::sleep(Duration::from_millis(20)).await;
                    }
                    if reply.hold {
                        // Park until the client hangs up
                        let _ = socket.read(&mut buf).await;
                        return;
                    }
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { addr, connections }
    }

    pub fn url(&self) -> String {
        format!("http://{}/sse", self.addr)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct ConnectorState {
    failures_left: AtomicUsize,
    attempts: Mutex<Vec<Instant>>,
    peers: Mutex<Vec<DuplexStream>>,
}

/// In-memory stand-in for a serial port that fails a set number of times
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<ConnectorState>,
}

impl MemoryConnector {
    pub fn failing(times: usize) -> Self {
        let connector = Self::default();
        connector.state.failures_left.store(times, Ordering::SeqCst);
        connector
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.state.attempts.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.state.attempts.lock().unwrap().len()
    }

    /// Device end of the most recent link
    pub fn take_peer(&self) -> Option<DuplexStream> {
        self.state.peers.lock().unwrap().pop()
    }

    /// Simulate unplugging every open link
    pub fn unplug(&self) {
        self.state.peers.lock().unwrap().clear();
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, _settings: &SerialSettings) -> Result<Box<dyn SerialLink>, DeviceError> {
        self.state.attempts.lock().unwrap().push(Instant::now());
        let failed = self
            .state
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(DeviceError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such device",
            )));
        }
        let (link, peer) = tokio::io::duplex(4096);
        self.state.peers.lock().unwrap().push(peer);
        Ok(Box::new(link))
    }
}

/// HTTP client that never routes loopback test traffic through a proxy
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

pub fn settings() -> SerialSettings {
    SerialSettings {
        device_id: "mem0".into(),
        baud_rate: 115200,
    }
}
