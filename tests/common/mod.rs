//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use staged_config::commit::{Activator, CommitEngine, NoopActivator};
use staged_config::history::HistoryStore;
use staged_config::{ConfigPath, ConfigTree};

pub fn path(text: &str) -> ConfigPath {
    text.parse().unwrap()
}

/// A tree from `(path, value)` pairs.
pub fn tree(entries: &[(&str, Option<&str>)]) -> ConfigTree {
    let mut tree = ConfigTree::new();
    for (p, value) in entries {
        tree.set(&path(p), value.map(str::to_string)).unwrap();
    }
    tree
}

pub fn engine() -> Arc<CommitEngine> {
    engine_with(Arc::new(NoopActivator))
}

pub fn engine_with(activator: Arc<dyn Activator>) -> Arc<CommitEngine> {
    Arc::new(CommitEngine::new(Arc::new(HistoryStore::in_memory()), activator))
}

/// A mock HTTP endpoint that records each request body.
pub struct MockBackend {
    pub addr: SocketAddr,
    calls: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }
}

/// Start a programmable mock backend. `f` receives the request body and
/// returns the status code and response body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> MockBackend
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);
    let calls = Arc::new(AtomicUsize::new(0));
    let bodies = Arc::new(Mutex::new(Vec::new()));

    {
        let calls = calls.clone();
        let bodies = bodies.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let f = f.clone();
                let calls = calls.clone();
                let bodies = bodies.clone();
                tokio::spawn(async move {
                    let Some(body) = read_request(&mut socket).await else {
                        return;
                    };
                    calls.fetch_add(1, Ordering::SeqCst);
                    bodies.lock().unwrap().push(body.clone());

                    let (status, response) = f(body).await;
                    let status_text = match status {
                        200 => "200 OK",
                        400 => "400 Bad Request",
                        404 => "404 Not Found",
                        500 => "500 Internal Server Error",
                        502 => "502 Bad Gateway",
                        503 => "503 Service Unavailable",
                        _ => "200 OK",
                    };
                    let response_str = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status_text,
                        response.len(),
                        response
                    );
                    let _ = socket.write_all(response_str.as_bytes()).await;
                    let _ = socket.shutdown().await;
                    tokio::time::sleep(Duration::from_millis(10)).await;
                });
            }
        });
    }

    MockBackend {
        addr,
        calls,
        bodies,
    }
}

/// Read one HTTP/1.1 request and return its body.
async fn read_request(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let end = (header_end + content_length).min(buf.len());
    Some(String::from_utf8_lossy(&buf[header_end..end]).to_string())
}
