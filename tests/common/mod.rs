//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use failover_proxy::config::{BackendConfig, ProxyConfig};
use failover_proxy::lifecycle::startup;
use failover_proxy::ProxyHandle;

/// How a mock backend answers once it has read a request.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// `200 OK` with the backend's name as the body.
    Answer,
    /// Promise more body than is sent, then close.
    CloseMidResponse,
    /// `200 OK` with a body of this many bytes.
    LargeBody(usize),
}

/// A raw TCP backend that records what it receives.
pub struct MockBackend {
    pub addr: SocketAddr,
    pub name: String,
    connections: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub async fn start(name: &str) -> Self {
        Self::start_with(name, Behavior::Answer).await
    }

    pub async fn start_with(name: &str, behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let body = name.to_string();
        let (conns, reqs) = (Arc::clone(&connections), Arc::clone(&requests));
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                conns.fetch_add(1, Ordering::SeqCst);
                let (reqs, body) = (Arc::clone(&reqs), body.clone());
                tokio::spawn(serve_one(socket, behavior, body, reqs));
            }
        });

        Self {
            addr,
            name: name.to_string(),
            connections,
            requests,
        }
    }

    /// Connections accepted, whether or not a request arrived.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Complete requests received.
    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Raw requests received (head and body), oldest first.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            name: Some(self.name.clone()),
            address: self.addr.to_string(),
        }
    }
}

async fn serve_one(
    mut socket: TcpStream,
    behavior: Behavior,
    body: String,
    requests: Arc<Mutex<Vec<String>>>,
) {
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    requests.lock().unwrap().push(request);

    let response = match behavior {
        Behavior::Answer => format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nX-Backend: {}\r\n\r\n{}",
            body.len(),
            body,
            body
        ),
        Behavior::CloseMidResponse => {
            "HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\npartial".to_string()
        }
        Behavior::LargeBody(len) => format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {len}\r\n\r\n{}",
            "x".repeat(len)
        ),
    };
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Read one request head plus its Content-Length body.
async fn read_request(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let body_len = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + body_len {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Some(String::from_utf8_lossy(&buf[..head_end + body_len]).to_string())
}

/// A backend that accepts connections and never reads from them.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Proxy config on an ephemeral port with test-sized timeouts.
pub fn proxy_config(backends: Vec<BackendConfig>) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.backends = backends;
    config.timeouts.connect_secs = 1.0;
    config.timeouts.write_secs = 1.0;
    config.timeouts.read_secs = 2.0;
    config.timeouts.overall_secs = 5.0;
    config.timeouts.shutdown_grace_secs = 1.0;
    config
}

pub async fn start_proxy(config: ProxyConfig) -> ProxyHandle {
    startup::start(config).await.expect("proxy failed to start")
}

/// Client with no system proxy and no connection reuse.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

pub fn url(handle: &ProxyHandle, path: &str) -> String {
    format!("http://{}{}", handle.local_addr(), path)
}

pub fn header(res: &reqwest::Response, name: &str) -> Option<String> {
    res.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Send raw bytes to the proxy and read until it closes.
pub async fn raw_exchange(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    // The proxy may answer before the request is fully written.
    let _ = stream.write_all(request).await;
    let _ = stream.shutdown().await;
    let mut out = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out)).await;
    String::from_utf8_lossy(&out).to_string()
}
