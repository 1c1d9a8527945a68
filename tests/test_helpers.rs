//! Test Helpers
//!
//! Range-aware mock responders, a gated raw TCP server and small polling
//! utilities shared by the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Deterministic, non-repeating-looking test payload
pub fn test_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

/// Serves a fixed body and honours single `Range: bytes=a-b` requests
pub struct RangeResponder {
    content: Vec<u8>,
}

impl RangeResponder {
    pub fn new(content: Vec<u8>) -> Self {
        Self { content }
    }
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let total = self.content.len();
        let range = request
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_range_header);

        match range {
            Some((start, end)) if start <= end && end < total => ResponseTemplate::new(206)
                .insert_header("Content-Range", format!("bytes {}-{}/{}", start, end, total))
                .set_body_bytes(self.content[start..=end].to_vec()),
            Some(_) => ResponseTemplate::new(416)
                .insert_header("Content-Range", format!("bytes */{}", total)),
            None => ResponseTemplate::new(200).set_body_bytes(self.content.clone()),
        }
    }
}

/// Parse `bytes=START-END`
pub fn parse_range_header(value: &str) -> Option<(usize, usize)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

/// Mount HEAD and GET handlers for `route`.
///
/// With `ranges` the HEAD response advertises `Accept-Ranges: bytes` and GET
/// honours ranges; without it GET always returns the whole body.
pub async fn mount_file(server: &MockServer, route: &str, content: &[u8], ranges: bool) {
    let mut head = ResponseTemplate::new(200).insert_header("Content-Length", content.len().to_string());
    if ranges {
        head = head.insert_header("Accept-Ranges", "bytes");
    }

    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(head)
        .mount(server)
        .await;

    if ranges {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(RangeResponder::new(content.to_vec()))
            .mount(server)
            .await;
    } else {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
            .mount(server)
            .await;
    }
}

/// GET requests the server has seen so far
pub async fn get_requests(server: &MockServer) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == "GET")
        .collect()
}

/// Plain HTTP/1.1 server that sends the first `first_part` bytes of a GET
/// body immediately and holds the rest until [`GatedServer::release`].
///
/// HEAD responses carry `Content-Length` but no `Accept-Ranges`, so the
/// engine downloads with a single segment.
pub struct GatedServer {
    addr: SocketAddr,
    gate: watch::Sender<bool>,
}

impl GatedServer {
    pub async fn start(content: Vec<u8>, first_part: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind listener");
        let addr = listener.local_addr().expect("Listener has no address");
        let (gate, _) = watch::channel(false);
        let content = Arc::new(content);

        let gate_rx = gate.subscribe();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let content = Arc::clone(&content);
                let gate_rx = gate_rx.clone();
                tokio::spawn(async move {
                    let _ = serve_gated(socket, content, first_part, gate_rx).await;
                });
            }
        });

        Self { addr, gate }
    }

    pub fn url(&self, route: &str) -> String {
        format!("http://{}{}", self.addr, route)
    }

    /// Let every held response send the rest of its body
    pub fn release(&self) {
        self.gate.send_replace(true);
    }
}

async fn serve_gated(
    mut socket: TcpStream,
    content: Arc<Vec<u8>>,
    first_part: usize,
    mut gate: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }

    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        content.len()
    );
    socket.write_all(head.as_bytes()).await?;
    if request.starts_with(b"HEAD") {
        return socket.shutdown().await;
    }

    let first_part = first_part.min(content.len());
    socket.write_all(&content[..first_part]).await?;
    socket.flush().await?;

    let _ = gate.wait_for(|open| *open).await;
    socket.write_all(&content[first_part..]).await?;
    socket.shutdown().await
}

/// Wait for a condition with timeout
pub async fn wait_for<F>(timeout_ms: u64, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range_header() {
        assert_eq!(parse_range_header("bytes=0-99"), Some((0, 99)));
        assert_eq!(parse_range_header("bytes=100-"), None);
        assert_eq!(parse_range_header("items=0-1"), None);
    }

    #[test]
    fn test_content_is_deterministic() {
        assert_eq!(test_content(1000), test_content(1000));
        assert_eq!(test_content(1000).len(), 1000);
    }
}
