use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::core::cache::{ResponseCache, SharedResponseCache};
use crate::core::chat_stream::ChatClient;

/// Request as seen by the mock server.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub request_line: String,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body should be JSON")
    }
}

/// Scripted HTTP response. Body parts are written with a pause in between so
/// the client observes them as separate reads.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body_parts: Vec<Vec<u8>>,
}

impl MockResponse {
    pub fn json(value: serde_json::Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            body_parts: vec![value.to_string().into_bytes()],
        }
    }

    pub fn event_stream<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Vec<u8>>,
    {
        Self {
            status: 200,
            content_type: "text/event-stream",
            body_parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body_parts: vec![body.as_bytes().to_vec()],
        }
    }
}

pub struct MockServer {
    pub base_url: String,
    handle: JoinHandle<Result<Vec<CapturedRequest>, String>>,
}

impl MockServer {
    /// Serve `responses` in order, one connection each.
    pub async fn start(responses: Vec<MockResponse>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("local addr should resolve");

        let handle = tokio::spawn(async move {
            let mut captured = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept().await.map_err(|err| err.to_string())?;
                captured.push(read_http_request(&mut stream).await?);
                write_response(&mut stream, &response).await?;
            }
            Ok(captured)
        });

        Self {
            base_url: format!("http://{addr}"),
            handle,
        }
    }

    pub async fn finish(self) -> Vec<CapturedRequest> {
        self.handle
            .await
            .expect("mock server task panicked")
            .expect("mock server failed")
    }
}

pub fn test_client(base_url: &str) -> (ChatClient, SharedResponseCache) {
    let cache = ResponseCache::new().into_shared();
    let http = reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("client should build");
    (ChatClient::with_client(http, base_url, cache.clone()), cache)
}

async fn read_http_request(stream: &mut TcpStream) -> Result<CapturedRequest, String> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];
    let header_end = loop {
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP headers".to_string());
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(pos) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default().to_string();
    let mut content_length = 0;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_length = value
                    .trim()
                    .parse::<usize>()
                    .map_err(|err| err.to_string())?;
            }
        }
    }

    let mut body = buffer[header_end..].to_vec();
    while body.len() < content_length {
        let read = stream
            .read(&mut chunk)
            .await
            .map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("Unexpected EOF while reading HTTP body".to_string());
        }
        body.extend_from_slice(&chunk[..read]);
    }
    body.truncate(content_length);

    Ok(CapturedRequest { request_line, body })
}

async fn write_response(stream: &mut TcpStream, response: &MockResponse) -> Result<(), String> {
    let reason = if response.status < 400 { "OK" } else { "Error" };
    let head = format!(
        "HTTP/1.1 {} {}\r\ncontent-type: {}\r\nconnection: close\r\n\r\n",
        response.status, reason, response.content_type
    );
    stream
        .write_all(head.as_bytes())
        .await
        .map_err(|err| err.to_string())?;

    for part in &response.body_parts {
        stream
            .write_all(part)
            .await
            .map_err(|err| err.to_string())?;
        stream.flush().await.map_err(|err| err.to_string())?;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // The client may already have hung up after the final frame.
    let _ = stream.shutdown().await;
    Ok(())
}
