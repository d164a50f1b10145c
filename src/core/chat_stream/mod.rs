//! Transport for the chat service: buffered replies, streamed replies and
//! remote history.
//!
//! Streaming runs as a spawned producer task that decodes frames and writes
//! [`StreamMessage`]s into an unbounded channel; the caller consumes the
//! receiver at its own pace. The producer always finishes with exactly one
//! terminal message, either [`StreamMessage::End`] or
//! [`StreamMessage::Error`].

pub mod decoder;

use std::fmt;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use decoder::{FrameDecoder, FrameEvent, ParseError};

use crate::api::{ChatReply, ChatRequest, HistoryEntry, HistoryResponse, StreamRequest};
use crate::core::cache::{self, CacheKey, SharedResponseCache};
use crate::core::message::{parse_timestamp, Message, Role};
use crate::utils::url::{construct_api_url, construct_history_url};

pub const DEFAULT_BASE_URL: &str = "https://thinkai.lat/api";

#[derive(Debug)]
pub enum StreamMessage {
    Chunk(String),
    Error(TransportError),
    End,
}

/// Failures talking to the chat service.
#[derive(Debug)]
pub enum TransportError {
    /// The service answered with a non-2xx status.
    Status { status: u16, body: String },
    /// The request could not be sent or the connection failed.
    Network(reqwest::Error),
    /// The response body broke off while it was being read.
    Aborted(String),
    /// The response body did not match the expected payload.
    Decode(String),
    /// No request URL could be built from the configured base URL.
    InvalidUrl(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Status { status, body } => {
                let body = body.trim();
                if body.is_empty() {
                    write!(f, "API error: {status}")
                } else {
                    write!(f, "API error: {status}: {body}")
                }
            }
            TransportError::Network(err) => write!(f, "Network error: {err}"),
            TransportError::Aborted(reason) => write!(f, "Stream aborted: {reason}"),
            TransportError::Decode(reason) => write!(f, "Unexpected response: {reason}"),
            TransportError::InvalidUrl(base) => write!(f, "Invalid API base URL: {base}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Network(err) => Some(err),
            _ => None,
        }
    }
}

/// Options recognized by the buffered endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct SendOptions {
    pub use_web_search: bool,
    pub fact_check: bool,
    /// Hidden addendum sent ahead of the visible text.
    pub system_prompt: Option<String>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            use_web_search: true,
            fact_check: true,
            system_prompt: None,
        }
    }
}

/// Message body actually sent: the hidden prompt, a blank line, then the
/// visible text. An empty prompt is treated as absent.
pub fn compose_message(text: &str, system_prompt: Option<&str>) -> String {
    match system_prompt.filter(|prompt| !prompt.is_empty()) {
        Some(prompt) => format!("{prompt}\n\n{text}"),
        None => text.to_string(),
    }
}

/// Contract between the orchestrator and the chat service.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(
        &self,
        text: &str,
        session_id: Option<&str>,
        options: &SendOptions,
    ) -> Result<ChatReply, TransportError>;

    /// Open a stream. Must be called from within a tokio runtime.
    fn stream_message(
        &self,
        text: &str,
        session_id: Option<&str>,
        system_prompt: Option<&str>,
        cancel_token: CancellationToken,
    ) -> mpsc::UnboundedReceiver<StreamMessage>;

    async fn get_history(&self, session_id: &str) -> Result<Vec<Message>, TransportError>;
}

/// Drive a stream receiver to completion, handing each chunk to `on_chunk`
/// in arrival order. Returns the concatenated text.
pub async fn collect_stream<F>(
    mut rx: mpsc::UnboundedReceiver<StreamMessage>,
    mut on_chunk: F,
) -> Result<String, TransportError>
where
    F: FnMut(&str),
{
    let mut full_response = String::new();
    while let Some(message) = rx.recv().await {
        match message {
            StreamMessage::Chunk(content) => {
                on_chunk(&content);
                full_response.push_str(&content);
            }
            StreamMessage::Error(err) => return Err(err),
            StreamMessage::End => return Ok(full_response),
        }
    }

    Err(TransportError::Aborted(
        "stream closed before completion".to_string(),
    ))
}

/// HTTP client for the chat service. Buffered replies go through the shared
/// [`ResponseCache`](crate::core::cache::ResponseCache).
#[derive(Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
    cache: SharedResponseCache,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, cache: SharedResponseCache) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, cache)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        cache: SharedResponseCache,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            cache,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn cache(&self) -> &SharedResponseCache {
        &self.cache
    }

    pub fn clear_cache(&self) {
        cache::lock(&self.cache).clear();
    }

    fn cached_reply(&self, key: &CacheKey) -> Option<ChatReply> {
        cache::lock(&self.cache).get(key)
    }

    fn remember_reply(&self, key: CacheKey, reply: ChatReply) {
        cache::lock(&self.cache).put(key, reply);
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}

fn history_message(entry: HistoryEntry) -> Result<Message, TransportError> {
    let role = Role::try_from(entry.role.as_str()).map_err(TransportError::Decode)?;
    let timestamp = parse_timestamp(&entry.timestamp).map_err(|err| {
        TransportError::Decode(format!("invalid timestamp {:?}: {err}", entry.timestamp))
    })?;

    Ok(Message {
        id: entry.id,
        role,
        content: entry.content,
        timestamp,
        metadata: None,
        sources: None,
        fact_check: None,
    })
}

struct StreamParams {
    client: reqwest::Client,
    url: String,
    request: StreamRequest,
}

async fn run_stream(params: StreamParams, tx: &mpsc::UnboundedSender<StreamMessage>) {
    let StreamParams {
        client,
        url,
        request,
    } = params;

    let response = match client
        .post(&url)
        .header("Content-Type", "application/json")
        .json(&request)
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => {
            let _ = tx.send(StreamMessage::Error(TransportError::Network(err)));
            return;
        }
    };

    let response = match ensure_success(response).await {
        Ok(response) => response,
        Err(err) => {
            let _ = tx.send(StreamMessage::Error(err));
            return;
        }
    };

    let mut decoder = FrameDecoder::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk_bytes = match chunk {
            Ok(bytes) => bytes,
            Err(err) => {
                let _ = tx.send(StreamMessage::Error(TransportError::Aborted(err.to_string())));
                return;
            }
        };

        for event in decoder.push(&chunk_bytes) {
            match event {
                // A consumer that stopped listening does not stop the read loop.
                FrameEvent::Chunk(content) => {
                    let _ = tx.send(StreamMessage::Chunk(content));
                }
                FrameEvent::Done => {
                    let _ = tx.send(StreamMessage::End);
                    return;
                }
            }
        }
    }

    if decoder.pending_len() > 0 {
        debug!(
            pending = decoder.pending_len(),
            "Stream ended with an unterminated line"
        );
    }
    let _ = tx.send(StreamMessage::End);
}

#[async_trait]
impl ChatTransport for ChatClient {
    async fn send_message(
        &self,
        text: &str,
        session_id: Option<&str>,
        options: &SendOptions,
    ) -> Result<ChatReply, TransportError> {
        let key = CacheKey::new(session_id, text);
        let cached = self.cached_reply(&key);
        if let Some(hit) = cached {
            debug!(session_id = session_id.unwrap_or("-"), "Serving reply from cache");
            return Ok(hit);
        }

        let request = ChatRequest {
            message: compose_message(text, options.system_prompt.as_deref()),
            session_id: session_id.map(str::to_owned),
            use_web_search: options.use_web_search,
            fact_check: options.fact_check,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(construct_api_url(&self.base_url, "chat"))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(TransportError::Network)?;
        let response = ensure_success(response).await.inspect_err(|err| {
            warn!(error = %err, "Chat request rejected");
        })?;

        let mut reply: ChatReply = response
            .json()
            .await
            .map_err(|err| TransportError::Decode(err.to_string()))?;
        reply.metadata.response_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        self.remember_reply(key, reply.clone());
        Ok(reply)
    }

    fn stream_message(
        &self,
        text: &str,
        session_id: Option<&str>,
        system_prompt: Option<&str>,
        cancel_token: CancellationToken,
    ) -> mpsc::UnboundedReceiver<StreamMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let params = StreamParams {
            client: self.client.clone(),
            url: construct_api_url(&self.base_url, "chat/stream"),
            request: StreamRequest {
                message: compose_message(text, system_prompt),
                session_id: session_id.map(str::to_owned),
            },
        };

        tokio::spawn(async move {
            tokio::select! {
                _ = run_stream(params, &tx) => {}
                _ = cancel_token.cancelled() => {
                    debug!("Stream cancelled");
                }
            }
        });

        rx
    }

    async fn get_history(&self, session_id: &str) -> Result<Vec<Message>, TransportError> {
        let url = construct_history_url(&self.base_url, session_id)
            .ok_or_else(|| TransportError::InvalidUrl(self.base_url.clone()))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(TransportError::Network)?;
        let response = ensure_success(response).await?;
        let history: HistoryResponse = response
            .json()
            .await
            .map_err(|err| TransportError::Decode(err.to_string()))?;

        history.messages.into_iter().map(history_message).collect()
    }
}
