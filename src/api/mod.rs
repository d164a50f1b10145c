//! Wire payloads exchanged with the chat service.

use serde::{Deserialize, Serialize};

/// Body of `POST /chat`.
#[derive(Debug, Serialize, Clone)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<String>,
    pub use_web_search: bool,
    pub fact_check: bool,
}

/// Body of `POST /chat/stream`.
#[derive(Debug, Serialize, Clone)]
pub struct StreamRequest {
    pub message: String,
    pub session_id: Option<String>,
}

/// Fully buffered reply returned by `POST /chat`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatReply {
    pub response: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub message_id: String,
    pub metadata: ReplyMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_check: Option<FactCheck>,
    #[serde(default)]
    pub context_info: ContextInfo,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ReplyMetadata {
    #[serde(default)]
    pub response_time_ms: f64,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub optimization_level: String,
    #[serde(default)]
    pub web_search_used: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ContextInfo {
    #[serde(default)]
    pub total_messages: u64,
    #[serde(default)]
    pub session_age_minutes: f64,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub memory_usage_kb: f64,
}

/// A web citation attached to a reply.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Source {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub credibility_score: f64,
    #[serde(default)]
    pub citation: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FactCheck {
    pub verdict: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub explanation: String,
}

/// JSON body of a single `data: ` line on the streaming endpoint.
#[derive(Debug, Deserialize, Default)]
pub struct StreamFrame {
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub done: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub messages: Vec<HistoryEntry>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub role: String,
    pub content: String,
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_reply_tolerates_missing_optional_sections() {
        let raw = r#"{
            "response": "Hello",
            "session_id": "s-1",
            "message_id": "m-1",
            "metadata": {"response_time_ms": 12.5, "source": "model"}
        }"#;
        let reply: ChatReply = serde_json::from_str(raw).expect("reply should parse");

        assert_eq!(reply.response, "Hello");
        assert_eq!(reply.metadata.source, "model");
        assert!(!reply.metadata.web_search_used);
        assert!(reply.sources.is_none());
        assert!(reply.fact_check.is_none());
        assert!(reply.context_info.topics.is_empty());
    }

    #[test]
    fn chat_request_serializes_missing_session_as_null() {
        let request = ChatRequest {
            message: "hi".to_string(),
            session_id: None,
            use_web_search: true,
            fact_check: false,
        };
        let value = serde_json::to_value(&request).expect("request should serialize");

        assert_eq!(
            value,
            serde_json::json!({
                "message": "hi",
                "session_id": null,
                "use_web_search": true,
                "fact_check": false
            })
        );
    }
}
