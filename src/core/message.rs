use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{ChatReply, FactCheck, ReplyMetadata, Source};
use crate::utils::ids;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_assistant(self) -> bool {
        self == Role::Assistant
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// Current time truncated to the millisecond precision used for every
/// persisted and remote timestamp.
pub fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

const NAIVE_ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Parse an ISO-8601 timestamp, normalized to UTC milliseconds. Timestamps
/// without an offset are read as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let parsed = match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => parsed.with_timezone(&Utc),
        Err(err) => match NaiveDateTime::parse_from_str(raw, NAIVE_ISO_FORMAT) {
            Ok(naive) => naive.and_utc(),
            Err(_) => return Err(err),
        },
    };
    Ok(parsed.trunc_subsecs(3))
}

pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serde adapter writing timestamps as `2024-01-02T03:04:05.678Z`.
pub(crate) mod iso_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_search_used: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<String>>,
}

impl From<&ReplyMetadata> for MessageMetadata {
    fn from(metadata: &ReplyMetadata) -> Self {
        Self {
            response_time_ms: Some(metadata.response_time_ms),
            source: Some(metadata.source.clone()).filter(|source| !source.is_empty()),
            optimization_level: Some(metadata.optimization_level.clone())
                .filter(|level| !level.is_empty()),
            web_search_used: Some(metadata.web_search_used),
            topics: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_check: Option<FactCheck>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: ids::message_id(),
            role,
            content: content.into(),
            timestamp: now_millis(),
            metadata: None,
            sources: None,
            fact_check: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Build an assistant message from a buffered reply. Topics reported by
    /// the service are carried in the metadata so the session picks them up.
    pub fn from_reply(reply: &ChatReply) -> Self {
        let mut metadata = MessageMetadata::from(&reply.metadata);
        if !reply.context_info.topics.is_empty() {
            metadata.topics = Some(reply.context_info.topics.clone());
        }

        let mut message = Self::assistant(reply.response.clone());
        if !reply.message_id.is_empty() {
            message.id = reply.message_id.clone();
        }
        message.metadata = Some(metadata);
        message.sources = reply.sources.clone();
        message.fact_check = reply.fact_check.clone();
        message
    }

    pub fn topics(&self) -> &[String] {
        self.metadata
            .as_ref()
            .and_then(|metadata| metadata.topics.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoodState {
    pub emoji: String,
    pub label: String,
    pub score: f64,
}

impl MoodState {
    pub fn new(emoji: impl Into<String>, label: impl Into<String>, score: f64) -> Self {
        Self {
            emoji: emoji.into(),
            label: label.into(),
            score,
        }
    }

    /// Mood for a free-form label; the known emotional tones get their own
    /// emoji and score, anything else reads as neutral.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_lowercase();
        let (emoji, score) = match label.as_str() {
            "calm" => ("🌿", 0.7),
            "energized" => ("⚡", 0.8),
            "balanced" => ("⚖️", 0.6),
            _ => ("🙂", 0.5),
        };
        Self::new(emoji, label, score)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(with = "iso_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub last_active: DateTime<Utc>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<MoodState>,
}

impl Session {
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            messages: Vec::new(),
            created_at: now,
            last_active: now,
            topics: Vec::new(),
            mood: None,
        }
    }

    pub(crate) fn push_message(&mut self, message: Message, now: DateTime<Utc>) {
        self.merge_topics(message.topics());
        self.messages.push(message);
        self.touch(now);
    }

    /// Union `topics` into the session, keeping first-seen order.
    pub(crate) fn merge_topics(&mut self, topics: &[String]) {
        for topic in topics {
            if !self.topics.contains(topic) {
                self.topics.push(topic.clone());
            }
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_active {
            self.last_active = now;
        }
    }

    pub fn contains_message(&self, id: &str) -> bool {
        self.messages.iter().any(|message| message.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn invalid_role_strings_are_rejected() {
        assert!(Role::try_from("tool").is_err());
        assert_eq!(Role::try_from("system"), Ok(Role::System));
    }

    #[test]
    fn message_serializes_with_millisecond_timestamp() {
        let mut message = Message::user("hello");
        message.timestamp = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
            + Duration::milliseconds(125);

        let value = serde_json::to_value(&message).expect("message should serialize");
        assert_eq!(value["timestamp"], "2024-03-01T09:30:00.125Z");
        assert_eq!(value["role"], "user");
        assert!(value.get("factCheck").is_none());

        let restored: Message = serde_json::from_value(value).expect("message should parse");
        assert_eq!(restored, message);
    }

    #[test]
    fn parse_timestamp_normalizes_offsets_and_precision() {
        let parsed = parse_timestamp("2024-03-01T10:30:00.123456+01:00").expect("valid timestamp");
        assert_eq!(format_timestamp(&parsed), "2024-03-01T09:30:00.123Z");
    }

    #[test]
    fn parse_timestamp_reads_offsetless_values_as_utc() {
        let parsed = parse_timestamp("2024-05-01T10:00:00.123456").expect("naive timestamp");
        assert_eq!(format_timestamp(&parsed), "2024-05-01T10:00:00.123Z");

        let whole = parse_timestamp("2024-05-01T10:00:00").expect("no fraction");
        assert_eq!(format_timestamp(&whole), "2024-05-01T10:00:00.000Z");

        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn session_topics_grow_by_union() {
        let now = now_millis();
        let mut session = Session::new("s", now);
        session.merge_topics(&["sleep".to_string(), "work".to_string()]);
        session.merge_topics(&["work".to_string(), "family".to_string()]);

        assert_eq!(session.topics, vec!["sleep", "work", "family"]);
    }

    #[test]
    fn last_active_never_moves_backwards() {
        let now = now_millis();
        let mut session = Session::new("s", now);
        session.push_message(Message::user("a"), now - Duration::seconds(5));

        assert_eq!(session.last_active, now);
        assert!(session.last_active >= session.created_at);
    }

    #[test]
    fn reply_topics_land_in_message_metadata() {
        let reply: ChatReply = serde_json::from_value(serde_json::json!({
            "response": "Let's talk about it.",
            "session_id": "s",
            "message_id": "srv-1",
            "metadata": {"response_time_ms": 40.0, "source": "model", "web_search_used": true},
            "context_info": {"topics": ["anxiety"]}
        }))
        .expect("reply should parse");

        let message = Message::from_reply(&reply);
        assert_eq!(message.id, "srv-1");
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.topics(), ["anxiety".to_string()]);
        let metadata = message.metadata.expect("metadata");
        assert_eq!(metadata.source.as_deref(), Some("model"));
        assert_eq!(metadata.web_search_used, Some(true));
        assert!(metadata.optimization_level.is_none());
    }

    #[test]
    fn unknown_mood_labels_read_as_neutral() {
        let mood = MoodState::from_label(" Wistful ");
        assert_eq!(mood.label, "wistful");
        assert_eq!(mood.score, 0.5);
        assert_eq!(MoodState::from_label("calm").emoji, "🌿");
    }
}
