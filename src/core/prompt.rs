//! Hidden therapeutic context sent ahead of each user message.

use crate::core::message::{Message, Role, Session};

/// Number of earlier messages quoted back to the service.
pub const CONTEXT_WINDOW: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
}

/// Conversation state handed to a [`PromptAugmenter`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContext {
    pub previous_messages: Vec<ContextMessage>,
    pub mood: Option<String>,
    pub topics: Vec<String>,
}

impl SessionContext {
    /// Build context from the messages preceding the one being sent. System
    /// notices and empty placeholders are not part of the conversation.
    pub fn from_history(history: &[Message], session: Option<&Session>) -> Self {
        let conversation: Vec<&Message> = history
            .iter()
            .filter(|message| message.role != Role::System && !message.content.is_empty())
            .collect();
        let start = conversation.len().saturating_sub(CONTEXT_WINDOW);

        Self {
            previous_messages: conversation[start..]
                .iter()
                .map(|message| ContextMessage {
                    role: message.role,
                    content: message.content.clone(),
                })
                .collect(),
            mood: session
                .and_then(|session| session.mood.as_ref())
                .map(|mood| mood.label.clone()),
            topics: session.map(|session| session.topics.clone()).unwrap_or_default(),
        }
    }
}

/// Produces the augmented text for a message. Implementations must be pure:
/// the same input always yields the same output.
pub trait PromptAugmenter: Send + Sync {
    fn enhance(&self, text: &str, context: &SessionContext) -> String;
}

const THERAPY_PREAMBLE: &str = "You are a warm, attentive counsellor trained in cognitive \
behavioural therapy and mindfulness practice. Listen closely, reflect feelings back \
before offering suggestions, and keep advice practical and gentle. You are not a \
replacement for emergency care: if the client mentions being in danger, encourage them \
to contact local emergency services or a crisis line right away.";

const THERAPY_CLOSING: &str = "Respond with empathy and therapeutic insight:";

/// Default augmenter: a fixed counselling preamble plus the recent exchange,
/// mood and topics.
#[derive(Debug, Clone, Copy, Default)]
pub struct TherapeuticPrompt;

impl PromptAugmenter for TherapeuticPrompt {
    fn enhance(&self, text: &str, context: &SessionContext) -> String {
        let mut parts = vec![THERAPY_PREAMBLE.to_string()];

        if !context.previous_messages.is_empty() {
            let recent = context
                .previous_messages
                .iter()
                .map(|message| {
                    let speaker = if message.role.is_user() {
                        "Client"
                    } else {
                        "Therapist"
                    };
                    format!("{speaker}: {}", message.content)
                })
                .collect::<Vec<_>>()
                .join("\n");
            parts.push(format!("\nRecent conversation context:\n{recent}"));
        }

        if let Some(mood) = context.mood.as_deref().filter(|mood| !mood.is_empty()) {
            parts.push(format!("\nClient's current mood: {mood}"));
        }

        if !context.topics.is_empty() {
            parts.push(format!("\nDiscussion topics: {}", context.topics.join(", ")));
        }

        parts.push(format!("\nClient says: {text}"));
        parts.push(format!("\n{THERAPY_CLOSING}"));
        parts.join("\n")
    }
}

/// The hidden part of an augmented message: the first occurrence of the
/// visible text removed, surrounding whitespace trimmed.
pub fn hidden_addendum(augmented: &str, text: &str) -> String {
    if text.is_empty() {
        return augmented.trim().to_string();
    }
    augmented.replacen(text, "", 1).trim().to_string()
}
