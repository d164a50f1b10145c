//! Send/stream/recover state machine exposed to presentation code.
//!
//! The orchestrator keeps a mirror of the active session's messages, drives
//! the transport, merges streamed chunks into a placeholder assistant
//! message and persists finished messages through the shared
//! [`SessionStore`](crate::core::session_store::SessionStore). Presentation
//! code follows along through [`ChatEvent`]s.


use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::chat_stream::{collect_stream, ChatTransport, SendOptions, TransportError};
use crate::core::message::{Message, MoodState};
use crate::core::prompt::{hidden_addendum, PromptAugmenter, SessionContext};
use crate::core::session_store::{self, SharedSessionStore};
use crate::utils::ids;

/// Shown in place of a reply whenever a send fails.
pub const APOLOGY_MESSAGE: &str = "I apologize, but I encountered an error. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    Sending,
    Streaming,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    StateChanged(ChatState),
    MessageAppended(Message),
    /// A streamed chunk was merged into `message`.
    MessageUpdated { message: Message, delta: String },
    /// An empty placeholder was dropped after a failure.
    MessageRemoved(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatOptions {
    /// Stream replies chunk by chunk instead of waiting for the full reply.
    pub streaming: bool,
    pub enable_web_search: bool,
    pub enable_fact_check: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            streaming: true,
            enable_web_search: true,
            enable_fact_check: true,
        }
    }
}

struct StreamState {
    placeholder_id: String,
    cancel_token: CancellationToken,
}

type CompletionCallback = Box<dyn Fn(&Message) + Send + Sync>;

pub struct ChatOrchestrator<T: ChatTransport> {
    transport: T,
    store: SharedSessionStore,
    augmenter: Box<dyn PromptAugmenter>,
    options: ChatOptions,
    messages: Vec<Message>,
    session_id: Option<String>,
    state: ChatState,
    stream: Option<StreamState>,
    observers: Vec<mpsc::UnboundedSender<ChatEvent>>,
    on_complete: Option<CompletionCallback>,
}

fn publish(observers: &mut Vec<mpsc::UnboundedSender<ChatEvent>>, event: ChatEvent) {
    observers.retain(|observer| observer.send(event.clone()).is_ok());
}

impl<T: ChatTransport> ChatOrchestrator<T> {
    /// Adopt the store's current session, or open a fresh one when there is
    /// none.
    pub fn new(
        transport: T,
        store: SharedSessionStore,
        augmenter: Box<dyn PromptAugmenter>,
        options: ChatOptions,
    ) -> Self {
        let (session_id, messages) = {
            let mut guard = session_store::lock(&store);
            match guard.current_session() {
                Some(session) => (session.id.clone(), session.messages.clone()),
                None => (guard.create_session(), Vec::new()),
            }
        };
        debug!(session_id = %session_id, messages = messages.len(), "Chat session attached");

        Self {
            transport,
            store,
            augmenter,
            options,
            messages,
            session_id: Some(session_id),
            state: ChatState::Idle,
            stream: None,
            observers: Vec::new(),
            on_complete: None,
        }
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ChatEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(tx);
        rx
    }

    /// Register the callback run with every finished assistant message.
    pub fn on_message_complete<F>(&mut self, callback: F)
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        self.on_complete = Some(Box::new(callback));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.state, ChatState::Sending | ChatState::Streaming)
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn options(&self) -> &ChatOptions {
        &self.options
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Empty the mirror and detach from the session; the next send opens a
    /// new one. Stored history is untouched.
    pub fn clear_messages(&mut self) {
        self.abandon_stream();
        self.messages.clear();
        self.session_id = None;
    }

    /// Attach to a stored session. Returns false for unknown ids.
    pub fn switch_session(&mut self, session_id: &str) -> bool {
        let messages = {
            let mut guard = session_store::lock(&self.store);
            if !guard.set_current_session(session_id) {
                return false;
            }
            guard
                .session(session_id)
                .map(|session| session.messages.clone())
                .unwrap_or_default()
        };
        self.abandon_stream();
        self.messages = messages;
        self.session_id = Some(session_id.to_string());
        true
    }

    /// Open a fresh session right away and attach to it.
    pub fn start_new_session(&mut self) -> String {
        self.abandon_stream();
        let session_id = session_store::lock(&self.store).create_session();
        self.messages.clear();
        self.session_id = Some(session_id.clone());
        session_id
    }

    pub fn set_mood(&mut self, label: &str) {
        let session_id = self.ensure_session();
        session_store::lock(&self.store).set_mood(&session_id, Some(MoodState::from_label(label)));
    }

    /// Send `text` and wait for the full reply. Returns the finished
    /// assistant message, or `None` when the text was blank or the exchange
    /// failed (the failure is shown as a system message).
    pub async fn send_message(&mut self, text: &str) -> Option<Message> {
        if text.trim().is_empty() {
            return None;
        }
        self.abandon_stream();

        let session_id = self.ensure_session();
        let context = SessionContext::from_history(
            &self.messages,
            session_store::lock(&self.store).session(&session_id),
        );

        let user_message = Message::user(text);
        self.append(user_message.clone());
        session_store::lock(&self.store).add_message(&session_id, user_message);
        self.set_state(ChatState::Sending);

        let augmented = self.augmenter.enhance(text, &context);
        let addendum = hidden_addendum(&augmented, text);

        let result = if self.options.streaming {
            self.stream_reply(text, &session_id, &addendum).await
        } else {
            self.buffered_reply(text, &session_id, &addendum).await
        };

        match result {
            Ok(reply) => {
                session_store::lock(&self.store).add_message(&session_id, reply.clone());
                if let Some(callback) = &self.on_complete {
                    callback(&reply);
                }
                self.set_state(ChatState::Idle);
                Some(reply)
            }
            Err(err) => {
                warn!(error = %err, session_id = %session_id, "Chat exchange failed");
                self.recover_from_failure();
                None
            }
        }
    }

    async fn stream_reply(
        &mut self,
        text: &str,
        session_id: &str,
        addendum: &str,
    ) -> Result<Message, TransportError> {
        self.set_state(ChatState::Streaming);

        let placeholder = Message::assistant(String::new());
        let placeholder_id = placeholder.id.clone();
        self.append(placeholder);

        let cancel_token = CancellationToken::new();
        self.stream = Some(StreamState {
            placeholder_id: placeholder_id.clone(),
            cancel_token: cancel_token.clone(),
        });

        let system_prompt = Some(addendum).filter(|prompt| !prompt.is_empty());
        let rx = self
            .transport
            .stream_message(text, Some(session_id), system_prompt, cancel_token);

        let Self {
            messages,
            observers,
            ..
        } = self;
        collect_stream(rx, |chunk| {
            if let Some(message) = messages.iter_mut().find(|m| m.id == placeholder_id) {
                message.content.push_str(chunk);
                let event = ChatEvent::MessageUpdated {
                    message: message.clone(),
                    delta: chunk.to_string(),
                };
                publish(observers, event);
            }
        })
        .await?;

        self.stream = None;
        self.messages
            .iter()
            .find(|message| message.id == placeholder_id)
            .cloned()
            .ok_or_else(|| TransportError::Aborted("reply placeholder went missing".to_string()))
    }

    async fn buffered_reply(
        &mut self,
        text: &str,
        session_id: &str,
        addendum: &str,
    ) -> Result<Message, TransportError> {
        let options = SendOptions {
            use_web_search: self.options.enable_web_search,
            fact_check: self.options.enable_fact_check,
            system_prompt: Some(addendum.to_string()).filter(|prompt| !prompt.is_empty()),
        };
        let reply = self
            .transport
            .send_message(text, Some(session_id), &options)
            .await?;

        let mut message = Message::from_reply(&reply);
        if self.messages.iter().any(|existing| existing.id == message.id) {
            message.id = ids::message_id();
        }
        self.append(message.clone());
        Ok(message)
    }

    fn recover_from_failure(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.cancel_token.cancel();
            self.drop_empty_placeholder(&stream.placeholder_id);
        }
        self.append(Message::system(APOLOGY_MESSAGE));
        self.set_state(ChatState::Error);
        self.set_state(ChatState::Idle);
    }

    /// Settle a send whose future was dropped before it finished: partial
    /// text is kept and stored, an empty placeholder is dropped, and the
    /// state returns to idle.
    fn abandon_stream(&mut self) {
        let Some(stream) = self.stream.take() else {
            if self.is_streaming() {
                debug!(state = ?self.state, "Resetting state left by a dropped send");
                self.set_state(ChatState::Idle);
            }
            return;
        };
        stream.cancel_token.cancel();
        debug!(placeholder = %stream.placeholder_id, "Finalizing abandoned stream");

        let partial = self
            .messages
            .iter()
            .find(|message| message.id == stream.placeholder_id && !message.content.is_empty())
            .cloned();
        match (partial, self.session_id.clone()) {
            (Some(message), Some(session_id)) => {
                session_store::lock(&self.store).add_message(&session_id, message);
            }
            _ => self.drop_empty_placeholder(&stream.placeholder_id),
        }
        self.set_state(ChatState::Idle);
    }

    fn drop_empty_placeholder(&mut self, placeholder_id: &str) {
        let position = self
            .messages
            .iter()
            .position(|message| message.id == placeholder_id && message.content.is_empty());
        if let Some(index) = position {
            self.messages.remove(index);
            publish(
                &mut self.observers,
                ChatEvent::MessageRemoved(placeholder_id.to_string()),
            );
        }
    }

    fn ensure_session(&mut self) -> String {
        if let Some(session_id) = &self.session_id {
            return session_id.clone();
        }
        let session_id = session_store::lock(&self.store).create_session();
        debug!(session_id = %session_id, "Opened a new session");
        self.session_id = Some(session_id.clone());
        session_id
    }

    fn append(&mut self, message: Message) {
        self.messages.push(message.clone());
        publish(&mut self.observers, ChatEvent::MessageAppended(message));
    }

    fn set_state(&mut self, state: ChatState) {
        if self.state == state {
            return;
        }
        debug!(from = ?self.state, to = ?state, "Chat state changed");
        self.state = state;
        publish(&mut self.observers, ChatEvent::StateChanged(state));
    }
}
