//! Line-based interactive chat

use std::error::Error;
use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::cli::sessions::print_session_list;
use crate::cli::AppContext;
use crate::core::message::Role;
use crate::core::orchestrator::{ChatEvent, ChatState};
use crate::core::session_store;

const PROMPT: &str = "> ";

const CHAT_HELP: &str = "Commands:\n\
  /new            Start a new session\n\
  /clear          Clear the conversation; the next message opens a new session\n\
  /mood <label>   Record how you are feeling\n\
  /sessions       List stored sessions\n\
  /switch <id>    Continue a stored session\n\
  /quit           Leave the chat";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    Empty,
    Message(String),
    New,
    Clear,
    Mood(String),
    Sessions,
    Switch(String),
    Help,
    Quit,
    Unknown(String),
}

/// Interpret one line of input. Anything that is not a known slash command
/// is sent as a message.
pub fn parse_input(line: &str) -> ReplInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ReplInput::Empty;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return ReplInput::Message(trimmed.to_string());
    };

    let mut parts = command.splitn(2, ' ');
    let name = parts.next().unwrap_or_default();
    let args = parts.next().unwrap_or("").trim();

    match name {
        "new" => ReplInput::New,
        "clear" => ReplInput::Clear,
        "mood" if !args.is_empty() => ReplInput::Mood(args.to_string()),
        "sessions" => ReplInput::Sessions,
        "switch" if !args.is_empty() => ReplInput::Switch(args.to_string()),
        "help" => ReplInput::Help,
        "quit" | "exit" => ReplInput::Quit,
        "" => ReplInput::Message(trimmed.to_string()),
        _ => ReplInput::Unknown(name.to_string()),
    }
}

/// Text printed for an orchestrator event, if any.
pub fn render_event(event: &ChatEvent) -> Option<String> {
    match event {
        ChatEvent::MessageUpdated { delta, .. } => Some(delta.clone()),
        ChatEvent::MessageAppended(message) => match message.role {
            Role::Assistant if !message.content.is_empty() => Some(message.content.clone()),
            Role::System => Some(format!("\n⚠️  {}", message.content)),
            _ => None,
        },
        ChatEvent::StateChanged(ChatState::Idle) => Some(format!("\n\n{PROMPT}")),
        ChatEvent::StateChanged(_) | ChatEvent::MessageRemoved(_) => None,
    }
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<ChatEvent>) {
    let mut stdout = io::stdout();
    while let Some(event) = rx.recv().await {
        if let Some(text) = render_event(&event) {
            let _ = write!(stdout, "{text}");
            let _ = stdout.flush();
        }
    }
}

fn print_prompt() -> io::Result<()> {
    let mut stdout = io::stdout();
    write!(stdout, "{PROMPT}")?;
    stdout.flush()
}

pub async fn run_chat(context: &AppContext) -> Result<(), Box<dyn Error>> {
    let mut chat = context.orchestrator(context.config.chat_options());
    let printer = tokio::spawn(print_events(chat.subscribe()));

    if let Some(session_id) = chat.session_id() {
        println!("Session {session_id} ({} messages). Type /help for commands.", chat.messages().len());
    }
    print_prompt()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_input(&line) {
            ReplInput::Empty => {}
            ReplInput::Message(text) => {
                // The printer shows the reply and the next prompt.
                chat.send_message(&text).await;
                continue;
            }
            ReplInput::New => {
                let session_id = chat.start_new_session();
                println!("Started session {session_id}");
            }
            ReplInput::Clear => {
                chat.clear_messages();
                println!("Conversation cleared. Your next message starts a new session.");
            }
            ReplInput::Mood(label) => {
                chat.set_mood(&label);
                let guard = session_store::lock(&context.store);
                if let Some(mood) = chat
                    .session_id()
                    .and_then(|id| guard.session(id))
                    .and_then(|session| session.mood.as_ref())
                {
                    println!("Mood noted: {} {}", mood.emoji, mood.label);
                }
            }
            ReplInput::Sessions => {
                let guard = session_store::lock(&context.store);
                print_session_list(&guard.all_sessions(), chat.session_id());
            }
            ReplInput::Switch(session_id) => {
                if chat.switch_session(&session_id) {
                    println!(
                        "Switched to {session_id} ({} messages)",
                        chat.messages().len()
                    );
                } else {
                    eprintln!("❌ No session named {session_id}");
                }
            }
            ReplInput::Help => println!("{CHAT_HELP}"),
            ReplInput::Quit => break,
            ReplInput::Unknown(name) => eprintln!("❌ Unknown command: /{name}. Try /help"),
        }
        print_prompt()?;
    }

    drop(chat);
    let _ = printer.await;
    println!();
    Ok(())
}
