//! Session listing, statistics, deletion and remote history

use std::error::Error;

use crate::cli::AppContext;
use crate::core::chat_stream::ChatTransport;
use crate::core::message::{Message, Session};
use crate::core::session_store::{self, SessionMetrics};

const PREVIEW_CHARS: usize = 48;

fn preview(session: &Session) -> String {
    let Some(first) = session.messages.iter().find(|m| m.role.is_user()) else {
        return "(empty)".to_string();
    };
    let text: String = first.content.chars().take(PREVIEW_CHARS).collect();
    if first.content.chars().count() > PREVIEW_CHARS {
        format!("{text}…")
    } else {
        text
    }
}

/// One line per session, most recently active first.
pub fn format_session_line(session: &Session, current: bool) -> String {
    let marker = if current { "*" } else { " " };
    let mood = session
        .mood
        .as_ref()
        .map(|mood| format!(" {}", mood.emoji))
        .unwrap_or_default();
    format!(
        "{marker} {}  {}  {:>3} msgs{mood}  {}",
        session.id,
        session.last_active.format("%Y-%m-%d %H:%M"),
        session.messages.len(),
        preview(session)
    )
}

pub fn print_session_list(sessions: &[&Session], current: Option<&str>) {
    if sessions.is_empty() {
        println!("No stored sessions.");
        return;
    }
    for session in sessions {
        println!(
            "{}",
            format_session_line(session, current == Some(session.id.as_str()))
        );
    }
}

pub fn format_metrics(metrics: &SessionMetrics) -> Vec<String> {
    let mut lines = vec![
        format!("Sessions: {}", metrics.total_sessions),
        format!("Messages: {}", metrics.total_messages),
        format!(
            "Average messages per session: {:.1}",
            metrics.avg_messages_per_session
        ),
    ];
    if metrics.top_topics.is_empty() {
        lines.push("Top topics: (none yet)".to_string());
    } else {
        lines.push("Top topics:".to_string());
        for entry in &metrics.top_topics {
            lines.push(format!("  {} ({})", entry.topic, entry.count));
        }
    }
    lines
}

pub fn list_sessions(context: &AppContext, stats: bool) {
    let guard = session_store::lock(&context.store);
    if stats {
        for line in format_metrics(&guard.metrics()) {
            println!("{line}");
        }
    } else {
        print_session_list(&guard.all_sessions(), guard.current_session_id());
    }
}

pub fn delete_session(context: &AppContext, session_id: &str) -> Result<(), Box<dyn Error>> {
    if session_store::lock(&context.store).delete_session(session_id) {
        println!("✅ Deleted {session_id}");
        Ok(())
    } else {
        Err(format!("No session named {session_id}").into())
    }
}

pub fn forget_all(context: &AppContext) {
    let mut guard = session_store::lock(&context.store);
    let count = guard.all_sessions().len();
    guard.clear_all_sessions();
    println!("✅ Deleted {count} sessions");
}

pub fn format_history_line(message: &Message) -> String {
    format!(
        "[{}] {}: {}",
        message.timestamp.format("%Y-%m-%d %H:%M:%S"),
        message.role.as_str(),
        message.content
    )
}

pub async fn show_history(context: &AppContext, session_id: &str) -> Result<(), Box<dyn Error>> {
    let history = context.client.get_history(session_id).await?;
    if history.is_empty() {
        println!("The service has no history for {session_id}.");
    }
    for message in &history {
        println!("{}", format_history_line(message));
    }
    Ok(())
}
