//! One-shot "say" and "ask" commands

use std::error::Error;
use std::io::{self, Write};

use crate::cli::AppContext;
use crate::core::message::Message;
use crate::core::orchestrator::{ChatEvent, ChatOptions};

fn require_prompt(prompt: &str, command: &str) -> Result<(), Box<dyn Error>> {
    if prompt.trim().is_empty() {
        return Err(format!("Usage: haven {command} <prompt>").into());
    }
    Ok(())
}

/// Stream one reply to stdout.
pub async fn run_say(context: &AppContext, prompt: &str) -> Result<(), Box<dyn Error>> {
    require_prompt(prompt, "say")?;

    let options = ChatOptions {
        streaming: true,
        ..context.config.chat_options()
    };
    let mut chat = context.orchestrator(options);
    let mut rx = chat.subscribe();
    let printer = tokio::spawn(async move {
        let mut stdout = io::stdout();
        while let Some(event) = rx.recv().await {
            if let ChatEvent::MessageUpdated { delta, .. } = event {
                let _ = write!(stdout, "{delta}");
                let _ = stdout.flush();
            }
        }
    });

    let reply = chat.send_message(prompt).await;
    drop(chat);
    let _ = printer.await;
    println!();

    match reply {
        Some(_) => Ok(()),
        None => Err("The chat service did not answer. Run with -v for details.".into()),
    }
}

/// Lines printed after a buffered reply: where it came from and what
/// backs it.
pub fn reply_details(reply: &Message) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(metadata) = &reply.metadata {
        let source = metadata.source.as_deref().unwrap_or("unknown");
        let latency = metadata.response_time_ms.unwrap_or(0.0);
        lines.push(format!("[{source}, {latency:.0} ms]"));
    }
    if let Some(sources) = &reply.sources {
        for source in sources {
            lines.push(format!("  {} {} <{}>", source.citation, source.title, source.url));
        }
    }
    if let Some(fact_check) = &reply.fact_check {
        lines.push(format!(
            "  fact check: {} ({:.0}% confidence)",
            fact_check.verdict,
            fact_check.confidence * 100.0
        ));
    }
    lines
}

/// Wait for the complete reply, then print it with its details.
pub async fn run_ask(context: &AppContext, prompt: &str) -> Result<(), Box<dyn Error>> {
    require_prompt(prompt, "ask")?;

    let options = ChatOptions {
        streaming: false,
        ..context.config.chat_options()
    };
    let mut chat = context.orchestrator(options);
    let Some(reply) = chat.send_message(prompt).await else {
        return Err("The chat service did not answer. Run with -v for details.".into());
    };

    println!("{}", reply.content);
    let details = reply_details(&reply);
    if !details.is_empty() {
        println!();
        for line in details {
            println!("{line}");
        }
    }
    Ok(())
}
