//! Command-line interface parsing and handling
//!
//! This module parses command-line arguments, wires the transport, cache and
//! session store together, and dispatches to the selected command.

pub mod chat;
pub mod say;
pub mod sessions;


use std::error::Error;
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use tracing::{debug, warn};

use crate::core::cache::ResponseCache;
use crate::core::chat_stream::ChatClient;
use crate::core::config::data::BASE_URL_ENV;
use crate::core::config::Config;
use crate::core::orchestrator::{ChatOptions, ChatOrchestrator};
use crate::core::prompt::TherapeuticPrompt;
use crate::core::session_store::{SessionStore, SharedSessionStore};
use crate::utils::logging;

#[derive(Parser)]
#[command(name = "haven")]
#[command(about = "A terminal companion for supportive, streamed conversations")]
#[command(
    long_about = "Haven sends your messages to a therapeutic chat service, streams the reply \
as it is written, and keeps every conversation in a local session history.\n\n\
Environment Variables:\n\
  HAVEN_API_URL     Chat service base URL (defaults to https://thinkai.lat/api)\n\
  HAVEN_LOG         Log filter directives, e.g. haven=debug\n\n\
Chat commands:\n\
  /new              Start a new session\n\
  /clear            Clear the screen history; the next message opens a new session\n\
  /mood <label>     Record how you are feeling (calm, energized, balanced, ...)\n\
  /sessions         List stored sessions\n\
  /switch <id>      Continue a stored session\n\
  /help             Show chat commands\n\
  /quit             Leave the chat"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Chat service base URL (overrides HAVEN_API_URL and the config file)
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Session history file to use instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub store: Option<PathBuf>,

    /// Increase diagnostic output on stderr (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Start an interactive chat in the current session (default)
    Chat,
    /// Send one message and stream the reply
    Say {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Send one message and print the complete reply with its sources
    Ask {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Show the history the service keeps for a session
    History { session_id: String },
    /// List stored sessions
    Sessions {
        /// Show totals and the most discussed topics instead
        #[arg(long)]
        stats: bool,
    },
    /// Delete one stored session
    Delete { session_id: String },
    /// Delete every stored session
    Forget,
    /// Show the current configuration
    Config,
    /// Set a configuration value
    Set {
        /// Configuration key to set
        key: String,
        /// Value to set for the key
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset a configuration value
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

/// Everything a command needs, built once from config, environment and
/// flags.
pub struct AppContext {
    pub config: Config,
    pub client: ChatClient,
    pub store: SharedSessionStore,
}

impl AppContext {
    pub fn build(args: &Args, config: Config) -> Self {
        let base_url =
            config.resolve_base_url(args.base_url.as_deref(), std::env::var(BASE_URL_ENV).ok());
        debug!(base_url = %base_url, "Using chat service");

        let store = match config.sessions_path(args.store.as_deref()) {
            Some(path) => SessionStore::open(path),
            None => {
                warn!("No data directory available; sessions will not be saved");
                SessionStore::in_memory()
            }
        };

        Self {
            client: ChatClient::new(base_url, ResponseCache::new().into_shared()),
            store: store.into_shared(),
            config,
        }
    }

    pub fn orchestrator(&self, options: ChatOptions) -> ChatOrchestrator<ChatClient> {
        ChatOrchestrator::new(
            self.client.clone(),
            self.store.clone(),
            Box::new(TherapeuticPrompt),
            options,
        )
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    logging::init_tracing(args.verbose);

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async_main(args))
}

async fn async_main(mut args: Args) -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    let command = args.command.take().unwrap_or(Commands::Chat);

    match command {
        Commands::Config => {
            config.print_all();
            Ok(())
        }
        Commands::Set { key, value } => {
            let mut config = config;
            config.set_value(&key, &value.join(" "))?;
            save_config(&config)?;
            println!("✅ Set {key}");
            Ok(())
        }
        Commands::Unset { key } => {
            let mut config = config;
            config.unset_value(&key)?;
            save_config(&config)?;
            println!("✅ Unset {key}");
            Ok(())
        }
        command => {
            let context = AppContext::build(&args, config);
            match command {
                Commands::Chat => chat::run_chat(&context).await,
                Commands::Say { prompt } => say::run_say(&context, &prompt.join(" ")).await,
                Commands::Ask { prompt } => say::run_ask(&context, &prompt.join(" ")).await,
                Commands::History { session_id } => {
                    sessions::show_history(&context, &session_id).await
                }
                Commands::Sessions { stats } => {
                    sessions::list_sessions(&context, stats);
                    Ok(())
                }
                Commands::Delete { session_id } => sessions::delete_session(&context, &session_id),
                Commands::Forget => {
                    sessions::forget_all(&context);
                    Ok(())
                }
                Commands::Config | Commands::Set { .. } | Commands::Unset { .. } => Ok(()),
            }
        }
    }
}

fn save_config(config: &Config) -> Result<(), Box<dyn Error>> {
    let path = Config::get_config_path().ok_or("Could not determine the config directory")?;
    config.save_to_path(&path)
}
