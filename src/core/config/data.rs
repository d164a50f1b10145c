use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::chat_stream::DEFAULT_BASE_URL;
use crate::core::orchestrator::ChatOptions;
use crate::core::session_store::SessionStore;

/// Environment variable overriding the configured API base URL.
pub const BASE_URL_ENV: &str = "HAVEN_API_URL";

/// Keys accepted by `haven config set` and `haven config unset`.
pub const CONFIG_KEYS: [&str; 5] = [
    "base-url",
    "web-search",
    "fact-check",
    "streaming",
    "sessions-path",
];

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Chat service base URL, e.g. "https://thinkai.lat/api"
    pub base_url: Option<String>,
    /// Ask the service to consult web search for buffered replies
    pub web_search: Option<bool>,
    /// Ask the service to fact-check buffered replies
    pub fact_check: Option<bool>,
    /// Stream replies as they are generated
    pub streaming: Option<bool>,
    /// Location of the persisted session record
    pub sessions_path: Option<PathBuf>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
///
/// # Examples
/// - Unix: `/home/user/.local/share/haven` → `~/.local/share/haven`
/// - Windows: `C:\\Users\\user\\AppData\\Roaming\\haven` → `C:\\Users\\user\\AppData\\Roaming\\haven`
/// - macOS: `/Users/user/Library/Application Support/...` → `~/Library/Application Support/...`
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

fn parse_switch(key: &str, value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(format!("Invalid value for {key}: {other} (expected on or off)")),
    }
}

impl Config {
    /// Base URL with precedence: command-line flag, then the environment,
    /// then this config, then the built-in default.
    pub fn resolve_base_url(&self, flag: Option<&str>, env: Option<String>) -> String {
        flag.map(str::to_owned)
            .or(env)
            .or_else(|| self.base_url.clone())
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    pub fn chat_options(&self) -> ChatOptions {
        ChatOptions {
            streaming: self.streaming.unwrap_or(true),
            enable_web_search: self.web_search.unwrap_or(true),
            enable_fact_check: self.fact_check.unwrap_or(true),
        }
    }

    /// Session record location: flag, then config, then the platform data
    /// directory.
    pub fn sessions_path(&self, flag: Option<&Path>) -> Option<PathBuf> {
        flag.map(Path::to_path_buf)
            .or_else(|| self.sessions_path.clone())
            .or_else(SessionStore::default_path)
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "base-url" => {
                let url = value.trim();
                if url.is_empty() {
                    return Err("base-url cannot be empty".to_string());
                }
                self.base_url = Some(url.to_string());
            }
            "web-search" => self.web_search = Some(parse_switch(key, value)?),
            "fact-check" => self.fact_check = Some(parse_switch(key, value)?),
            "streaming" => self.streaming = Some(parse_switch(key, value)?),
            "sessions-path" => self.sessions_path = Some(PathBuf::from(value)),
            _ => return Err(unknown_key(key)),
        }
        Ok(())
    }

    pub fn unset_value(&mut self, key: &str) -> Result<(), String> {
        match key {
            "base-url" => self.base_url = None,
            "web-search" => self.web_search = None,
            "fact-check" => self.fact_check = None,
            "streaming" => self.streaming = None,
            "sessions-path" => self.sessions_path = None,
            _ => return Err(unknown_key(key)),
        }
        Ok(())
    }
}

fn unknown_key(key: &str) -> String {
    format!(
        "Unknown config key: {key}. Available keys: {}",
        CONFIG_KEYS.join(", ")
    )
}
