use crate::core::chat_stream::DEFAULT_BASE_URL;
use crate::core::config::data::{path_display, Config};

fn switch(value: Option<bool>) -> &'static str {
    match value.unwrap_or(true) {
        true => "on",
        false => "off",
    }
}

impl Config {
    pub fn print_all(&self) {
        println!("Current configuration:");
        match &self.base_url {
            Some(url) => println!("  base-url: {url}"),
            None => println!("  base-url: (unset, using {DEFAULT_BASE_URL})"),
        }
        println!("  web-search: {}", switch(self.web_search));
        println!("  fact-check: {}", switch(self.fact_check));
        println!("  streaming: {}", switch(self.streaming));
        match &self.sessions_path {
            Some(path) => println!("  sessions-path: {}", path_display(path)),
            None => println!("  sessions-path: (default)"),
        }
    }
}
