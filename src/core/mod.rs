pub mod cache;
pub mod chat_stream;
pub mod config;
pub mod message;
pub mod orchestrator;
pub mod prompt;
pub mod session_store;
