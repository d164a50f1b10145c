//! Haven is a terminal client for a remote therapeutic-chat service.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`api`] defines the wire payloads exchanged with the service.
//! - [`core`] owns the streaming transport, the reply cache, the persisted
//!   session store, prompt augmentation, and the chat orchestrator that
//!   sequences sending, streaming and error recovery.
//! - [`cli`] parses arguments and drives the interactive chat and the
//!   one-shot commands.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
