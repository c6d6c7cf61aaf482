//! Root of the `mindcraft-core` library.
//!
//! Content-generation pipelines (research sessions and curriculum plans),
//! the completion backends they drive, and the streaming chat relay.

// Prevent accidental direct writes to stdout/stderr in library code. All
// user-visible output must go through the service layer or tracing.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod chat;
pub mod completion;
pub mod config;
pub mod db;
pub mod error;
pub mod evaluate;
pub mod generate;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod research;

pub use error::{CoreError, Result};
