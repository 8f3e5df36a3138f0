//! Conversation layer between review flows and an LLM backend.
//!
//! Provides the token counter, the prompt template model, the transport seam
//! with an OpenAI-compatible implementation, and the [`Bot`] that wraps each
//! turn in timeout and retry handling.

pub mod bot;
mod history;
pub mod inputs;
pub mod openai;
pub mod prompts;
pub mod tokenizer;
pub mod transport;

pub use bot::{Bot, ChatReply};
