//! Core types, configuration, and error handling for Parley.
//!
//! This crate provides the shared foundation used by the chat layer and the CLI:
//! - [`ParleyError`]: unified error type using `thiserror`
//! - [`ParleyConfig`]: configuration loaded from `.parley.toml`
//! - Shared value objects: [`ConversationIds`], [`TokenLimits`],
//!   [`ModelOptions`], [`Credentials`], [`EntryPoint`], [`OutputFormat`]

mod config;
mod error;
mod filter;
mod types;

pub use config::{BotOptions, ParleyConfig, PromptConfig, ReviewOptions};
pub use error::ParleyError;
pub use filter::PathFilter;
pub use types::{
    ConversationIds, Credentials, EntryPoint, ModelOptions, OutputFormat, TokenLimits,
};

/// A convenience `Result` type for Parley operations.
pub type Result<T> = std::result::Result<T, ParleyError>;
