//! The seam between the bot and an LLM backend.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Options for a single send.
#[derive(Debug, Clone)]
pub struct SendOptions {
    /// Upper bound for this attempt.
    pub timeout: Duration,
    /// Message the new turn attaches to, if continuing a thread.
    pub parent_message_id: Option<String>,
    /// Conversation the parent belongs to, if known.
    pub conversation_id: Option<String>,
    /// Fixed persona for the conversation.
    pub system_message: Arc<str>,
}

/// A successful reply from the backend.
///
/// # Examples
///
/// ```
/// use parley_chat::transport::ChatResult;
///
/// let result = ChatResult {
///     id: "chatcmpl-1".into(),
///     conversation_id: Some("conv-1".into()),
///     parent_message_id: Some("user-1".into()),
///     text: "LGTM!".into(),
/// };
/// assert_eq!(result.text, "LGTM!");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResult {
    /// Id of the assistant message; the next turn's parent.
    pub id: String,
    /// Conversation the reply belongs to.
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Id of the user message this reply answers.
    #[serde(default)]
    pub parent_message_id: Option<String>,
    /// Raw reply text.
    pub text: String,
}

/// Why a send failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The attempt exceeded its timeout.
    Timeout,
    /// Connection or transport-level failure.
    Network,
    /// HTTP 429.
    RateLimited,
    /// HTTP 5xx.
    Server { status: u16 },
    /// Any other HTTP 4xx; retrying will not help.
    Client { status: u16 },
    /// The backend answered with something we could not use.
    Malformed,
}

impl FailureKind {
    /// Returns `true` if another attempt may succeed.
    pub fn is_transient(self) -> bool {
        !matches!(self, FailureKind::Client { .. })
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network"),
            FailureKind::RateLimited => write!(f, "rate limited"),
            FailureKind::Server { status } => write!(f, "server error {status}"),
            FailureKind::Client { status } => write!(f, "client error {status}"),
            FailureKind::Malformed => write!(f, "malformed response"),
        }
    }
}

/// A failed send: what went wrong plus backend detail.
///
/// # Examples
///
/// ```
/// use parley_chat::transport::{FailureKind, SendFailure};
///
/// let failure = SendFailure::new(FailureKind::RateLimited, "slow down");
/// assert!(failure.kind.is_transient());
/// assert_eq!(failure.to_string(), "rate limited: slow down");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct SendFailure {
    /// Failure classification.
    pub kind: FailureKind,
    /// Backend or transport message.
    pub detail: String,
}

impl SendFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// A backend that answers one message at a time.
///
/// Implementations may keep history keyed by message id so that
/// `parent_message_id` can be expanded into prior turns.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send `message` and return the backend's reply.
    async fn send(&self, message: &str, options: &SendOptions) -> Result<ChatResult, SendFailure>;
}
