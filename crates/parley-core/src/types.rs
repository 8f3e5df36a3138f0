use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifiers that thread one logical conversation across independent calls.
///
/// An empty value means "start a new conversation". A value is only ever
/// produced by a successful chat turn and consumed by the next turn of the
/// same thread; the caller owns it, never the bot.
///
/// # Examples
///
/// ```
/// use parley_core::ConversationIds;
///
/// let ids = ConversationIds::default();
/// assert!(ids.is_empty());
///
/// let ids = ConversationIds::new(Some("msg-1".into()), Some("conv-1".into()));
/// assert_eq!(ids.parent_message_id.as_deref(), Some("msg-1"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationIds {
    /// Message the next turn should attach to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
    /// Conversation the parent message belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ConversationIds {
    /// Create ids from an optional parent message and conversation.
    pub fn new(parent_message_id: Option<String>, conversation_id: Option<String>) -> Self {
        Self {
            parent_message_id,
            conversation_id,
        }
    }

    /// Returns `true` when neither identifier is set.
    pub fn is_empty(&self) -> bool {
        self.parent_message_id.is_none() && self.conversation_id.is_none()
    }
}

/// Token budget for a single model.
///
/// # Examples
///
/// ```
/// use parley_core::TokenLimits;
///
/// let limits = TokenLimits::for_model("gpt-4");
/// assert_eq!(limits.max_tokens, 8000);
/// assert_eq!(limits.response_tokens, 2000);
/// assert_eq!(limits.request_tokens, 5900);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenLimits {
    /// Total context window (prompt plus response).
    pub max_tokens: usize,
    /// Tokens reserved for the response.
    pub response_tokens: usize,
    /// Tokens available for the request after the response reservation and a safety margin.
    pub request_tokens: usize,
    /// Knowledge cutoff label stamped into the system message.
    pub knowledge_cut_off: String,
}

const REQUEST_MARGIN: usize = 100;
const KNOWLEDGE_CUT_OFF: &str = "2021-09-01";

impl TokenLimits {
    /// Build limits from explicit totals.
    pub fn new(max_tokens: usize, response_tokens: usize) -> Self {
        Self {
            max_tokens,
            response_tokens,
            request_tokens: max_tokens
                .saturating_sub(response_tokens)
                .saturating_sub(REQUEST_MARGIN),
            knowledge_cut_off: KNOWLEDGE_CUT_OFF.into(),
        }
    }

    /// Look up the limits for a model identifier.
    ///
    /// Unknown models get the conservative 4000/1000 budget.
    pub fn for_model(model: &str) -> Self {
        match model {
            "gpt-4-32k" => Self::new(32600, 4000),
            "gpt-3.5-turbo-16k" => Self::new(16300, 3000),
            "gpt-4" => Self::new(8000, 2000),
            _ => Self::new(4000, 1000),
        }
    }
}

impl fmt::Display for TokenLimits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "max_tokens={}, request_tokens={}, response_tokens={}",
            self.max_tokens, self.request_tokens, self.response_tokens
        )
    }
}

/// A backend model paired with its token limits.
///
/// # Examples
///
/// ```
/// use parley_core::ModelOptions;
///
/// let opts = ModelOptions::new("gpt-3.5-turbo-16k");
/// assert_eq!(opts.token_limits.max_tokens, 16300);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOptions {
    /// Backend model identifier.
    pub model: String,
    /// Token budget for `model`.
    pub token_limits: TokenLimits,
}

impl ModelOptions {
    /// Pair `model` with its default limits.
    pub fn new(model: impl Into<String>) -> Self {
        let model = model.into();
        let token_limits = TokenLimits::for_model(&model);
        Self {
            model,
            token_limits,
        }
    }
}

/// API credentials handed to a bot at construction.
///
/// The library never reads the process environment; the caller resolves
/// credentials and passes them in.
///
/// # Examples
///
/// ```
/// use parley_core::Credentials;
///
/// let creds = Credentials::from_lookup(|name| match name {
///     "OPENAI_API_KEY" => Some("sk-test".to_string()),
///     _ => None,
/// });
/// assert_eq!(creds.api_key.as_deref(), Some("sk-test"));
/// assert!(creds.api_org.is_none());
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Bearer key for the LLM API.
    pub api_key: Option<String>,
    /// Optional organization id sent as `OpenAI-Organization`.
    pub api_org: Option<String>,
}

impl Credentials {
    /// Environment variable holding the API key.
    pub const API_KEY_VAR: &'static str = "OPENAI_API_KEY";
    /// Environment variable holding the organization id.
    pub const API_ORG_VAR: &'static str = "OPENAI_API_ORG";

    /// Create credentials from an explicit key.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            api_org: None,
        }
    }

    /// Resolve credentials through a variable lookup, such as `std::env::var`.
    ///
    /// Blank values are treated as absent.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            api_key: non_blank(Self::API_KEY_VAR),
            api_org: non_blank(Self::API_ORG_VAR),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_org", &self.api_org)
            .finish()
    }
}

/// Orchestration flow a hosting event routes to.
///
/// # Examples
///
/// ```
/// use parley_core::EntryPoint;
///
/// assert_eq!(EntryPoint::from_event_name("pull_request"), Some(EntryPoint::CodeReview));
/// assert_eq!(EntryPoint::from_event_name("push"), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    /// Whole pull-request summary and review.
    CodeReview,
    /// Reply within a single review-comment thread.
    ReviewComment,
}

impl EntryPoint {
    /// Map a GitHub event name to its flow, if any.
    pub fn from_event_name(event: &str) -> Option<Self> {
        match event {
            "pull_request" | "pull_request_target" => Some(EntryPoint::CodeReview),
            "pull_request_review_comment" => Some(EntryPoint::ReviewComment),
            _ => None,
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryPoint::CodeReview => write!(f, "code_review"),
            EntryPoint::ReviewComment => write!(f, "review_comment"),
        }
    }
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use parley_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
