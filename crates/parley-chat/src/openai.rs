use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parley_core::{ParleyError, TokenLimits};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::history::{MessageStore, Role, StoredMessage};
use crate::tokenizer::count_tokens;
use crate::transport::{ChatResult, ChatTransport, FailureKind, SendFailure, SendOptions};

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: Role,
    content: String,
}

/// Connection settings for [`OpenAiTransport`].
#[derive(Clone)]
pub struct OpenAiConfig {
    /// API base including the version segment, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Bearer token sent in the `Authorization` header.
    pub api_key: String,
    /// Sent as `OpenAI-Organization` when set.
    pub api_org: Option<String>,
    /// Backend model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Context window split used to size history and `max_tokens`.
    pub token_limits: TokenLimits,
    /// Most messages kept for replaying threads.
    pub history_limit: usize,
    /// Where the message history is persisted between runs, if anywhere.
    pub history_file: Option<PathBuf>,
}

/// OpenAI-compatible chat completions transport.
///
/// Works with any provider exposing `{base_url}/chat/completions`. Every
/// message sent or received is kept in a bounded store so a later turn can
/// name its parent and have the prior thread replayed as history. Message ids
/// are generated here; the backend's completion id is only recorded.
///
/// # Examples
///
/// ```
/// use parley_chat::openai::{OpenAiConfig, OpenAiTransport};
/// use parley_core::TokenLimits;
///
/// let transport = OpenAiTransport::new(OpenAiConfig {
///     base_url: "https://api.openai.com/v1".into(),
///     api_key: "sk-test".into(),
///     api_org: None,
///     model: "gpt-4".into(),
///     temperature: 0.05,
///     token_limits: TokenLimits::for_model("gpt-4"),
///     history_limit: 1_000,
///     history_file: None,
/// })
/// .unwrap();
/// assert_eq!(transport.endpoint(), "https://api.openai.com/v1/chat/completions");
/// ```
pub struct OpenAiTransport {
    client: reqwest::Client,
    config: OpenAiConfig,
    store: Mutex<MessageStore>,
}

/// Request messages for one turn plus what was learned building them.
struct Prepared {
    messages: Vec<ChatMessage>,
    inherited_conversation: Option<String>,
    prompt_tokens: usize,
    parent_missing: bool,
}

impl OpenAiTransport {
    /// Create a transport, loading saved history when `history_file` exists.
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::Llm`] if the HTTP client cannot be built, or
    /// [`ParleyError::Io`] / [`ParleyError::Serialization`] if the history
    /// file cannot be read.
    pub fn new(config: OpenAiConfig) -> Result<Self, ParleyError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ParleyError::Llm(format!("failed to create HTTP client: {e}")))?;
        let store = match &config.history_file {
            Some(path) => MessageStore::load(path, config.history_limit)?,
            None => MessageStore::new(config.history_limit),
        };
        Ok(Self {
            client,
            config,
            store: Mutex::new(store),
        })
    }

    /// Full URL of the chat completions endpoint.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Number of messages currently held for replay.
    pub async fn history_len(&self) -> usize {
        self.store.lock().await.len()
    }

    async fn build_messages(&self, message: &str, options: &SendOptions) -> Prepared {
        let mut store = self.store.lock().await;

        let parent = options.parent_message_id.as_deref();
        let parent_missing = parent.is_some_and(|id| !store.contains(id));
        let ancestors = store.ancestors(parent);
        let inherited_conversation = ancestors.first().map(|m| m.conversation_id.clone());

        let budget = self
            .config
            .token_limits
            .max_tokens
            .saturating_sub(self.config.token_limits.response_tokens);
        let fixed = count_tokens(&options.system_message) + count_tokens(message);
        let (history, prompt_tokens) = select_history(&ancestors, budget, fixed);

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage {
            role: Role::System,
            content: options.system_message.to_string(),
        });
        messages.extend(history.into_iter().map(|m| ChatMessage {
            role: m.role,
            content: m.text.clone(),
        }));
        messages.push(ChatMessage {
            role: Role::User,
            content: message.to_string(),
        });

        Prepared {
            messages,
            inherited_conversation,
            prompt_tokens,
            parent_missing,
        }
    }

    async fn remember(
        &self,
        user_id: &str,
        assistant_id: &str,
        user: StoredMessage,
        reply: StoredMessage,
    ) {
        let mut store = self.store.lock().await;
        store.insert(user_id.to_string(), user);
        store.insert(assistant_id.to_string(), reply);
        debug!(stored = store.len(), "history updated");

        let Some(path) = &self.config.history_file else {
            return;
        };
        let saved = match store.to_json() {
            Ok(json) => write_history(path, json).await,
            Err(e) => Err(e),
        };
        if let Err(e) = saved {
            warn!(path = %path.display(), "failed to save message history: {e}");
        }
    }
}

async fn write_history(path: &Path, json: String) -> Result<(), ParleyError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, json).await?;
    Ok(())
}

/// Pick the newest ancestors that fit in `budget`, returned oldest first.
///
/// `ancestors` is ordered newest first; `used` starts at the cost of the
/// messages that are always sent.
fn select_history(
    ancestors: &[StoredMessage],
    budget: usize,
    mut used: usize,
) -> (Vec<&StoredMessage>, usize) {
    let mut kept = Vec::new();
    for message in ancestors {
        let cost = count_tokens(&message.text);
        if used + cost > budget {
            break;
        }
        used += cost;
        kept.push(message);
    }
    kept.reverse();
    (kept, used)
}

fn classify_status(status: u16) -> FailureKind {
    match status {
        429 => FailureKind::RateLimited,
        400..=499 => FailureKind::Client { status },
        500..=599 => FailureKind::Server { status },
        _ => FailureKind::Malformed,
    }
}

fn parse_completion(body: &serde_json::Value) -> Result<(Option<String>, String), SendFailure> {
    let content = body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| {
            SendFailure::new(
                FailureKind::Malformed,
                format!("unexpected response structure: {body}"),
            )
        })?;
    let id = body.get("id").and_then(|v| v.as_str()).map(str::to_string);
    Ok((id, content.to_string()))
}

#[async_trait]
impl ChatTransport for OpenAiTransport {
    async fn send(&self, message: &str, options: &SendOptions) -> Result<ChatResult, SendFailure> {
        let user_id = uuid::Uuid::new_v4().to_string();
        let prepared = self.build_messages(message, options).await;
        if prepared.parent_missing {
            warn!(
                parent_message_id = options.parent_message_id.as_deref().unwrap_or_default(),
                "parent message not in history, starting without prior turns"
            );
        }
        let conversation_id = options
            .conversation_id
            .clone()
            .or(prepared.inherited_conversation)
            .unwrap_or_else(|| user_id.clone());

        let limits = &self.config.token_limits;
        let max_tokens = limits
            .response_tokens
            .min(limits.max_tokens.saturating_sub(prepared.prompt_tokens))
            .max(1);

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": prepared.messages,
            "temperature": self.config.temperature,
            "max_tokens": max_tokens,
            "stream": false,
        });

        let mut request = self
            .client
            .post(self.endpoint())
            .timeout(options.timeout)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json");
        if let Some(org) = &self.config.api_org {
            request = request.header("OpenAI-Organization", org);
        }

        let response = request.json(&body).send().await.map_err(|e| {
            let kind = if e.is_timeout() {
                FailureKind::Timeout
            } else {
                FailureKind::Network
            };
            SendFailure::new(kind, format!("request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(SendFailure::new(
                classify_status(status.as_u16()),
                format!("LLM API error {status}: {body_text}"),
            ));
        }

        let response_body: serde_json::Value = response.json().await.map_err(|e| {
            let kind = if e.is_timeout() {
                FailureKind::Timeout
            } else {
                FailureKind::Malformed
            };
            SendFailure::new(kind, format!("failed to parse response: {e}"))
        })?;
        let (completion_id, text) = parse_completion(&response_body)?;
        debug!(
            completion_id = completion_id.as_deref().unwrap_or_default(),
            "completion received"
        );

        let assistant_id = uuid::Uuid::new_v4().to_string();
        self.remember(
            &user_id,
            &assistant_id,
            StoredMessage {
                role: Role::User,
                text: message.to_string(),
                parent_message_id: options.parent_message_id.clone(),
                conversation_id: conversation_id.clone(),
                completion_id: None,
            },
            StoredMessage {
                role: Role::Assistant,
                text: text.clone(),
                parent_message_id: Some(user_id.clone()),
                conversation_id: conversation_id.clone(),
                completion_id,
            },
        )
        .await;

        Ok(ChatResult {
            id: assistant_id,
            conversation_id: Some(conversation_id),
            parent_message_id: Some(user_id),
            text,
        })
    }
}
