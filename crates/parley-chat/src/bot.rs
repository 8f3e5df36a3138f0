use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use parley_core::{BotOptions, ConversationIds, Credentials, ModelOptions, ParleyError};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::openai::{OpenAiConfig, OpenAiTransport};
use crate::transport::{ChatResult, ChatTransport, FailureKind, SendFailure, SendOptions};

/// Prefix the backend sometimes prepends to an otherwise normal reply.
const RESPONSE_QUIRK_PREFIX: &str = "with ";

/// Outcome of one chat turn.
///
/// An empty reply means "skip this turn": the message was empty, the backend
/// never answered, or it failed permanently. It is never an error.
///
/// # Examples
///
/// ```
/// use parley_chat::bot::ChatReply;
///
/// let reply = ChatReply::empty();
/// assert!(reply.is_empty());
/// assert!(reply.ids.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    /// Reply text, empty when the turn produced nothing.
    pub text: String,
    /// Ids to pass to the next turn of the same thread.
    pub ids: ConversationIds,
    /// Time spent in the backend, retries included.
    #[serde(skip)]
    pub elapsed: Duration,
}

impl ChatReply {
    /// The degraded result: no text, no ids.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` if the turn produced no text.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Split into `(text, ids)`.
    pub fn into_parts(self) -> (String, ConversationIds) {
        (self.text, self.ids)
    }
}

/// Conversation client bound to one model and one fixed persona.
///
/// The bot keeps no per-conversation state: every call carries its own
/// [`ConversationIds`], so one instance can be shared across tasks. It does
/// not limit concurrency; callers bound in-flight turns themselves.
pub struct Bot {
    transport: Arc<dyn ChatTransport>,
    system_message: Arc<str>,
    model: String,
    retries: u32,
    timeout: Duration,
    backoff: Duration,
    debug: bool,
}

impl Bot {
    /// Create a bot talking to the configured OpenAI-compatible endpoint.
    ///
    /// `today` is stamped into the system message.
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::Config`] if `credentials` has no API key,
    /// [`ParleyError::Llm`] if the HTTP client cannot be built, or an I/O or
    /// serialization error if `history_file` exists but cannot be loaded.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::NaiveDate;
    /// use parley_chat::Bot;
    /// use parley_core::{BotOptions, Credentials, ModelOptions};
    ///
    /// let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    /// let bot = Bot::new(
    ///     &BotOptions::default(),
    ///     &ModelOptions::new("gpt-4"),
    ///     &Credentials::with_api_key("sk-test"),
    ///     today,
    /// )
    /// .unwrap();
    /// assert!(bot.system_message().contains("Current date: 2024-05-01"));
    ///
    /// let missing = Bot::new(
    ///     &BotOptions::default(),
    ///     &ModelOptions::new("gpt-4"),
    ///     &Credentials::default(),
    ///     today,
    /// );
    /// assert!(missing.is_err());
    /// ```
    pub fn new(
        options: &BotOptions,
        model: &ModelOptions,
        credentials: &Credentials,
        today: NaiveDate,
    ) -> Result<Self, ParleyError> {
        let api_key = require_api_key(credentials)?;
        let transport = OpenAiTransport::new(OpenAiConfig {
            base_url: options.base_url.clone(),
            api_key: api_key.to_string(),
            api_org: credentials.api_org.clone(),
            model: model.model.clone(),
            temperature: options.model_temperature,
            token_limits: model.token_limits.clone(),
            history_limit: options.history_limit,
            history_file: options.history_file.clone(),
        })?;
        Ok(Self::assemble(options, model, today, Arc::new(transport)))
    }

    /// Create a bot over an arbitrary transport.
    ///
    /// The credential is still required so that a misconfigured run fails
    /// here rather than on the first turn.
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::Config`] if `credentials` has no API key.
    pub fn with_transport(
        options: &BotOptions,
        model: &ModelOptions,
        credentials: &Credentials,
        today: NaiveDate,
        transport: Arc<dyn ChatTransport>,
    ) -> Result<Self, ParleyError> {
        require_api_key(credentials)?;
        Ok(Self::assemble(options, model, today, transport))
    }

    fn assemble(
        options: &BotOptions,
        model: &ModelOptions,
        today: NaiveDate,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            transport,
            system_message: Arc::from(compose_system_message(options, model, today)),
            model: model.model.clone(),
            retries: options.retries,
            timeout: Duration::from_millis(options.timeout_ms),
            backoff: Duration::from_millis(options.retry_backoff_ms),
            debug: options.debug,
        }
    }

    /// The persona sent with every turn.
    pub fn system_message(&self) -> &str {
        &self.system_message
    }

    /// Backend model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `message` as the next turn after `ids`.
    ///
    /// Never fails: an empty message, exhausted retries, or a permanent
    /// backend error all yield [`ChatReply::empty`]. Worst-case latency is
    /// `retries` attempts of `timeout_ms` each, plus any configured backoff.
    pub async fn chat(&self, message: &str, ids: &ConversationIds) -> ChatReply {
        match self.chat_turn(message, ids).await {
            Ok(reply) => reply,
            Err(failure) => {
                warn!(model = %self.model, kind = %failure.kind, "failed to chat: {failure:?}");
                ChatReply::empty()
            }
        }
    }

    async fn chat_turn(
        &self,
        message: &str,
        ids: &ConversationIds,
    ) -> Result<ChatReply, SendFailure> {
        if message.is_empty() {
            return Ok(ChatReply::empty());
        }

        let start = Instant::now();
        let outcome = self.send_with_retry(message, ids).await;
        let elapsed = start.elapsed();
        info!(
            model = %self.model,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "sendMessage (including retries) response time"
        );

        let Some(response) = outcome? else {
            warn!(model = %self.model, "response is null");
            return Ok(ChatReply {
                elapsed,
                ..ChatReply::empty()
            });
        };

        if self.debug {
            info!(response = ?response, "raw response");
        } else {
            debug!(response = ?response, "raw response");
        }

        let text = self.extract_text(&response);
        Ok(ChatReply {
            text,
            ids: ConversationIds::new(Some(response.id), response.conversation_id),
            elapsed,
        })
    }

    /// Try the transport up to `retries` times.
    ///
    /// Returns `Ok(None)` once transient failures exhaust the attempts, and
    /// `Err` as soon as a permanent failure is seen.
    async fn send_with_retry(
        &self,
        message: &str,
        ids: &ConversationIds,
    ) -> Result<Option<ChatResult>, SendFailure> {
        let options = SendOptions {
            timeout: self.timeout,
            parent_message_id: ids.parent_message_id.clone(),
            conversation_id: ids.conversation_id.clone(),
            system_message: Arc::clone(&self.system_message),
        };

        let attempts = self.retries.max(1);
        for attempt in 1..=attempts {
            let outcome =
                match tokio::time::timeout(self.timeout, self.transport.send(message, &options))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(SendFailure::new(
                        FailureKind::Timeout,
                        format!("no response within {} ms", self.timeout.as_millis()),
                    )),
                };

            match outcome {
                Ok(response) => return Ok(Some(response)),
                Err(failure) if !failure.kind.is_transient() => {
                    info!(attempt, "failed to send message: {failure}");
                    return Err(failure);
                }
                Err(failure) => {
                    info!(attempt, attempts, "failed to send message: {failure}");
                    if attempt < attempts && !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }

        info!(attempts, "giving up after retries");
        Ok(None)
    }

    fn extract_text(&self, response: &ChatResult) -> String {
        let text = response
            .text
            .strip_prefix(RESPONSE_QUIRK_PREFIX)
            .unwrap_or(&response.text)
            .to_string();
        if self.debug {
            info!("responses: {text}");
        }
        text
    }
}

fn require_api_key(credentials: &Credentials) -> Result<&str, ParleyError> {
    credentials.api_key.as_deref().ok_or_else(|| {
        ParleyError::Config(format!(
            "unable to initialize the LLM API, '{}' is not available",
            Credentials::API_KEY_VAR
        ))
    })
}

/// Build the fixed persona: configured text, knowledge cutoff, date, and
/// response language.
pub fn compose_system_message(
    options: &BotOptions,
    model: &ModelOptions,
    today: NaiveDate,
) -> String {
    format!(
        "{}\nKnowledge cutoff: {}\nCurrent date: {}\n\nIMPORTANT: Entire response must be in the language with ISO code: {}\n",
        options.system_message,
        model.token_limits.knowledge_cut_off,
        today.format("%Y-%m-%d"),
        options.language,
    )
}
