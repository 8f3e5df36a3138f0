use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ParleyError;
use crate::filter::PathFilter;

/// Top-level configuration loaded from `.parley.toml`.
///
/// Every field has a default, so an empty file yields a usable config.
///
/// # Examples
///
/// ```
/// use parley_core::ParleyConfig;
///
/// let config = ParleyConfig::default();
/// assert_eq!(config.bot.retries, 5);
/// assert_eq!(config.review.max_files, 150);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    /// Conversation client settings.
    #[serde(default)]
    pub bot: BotOptions,
    /// Review flow settings consumed by the orchestration layer.
    #[serde(default)]
    pub review: ReviewOptions,
    /// User-supplied prompt templates.
    #[serde(default)]
    pub prompts: PromptConfig,
}

impl ParleyConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::FileNotFound`] if `path` does not exist,
    /// [`ParleyError::Io`] if it cannot be read, or [`ParleyError::Toml`]
    /// if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use parley_core::ParleyConfig;
    /// use std::path::Path;
    ///
    /// let config = ParleyConfig::from_file(Path::new(".parley.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, ParleyError> {
        if !path.exists() {
            return Err(ParleyError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use parley_core::ParleyConfig;
    ///
    /// let toml = r#"
    /// [bot]
    /// retries = 2
    /// "#;
    /// let config = ParleyConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.bot.retries, 2);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, ParleyError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }
}

const DEFAULT_SYSTEM_MESSAGE: &str = "\
You are a highly experienced software engineer acting as a pull request \
reviewer. You provide concise, accurate feedback on code changes: logic \
errors, security issues, performance problems, data races, resource leaks, \
and maintainability concerns. Do not comment on trivial style issues unless \
they hide a defect.";

/// Conversation client configuration.
///
/// Created once at startup and never mutated afterwards; a bot built from it
/// keeps its own copy.
///
/// # Examples
///
/// ```
/// use parley_core::BotOptions;
///
/// let opts = BotOptions::default();
/// assert_eq!(opts.light_model, "gpt-3.5-turbo");
/// assert_eq!(opts.heavy_model, "gpt-4");
/// assert_eq!(opts.timeout_ms, 360_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotOptions {
    /// Log raw responses at info level.
    #[serde(default)]
    pub debug: bool,
    /// Persona text prepended to every conversation.
    #[serde(default = "default_system_message")]
    pub system_message: String,
    /// Model for cheap summarization turns.
    #[serde(default = "default_light_model")]
    pub light_model: String,
    /// Model for review turns.
    #[serde(default = "default_heavy_model")]
    pub heavy_model: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub model_temperature: f32,
    /// Attempts per chat turn (at least one attempt is always made).
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Pause between failed attempts in milliseconds.
    #[serde(default)]
    pub retry_backoff_ms: u64,
    /// Upper bound on in-flight chat turns, enforced by callers.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    /// Base URL of the OpenAI-compatible API, including the version segment.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// ISO code of the language every response must be written in.
    #[serde(default = "default_language")]
    pub language: String,
    /// Most messages the history store keeps before evicting the least
    /// recently used.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// JSON file the history store is loaded from and saved to, so a later
    /// run can continue a thread. In memory only when unset.
    #[serde(default)]
    pub history_file: Option<PathBuf>,
}

fn default_system_message() -> String {
    DEFAULT_SYSTEM_MESSAGE.into()
}

fn default_light_model() -> String {
    "gpt-3.5-turbo".into()
}

fn default_heavy_model() -> String {
    "gpt-4".into()
}

fn default_temperature() -> f32 {
    0.05
}

fn default_retries() -> u32 {
    5
}

fn default_timeout_ms() -> u64 {
    360_000
}

fn default_concurrency_limit() -> usize {
    6
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_language() -> String {
    "en-US".into()
}

fn default_history_limit() -> usize {
    10_000
}

impl Default for BotOptions {
    fn default() -> Self {
        Self {
            debug: false,
            system_message: default_system_message(),
            light_model: default_light_model(),
            heavy_model: default_heavy_model(),
            model_temperature: default_temperature(),
            retries: default_retries(),
            timeout_ms: default_timeout_ms(),
            retry_backoff_ms: 0,
            concurrency_limit: default_concurrency_limit(),
            base_url: default_base_url(),
            language: default_language(),
            history_limit: default_history_limit(),
            history_file: None,
        }
    }
}

/// Review flow configuration.
///
/// These knobs belong to the orchestration layer; they are loaded here so a
/// single file configures the whole run.
///
/// # Examples
///
/// ```
/// use parley_core::ReviewOptions;
///
/// let opts = ReviewOptions::default();
/// assert!(!opts.disable_review);
/// assert!(opts.path_filters.is_empty());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOptions {
    /// Only summarize, never review.
    #[serde(default)]
    pub disable_review: bool,
    /// Skip release-notes generation.
    #[serde(default)]
    pub disable_release_notes: bool,
    /// Maximum files to review; 0 means unlimited.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    /// Review changes even when the summary marks them as trivial.
    #[serde(default)]
    pub review_simple_changes: bool,
    /// Leave a comment even when a hunk looks good.
    #[serde(default)]
    pub review_comment_lgtm: bool,
    /// Glob rules selecting which paths are reviewed; `!` excludes.
    #[serde(default)]
    pub path_filters: Vec<String>,
    /// Upper bound on concurrent source-control API calls.
    #[serde(default = "default_concurrency_limit")]
    pub github_concurrency_limit: usize,
}

fn default_max_files() -> usize {
    150
}

impl Default for ReviewOptions {
    fn default() -> Self {
        Self {
            disable_review: false,
            disable_release_notes: false,
            max_files: default_max_files(),
            review_simple_changes: false,
            review_comment_lgtm: false,
            path_filters: Vec::new(),
            github_concurrency_limit: default_concurrency_limit(),
        }
    }
}

impl ReviewOptions {
    /// Compile [`ReviewOptions::path_filters`] into a matcher.
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::Config`] if a rule is not a valid glob.
    pub fn path_filter(&self) -> Result<PathFilter, ParleyError> {
        PathFilter::new(&self.path_filters)
    }
}

/// User-supplied prompt templates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Template for the final pull-request summary.
    #[serde(default)]
    pub summarize: String,
    /// Template for release notes.
    #[serde(default)]
    pub summarize_release_notes: String,
}
