use std::path::PathBuf;

/// Errors raised while setting Parley up.
///
/// Chat turns never fail with this type; a turn that cannot be completed
/// degrades to an empty reply. These errors come from loading configuration,
/// constructing a bot, or reading saved history.
///
/// # Examples
///
/// ```
/// use parley_core::ParleyError;
///
/// let err = ParleyError::Config("OPENAI_API_KEY is not set".into());
/// assert_eq!(err.to_string(), "invalid configuration: OPENAI_API_KEY is not set");
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ParleyError {
    /// Reading a config, template, or history file failed.
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// Missing credential or unusable setting.
    #[error("invalid configuration: {0}")]
    #[diagnostic(help("check .parley.toml and the OPENAI_API_KEY environment variable"))]
    Config(String),

    /// The backend client could not be set up.
    #[error("backend unavailable: {0}")]
    Llm(String),

    /// Saved history is not valid JSON.
    #[error("malformed JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `.parley.toml` does not parse.
    #[error("malformed .parley.toml: {0}")]
    Toml(#[from] toml::de::Error),

    /// A file named on the command line or in config does not exist.
    #[error("no such file: {}", .0.display())]
    FileNotFound(PathBuf),
}
