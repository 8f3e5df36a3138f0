//! Token counting against the `cl100k_base` vocabulary.
//!
//! Counts are used for budgeting prompts before a call is made; they are never
//! sent to the backend.

use std::sync::OnceLock;

use parley_core::TokenLimits;
use tiktoken_rs::CoreBPE;

/// Literal sentinel the vocabulary treats as a special token.
const END_OF_TEXT: &str = "<|endoftext|>";

fn encoder() -> &'static CoreBPE {
    static ENCODER: OnceLock<CoreBPE> = OnceLock::new();
    // The vocabulary is compiled into tiktoken-rs; failing to load it is a broken build.
    ENCODER.get_or_init(|| tiktoken_rs::cl100k_base().expect("cl100k_base vocabulary is bundled"))
}

/// Count the tokens in `text`.
///
/// Any literal `<|endoftext|>` sentinel is stripped before encoding. The
/// input is never truncated.
///
/// # Examples
///
/// ```
/// use parley_chat::tokenizer::count_tokens;
///
/// assert_eq!(count_tokens(""), 0);
/// assert_eq!(count_tokens("hello<|endoftext|>"), count_tokens("hello"));
/// ```
pub fn count_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let cleaned = text.replace(END_OF_TEXT, "");
    encoder().encode_ordinary(&cleaned).len()
}

/// Returns `true` if `text` fits in the request budget of `limits`.
///
/// # Examples
///
/// ```
/// use parley_core::TokenLimits;
/// use parley_chat::tokenizer::fits_request_budget;
///
/// let limits = TokenLimits::for_model("gpt-4");
/// assert!(fits_request_budget("fn main() {}", &limits));
/// ```
pub fn fits_request_budget(text: &str, limits: &TokenLimits) -> bool {
    count_tokens(text) <= limits.request_tokens
}
