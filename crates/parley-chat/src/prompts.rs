//! Prompt templates for the review flows.
//!
//! The summarize and release-notes templates are user-supplied; the per-file
//! and comment-reply templates are built in.

use parley_core::PromptConfig;

use crate::inputs::PromptInputs;

const SUMMARIZE_FILE_DIFF: &str = "\
## GitHub PR Title

`$title`

## Description

```
$description
```

## Diff

```diff
$file_diff
```

## Instructions

Summarize the diff above in 100 words or fewer. Focus on changes to exported \
signatures, behavior visible to callers, and data structures. Do not repeat \
the diff.

Below the summary, on its own line, write `[TRIAGE]: NEEDS_REVIEW` if the \
change alters logic or functionality, or `[TRIAGE]: APPROVED` if it only \
touches formatting, comments, or naming.
";

const REVIEW_FILE_DIFF: &str = "\
## GitHub PR Title

`$title`

## Description

```
$description
```

## Summary of changes

```
$short_summary
```

## File `$filename`

$patches

## Instructions

Review the hunks above. Each hunk is annotated with new-file line numbers. \
Reply with one section per issue in the form `START-END:` followed by the \
comment. Only report substantive problems; if the hunk looks correct, reply \
`LGTM!` for that range.
";

const COMMENT: &str = "\
## GitHub PR Title

`$title`

## Description

```
$description
```

## Summary generated by the bot

```
$short_summary
```

## Entire diff

```diff
$file_diff
```

## Diff being commented on

```diff
$diff
```

## Conversation chain

```
$comment_chain
```

## The comment that needs a reply

```
$comment
```

## Instructions

Reply directly to the new comment above. Reference the diff where it helps.
";

/// The set of templates used by the review flows.
///
/// # Examples
///
/// ```
/// use parley_chat::inputs::{Field, PromptInputs};
/// use parley_chat::prompts::Prompts;
///
/// let prompts = Prompts::new("Summarize: $raw_summary", "");
/// let inputs = PromptInputs::default().with(Field::RawSummary, "- src/lib.rs: adds retry");
/// assert_eq!(prompts.render_summarize(&inputs), "Summarize: - src/lib.rs: adds retry");
/// ```
#[derive(Debug, Clone, Default)]
pub struct Prompts {
    summarize: String,
    summarize_release_notes: String,
}

impl Prompts {
    /// Create a prompt set from the user-supplied templates.
    pub fn new(summarize: impl Into<String>, summarize_release_notes: impl Into<String>) -> Self {
        Self {
            summarize: summarize.into(),
            summarize_release_notes: summarize_release_notes.into(),
        }
    }

    /// Create a prompt set from the `[prompts]` config section.
    pub fn from_config(config: &PromptConfig) -> Self {
        Self::new(&config.summarize, &config.summarize_release_notes)
    }

    /// Per-file diff summary with triage verdict.
    pub fn render_summarize_file_diff(&self, inputs: &PromptInputs) -> String {
        inputs.render(SUMMARIZE_FILE_DIFF)
    }

    /// Final pull-request summary. Empty when no template is configured.
    pub fn render_summarize(&self, inputs: &PromptInputs) -> String {
        inputs.render(&self.summarize)
    }

    /// Release notes. Empty when no template is configured.
    pub fn render_summarize_release_notes(&self, inputs: &PromptInputs) -> String {
        inputs.render(&self.summarize_release_notes)
    }

    /// Per-file review of annotated hunks.
    pub fn render_review_file_diff(&self, inputs: &PromptInputs) -> String {
        inputs.render(REVIEW_FILE_DIFF)
    }

    /// Reply within a review-comment thread.
    pub fn render_comment(&self, inputs: &PromptInputs) -> String {
        inputs.render(COMMENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::Field;

    #[test]
    fn unconfigured_user_templates_render_empty() {
        let prompts = Prompts::default();
        let inputs = PromptInputs::default();
        assert!(prompts.render_summarize(&inputs).is_empty());
        assert!(prompts.render_summarize_release_notes(&inputs).is_empty());
    }

    #[test]
    fn from_config_uses_both_templates() {
        let config = PromptConfig {
            summarize: "S: $short_summary".into(),
            summarize_release_notes: "R: $title".into(),
        };
        let prompts = Prompts::from_config(&config);
        let inputs = PromptInputs::default()
            .with(Field::ShortSummary, "short")
            .with(Field::Title, "Add retries");
        assert_eq!(prompts.render_summarize(&inputs), "S: short");
        assert_eq!(prompts.render_summarize_release_notes(&inputs), "R: Add retries");
    }

    #[test]
    fn file_diff_summary_uses_defaults_for_missing_fields() {
        let prompts = Prompts::default();
        let rendered = prompts.render_summarize_file_diff(&PromptInputs::default());
        assert!(rendered.contains("`no title provided`"));
        assert!(rendered.contains("no description provided"));
        assert!(rendered.contains("file diff cannot be provided"));
        assert!(rendered.contains("[TRIAGE]"));
    }

    #[test]
    fn review_prompt_keeps_placeholder_for_empty_summary() {
        let prompts = Prompts::default();
        let inputs = PromptInputs::default()
            .with(Field::Filename, "src/bot.rs")
            .with(Field::Patches, "---new_hunk---\n10: +retry()");
        let rendered = prompts.render_review_file_diff(&inputs);
        assert!(rendered.contains("## File `src/bot.rs`"));
        assert!(rendered.contains("10: +retry()"));
        assert!(rendered.contains("$short_summary"));
    }

    #[test]
    fn comment_prompt_includes_thread() {
        let prompts = Prompts::default();
        let inputs = PromptInputs::default()
            .with(Field::Comment, "@bot why is this unsafe?")
            .with(Field::Diff, "+unsafe { ptr.read() }");
        let rendered = prompts.render_comment(&inputs);
        assert!(rendered.contains("@bot why is this unsafe?"));
        assert!(rendered.contains("+unsafe { ptr.read() }"));
        assert!(rendered.contains("no other comments on this patch"));
    }
}
