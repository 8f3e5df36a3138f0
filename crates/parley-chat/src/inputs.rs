//! Named prompt fields and placeholder rendering.
//!
//! A [`PromptInputs`] value holds every field a prompt template may reference.
//! Rendering substitutes `$placeholder` markers in one left-to-right pass.

use std::fmt;

/// A named prompt field and its `$placeholder` marker.
///
/// # Examples
///
/// ```
/// use parley_chat::inputs::Field;
///
/// assert_eq!(Field::CommentChain.placeholder(), "$comment_chain");
/// assert_eq!(Field::Title.default_value(), "no title provided");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    SystemMessage,
    Title,
    Description,
    RawSummary,
    ShortSummary,
    Filename,
    FileContent,
    FileDiff,
    Patches,
    Diff,
    CommentChain,
    Comment,
}

impl Field {
    /// Every field, in storage order.
    pub const ALL: [Field; 12] = [
        Field::SystemMessage,
        Field::Title,
        Field::Description,
        Field::RawSummary,
        Field::ShortSummary,
        Field::Filename,
        Field::FileContent,
        Field::FileDiff,
        Field::Patches,
        Field::Diff,
        Field::CommentChain,
        Field::Comment,
    ];

    /// Literal marker replaced during rendering.
    pub fn placeholder(self) -> &'static str {
        match self {
            Field::SystemMessage => "$system_message",
            Field::Title => "$title",
            Field::Description => "$description",
            Field::RawSummary => "$raw_summary",
            Field::ShortSummary => "$short_summary",
            Field::Filename => "$filename",
            Field::FileContent => "$file_content",
            Field::FileDiff => "$file_diff",
            Field::Patches => "$patches",
            Field::Diff => "$diff",
            Field::CommentChain => "$comment_chain",
            Field::Comment => "$comment",
        }
    }

    /// Value used when the real one is unavailable.
    pub fn default_value(self) -> &'static str {
        match self {
            Field::Title => "no title provided",
            Field::Description => "no description provided",
            Field::FileContent => "file contents cannot be provided",
            Field::FileDiff => "file diff cannot be provided",
            Field::Diff => "no diff",
            Field::CommentChain => "no other comments on this patch",
            Field::Comment => "no comment provided",
            Field::SystemMessage
            | Field::RawSummary
            | Field::ShortSummary
            | Field::Filename
            | Field::Patches => "",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.placeholder()[1..])
    }
}

// Scan order for rendering: a placeholder must come before any other
// placeholder that is a prefix of it.
const SCAN_ORDER: [Field; 12] = [
    Field::SystemMessage,
    Field::ShortSummary,
    Field::CommentChain,
    Field::FileContent,
    Field::RawSummary,
    Field::Description,
    Field::FileDiff,
    Field::Filename,
    Field::Patches,
    Field::Comment,
    Field::Title,
    Field::Diff,
];

/// Field values for one prompt.
///
/// Values are replaced through [`PromptInputs::with`], which consumes and
/// returns the value; branch per file or per comment by cloning a shared base.
///
/// # Examples
///
/// ```
/// use parley_chat::inputs::{Field, PromptInputs};
///
/// let base = PromptInputs::default().with(Field::Title, "Fix bug");
/// let per_file = base.clone().with(Field::Filename, "src/lib.rs");
///
/// assert_eq!(base.get(Field::Filename), "");
/// assert_eq!(per_file.get(Field::Title), "Fix bug");
/// assert_eq!(per_file.render("$title in $filename"), "Fix bug in src/lib.rs");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptInputs {
    values: [String; 12],
}

impl Default for PromptInputs {
    fn default() -> Self {
        Self {
            values: Field::ALL.map(|field| field.default_value().to_string()),
        }
    }
}

impl PromptInputs {
    /// Inputs with every field empty, no defaults applied.
    pub fn empty() -> Self {
        Self {
            values: Default::default(),
        }
    }

    /// Current value of `field`.
    pub fn get(&self, field: Field) -> &str {
        &self.values[field.index()]
    }

    /// Return these inputs with `field` set to `value`.
    #[must_use]
    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.values[field.index()] = value.into();
        self
    }

    /// Substitute placeholders in `template`.
    ///
    /// Every occurrence of a known placeholder whose field is non-empty is
    /// replaced by the field value. Placeholders of empty fields, and unknown
    /// `$` markers, are left verbatim. Substituted text is never rescanned, so
    /// a value containing a placeholder appears literally in the output.
    ///
    /// # Examples
    ///
    /// ```
    /// use parley_chat::inputs::{Field, PromptInputs};
    ///
    /// let inputs = PromptInputs::empty().with(Field::Title, "Fix bug");
    /// assert_eq!(
    ///     inputs.render("Title: $title, Diff: $diff"),
    ///     "Title: Fix bug, Diff: $diff"
    /// );
    /// assert_eq!(inputs.render(""), "");
    /// ```
    pub fn render(&self, template: &str) -> String {
        if template.is_empty() {
            return String::new();
        }

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            rest = &rest[pos..];

            let matched = SCAN_ORDER
                .iter()
                .copied()
                .find(|field| rest.starts_with(field.placeholder()));
            match matched {
                Some(field) => {
                    let placeholder = field.placeholder();
                    let value = self.get(field);
                    if value.is_empty() {
                        out.push_str(placeholder);
                    } else {
                        out.push_str(value);
                    }
                    rest = &rest[placeholder.len()..];
                }
                None => {
                    out.push('$');
                    rest = &rest[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}
