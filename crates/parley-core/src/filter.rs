//! Glob rules deciding which changed paths are sent for review.

use crate::error::ParleyError;

/// Include/exclude matcher built from `path_filters` rules.
///
/// A rule prefixed with `!` excludes matching paths. With no rules every path
/// passes. When at least one inclusion rule exists a path must match one of
/// them, and it must never match an exclusion.
///
/// # Examples
///
/// ```
/// use parley_core::PathFilter;
///
/// let filter = PathFilter::new(&["src/**/*.rs", "!src/generated/**"]).unwrap();
/// assert!(filter.check("src/bot/mod.rs"));
/// assert!(!filter.check("src/generated/api.rs"));
/// assert!(!filter.check("README.md"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    rules: Vec<(glob::Pattern, bool)>,
}

impl PathFilter {
    /// Compile filter rules. Blank rules are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ParleyError::Config`] for an invalid glob.
    pub fn new<S: AsRef<str>>(rules: &[S]) -> Result<Self, ParleyError> {
        let mut compiled = Vec::new();
        for rule in rules {
            let rule = rule.as_ref().trim();
            if rule.is_empty() {
                continue;
            }
            let (pattern, exclude) = match rule.strip_prefix('!') {
                Some(rest) => (rest.trim(), true),
                None => (rule, false),
            };
            let pattern = glob::Pattern::new(pattern).map_err(|e| {
                ParleyError::Config(format!("invalid path filter '{rule}': {e}"))
            })?;
            compiled.push((pattern, exclude));
        }
        Ok(Self { rules: compiled })
    }

    /// Returns `true` if `path` should be reviewed.
    pub fn check(&self, path: &str) -> bool {
        if self.rules.is_empty() {
            return true;
        }

        let options = glob::MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };

        let mut included = false;
        let mut excluded = false;
        let mut has_inclusion = false;
        for (pattern, exclude) in &self.rules {
            if pattern.matches_with(path, options) {
                if *exclude {
                    excluded = true;
                } else {
                    included = true;
                }
            }
            if !exclude {
                has_inclusion = true;
            }
        }

        (!has_inclusion || included) && !excluded
    }
}
