//! Removal of gateway recipient names from outgoing text

use crate::error::{GatewayError, Result};
use regex::{Regex, RegexBuilder};

/// Compiled size cap for the name pattern
const PATTERN_SIZE_LIMIT: usize = 10 * (1 << 20);

/// Removes every public recipient name, standalone or followed by `@`,
/// case-insensitively
#[derive(Debug, Clone, Default)]
pub struct Scrubber {
    pattern: Option<Regex>,
}

impl Scrubber {
    /// Fails when the names cannot be compiled into one pattern, so that
    /// scrubbing is never silently disabled
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::compile(names, PATTERN_SIZE_LIMIT)
    }

    fn compile<I, S>(names: I, size_limit: usize) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = names
            .into_iter()
            .map(|n| n.as_ref().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            return Ok(Self { pattern: None });
        }
        // Longest first so a name never leaves part of a longer one behind
        names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        names.dedup();

        let alternation = names
            .iter()
            .map(|n| regex::escape(n))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = RegexBuilder::new(&format!("(?:{})@?", alternation))
            .case_insensitive(true)
            .size_limit(size_limit)
            .build()
            .map_err(|e| GatewayError::Config(format!("recipient names: {}", e)))?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }

    pub fn scrub(&self, text: &str) -> String {
        match &self.pattern {
            Some(re) => re.replace_all(text, "").into_owned(),
            None => text.to_string(),
        }
    }
}
