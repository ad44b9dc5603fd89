//! Glob patterns with Redis `KEYS`/`SCAN MATCH` semantics.

use regex::Regex;

use crate::error::{CacheError, Result};

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    regex: Regex,
}

impl GlobPattern {
    /// Compiles `*`, `?`, `[abc]`, `[^a]`, `[a-z]` and `\x` escapes.
    pub fn new(pattern: &str) -> Result<Self> {
        let mut out = String::with_capacity(pattern.len() * 2 + 6);
        // Keys may hold newlines; wildcards must still cover them
        out.push_str("(?s)^");

        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' => out.push_str(".*"),
                '?' => out.push('.'),
                '\\' => match chars.next() {
                    Some(escaped) => out.push_str(&regex::escape(&escaped.to_string())),
                    None => out.push_str(r"\\"),
                },
                '[' => {
                    out.push('[');
                    if chars.peek() == Some(&'^') {
                        chars.next();
                        out.push('^');
                    }
                    let mut closed = false;
                    for inner in chars.by_ref() {
                        if inner == ']' {
                            closed = true;
                            break;
                        }
                        match inner {
                            '-' => out.push('-'),
                            other => out.push_str(&regex::escape(&other.to_string())),
                        }
                    }
                    if !closed {
                        return Err(CacheError::InvalidArgument(format!(
                            "unterminated character class in pattern '{}'",
                            pattern
                        )));
                    }
                    out.push(']');
                }
                other => out.push_str(&regex::escape(&other.to_string())),
            }
        }
        out.push('$');

        let regex = Regex::new(&out)
            .map_err(|e| CacheError::InvalidArgument(format!("bad pattern '{}': {}", pattern, e)))?;
        Ok(Self { regex })
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}
