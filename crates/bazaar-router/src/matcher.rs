//! Route glob matching
//!
//! A pattern is literal text with zero or more `*` wildcards. The pattern is
//! anchored at both ends and each `*` matches any run of characters,
//! slashes included, so `/api/v1/hotels/*` matches
//! `/api/v1/hotels/42/rooms/7`.

use bazaar_core::{Error, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use tracing::warn;

/// Compiled form of a route glob
///
/// Compilation happens on first use. A pattern that fails to compile is
/// reported once and then never matches.
#[derive(Debug)]
pub struct PathPattern {
    /// Original pattern
    pattern: String,

    /// Compiled regex, `None` if compilation failed
    compiled: OnceCell<Option<Regex>>,
}

impl PathPattern {
    /// Wrap `pattern` without compiling it
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            compiled: OnceCell::new(),
        }
    }

    /// Original pattern text
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Number of `*` wildcards
    pub fn wildcard_count(&self) -> usize {
        self.pattern.matches('*').count()
    }

    /// Whether the whole `path` matches
    pub fn is_match(&self, path: &str) -> bool {
        match self.regex() {
            Some(re) => re.is_match(path),
            None => self.is_literal() && self.pattern == path,
        }
    }

    /// Match `path`, returning the text captured by each `*` in order
    pub fn captures(&self, path: &str) -> Option<Vec<String>> {
        if self.is_literal() {
            return (self.pattern == path).then(Vec::new);
        }

        let captures = self.regex()?.captures(path)?;
        Some(
            captures
                .iter()
                .skip(1)
                .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
                .collect(),
        )
    }

    /// Compile eagerly, reporting why the pattern is unusable
    pub fn compile(&self) -> Result<()> {
        if self.is_literal() {
            return Ok(());
        }
        Self::pattern_to_regex(&self.pattern)
            .map(|_| ())
            .map_err(|e| Error::InvalidPattern {
                pattern: self.pattern.clone(),
                reason: e.to_string(),
            })
    }

    fn is_literal(&self) -> bool {
        !self.pattern.contains('*')
    }

    fn regex(&self) -> Option<&Regex> {
        if self.is_literal() {
            return None;
        }

        self.compiled
            .get_or_init(|| match Self::pattern_to_regex(&self.pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(
                        pattern = %self.pattern,
                        error = %e,
                        "Route pattern failed to compile and will never match"
                    );
                    None
                }
            })
            .as_ref()
    }

    /// Convert a glob to an anchored regex
    fn pattern_to_regex(pattern: &str) -> std::result::Result<Regex, regex::Error> {
        let mut regex_str = String::with_capacity(pattern.len() + 8);
        regex_str.push('^');

        let mut literals = pattern.split('*').peekable();
        while let Some(literal) = literals.next() {
            regex_str.push_str(&regex::escape(literal));
            if literals.peek().is_some() {
                regex_str.push_str("(.*)");
            }
        }

        regex_str.push('$');
        Regex::new(&regex_str)
    }
}

impl Clone for PathPattern {
    fn clone(&self) -> Self {
        Self::new(self.pattern.clone())
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for PathPattern {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_wildcard_spans_segments() {
        let pattern = PathPattern::new("/api/v1/hotels/*");

        assert!(pattern.is_match("/api/v1/hotels/42"));
        assert!(pattern.is_match("/api/v1/hotels/42/rooms/7"));
        assert!(pattern.is_match("/api/v1/hotels/"));
        assert!(!pattern.is_match("/api/v1/hotel/42"));
        assert!(!pattern.is_match("/api/v2/hotels/42"));
        assert!(!pattern.is_match("/api/v1/hotels"));
    }

    #[test]
    fn test_literal_pattern_is_anchored() {
        let pattern = PathPattern::new("/api/v1/feed");

        assert!(pattern.is_match("/api/v1/feed"));
        assert!(!pattern.is_match("/api/v1/feed/"));
        assert!(!pattern.is_match("/prefix/api/v1/feed"));
        assert_eq!(pattern.captures("/api/v1/feed"), Some(vec![]));
    }

    #[test]
    fn test_inner_wildcards_capture_in_order() {
        let pattern = PathPattern::new("/api/*/orders/*");

        assert_eq!(
            pattern.captures("/api/v2/orders/9/items"),
            Some(vec!["v2".to_string(), "9/items".to_string()])
        );
        assert_eq!(pattern.captures("/api/v2/carts/9"), None);
        assert_eq!(pattern.wildcard_count(), 2);
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let pattern = PathPattern::new("/files/(v1)+.json/*");

        assert!(pattern.is_match("/files/(v1)+.json/a"));
        assert!(!pattern.is_match("/files/v1v1xjson/a"));
    }

    #[test]
    fn test_bare_wildcard_matches_everything() {
        let pattern = PathPattern::new("*");
        assert!(pattern.is_match(""));
        assert!(pattern.is_match("/anything/at/all"));
        assert!(pattern.compile().is_ok());
    }
}
