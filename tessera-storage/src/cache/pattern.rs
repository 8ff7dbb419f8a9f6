//! Glob patterns for bulk cache deletion.
//!
//! `*` matches any run of characters and `?` a single character. Patterns
//! must end with `*`; the literal text before the first wildcard is the scan
//! prefix backends can use to narrow the candidate keys.

use regex::Regex;
use tessera_core::{CacheError, CacheResult};

/// A validated delete pattern.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    raw: String,
    prefix: String,
    regex: Regex,
}

impl KeyPattern {
    pub fn parse(pattern: &str) -> CacheResult<Self> {
        if !pattern.ends_with('*') {
            return Err(CacheError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "pattern must end with a '*' wildcard".to_string(),
            });
        }

        let prefix: String = pattern
            .chars()
            .take_while(|c| *c != '*' && *c != '?')
            .collect();

        let mut source = String::with_capacity(pattern.len() + 8);
        source.push('^');
        for c in pattern.chars() {
            match c {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                other => source.push_str(&regex::escape(&other.to_string())),
            }
        }
        source.push('$');

        let regex = Regex::new(&source).map_err(|e| CacheError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            raw: pattern.to_string(),
            prefix,
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Literal prefix every matching key starts with.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// True when the pattern is `<literal>*` and a prefix scan alone decides a match.
    pub fn is_prefix_only(&self) -> bool {
        self.raw.len() == self.prefix.len() + 1
    }

    pub fn matches(&self, key: &str) -> bool {
        key.starts_with(&self.prefix) && self.regex.is_match(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_wildcard_required() {
        let err = KeyPattern::parse("repo:payments:list").unwrap_err();
        assert!(matches!(err, CacheError::InvalidPattern { .. }));
    }

    #[test]
    fn test_prefix_pattern() {
        let p = KeyPattern::parse("repo:payments:list:*").unwrap();
        assert_eq!(p.prefix(), "repo:payments:list:");
        assert!(p.is_prefix_only());
        assert!(p.matches("repo:payments:list:all"));
        assert!(p.matches("repo:payments:list:status=paid:page=1:size=20"));
        assert!(!p.matches("repo:payments:count:all"));
        assert!(!p.matches("repo:invoices:list:all"));
    }

    #[test]
    fn test_inner_wildcards() {
        let p = KeyPattern::parse("repo:*:count:*").unwrap();
        assert!(!p.is_prefix_only());
        assert!(p.matches("repo:payments:count:all"));
        assert!(p.matches("repo:invoices:count:status=open"));
        assert!(!p.matches("repo:invoices:list:all"));

        let q = KeyPattern::parse("repo:payments:id:id=?*").unwrap();
        assert!(q.matches("repo:payments:id:id=1"));
        assert!(!q.matches("repo:payments:id:id="));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let p = KeyPattern::parse("repo:a.b:(x)*").unwrap();
        assert!(p.matches("repo:a.b:(x)list"));
        assert!(!p.matches("repo:aXb:(x)list"));
    }
}
