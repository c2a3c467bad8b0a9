use regex::Regex;

use crate::error::{Error, Result};

/// The places we have seen Superset's login form put its CSRF token.
/// Tried in this order; the first match wins.
pub const DEFAULT_PATTERNS: &[&str] = &[
    r#"name="csrf_token" type="hidden" value="([^"]+)""#,
    r#"name="csrf_token" value="([^"]+)""#,
    r#"(?i)<input[^>]*name=["']csrf_token["'][^>]*value=["']([^"']+)["']"#,
    r#"(?i)csrf_token["\s]*[=:]["\s]*["']([^"']+)["']"#,
];

/// An ordered list of patterns for scraping a CSRF token out of HTML.
/// Each pattern must capture the token in its first group.
#[derive(Debug, Clone)]
pub struct CsrfPatterns {
    patterns: Vec<Regex>,
}

impl CsrfPatterns {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Regex::new(pattern)
                    .map_err(|error| Error::Config(format!("bad CSRF pattern {pattern:?}: {error}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Returns the token found by the highest-priority matching pattern.
    pub fn extract<'a>(&self, html: &'a str) -> Option<&'a str> {
        self.patterns
            .iter()
            .find_map(|pattern| pattern.captures(html)?.get(1))
            .map(|token| token.as_str())
    }
}

impl Default for CsrfPatterns {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERNS).expect("built-in CSRF patterns should compile")
    }
}
