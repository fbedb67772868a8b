//! Route matching logic.
//!
//! # Responsibilities
//! - Compile route path patterns (regex or `/**` prefix globs)
//! - Match request paths and extract named capture groups
//!
//! # Design Decisions
//! - Patterns are compiled once at startup and anchored at both ends
//! - A trailing `/**` is shorthand for "this prefix and anything below it",
//!   with the remainder captured as `segment`
//! - Path matching is case-sensitive

use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;

use crate::error::GatewayError;

/// Name of the capture group produced by `/**` globs.
pub const SEGMENT: &str = "segment";

/// Named capture groups extracted from a matched path.
pub type Segments = BTreeMap<String, String>;

/// A compiled path pattern.
#[derive(Clone)]
pub struct PathPattern {
    source: String,
    regex: Regex,
}

impl PathPattern {
    /// Compile a route pattern.
    pub fn compile(pattern: &str) -> Result<Self, GatewayError> {
        let expression = match pattern.strip_suffix("/**") {
            Some(prefix) => format!(
                "^{}(?:/(?P<{}>.*))?$",
                regex::escape(prefix),
                SEGMENT
            ),
            None => format!("^(?:{})$", strip_anchors(pattern)),
        };

        let regex = Regex::new(&expression).map_err(|e| {
            GatewayError::FilterConfig(format!("path pattern '{}' does not compile: {}", pattern, e))
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// The pattern as written in configuration.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns true if the path matches.
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// Match the path and return its named groups.
    /// Groups that did not participate in the match are omitted.
    pub fn captures(&self, path: &str) -> Option<Segments> {
        let caps = self.regex.captures(path)?;
        let segments = self
            .regex
            .capture_names()
            .flatten()
            .filter_map(|name| {
                caps.name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();
        Some(segments)
    }
}

/// Drop one leading `^` and one trailing unescaped `$`.
fn strip_anchors(pattern: &str) -> &str {
    let body = pattern.strip_prefix('^').unwrap_or(pattern);
    match body.strip_suffix('$') {
        Some(rest) => {
            let backslashes = rest.chars().rev().take_while(|&c| c == '\\').count();
            if backslashes % 2 == 0 {
                rest
            } else {
                body
            }
        }
        None => body,
    }
}

impl fmt::Debug for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PathPattern").field(&self.source).finish()
    }
}
