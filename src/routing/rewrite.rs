//! Path rewriting.
//!
//! A rewrite filter runs its own regex over the inbound path and replaces
//! every match with a template. Templates refer to capture groups with
//! `${name}`, `$name`, `${index}` or `$index`, and `$$` is a literal `$`.
//! Every reference is checked against the regex when the route table is
//! built.

use std::borrow::Cow;

use regex::Regex;

use crate::error::GatewayError;

/// A compiled `RewritePath` filter.
#[derive(Debug, Clone)]
pub struct RewritePath {
    from: Regex,
    to_template: String,
}

impl RewritePath {
    /// Compile the filter, rejecting templates that reference unknown groups.
    pub fn new(from_pattern: &str, to_template: &str) -> Result<Self, GatewayError> {
        let from = Regex::new(from_pattern).map_err(|e| {
            GatewayError::FilterConfig(format!(
                "rewrite pattern '{}' does not compile: {}",
                from_pattern, e
            ))
        })?;

        for reference in template_references(to_template) {
            let known = match reference.parse::<usize>() {
                Ok(index) => index < from.captures_len(),
                Err(_) => from.capture_names().flatten().any(|n| n == reference),
            };
            if !known {
                return Err(GatewayError::FilterConfig(format!(
                    "rewrite template '{}' references undefined group '{}'",
                    to_template, reference
                )));
            }
        }

        Ok(Self {
            from,
            to_template: to_template.to_string(),
        })
    }

    /// Rewrite a path. Paths the regex does not match are returned as-is.
    pub fn apply<'a>(&self, path: &'a str) -> Cow<'a, str> {
        self.from.replace_all(path, self.to_template.as_str())
    }

}

/// Group references in a template, read with the same rules `regex` uses
/// when expanding it: `$$` is an escape, `${...}` runs to the closing brace,
/// and a bare `$` takes the longest run of `[A-Za-z0-9_]`. A `$` that starts
/// none of these is literal.
fn template_references(template: &str) -> Vec<&str> {
    let mut refs = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('$') {
        let after = &rest[start + 1..];
        if let Some(tail) = after.strip_prefix('$') {
            rest = tail;
        } else if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => {
                    refs.push(&braced[..end]);
                    rest = &braced[end + 1..];
                }
                None => rest = braced,
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            if end > 0 {
                refs.push(&after[..end]);
            }
            rest = &after[end..];
        }
    }
    refs
}
