//! Path pattern compilation and matching.
//!
//! Patterns support literal segments, named `:param` segments and `*`
//! wildcards. A pattern is either relative (`/posts/:id`), matched against the
//! request path, or absolute (`https://api.example.com/posts/:id`), matched
//! against origin and path. Query strings never take part in matching.

use crate::error::HandlerError;
use crate::request::CanonicalRequest;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;
use url::Url;

/// Parameters captured from a matched path.
///
/// Named segments are keyed by name, wildcards by their position ("0", "1", ...).
pub type PathParams = HashMap<String, String>;

#[derive(Debug, Clone)]
enum Capture {
    Named(String),
    Wildcard(usize),
}

/// Compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    regex: Arc<Regex>,
    captures: Vec<Capture>,
    absolute: bool,
}

impl PathPattern {
    /// Compile a pattern.
    ///
    /// A query string or fragment in the pattern is dropped with a warning.
    pub fn compile(pattern: &str) -> Result<Self, HandlerError> {
        let trimmed = match pattern.find(|c| c == '?' || c == '#') {
            Some(index) => {
                warn!(
                    "Found a redundant usage of query parameters in the request handler URL for \"{}\". \
                     Query parameters are ignored when matching; inspect them in the resolver instead.",
                    pattern
                );
                &pattern[..index]
            }
            None => pattern,
        };

        let (origin, path) = split_origin(trimmed);
        let mut expression = String::from("^");
        let mut captures = Vec::new();
        let mut wildcards = 0;

        if let Some(origin) = origin {
            let origin = normalize_origin(origin);
            expression.push_str(&escape_with_wildcards(&origin, &mut captures, &mut wildcards));
        }

        let path = path.trim_matches('/');
        if !path.is_empty() {
            for segment in path.split('/') {
                expression.push('/');
                if let Some(name) = segment.strip_prefix(':') {
                    expression.push_str("([^/]+)");
                    captures.push(Capture::Named(name.to_string()));
                } else {
                    expression.push_str(&escape_with_wildcards(
                        segment,
                        &mut captures,
                        &mut wildcards,
                    ));
                }
            }
        }
        expression.push_str("/?$");

        let regex = Regex::new(&expression).map_err(|source| HandlerError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            source: trimmed.to_string(),
            regex: Arc::new(regex),
            captures,
            absolute: origin.is_some(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a request, returning the captured parameters.
    pub fn matches(&self, request: &CanonicalRequest) -> Option<PathParams> {
        let target = if self.absolute {
            request.public_url()
        } else {
            request.path().to_string()
        };
        self.matches_str(&target)
    }

    fn matches_str(&self, target: &str) -> Option<PathParams> {
        let found = self.regex.captures(target)?;
        let params = self
            .captures
            .iter()
            .enumerate()
            .filter_map(|(index, capture)| {
                let value = found.get(index + 1)?.as_str();
                let value = urlencoding::decode(value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.to_string());
                let key = match capture {
                    Capture::Named(name) => name.clone(),
                    Capture::Wildcard(position) => position.to_string(),
                };
                Some((key, value))
            })
            .collect();
        Some(params)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Split `scheme://authority` off an absolute pattern.
fn split_origin(pattern: &str) -> (Option<&str>, &str) {
    for scheme in ["http://", "https://"] {
        let has_scheme = pattern
            .get(..scheme.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme));
        if has_scheme {
            let rest = &pattern[scheme.len()..];
            let end = rest.find('/').map(|i| i + scheme.len()).unwrap_or(pattern.len());
            return (Some(&pattern[..end]), &pattern[end..]);
        }
    }
    (None, pattern)
}

/// Serialize an origin the way request URLs are: lowercase scheme and host,
/// no default port.
fn normalize_origin(origin: &str) -> String {
    if !origin.contains('*') {
        if let Ok(url) = Url::parse(origin) {
            return url.origin().ascii_serialization();
        }
    }
    let origin = origin.to_ascii_lowercase();
    let default_port = if origin.starts_with("https://") { ":443" } else { ":80" };
    match origin.strip_suffix(default_port) {
        Some(stripped) => stripped.to_string(),
        None => origin,
    }
}

/// Escape a literal, turning each `*` into a capturing wildcard.
fn escape_with_wildcards(
    literal: &str,
    captures: &mut Vec<Capture>,
    wildcards: &mut usize,
) -> String {
    let mut out = String::new();
    for (index, part) in literal.split('*').enumerate() {
        if index > 0 {
            out.push_str("(.*)");
            captures.push(Capture::Wildcard(*wildcards));
            *wildcards += 1;
        }
        out.push_str(&regex::escape(part));
    }
    out
}
