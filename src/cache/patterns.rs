//! Invalidation patterns for write requests.
//!
//! Patterns are glob strings over the key space produced by
//! [`CacheKeyBuilder`](super::CacheKeyBuilder). They are deliberately coarse: a
//! key removed without need only costs one extra miss, a key that survives a
//! write serves stale data until its TTL runs out.

use std::fmt;

use tracing::debug;

use super::keys::{KeySpace, RequestParts, path_segments, resource_id};

/// A Redis-style glob: `*` matches any run of characters, `?` a single one and
/// `\` escapes the character that follows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvalidationPattern(String);

impl InvalidationPattern {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, key: &str) -> bool {
        glob_match(&self.0, key)
    }
}

impl fmt::Display for InvalidationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives the patterns whose union covers every key a read of the touched
/// collection or resource could have produced.
#[derive(Debug, Clone, Default)]
pub struct InvalidationPatternBuilder {
    space: KeySpace,
}

impl InvalidationPatternBuilder {
    pub fn new(space: KeySpace) -> Self {
        Self { space }
    }

    /// Always yields the `version:resource:*` wildcard first, then the caller's
    /// scope, then the single-resource patterns, and finally the bare
    /// collection key (`version:resource`), which the leading wildcard cannot
    /// match because it carries no trailing separator.
    pub fn build_patterns(&self, request: &RequestParts<'_>) -> Vec<InvalidationPattern> {
        let segments = path_segments(request.path);
        let base = format!(
            "{}:{}",
            escape_glob(self.space.version(&segments)),
            escape_glob(&self.space.resource_type)
        );

        let mut patterns = vec![InvalidationPattern(format!("{base}:*"))];

        if let Some(scope) = request.scope {
            patterns.push(InvalidationPattern(format!(
                "{base}:{}:*",
                escape_glob(scope)
            )));
        }

        if let Some(id) = resource_id(&segments) {
            let id = escape_glob(id);
            patterns.push(InvalidationPattern(format!("{base}:*:{id}")));
            // Single-resource reads that carried allow-listed query parameters.
            patterns.push(InvalidationPattern(format!("{base}:*:{id}:*")));
        }

        patterns.push(InvalidationPattern(base));

        debug!(
            method = %request.method,
            path = request.path,
            patterns = ?patterns.iter().map(InvalidationPattern::as_str).collect::<Vec<_>>(),
            "derived invalidation patterns"
        );
        patterns
    }
}

/// Escapes glob metacharacters so request-derived text only matches literally.
pub fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Matches `text` against a glob supporting `*`, `?` and `\` escapes.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0usize, 0usize);
    // Position of the last `*` seen and the text index it is currently absorbing up to.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() {
            match pattern[p] {
                '*' => {
                    backtrack = Some((p, t));
                    p += 1;
                    continue;
                }
                '?' => {
                    p += 1;
                    t += 1;
                    continue;
                }
                '\\' if p + 1 < pattern.len() => {
                    if pattern[p + 1] == text[t] {
                        p += 2;
                        t += 1;
                        continue;
                    }
                }
                literal => {
                    if literal == text[t] {
                        p += 1;
                        t += 1;
                        continue;
                    }
                }
            }
        }

        match backtrack {
            Some((star, absorbed)) => {
                p = star + 1;
                t = absorbed + 1;
                backtrack = Some((star, absorbed + 1));
            }
            None => return false,
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
