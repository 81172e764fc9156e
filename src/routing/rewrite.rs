//! Prefix matching and path rewriting.
//!
//! # Responsibilities
//! - Compile a match prefix (possibly with `:name` segments) once at registration
//! - Capture named segments from a request path
//! - Replace the matched portion of the path with the rewrite prefix
//! - Rewrite `Location` headers back to the externally visible prefix
//!
//! # Design Decisions
//! - Pure functions, no I/O
//! - Matching is segment-boundary aware: `/pub` matches `/pub/x`, not `/public`
//! - A prefix ending in `/` only matches paths that continue past that slash
//! - The query string is split off before matching and re-encoded afterwards

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use url::Url;

/// Bytes left as-is when re-encoding query keys and values.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'!')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*');

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled match prefix such as `/api/:id/static`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixPattern {
    raw: String,
    segments: Vec<Segment>,
    trailing_slash: bool,
}

/// Result of matching a request path against a [`PrefixPattern`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixMatch {
    /// Number of bytes of the path covered by the prefix.
    pub matched: usize,
    /// Captured `:name` segments, in prefix order.
    pub params: Vec<(String, String)>,
}

impl PrefixPattern {
    /// Compile a prefix, normalising it to a canonical path form.
    ///
    /// Empty input and `/` both denote the root prefix.
    pub fn parse(prefix: &str) -> Self {
        let trailing_slash = prefix.len() > 1 && prefix.ends_with('/');
        let segments: Vec<Segment> = prefix
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix(':') {
                Some(name) if !name.is_empty() => Segment::Param(name.to_string()),
                _ => Segment::Literal(s.to_string()),
            })
            .collect();

        let mut raw = String::from("/");
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                raw.push('/');
            }
            match segment {
                Segment::Literal(s) => raw.push_str(s),
                Segment::Param(name) => {
                    raw.push(':');
                    raw.push_str(name);
                }
            }
        }
        let trailing_slash = trailing_slash && !segments.is_empty();
        if trailing_slash {
            raw.push('/');
        }

        Self {
            raw,
            segments,
            trailing_slash,
        }
    }

    /// Canonical textual form.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True for `/`, which matches every path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True if the prefix contains `:name` segments.
    pub fn has_params(&self) -> bool {
        self.segments.iter().any(|s| matches!(s, Segment::Param(_)))
    }

    /// True if the prefix was written with a trailing slash.
    pub fn ends_with_slash(&self) -> bool {
        self.trailing_slash
    }

    /// Match a path (without query string) against this prefix.
    pub fn match_path(&self, path: &str) -> Option<PrefixMatch> {
        if self.is_root() {
            return Some(PrefixMatch {
                matched: 0,
                params: Vec::new(),
            });
        }

        let mut matched = 0;
        let mut params = Vec::new();
        for segment in &self.segments {
            let rest = path[matched..].strip_prefix('/')?;
            let end = rest.find('/').unwrap_or(rest.len());
            let value = &rest[..end];
            match segment {
                Segment::Literal(literal) if literal == value => {}
                Segment::Param(name) if !value.is_empty() => {
                    params.push((name.clone(), value.to_string()));
                }
                _ => return None,
            }
            matched += 1 + end;
        }

        if self.trailing_slash {
            if !path[matched..].starts_with('/') {
                return None;
            }
            matched += 1;
        }

        Some(PrefixMatch { matched, params })
    }
}

impl std::fmt::Display for PrefixPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Split `path?query` into its parts. An empty query is dropped.
pub fn split_query(request_path: &str) -> (&str, Option<&str>) {
    match request_path.split_once('?') {
        Some((path, query)) if !query.is_empty() => (path, Some(query)),
        Some((path, _)) => (path, None),
        None => (request_path, None),
    }
}

/// Resolve the rewrite prefix for a registration.
///
/// Falls back to the upstream URL path. A trailing `/` is dropped when
/// the match prefix has none, so `/api` + `/a` does not become `/api2//a`.
pub fn effective_rewrite_prefix(
    prefix: &PrefixPattern,
    configured: Option<&str>,
    upstream: Option<&Url>,
) -> String {
    let mut rewrite_prefix = match (configured, upstream) {
        (Some(configured), _) => configured.to_string(),
        (None, Some(upstream)) => upstream.path().to_string(),
        (None, None) => "/".to_string(),
    };
    if !prefix.ends_with_slash() && rewrite_prefix.ends_with('/') {
        rewrite_prefix.pop();
    }
    rewrite_prefix
}

/// Substitute captured params into `:name` segments of a rewrite prefix.
pub fn substitute_params(rewrite_prefix: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return rewrite_prefix.to_string();
    }
    rewrite_prefix
        .split('/')
        .map(|segment| {
            segment
                .strip_prefix(':')
                .and_then(|name| params.iter().find(|(n, _)| n == name))
                .map(|(_, value)| value.as_str())
                .unwrap_or(segment)
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Compute the destination path and query for a request.
///
/// Returns `None` when the path does not match the prefix. An empty
/// destination becomes `/`.
pub fn rewrite(request_path: &str, prefix: &PrefixPattern, rewrite_prefix: &str) -> Option<String> {
    let (path, query) = split_query(request_path);
    let m = prefix.match_path(path)?;
    Some(rewrite_with_params(
        path,
        query,
        m.matched,
        rewrite_prefix,
        &m.params,
    ))
}

/// Lower-level form of [`rewrite`] for callers that already matched.
pub fn rewrite_with_params(
    path: &str,
    query: Option<&str>,
    matched: usize,
    rewrite_prefix: &str,
    params: &[(String, String)],
) -> String {
    let base = substitute_params(rewrite_prefix, params);
    let rest = &path[matched..];

    let mut dest = base;
    if dest.ends_with('/') && rest.starts_with('/') {
        dest.pop();
    }
    dest.push_str(rest);
    if dest.is_empty() {
        dest.push('/');
    }

    if let Some(query) = query {
        let encoded = reencode_query(query);
        if !encoded.is_empty() {
            dest.push('?');
            dest.push_str(&encoded);
        }
    }
    dest
}

/// Re-encode a query string, keeping parameter order and repeated keys.
///
/// Spaces (`%20` or `+`) are written as `%20`; `-._~!'()*` stay unescaped.
pub fn reencode_query(query: &str) -> String {
    let mut encoded = String::with_capacity(query.len());
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if !encoded.is_empty() {
            encoded.push('&');
        }
        encoded.extend(utf8_percent_encode(&key, QUERY_COMPONENT));
        encoded.push('=');
        encoded.extend(utf8_percent_encode(&value, QUERY_COMPONENT));
    }
    encoded
}

/// Rewrite an upstream `Location` header back to the external prefix.
///
/// `external` is the part of the request path the prefix matched.
/// Locations outside the rewrite prefix are returned unchanged.
pub fn rewrite_location(location: &str, rewrite_prefix: &str, external: &str) -> String {
    if rewrite_prefix.is_empty() {
        if location.starts_with('/') && !location.starts_with("//") {
            return format!("{}{}", external.trim_end_matches('/'), location);
        }
        return location.to_string();
    }
    match location.strip_prefix(rewrite_prefix) {
        Some(rest) => {
            let mut out = external.to_string();
            if out.ends_with('/') && rest.starts_with('/') {
                out.pop();
            }
            out.push_str(rest);
            if out.is_empty() {
                out.push('/');
            }
            out
        }
        None => location.to_string(),
    }
}
