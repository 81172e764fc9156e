//! Request constraint matching.
//!
//! # Responsibilities
//! - Match host header (exact match, case-insensitive)
//! - Match exact header values
//! - Match request method against the registration's method list
//! - Match the path remainder (after the prefix) against route patterns
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Host matching is case-insensitive (RFC 9110)
//! - Path matching is case-sensitive
//! - Empty condition = always matches (wildcard)
//! - No regex to guarantee O(n) matching

use axum::http::{HeaderName, HeaderValue, Method};

use crate::config::ConstraintsConfig;
use crate::config::ConfigError;
use crate::http::request::RequestContext;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, ctx: &RequestContext) -> bool;
}

/// Matches the Host header.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    /// Create a new host matcher.
    /// The host is normalized to lowercase for case-insensitive matching.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            expected_host: host.into().to_lowercase(),
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, ctx: &RequestContext) -> bool {
        let Some(host) = ctx.host() else {
            return false;
        };
        let host = host.to_lowercase();
        if host == self.expected_host {
            return true;
        }
        // Configured without a port: compare against the bare hostname.
        !self.expected_host.contains(':')
            && host
                .rsplit_once(':')
                .map(|(name, _)| name == self.expected_host)
                .unwrap_or(false)
    }
}

/// Matches an exact header value.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    name: HeaderName,
    value: HeaderValue,
}

impl HeaderMatcher {
    pub fn new(name: &str, value: &str) -> Result<Self, ConfigError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ConfigError::InvalidRoute(format!("header constraint `{name}`: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ConfigError::InvalidRoute(format!("header constraint `{name}`: {e}")))?;
        Ok(Self { name, value })
    }
}

impl Matcher for HeaderMatcher {
    fn matches(&self, ctx: &RequestContext) -> bool {
        ctx.headers.get(&self.name) == Some(&self.value)
    }
}

/// Matches the request method.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    methods: Vec<Method>,
}

impl MethodMatcher {
    pub fn new<S: AsRef<str>>(methods: &[S]) -> Result<Self, ConfigError> {
        let methods = methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.as_ref().to_ascii_uppercase().as_bytes()).map_err(|_| {
                    ConfigError::InvalidRoute(format!("`{}` is not an HTTP method", m.as_ref()))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { methods })
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, ctx: &RequestContext) -> bool {
        self.methods.contains(&ctx.method)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug, Default)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    /// Build the constraint set of a registration.
    pub fn from_constraints(config: &ConstraintsConfig) -> Result<Self, ConfigError> {
        let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
        if let Some(host) = &config.host {
            matchers.push(Box::new(HostMatcher::new(host.as_str())));
        }
        for (name, value) in &config.headers {
            matchers.push(Box::new(HeaderMatcher::new(name, value)?));
        }
        Ok(Self { matchers })
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, ctx: &RequestContext) -> bool {
        // All matchers must pass (AND)
        self.matchers.iter().all(|m| m.matches(ctx))
    }
}

/// A route pattern relative to the registration prefix: `/`, `/a`, `/*`, `/a/*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePattern {
    Exact(String),
    Wildcard(String),
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(base) => RoutePattern::Wildcard(base.to_string()),
            None => RoutePattern::Exact(pattern.to_string()),
        }
    }

    /// `rest` is the path remainder after the prefix, always starting with `/`.
    pub fn matches(&self, rest: &str) -> bool {
        match self {
            RoutePattern::Exact(path) => rest == path,
            RoutePattern::Wildcard(base) => rest.starts_with(base.as_str()),
        }
    }
}

/// The set of route patterns a registration serves for plain HTTP.
#[derive(Debug, Clone)]
pub struct RouteSet {
    patterns: Vec<RoutePattern>,
}

impl RouteSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            patterns: patterns.iter().map(|p| RoutePattern::parse(p.as_ref())).collect(),
        }
    }

    /// Check the part of the path that follows the matched prefix.
    pub fn matches(&self, rest: &str) -> bool {
        let rest = if rest.starts_with('/') {
            rest.to_string()
        } else {
            format!("/{rest}")
        };
        self.patterns.iter().any(|p| p.matches(&rest))
    }
}

impl Default for RouteSet {
    fn default() -> Self {
        Self::new(&["/", "/*"])
    }
}
