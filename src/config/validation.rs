//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (registrations reference existing listeners)
//! - Validate URLs, methods, route patterns and reconnection policies
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::Method;
use url::Url;

use crate::config::schema::{ProxyConfig, UpstreamConfig};
use crate::relay::ReconnectPolicy;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human readable description.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut listener_names = HashSet::new();

    for (i, listener) in config.listeners.iter().enumerate() {
        if !listener_names.insert(listener.name.as_str()) {
            errors.push(ValidationError::new(
                format!("listeners[{i}].name"),
                format!("duplicate listener `{}`", listener.name),
            ));
        }
        if listener.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                format!("listeners[{i}].bind_address"),
                format!("`{}` is not a socket address", listener.bind_address),
            ));
        }
    }

    for (i, upstream) in config.upstreams.iter().enumerate() {
        if !listener_names.contains(upstream.listener.as_str()) {
            errors.push(ValidationError::new(
                format!("upstreams[{i}].listener"),
                format!("unknown listener `{}`", upstream.listener),
            ));
        }
        validate_upstream(i, upstream, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_upstream(i: usize, upstream: &UpstreamConfig, errors: &mut Vec<ValidationError>) {
    let field = |name: &str| format!("upstreams[{i}].{name}");

    let ws_upstream = upstream.ws_upstream.as_deref().unwrap_or("");
    if upstream.upstream.is_empty() && ws_upstream.is_empty() {
        errors.push(ValidationError::new(field("upstream"), "upstream must be specified"));
    }
    if !upstream.upstream.is_empty() {
        if let Err(reason) = check_url(&upstream.upstream) {
            errors.push(ValidationError::new(field("upstream"), reason));
        }
    }
    if !ws_upstream.is_empty() {
        if let Err(reason) = check_url(ws_upstream) {
            errors.push(ValidationError::new(field("ws_upstream"), reason));
        }
    }

    if !upstream.prefix.is_empty() && !upstream.prefix.starts_with('/') {
        errors.push(ValidationError::new(field("prefix"), "prefix must start with `/`"));
    }

    for method in &upstream.http_methods {
        if Method::from_bytes(method.to_ascii_uppercase().as_bytes()).is_err() {
            errors.push(ValidationError::new(
                field("http_methods"),
                format!("`{method}` is not an HTTP method"),
            ));
        }
    }

    for route in &upstream.routes {
        if !route.starts_with('/') {
            errors.push(ValidationError::new(
                field("routes"),
                format!("route `{route}` must start with `/`"),
            ));
        }
    }

    if let Some(reconnect) = &upstream.ws_reconnect {
        if let Err(err) = ReconnectPolicy::from_config(reconnect) {
            errors.push(ValidationError::new(field("ws_reconnect"), err.to_string()));
        }
    }

    if upstream.max_pending_frames == 0 {
        errors.push(ValidationError::new(
            field("max_pending_frames"),
            "must be greater than zero",
        ));
    }
}

/// Accepts http, https, ws and wss URLs with a host.
pub(crate) fn check_url(value: &str) -> Result<Url, String> {
    let url = Url::parse(value).map_err(|e| format!("`{value}` is not a URL: {e}"))?;
    match url.scheme() {
        "http" | "https" | "ws" | "wss" => {}
        other => return Err(format!("unsupported scheme `{other}`")),
    }
    if url.host_str().is_none() {
        return Err(format!("`{value}` has no host"));
    }
    Ok(url)
}
