//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Name of the listener used when a registration does not name one.
pub const DEFAULT_LISTENER: &str = "default";

/// Root configuration for the relay proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Physical listeners. Several registrations may share one listener.
    pub listeners: Vec<ListenerConfig>,

    /// Upstream registrations, in registration order.
    pub upstreams: Vec<UpstreamConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listeners: vec![ListenerConfig::default()],
            upstreams: Vec::new(),
            observability: ObservabilityConfig::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Listener identifier referenced by registrations.
    pub name: String,

    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_LISTENER.to_string(),
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// One upstream registration: prefix matching, rewriting and the
/// options for plain HTTP and socket traffic.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Registration identifier for logging/metrics.
    pub name: String,

    /// Listener this registration is attached to.
    pub listener: String,

    /// Base URL for plain and socket traffic. Empty when a dynamic
    /// resolver is supplied programmatically.
    pub upstream: String,

    /// Externally visible prefix. May contain `:name` segments.
    pub prefix: String,

    /// Internal prefix substituted when forwarding. Defaults to the
    /// upstream URL path.
    pub rewrite_prefix: Option<String>,

    /// Enable socket relaying for upgrade requests.
    pub websocket: bool,

    /// Optional socket-only upstream.
    pub ws_upstream: Option<String>,

    /// Methods served for plain HTTP requests.
    pub http_methods: Vec<String>,

    /// Route patterns, relative to the prefix.
    pub routes: Vec<String>,

    /// Host/header constraints for plain HTTP requests.
    pub constraints: ConstraintsConfig,

    /// Rewrite the response `Location` header back to the external prefix.
    pub internal_rewrite_location_header: bool,

    /// Forwarder settings.
    pub http: HttpForwardConfig,

    /// Outbound socket dial options.
    pub ws_client: WsClientConfig,

    /// Inbound socket accept options.
    pub ws_server: WsServerConfig,

    /// Reconnection policy. Absent means one-shot relaying.
    pub ws_reconnect: Option<ReconnectConfig>,

    /// Bound on frames held while the target is not yet open.
    pub max_pending_frames: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            listener: DEFAULT_LISTENER.to_string(),
            upstream: String::new(),
            prefix: String::new(),
            rewrite_prefix: None,
            websocket: false,
            ws_upstream: None,
            http_methods: default_http_methods(),
            routes: vec!["/".to_string(), "/*".to_string()],
            constraints: ConstraintsConfig::default(),
            internal_rewrite_location_header: true,
            http: HttpForwardConfig::default(),
            ws_client: WsClientConfig::default(),
            ws_server: WsServerConfig::default(),
            ws_reconnect: None,
            max_pending_frames: 1024,
        }
    }
}

/// Methods served when `http_methods` is not configured.
pub fn default_http_methods() -> Vec<String> {
    ["DELETE", "GET", "HEAD", "PATCH", "POST", "PUT", "OPTIONS"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}

/// Request constraints (AND semantics).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ConstraintsConfig {
    /// Host header to match (case-insensitive).
    pub host: Option<String>,

    /// Exact header values to match.
    pub headers: BTreeMap<String, String>,
}

/// Forwarder configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpForwardConfig {
    /// Upstream request timeout in milliseconds (0 = no timeout).
    pub timeout_ms: u64,

    /// Stream request bodies to the upstream. When false the body is read
    /// in full first so the pre-handler can inspect it.
    pub proxy_payloads: bool,
}

impl Default for HttpForwardConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            proxy_payloads: true,
        }
    }
}

/// Outbound socket dial options.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WsClientConfig {
    /// Extra headers sent with the target handshake.
    pub headers: BTreeMap<String, String>,

    /// Literal query string parameters replacing the request query.
    pub query_string: Option<BTreeMap<String, String>>,
}

/// Inbound socket accept options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WsServerConfig {
    /// Maximum message size accepted from clients, in bytes.
    pub max_message_size: usize,

    /// Maximum frame size accepted from clients, in bytes.
    pub max_frame_size: usize,
}

impl Default for WsServerConfig {
    fn default() -> Self {
        Self {
            max_message_size: 64 << 20,
            max_frame_size: 16 << 20,
        }
    }
}

/// Raw reconnection settings as written in the config file.
///
/// Numbers are kept signed/floating so that out-of-range values are
/// reported by validation rather than rejected by the parser.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub ping_interval_ms: Option<i64>,
    pub reconnect_interval_ms: Option<i64>,
    pub reconnect_decay: Option<f64>,
    pub max_reconnection_retries: Option<i64>,
    pub connection_timeout_ms: Option<i64>,
    pub reconnect_on_normal_close: Option<bool>,
    pub logs: Option<bool>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Maximum time to wait for relay sessions to close, in seconds.
    pub drain_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout_secs: 10,
        }
    }
}
