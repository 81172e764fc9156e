//! Request handling and transformation.
//!
//! # Responsibilities
//! - Extract routing-relevant information (host, path, query, upgrade)
//! - Hand resolvers and hooks a read-only view of the request
//!
//! # Design Decisions
//! - `x-request-id` is assigned and echoed by the router's tower-http
//!   layers; a request that bypassed them still gets a fresh UUID here
//! - `RequestContext` is built once per request and shared by reference

use std::net::SocketAddr;

use axum::http::{header, request::Parts, HeaderMap, Method, Uri};
use uuid::Uuid;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Upgrade details of a socket handshake request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeInfo {
    /// Subprotocols offered by the client, in order.
    pub protocols: Vec<String>,
}

/// Read-only view of an incoming request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub remote_addr: Option<SocketAddr>,
    /// Present for socket upgrade requests.
    pub upgrade: Option<UpgradeInfo>,
}

impl RequestContext {
    pub fn from_parts(parts: &Parts, remote_addr: Option<SocketAddr>) -> Self {
        let request_id = parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            request_id,
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            upgrade: upgrade_info(&parts.headers),
            headers: parts.headers.clone(),
            remote_addr,
        }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Host header, falling back to the URI authority.
    pub fn host(&self) -> Option<&str> {
        self.headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| self.uri.host())
    }

    pub fn is_upgrade(&self) -> bool {
        self.upgrade.is_some()
    }

    /// First subprotocol offered by the client.
    pub fn requested_protocol(&self) -> Option<&str> {
        self.upgrade
            .as_ref()
            .and_then(|u| u.protocols.first())
            .map(String::as_str)
    }
}

fn upgrade_info(headers: &HeaderMap) -> Option<UpgradeInfo> {
    let wants_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    let is_websocket = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"));
    if !(wants_upgrade && is_websocket) {
        return None;
    }

    let protocols = headers
        .get_all(header::SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    Some(UpgradeInfo { protocols })
}
