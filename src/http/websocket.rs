//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Build the target URL and dial options of an upgrade request
//! - Verify the client, then complete the upgrade handshake with it
//! - Register the session with the shutdown coordinator and run the relay
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Proxy ←──── WebSocket frames ────→ Backend
//!
//! upgrade request → verify_client → target_url + dial_params
//!                 → WebSocketUpgrade (client handshake)
//!                 → RelaySession::run (one task per client)
//! ```
//!
//! # Design Decisions
//! - WebSocket handled separately from HTTP request/response
//! - The client's first offered subprotocol is accepted and forwarded alone
//! - Sessions are tracked before the handshake completes, so a shutdown
//!   racing the upgrade either refuses it (503) or closes it with 1001

use std::sync::Arc;

use axum::extract::{FromRequestParts, WebSocketUpgrade};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use url::Url;

use crate::http::request::RequestContext;
use crate::lifecycle::ShutdownCoordinator;
use crate::relay::{frame, DialParams, RelaySession, TargetDialer};
use crate::routing::registry::Resolution;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TargetUrlError {
    #[error("registration `{0}` has no socket upstream")]
    NoUpstream(String),

    #[error("cannot dial `{0}` as a socket upstream")]
    UnsupportedScheme(String),
}

/// Target URL for an upgrade request.
///
/// A `ws_upstream` with a root path keeps the rewritten request path; any
/// other `ws_upstream` path is used as is. Otherwise the rewritten path is
/// applied to the resolved base, with `http` dialed as `ws` and `https` as `wss`.
pub fn target_url(resolution: &Resolution, ctx: &RequestContext) -> Result<Url, TargetUrlError> {
    let route = &resolution.route;
    let mut url = match (&route.ws_upstream, &resolution.base) {
        (Some(ws), _) => {
            let mut url = ws.clone();
            if url.path() == "/" {
                url.set_path(&resolution.path);
            }
            url
        }
        (None, Some(base)) => {
            let mut url = base.clone();
            url.set_path(&resolution.path);
            url
        }
        (None, None) => return Err(TargetUrlError::NoUpstream(route.name.clone())),
    };

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(TargetUrlError::UnsupportedScheme(other.to_string())),
    };
    if url.scheme() != scheme && url.set_scheme(scheme).is_err() {
        return Err(TargetUrlError::UnsupportedScheme(url.scheme().to_string()));
    }

    let query = match &route.ws_client.query_string {
        Some(query_string) => query_string.render(ctx.query(), ctx),
        None => resolution.query.clone(),
    };
    url.set_query(query.as_deref().filter(|q| !q.is_empty()));
    url.set_fragment(None);
    Ok(url)
}

/// Dial options: configured headers, passed through the rewrite function.
pub fn dial_params(resolution: &Resolution, ctx: &RequestContext, url: Url) -> DialParams {
    let client = &resolution.route.ws_client;
    let headers: HeaderMap = match &client.rewrite_headers {
        Some(rewrite) => rewrite(client.headers.clone(), ctx),
        None => client.headers.clone(),
    };
    DialParams {
        url,
        headers,
        protocol: ctx.requested_protocol().map(str::to_string),
    }
}

/// Accept an upgrade request and relay it to its target.
pub async fn upgrade(
    resolution: Resolution,
    ctx: RequestContext,
    mut parts: Parts,
    dialer: Arc<dyn TargetDialer>,
    coordinator: &Arc<ShutdownCoordinator>,
) -> Response {
    let route = Arc::clone(&resolution.route);

    if let Some(verify) = &route.ws_server.verify_client {
        if !verify(&ctx) {
            tracing::debug!(request_id = %ctx.request_id, upstream = %route.name, "Client rejected by verify_client");
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    }

    let url = match target_url(&resolution, &ctx) {
        Ok(url) => url,
        Err(err) => {
            tracing::warn!(request_id = %ctx.request_id, error = %err, "Cannot build target URL");
            return (StatusCode::BAD_GATEWAY, err.to_string()).into_response();
        }
    };
    let params = dial_params(&resolution, &ctx, url);

    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let Some(guard) = coordinator.track(params.url.as_str()) else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down").into_response();
    };

    let mut ws = ws
        .max_message_size(route.ws_server.max_message_size)
        .max_frame_size(route.ws_server.max_frame_size);
    if let Some(protocol) = params.protocol.clone() {
        ws = ws.protocols([protocol]);
    }

    tracing::debug!(
        request_id = %ctx.request_id,
        session_id = %guard.id(),
        upstream = %route.name,
        target = %params.url,
        "Accepting socket upgrade"
    );

    let shutdown = coordinator.signal();
    ws.on_upgrade(move |socket| async move {
        let session = RelaySession::new(
            guard.id(),
            frame::source_socket(socket),
            params,
            dialer,
            route.reconnect.clone(),
            route.hooks.clone(),
            route.max_pending_frames,
            shutdown,
        );
        session.run().await;
        drop(guard);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use axum::http::{HeaderValue, Request};

    use crate::config::UpstreamConfig;
    use crate::routing::registry::{RouteOptions, UpstreamRegistry};

    fn ctx(uri: &str) -> RequestContext {
        let (parts, _) = Request::builder()
            .uri(uri)
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .header("sec-websocket-protocol", "chat, superchat")
            .body(())
            .unwrap()
            .into_parts();
        RequestContext::from_parts(&parts, None)
    }

    fn resolve(options: RouteOptions, uri: &str) -> (Resolution, RequestContext) {
        let mut registry = UpstreamRegistry::new();
        registry.register(options).unwrap();
        let ctx = ctx(uri);
        (registry.resolve_upgrade(&ctx).unwrap(), ctx)
    }

    fn socket_route(prefix: &str, upstream: &str) -> UpstreamConfig {
        UpstreamConfig {
            prefix: prefix.into(),
            upstream: upstream.into(),
            websocket: true,
            ..UpstreamConfig::default()
        }
    }

    #[test]
    fn converts_http_schemes() {
        let (resolution, ctx) = resolve(socket_route("/api", "http://127.0.0.1:3000").into(), "/api/chat?a=1");
        let url = target_url(&resolution, &ctx).unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:3000/chat?a=1");

        let (resolution, ctx) = resolve(socket_route("/", "https://backend.local/base").into(), "/x");
        let url = target_url(&resolution, &ctx).unwrap();
        assert_eq!(url.as_str(), "wss://backend.local/base/x");
    }

    #[test]
    fn ws_upstream_root_keeps_request_path() {
        let mut config = socket_route("/ws", "");
        config.ws_upstream = Some("ws://127.0.0.1:4000".into());
        let (resolution, ctx) = resolve(config.into(), "/ws/room/1");
        assert_eq!(target_url(&resolution, &ctx).unwrap().as_str(), "ws://127.0.0.1:4000/room/1");

        let mut config = socket_route("/ws", "");
        config.ws_upstream = Some("ws://127.0.0.1:4000/fixed".into());
        let (resolution, ctx) = resolve(config.into(), "/ws/room/1");
        assert_eq!(target_url(&resolution, &ctx).unwrap().as_str(), "ws://127.0.0.1:4000/fixed");
    }

    #[test]
    fn literal_query_string_replaces_request_query() {
        let mut config = socket_route("/", "http://127.0.0.1:3000");
        config.ws_client.query_string = Some(BTreeMap::from([("token".to_string(), "a b".to_string())]));
        let (resolution, ctx) = resolve(config.into(), "/socket?ignored=1");
        assert_eq!(
            target_url(&resolution, &ctx).unwrap().as_str(),
            "ws://127.0.0.1:3000/socket?token=a+b"
        );
    }

    #[test]
    fn query_string_function_sees_original_query() {
        let options = RouteOptions::new(socket_route("/", "http://127.0.0.1:3000"))
            .with_query_string(|original, _ctx| original.map(|q| format!("{q}&proxied=1")));
        let (resolution, ctx) = resolve(options, "/socket?x=1");
        assert_eq!(
            target_url(&resolution, &ctx).unwrap().as_str(),
            "ws://127.0.0.1:3000/socket?x=1&proxied=1"
        );
    }

    #[test]
    fn dial_params_apply_header_rewrite_and_first_protocol() {
        let mut config = socket_route("/", "http://127.0.0.1:3000");
        config.ws_client.headers = BTreeMap::from([("x-static".to_string(), "1".to_string())]);
        let options = RouteOptions::new(config).with_header_rewrite(|mut headers, ctx| {
            headers.insert("x-request-id", HeaderValue::from_str(&ctx.request_id).unwrap());
            headers
        });
        let (resolution, ctx) = resolve(options, "/");
        let url = target_url(&resolution, &ctx).unwrap();
        let params = dial_params(&resolution, &ctx, url);

        assert_eq!(params.headers["x-static"], "1");
        assert_eq!(params.headers["x-request-id"], ctx.request_id.as_str());
        assert_eq!(params.protocol.as_deref(), Some("chat"));
    }
}
