//! Plain HTTP forwarding.
//!
//! # Responsibilities
//! - Send a resolved plain request to its upstream and stream the response back
//! - Strip hop-by-hop headers in both directions
//! - Set `Host` to the upstream authority and propagate `x-request-id`
//! - Rewrite the response `Location` header back to the external prefix
//! - Run the registration's pre-handler and header rewrite functions
//!
//! # Design Decisions
//! - One pooled hyper-util client shared by every registration
//! - Bodies are streamed unless the registration turns `proxy_payloads` off
//! - Timeout → 504, unreachable upstream → 503, oversized buffered body → 413

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::http::request::{RequestContext, X_REQUEST_ID};
use crate::resilience::timeouts;
use crate::routing::registry::Resolution;
use crate::routing::rewrite;

/// Headers that apply to a single connection and are never forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Largest request body read when payloads are buffered.
const BUFFERED_BODY_LIMIT: usize = 16 << 20;

/// Forwards plain requests to upstreams.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
}

impl Default for Forwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl Forwarder {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }

    /// Forward `request` as decided by `resolution`.
    pub async fn forward(&self, resolution: &Resolution, ctx: &RequestContext, request: Request<Body>) -> Response {
        let route = &resolution.route;
        let Some(base) = &resolution.base else {
            return (StatusCode::BAD_GATEWAY, "No upstream for plain requests").into_response();
        };

        let (url, uri) = match upstream_uri(base, resolution) {
            Ok(pair) => pair,
            Err(reason) => {
                tracing::warn!(request_id = %ctx.request_id, upstream = %route.name, error = %reason, "Invalid upstream URI");
                return (StatusCode::BAD_GATEWAY, "Invalid upstream URI").into_response();
            }
        };

        let (mut parts, body) = request.into_parts();
        let http = &route.http;
        let (body, buffered) = if http.proxy_payloads {
            (body, None)
        } else {
            match axum::body::to_bytes(body, BUFFERED_BODY_LIMIT).await {
                Ok(bytes) => (Body::from(bytes.clone()), Some(bytes)),
                Err(err) => {
                    tracing::warn!(request_id = %ctx.request_id, upstream = %route.name, error = %err, "Request body not read");
                    return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
                }
            }
        };
        if let Some(pre_handler) = &http.pre_handler {
            if let Err(status) = pre_handler(ctx, buffered.as_ref()) {
                tracing::debug!(request_id = %ctx.request_id, upstream = %route.name, status = %status, "Pre-handler answered request");
                return status.into_response();
            }
        }

        parts.uri = uri;
        strip_hop_by_hop(&mut parts.headers);
        if let Some(host) = authority(&url).and_then(|a| HeaderValue::from_str(&a).ok()) {
            parts.headers.insert(header::HOST, host);
        }
        if let Ok(id) = HeaderValue::from_str(&ctx.request_id) {
            parts.headers.insert(X_REQUEST_ID, id);
        }
        if let Some(rewrite_headers) = &http.rewrite_request_headers {
            parts.headers = rewrite_headers(std::mem::take(&mut parts.headers), ctx);
        }

        tracing::debug!(
            request_id = %ctx.request_id,
            upstream = %route.name,
            destination = %url,
            "Forwarding request"
        );

        let request = Request::from_parts(parts, body);
        let response = match timeouts::with_deadline(http.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                tracing::error!(request_id = %ctx.request_id, upstream = %route.name, error = %err, "Upstream error");
                return (StatusCode::SERVICE_UNAVAILABLE, "Upstream unavailable").into_response();
            }
            Err(_) => {
                tracing::warn!(
                    request_id = %ctx.request_id,
                    upstream = %route.name,
                    timeout_ms = timeouts::as_millis(http.timeout),
                    "Upstream request timed out"
                );
                return (StatusCode::GATEWAY_TIMEOUT, "Upstream timed out").into_response();
            }
        };

        finish(response, resolution, ctx)
    }
}

/// Turn an upstream response into the client response.
fn finish(response: hyper::Response<Incoming>, resolution: &Resolution, ctx: &RequestContext) -> Response {
    let (mut parts, body) = response.into_parts();
    let http = &resolution.route.http;
    strip_hop_by_hop(&mut parts.headers);
    if http.rewrite_location {
        rewrite_location_header(&mut parts.headers, resolution);
    }
    if let Some(rewrite_headers) = &http.rewrite_response_headers {
        parts.headers = rewrite_headers(std::mem::take(&mut parts.headers), ctx);
    }
    Response::from_parts(parts, Body::new(body))
}

fn upstream_uri(base: &Url, resolution: &Resolution) -> Result<(Url, Uri), String> {
    let mut url = base.clone();
    url.set_path(&resolution.path);
    url.set_query(resolution.query.as_deref());
    url.set_fragment(None);
    let uri = url.as_str().parse::<Uri>().map_err(|e| e.to_string())?;
    Ok((url, uri))
}

fn authority(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Remove hop-by-hop headers, including those the `Connection` header names.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

fn rewrite_location_header(headers: &mut HeaderMap, resolution: &Resolution) {
    let Some(location) = headers.get(header::LOCATION).and_then(|v| v.to_str().ok()) else {
        return;
    };
    let rewritten = rewrite::rewrite_location(location, &resolution.internal_prefix, &resolution.external_prefix);
    if rewritten != location {
        if let Ok(value) = HeaderValue::from_str(&rewritten) {
            headers.insert(header::LOCATION, value);
        }
    }
}
