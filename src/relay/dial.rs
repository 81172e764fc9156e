//! Target connection dialing.

use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use futures_util::future::BoxFuture;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use url::Url;

use super::{BoxSocket, WsError};
use crate::resilience::timeouts;

/// Headers owned by the handshake itself; never copied from options.
const HANDSHAKE_HEADERS: [header::HeaderName; 6] = [
    header::HOST,
    header::CONNECTION,
    header::UPGRADE,
    header::SEC_WEBSOCKET_KEY,
    header::SEC_WEBSOCKET_VERSION,
    header::SEC_WEBSOCKET_EXTENSIONS,
];

/// Everything needed to (re)open the target of a session.
#[derive(Debug, Clone)]
pub struct DialParams {
    pub url: Url,
    pub headers: HeaderMap,
    /// The client's first requested subprotocol, forwarded alone.
    pub protocol: Option<String>,
}

impl DialParams {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: HeaderMap::new(),
            protocol: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DialError {
    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("unexpected server response: {0}")]
    UnexpectedResponse(StatusCode),

    #[error("connection timed out after {0} ms")]
    Timeout(u64),

    #[error("invalid dial request: {0}")]
    InvalidRequest(String),
}

impl From<WsError> for DialError {
    fn from(err: WsError) -> Self {
        match err {
            WsError::Http(response) => DialError::UnexpectedResponse(response.status()),
            other => DialError::Handshake(other.to_string()),
        }
    }
}

/// Opens target connections. The seam between the relay and the network.
pub trait TargetDialer: Send + Sync {
    fn dial(&self, params: &DialParams) -> BoxFuture<'static, Result<BoxSocket, DialError>>;
}

/// Dials real targets with tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteDialer;

impl TargetDialer for TungsteniteDialer {
    fn dial(&self, params: &DialParams) -> BoxFuture<'static, Result<BoxSocket, DialError>> {
        let request = build_request(params);
        Box::pin(async move {
            let (stream, response) = tokio_tungstenite::connect_async(request?).await?;
            tracing::trace!(status = %response.status(), "Target handshake complete");
            Ok::<BoxSocket, DialError>(Box::new(stream))
        })
    }
}

/// Dial with an optional bound; expiry is reported as [`DialError::Timeout`].
pub async fn dial_with_timeout(
    dialer: &dyn TargetDialer,
    params: &DialParams,
    limit: Option<Duration>,
) -> Result<BoxSocket, DialError> {
    timeouts::with_deadline(limit, dialer.dial(params))
        .await
        .map_err(|_| DialError::Timeout(timeouts::as_millis(limit)))?
}

fn build_request(
    params: &DialParams,
) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request, DialError> {
    let mut request = params
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| DialError::InvalidRequest(e.to_string()))?;

    let headers = request.headers_mut();
    for (name, value) in &params.headers {
        if !HANDSHAKE_HEADERS.contains(name) {
            headers.insert(name.clone(), value.clone());
        }
    }
    if let Some(protocol) = &params.protocol {
        let value = HeaderValue::from_str(protocol)
            .map_err(|e| DialError::InvalidRequest(format!("subprotocol `{protocol}`: {e}")))?;
        headers.insert(header::SEC_WEBSOCKET_PROTOCOL, value);
    }
    Ok(request)
}
