//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request as WsRequest, Response as WsResponse};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use relay_proxy::lifecycle::ShutdownCoordinator;
use relay_proxy::routing::RouteOptions;
use relay_proxy::ProxyServer;

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

/// An address nothing listens on.
pub fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// What the echo backend saw in a handshake.
#[derive(Debug)]
pub struct Handshake {
    pub uri: String,
    pub headers: HeaderMap,
}

impl Handshake {
    pub fn protocol(&self) -> Option<&str> {
        self.headers
            .get(header::SEC_WEBSOCKET_PROTOCOL)
            .and_then(|v| v.to_str().ok())
    }
}

/// Socket backend echoing text and binary frames.
///
/// Answers the text frame `close` with close code 4000. Stopping it drops
/// every open connection without a close frame.
pub struct EchoBackend {
    pub addr: SocketAddr,
    pub handshakes: mpsc::UnboundedReceiver<Handshake>,
    task: JoinHandle<()>,
}

impl EchoBackend {
    pub async fn start() -> Self {
        Self::start_on("127.0.0.1:0".parse().unwrap()).await
    }

    /// Start on a fixed address, e.g. to restart a stopped backend.
    pub async fn start_on(addr: SocketAddr) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, handshakes) = mpsc::unbounded_channel();

        let task = tokio::spawn(async move {
            let mut connections = JoinSet::new();
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                connections.spawn(async move {
                    let callback = move |request: &WsRequest, mut response: WsResponse| -> Result<WsResponse, ErrorResponse> {
                        let offered = request
                            .headers()
                            .get(header::SEC_WEBSOCKET_PROTOCOL)
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.split(',').next())
                            .map(|p| p.trim().to_string());
                        if let Some(protocol) = offered {
                            response
                                .headers_mut()
                                .insert(header::SEC_WEBSOCKET_PROTOCOL, protocol.parse().unwrap());
                        }
                        let _ = tx.send(Handshake {
                            uri: request.uri().to_string(),
                            headers: request.headers().clone(),
                        });
                        Ok(response)
                    };
                    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                        return;
                    };
                    while let Some(Ok(message)) = ws.next().await {
                        match message {
                            Message::Text(text) if text.as_str() == "close" => {
                                let _ = ws
                                    .close(Some(CloseFrame {
                                        code: CloseCode::from(4000),
                                        reason: "bye".into(),
                                    }))
                                    .await;
                                break;
                            }
                            Message::Text(_) | Message::Binary(_) => {
                                if ws.send(message).await.is_err() {
                                    break;
                                }
                            }
                            Message::Close(_) => break,
                            _ => {}
                        }
                    }
                });
            }
        });

        Self { addr, handshakes, task }
    }

    /// Drop the listener and every open connection.
    pub async fn stop(self) -> SocketAddr {
        self.task.abort();
        let _ = self.task.await;
        self.addr
    }

    pub async fn next_handshake(&mut self) -> Handshake {
        tokio::time::timeout(WAIT, self.handshakes.recv())
            .await
            .expect("no handshake")
            .expect("backend stopped")
    }
}

/// HTTP origin describing each request it receives as JSON.
///
/// Paths containing `redirect` answer 302 with `redirect` replaced by
/// `landing` in `Location`; paths containing `slow` wait two seconds.
pub async fn start_origin() -> SocketAddr {
    async fn describe(request: Request<Body>) -> Response {
        let (parts, body) = request.into_parts();
        let path = parts.uri.path().to_string();
        if path.contains("slow") {
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
        if path.contains("redirect") {
            return (StatusCode::FOUND, [(header::LOCATION, path.replace("redirect", "landing"))]).into_response();
        }
        let get = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
        Json(json!({
            "method": parts.method.as_str(),
            "path": path,
            "query": parts.uri.query(),
            "host": get("host"),
            "request_id": get("x-request-id"),
            "forwarded_by": get("x-forwarded-by"),
            "body": String::from_utf8_lossy(&body),
        }))
        .into_response()
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, Router::new().fallback(describe)).await.unwrap();
    });
    addr
}

/// A running proxy on an ephemeral port.
pub struct Proxy {
    pub addr: SocketAddr,
    pub coordinator: Arc<ShutdownCoordinator>,
    pub task: JoinHandle<std::io::Result<()>>,
}

impl Proxy {
    pub fn http(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

pub async fn start_proxy(routes: Vec<RouteOptions>) -> Proxy {
    start_proxy_with(routes, Duration::from_secs(5)).await
}

pub async fn start_proxy_with(routes: Vec<RouteOptions>, drain_timeout: Duration) -> Proxy {
    let coordinator = Arc::new(ShutdownCoordinator::new(drain_timeout));
    let mut server = ProxyServer::new(Arc::clone(&coordinator));
    for route in routes {
        server.register(route).unwrap();
    }
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(server.serve(vec![(Default::default(), listener)]));
    Proxy { addr, coordinator, task }
}

/// HTTP client that neither pools nor follows redirects.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

pub async fn connect(url: &str) -> Client {
    let (ws, _) = tokio_tungstenite::connect_async(url).await.expect("upgrade failed");
    ws
}

/// Next text frame, skipping control frames.
pub async fn recv_text(ws: &mut Client) -> String {
    tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text.as_str().to_string(),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => panic!("expected text frame, got {other:?}"),
            }
        }
    })
    .await
    .expect("no text frame")
}

/// Close code sent by the proxy, `None` if the connection just ended.
pub async fn recv_close(ws: &mut Client) -> Option<u16> {
    tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(Some(frame)))) => return Some(u16::from(frame.code)),
                Some(Ok(Message::Close(None))) => return Some(1005),
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return None,
            }
        }
    })
    .await
    .expect("connection not closed")
}
