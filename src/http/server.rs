//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create one Axum Router per listener, with its own upstream registry
//! - Wire up middleware (tracing, request ID)
//! - Dispatch upgrade requests to the socket relay and plain requests to
//!   the forwarder
//! - Serve every listener until the shutdown coordinator releases them
//!
//! # Design Decisions
//! - Several registrations share one listener; dispatch within a listener
//!   is longest-prefix first
//! - An upgrade request no socket registration matches is served as a
//!   plain request
//! - Listeners close last, after relay sessions have drained

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::{ConfigError, ListenerConfig, ProxyConfig, DEFAULT_LISTENER};
use crate::http::forward::Forwarder;
use crate::http::request::RequestContext;
use crate::http::websocket;
use crate::lifecycle::ShutdownCoordinator;
use crate::observability::metrics;
use crate::relay::{TargetDialer, TungsteniteDialer};
use crate::routing::registry::{ResolveError, RouteOptions, UpstreamRegistry};

/// Name of a physical listener.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(String);

impl ListenerId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new(DEFAULT_LISTENER)
    }
}

impl From<&str> for ListenerId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request dispatch for one listener.
pub struct ProxyFrontend {
    id: ListenerId,
    registry: UpstreamRegistry,
    coordinator: Arc<ShutdownCoordinator>,
    forwarder: Forwarder,
    dialer: Arc<dyn TargetDialer>,
}

impl ProxyFrontend {
    pub fn new(
        id: ListenerId,
        registry: UpstreamRegistry,
        coordinator: Arc<ShutdownCoordinator>,
        forwarder: Forwarder,
        dialer: Arc<dyn TargetDialer>,
    ) -> Self {
        Self {
            id,
            registry,
            coordinator,
            forwarder,
            dialer,
        }
    }

    pub fn id(&self) -> &ListenerId {
        &self.id
    }

    pub fn registry(&self) -> &UpstreamRegistry {
        &self.registry
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Outermost first: assign `x-request-id`, trace, echo the id on the response.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(self)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    async fn dispatch(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let remote = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let (parts, body) = request.into_parts();
        let ctx = RequestContext::from_parts(&parts, remote);
        let method = ctx.method.to_string();

        tracing::debug!(
            request_id = %ctx.request_id,
            listener = %self.id,
            method = %method,
            path = %ctx.path(),
            upgrade = ctx.is_upgrade(),
            "Proxying request"
        );

        if ctx.is_upgrade() {
            if self.coordinator.is_closing() {
                metrics::record_request(&method, 503, "none", start);
                return (StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down").into_response();
            }
            match self.registry.resolve_upgrade(&ctx) {
                Ok(resolution) => {
                    let upstream = resolution.route.name.clone();
                    let response =
                        websocket::upgrade(resolution, ctx, parts, Arc::clone(&self.dialer), &self.coordinator).await;
                    metrics::record_request(&method, response.status().as_u16(), &upstream, start);
                    return response;
                }
                Err(ResolveError::NotFound) => {}
                Err(err) => return self.reject(&ctx, &method, err, start),
            }
        }

        let resolution = match self.registry.resolve_http(&ctx) {
            Ok(resolution) => resolution,
            Err(err) => return self.reject(&ctx, &method, err, start),
        };
        let response = self
            .forwarder
            .forward(&resolution, &ctx, Request::from_parts(parts, body))
            .await;
        metrics::record_request(&method, response.status().as_u16(), &resolution.route.name, start);
        response
    }

    fn reject(&self, ctx: &RequestContext, method: &str, err: ResolveError, start: Instant) -> Response {
        let status = err.status();
        tracing::warn!(request_id = %ctx.request_id, path = %ctx.path(), error = %err, "Request not routed");
        metrics::record_request(method, status.as_u16(), "none", start);
        (status, err.to_string()).into_response()
    }
}

async fn proxy_handler(State(frontend): State<Arc<ProxyFrontend>>, request: Request<Body>) -> Response {
    frontend.dispatch(request).await
}

/// The proxy: registrations grouped by listener, served until shutdown.
pub struct ProxyServer {
    registries: BTreeMap<ListenerId, UpstreamRegistry>,
    coordinator: Arc<ShutdownCoordinator>,
    forwarder: Forwarder,
    dialer: Arc<dyn TargetDialer>,
}

impl ProxyServer {
    pub fn new(coordinator: Arc<ShutdownCoordinator>) -> Self {
        Self {
            registries: BTreeMap::new(),
            coordinator,
            forwarder: Forwarder::new(),
            dialer: Arc::new(TungsteniteDialer),
        }
    }

    /// Replace the target dialer used by every relay session.
    pub fn with_dialer(mut self, dialer: Arc<dyn TargetDialer>) -> Self {
        self.dialer = dialer;
        self
    }

    /// Register every upstream of a validated configuration.
    pub fn from_config(config: &ProxyConfig, coordinator: Arc<ShutdownCoordinator>) -> Result<Self, ConfigError> {
        let mut server = Self::new(coordinator);
        for listener in &config.listeners {
            server.registries.entry(ListenerId::new(&listener.name)).or_default();
        }
        for upstream in &config.upstreams {
            let id = ListenerId::new(&upstream.listener);
            if !server.registries.contains_key(&id) {
                return Err(ConfigError::UnknownListener(upstream.listener.clone()));
            }
            server.register(upstream.clone())?;
        }
        Ok(server)
    }

    /// Attach a registration to the listener it names.
    pub fn register(&mut self, options: impl Into<RouteOptions>) -> Result<&mut Self, ConfigError> {
        let options = options.into();
        let id = ListenerId::new(&options.config.listener);
        self.registries.entry(id).or_default().register(options)?;
        Ok(self)
    }

    pub fn coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.coordinator
    }

    /// Bind the configured listeners.
    pub async fn bind(listeners: &[ListenerConfig]) -> io::Result<Vec<(ListenerId, TcpListener)>> {
        let mut bound = Vec::with_capacity(listeners.len());
        for listener in listeners {
            let socket = TcpListener::bind(&listener.bind_address).await?;
            bound.push((ListenerId::new(&listener.name), socket));
        }
        Ok(bound)
    }

    /// Serve the given listeners until the coordinator releases them.
    pub async fn serve(mut self, listeners: Vec<(ListenerId, TcpListener)>) -> io::Result<()> {
        let mut tasks = JoinSet::new();

        for (id, listener) in listeners {
            let addr = listener.local_addr()?;
            let registry = self.registries.remove(&id).unwrap_or_default();
            tracing::info!(
                listener = %id,
                address = %addr,
                registrations = registry.len(),
                "HTTP server starting"
            );

            let frontend = Arc::new(ProxyFrontend::new(
                id.clone(),
                registry,
                Arc::clone(&self.coordinator),
                self.forwarder.clone(),
                Arc::clone(&self.dialer),
            ));
            let app = frontend.router().into_make_service_with_connect_info::<SocketAddr>();
            let coordinator = Arc::clone(&self.coordinator);
            tasks.spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { coordinator.listener_closed().await })
                    .await?;
                tracing::info!(listener = %id, "HTTP server stopped");
                Ok::<(), io::Error>(())
            });
        }

        for (id, registry) in &self.registries {
            if !registry.is_empty() {
                tracing::warn!(listener = %id, "Registrations attached to a listener that is not served");
            }
        }

        while let Some(joined) = tasks.join_next().await {
            joined.map_err(io::Error::other)??;
        }
        Ok(())
    }

    /// Bind the configured listeners and serve them.
    pub async fn run(self, config: &ProxyConfig) -> io::Result<()> {
        let listeners = Self::bind(&config.listeners).await?;
        self.serve(listeners).await
    }
}
