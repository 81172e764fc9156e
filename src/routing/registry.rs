//! Upstream registry.
//!
//! # Responsibilities
//! - Compile a registration (`RouteOptions`) into an immutable `UpstreamRoute`
//! - Keep routes ordered by descending prefix length (ties: registration order)
//! - Resolve a request to a route, a base URL and a rewritten destination
//!
//! # Design Decisions
//! - Linear scan; the ordering makes the first match the most specific one
//! - Dynamic resolvers are consulted per request and never cached
//! - Registration fails fast; nothing is validated lazily at request time

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use url::Url;

use crate::config::validation::check_url;
use crate::config::{ConfigError, UpstreamConfig};
use crate::http::request::RequestContext;
use crate::relay::{HookSet, ReconnectPolicy};
use crate::routing::matcher::{AndMatcher, Matcher, MethodMatcher, RouteSet};
use crate::routing::rewrite::{self, PrefixMatch, PrefixPattern};

/// Resolves the upstream base URL for a single request.
pub trait UpstreamResolver: Send + Sync {
    fn resolve(&self, ctx: &RequestContext) -> Option<Url>;
}

impl<F> UpstreamResolver for F
where
    F: Fn(&RequestContext) -> Option<Url> + Send + Sync,
{
    fn resolve(&self, ctx: &RequestContext) -> Option<Url> {
        self(ctx)
    }
}

/// Computes the dial query string from the original query.
pub type QueryStringFn = Arc<dyn Fn(Option<&str>, &RequestContext) -> Option<String> + Send + Sync>;

/// Rewrites the headers sent with the target handshake.
pub type HeaderRewriteFn = Arc<dyn Fn(HeaderMap, &RequestContext) -> HeaderMap + Send + Sync>;

/// Accepts or rejects an upgrade request before the handshake completes.
pub type VerifyClientFn = Arc<dyn Fn(&RequestContext) -> bool + Send + Sync>;

/// Rewrites a plain request URL (path and query) before prefix rewriting.
///
/// Receives the URL, the captured params (`*` holds the path after the
/// prefix) and the part of the path the prefix matched.
pub type PreRewriteFn = Arc<dyn Fn(&str, &[(String, String)], &str) -> String + Send + Sync>;

/// Runs before a plain request is forwarded. The body is only present when
/// payloads are buffered. `Err(status)` answers the request instead.
pub type PreHandlerFn = Arc<dyn Fn(&RequestContext, Option<&Bytes>) -> Result<(), StatusCode> + Send + Sync>;

/// Where plain and socket traffic of a route goes.
#[derive(Clone)]
pub enum UpstreamTarget {
    Static(Url),
    Dynamic(Arc<dyn UpstreamResolver>),
}

impl fmt::Debug for UpstreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamTarget::Static(url) => f.debug_tuple("Static").field(&url.as_str()).finish(),
            UpstreamTarget::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Dial query string: literal parameters or a per-request function.
#[derive(Clone)]
pub enum QueryString {
    Static(BTreeMap<String, String>),
    Dynamic(QueryStringFn),
}

impl QueryString {
    pub fn render(&self, original: Option<&str>, ctx: &RequestContext) -> Option<String> {
        match self {
            QueryString::Static(params) => Some(
                url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(params.iter())
                    .finish(),
            ),
            QueryString::Dynamic(f) => f(original, ctx),
        }
    }
}

/// Outbound dial options of a route.
#[derive(Clone, Default)]
pub struct WsClientSettings {
    pub headers: HeaderMap,
    pub query_string: Option<QueryString>,
    pub rewrite_headers: Option<HeaderRewriteFn>,
}

/// Inbound accept options of a route.
#[derive(Clone)]
pub struct WsServerSettings {
    pub max_message_size: usize,
    pub max_frame_size: usize,
    pub verify_client: Option<VerifyClientFn>,
}

/// Plain-request options of a route.
#[derive(Clone)]
pub struct HttpSettings {
    pub timeout: Option<Duration>,
    /// Stream the request body; when false it is buffered for the pre-handler.
    pub proxy_payloads: bool,
    pub rewrite_location: bool,
    pub pre_handler: Option<PreHandlerFn>,
    pub pre_rewrite: Option<PreRewriteFn>,
    pub rewrite_request_headers: Option<HeaderRewriteFn>,
    pub rewrite_response_headers: Option<HeaderRewriteFn>,
}

/// A registration: the TOML-expressible part plus options that need code.
#[derive(Clone)]
pub struct RouteOptions {
    pub config: UpstreamConfig,
    pub hooks: HookSet,
    pub resolver: Option<Arc<dyn UpstreamResolver>>,
    pub query_string: Option<QueryStringFn>,
    /// Handshake headers of socket dials.
    pub rewrite_request_headers: Option<HeaderRewriteFn>,
    pub verify_client: Option<VerifyClientFn>,
    pub pre_handler: Option<PreHandlerFn>,
    pub pre_rewrite: Option<PreRewriteFn>,
    /// Headers of forwarded plain requests.
    pub forward_request_headers: Option<HeaderRewriteFn>,
    /// Headers of responses to plain requests.
    pub forward_response_headers: Option<HeaderRewriteFn>,
}

impl RouteOptions {
    pub fn new(config: UpstreamConfig) -> Self {
        Self {
            config,
            hooks: HookSet::default(),
            resolver: None,
            query_string: None,
            rewrite_request_headers: None,
            verify_client: None,
            pre_handler: None,
            pre_rewrite: None,
            forward_request_headers: None,
            forward_response_headers: None,
        }
    }

    pub fn with_hooks(mut self, hooks: HookSet) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_resolver(mut self, resolver: impl UpstreamResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn with_query_string<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&str>, &RequestContext) -> Option<String> + Send + Sync + 'static,
    {
        self.query_string = Some(Arc::new(f));
        self
    }

    pub fn with_header_rewrite<F>(mut self, f: F) -> Self
    where
        F: Fn(HeaderMap, &RequestContext) -> HeaderMap + Send + Sync + 'static,
    {
        self.rewrite_request_headers = Some(Arc::new(f));
        self
    }

    pub fn with_verify_client<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext) -> bool + Send + Sync + 'static,
    {
        self.verify_client = Some(Arc::new(f));
        self
    }

    pub fn with_pre_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&RequestContext, Option<&Bytes>) -> Result<(), StatusCode> + Send + Sync + 'static,
    {
        self.pre_handler = Some(Arc::new(f));
        self
    }

    pub fn with_pre_rewrite<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &[(String, String)], &str) -> String + Send + Sync + 'static,
    {
        self.pre_rewrite = Some(Arc::new(f));
        self
    }

    pub fn with_forward_request_headers<F>(mut self, f: F) -> Self
    where
        F: Fn(HeaderMap, &RequestContext) -> HeaderMap + Send + Sync + 'static,
    {
        self.forward_request_headers = Some(Arc::new(f));
        self
    }

    pub fn with_forward_response_headers<F>(mut self, f: F) -> Self
    where
        F: Fn(HeaderMap, &RequestContext) -> HeaderMap + Send + Sync + 'static,
    {
        self.forward_response_headers = Some(Arc::new(f));
        self
    }
}

impl From<UpstreamConfig> for RouteOptions {
    fn from(config: UpstreamConfig) -> Self {
        Self::new(config)
    }
}

/// A compiled, immutable registration.
pub struct UpstreamRoute {
    pub name: String,
    pub prefix: PrefixPattern,
    pub rewrite_prefix: String,
    /// `None` only for socket-only registrations configured with `ws_upstream`.
    pub target: Option<UpstreamTarget>,
    pub websocket: bool,
    pub ws_upstream: Option<Url>,
    pub http: HttpSettings,
    pub ws_client: WsClientSettings,
    pub ws_server: WsServerSettings,
    pub reconnect: Option<ReconnectPolicy>,
    pub hooks: HookSet,
    pub max_pending_frames: usize,
    methods: MethodMatcher,
    routes: RouteSet,
    constraints: AndMatcher,
}

impl fmt::Debug for UpstreamRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamRoute")
            .field("name", &self.name)
            .field("prefix", &self.prefix.as_str())
            .field("rewrite_prefix", &self.rewrite_prefix)
            .field("target", &self.target)
            .field("websocket", &self.websocket)
            .finish_non_exhaustive()
    }
}

impl UpstreamRoute {
    /// Compile a registration. Fails if no upstream can ever be determined.
    pub fn compile(options: RouteOptions) -> Result<Self, ConfigError> {
        let RouteOptions {
            config,
            hooks,
            resolver,
            query_string,
            rewrite_request_headers,
            verify_client,
            pre_handler,
            pre_rewrite,
            forward_request_headers,
            forward_response_headers,
        } = options;

        let ws_upstream = match config.ws_upstream.as_deref() {
            Some(raw) if !raw.is_empty() => Some(parse_url("ws_upstream", raw)?),
            _ => None,
        };

        let target = match (resolver, config.upstream.as_str()) {
            (Some(resolver), _) => Some(UpstreamTarget::Dynamic(resolver)),
            (None, raw) if !raw.is_empty() => Some(UpstreamTarget::Static(parse_url("upstream", raw)?)),
            (None, _) if config.websocket && ws_upstream.is_some() => None,
            (None, _) => return Err(ConfigError::MissingUpstream(config.name.clone())),
        };

        let prefix = PrefixPattern::parse(&config.prefix);
        let static_url = match &target {
            Some(UpstreamTarget::Static(url)) => Some(url),
            _ => None,
        };
        let rewrite_prefix =
            rewrite::effective_rewrite_prefix(&prefix, config.rewrite_prefix.as_deref(), static_url);

        let reconnect = config
            .ws_reconnect
            .as_ref()
            .map(ReconnectPolicy::from_config)
            .transpose()?;

        let query_string = match (query_string, &config.ws_client.query_string) {
            (Some(f), _) => Some(QueryString::Dynamic(f)),
            (None, Some(params)) => Some(QueryString::Static(params.clone())),
            (None, None) => None,
        };

        Ok(Self {
            methods: MethodMatcher::new(&config.http_methods)?,
            routes: RouteSet::new(&config.routes),
            constraints: AndMatcher::from_constraints(&config.constraints)?,
            ws_client: WsClientSettings {
                headers: header_map(&config.ws_client.headers)?,
                query_string,
                rewrite_headers: rewrite_request_headers,
            },
            ws_server: WsServerSettings {
                max_message_size: config.ws_server.max_message_size,
                max_frame_size: config.ws_server.max_frame_size,
                verify_client,
            },
            http: HttpSettings {
                timeout: (config.http.timeout_ms > 0).then(|| Duration::from_millis(config.http.timeout_ms)),
                proxy_payloads: config.http.proxy_payloads,
                rewrite_location: config.internal_rewrite_location_header,
                pre_handler,
                pre_rewrite,
                rewrite_request_headers: forward_request_headers,
                rewrite_response_headers: forward_response_headers,
            },
            name: config.name,
            prefix,
            rewrite_prefix,
            target,
            websocket: config.websocket,
            ws_upstream,
            reconnect,
            hooks,
            max_pending_frames: config.max_pending_frames.max(1),
        })
    }

    /// Plain-request filter: method, route patterns and constraints.
    fn serves_http(&self, ctx: &RequestContext, rest: &str) -> bool {
        self.target.is_some()
            && self.methods.matches(ctx)
            && self.routes.matches(rest)
            && self.constraints.matches(ctx)
    }
}

fn parse_url(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
    check_url(raw).map_err(|reason| ConfigError::InvalidUrl { field, reason })
}

fn header_map(headers: &BTreeMap<String, String>) -> Result<HeaderMap, ConfigError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ConfigError::InvalidRoute(format!("ws_client header `{name}`: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ConfigError::InvalidRoute(format!("ws_client header `{name}`: {e}")))?;
        map.insert(header, value);
    }
    Ok(map)
}

/// Why a request could not be mapped to an upstream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no registration matches the request")]
    NotFound,
    #[error("resolver of `{0}` returned no upstream")]
    NoUpstream(String),
}

impl ResolveError {
    pub fn status(&self) -> StatusCode {
        match self {
            ResolveError::NotFound => StatusCode::NOT_FOUND,
            ResolveError::NoUpstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// The routing decision for one request.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub route: Arc<UpstreamRoute>,
    /// Base URL for this request. `None` for socket-only registrations.
    pub base: Option<Url>,
    /// Rewritten path, always starting with `/`.
    pub path: String,
    /// Re-encoded query string, if any.
    pub query: Option<String>,
    /// Part of the request path the prefix covered.
    pub external_prefix: String,
    /// Rewrite prefix with captured params substituted.
    pub internal_prefix: String,
}

impl Resolution {
    /// Path and query as sent upstream.
    pub fn destination(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }
}

/// Ordered collection of upstream routes for one listener.
#[derive(Debug, Default)]
pub struct UpstreamRegistry {
    routes: Vec<Arc<UpstreamRoute>>,
}

impl UpstreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and insert a registration, keeping the longest prefixes first.
    pub fn register(&mut self, options: impl Into<RouteOptions>) -> Result<(), ConfigError> {
        let route = UpstreamRoute::compile(options.into())?;
        tracing::debug!(
            name = %route.name,
            prefix = %route.prefix,
            rewrite_prefix = %route.rewrite_prefix,
            websocket = route.websocket,
            "Registered upstream"
        );
        self.routes.push(Arc::new(route));
        // Stable: equal lengths keep registration order.
        self.routes
            .sort_by(|a, b| b.prefix.as_str().len().cmp(&a.prefix.as_str().len()));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn routes(&self) -> impl Iterator<Item = &Arc<UpstreamRoute>> {
        self.routes.iter()
    }

    /// First route whose prefix matches the path (query string ignored).
    pub fn resolve(&self, request_path: &str) -> Option<&Arc<UpstreamRoute>> {
        let (path, _) = rewrite::split_query(request_path);
        self.routes
            .iter()
            .find(|route| route.prefix.match_path(path).is_some())
    }

    /// Resolve an upgrade request among socket-enabled routes.
    pub fn resolve_upgrade(&self, ctx: &RequestContext) -> Result<Resolution, ResolveError> {
        self.resolve_with(ctx, false, |route, _| route.websocket)
    }

    /// Resolve a plain request, applying method, route and constraint
    /// filters and the route's pre-rewrite function.
    pub fn resolve_http(&self, ctx: &RequestContext) -> Result<Resolution, ResolveError> {
        self.resolve_with(ctx, true, |route, rest| route.serves_http(ctx, rest))
    }

    fn resolve_with<F>(&self, ctx: &RequestContext, plain: bool, accepts: F) -> Result<Resolution, ResolveError>
    where
        F: Fn(&UpstreamRoute, &str) -> bool,
    {
        let path = ctx.path();
        for route in &self.routes {
            let Some(m) = route.prefix.match_path(path) else {
                continue;
            };
            if !accepts(route, &path[m.matched..]) {
                continue;
            }

            let base = match &route.target {
                Some(UpstreamTarget::Static(url)) => Some(url.clone()),
                Some(UpstreamTarget::Dynamic(resolver)) => Some(
                    resolver
                        .resolve(ctx)
                        .ok_or_else(|| ResolveError::NoUpstream(route.name.clone()))?,
                ),
                None => None,
            };

            let internal_prefix = rewrite::substitute_params(&route.rewrite_prefix, &m.params);
            let destination = match (&route.http.pre_rewrite, plain) {
                (Some(pre_rewrite), true) => pre_rewritten(route, pre_rewrite, ctx, &m),
                _ => rewrite::rewrite_with_params(path, ctx.query(), m.matched, &route.rewrite_prefix, &m.params),
            };
            let (dest_path, dest_query) = rewrite::split_query(&destination);

            return Ok(Resolution {
                route: Arc::clone(route),
                base,
                path: dest_path.to_string(),
                query: dest_query.map(str::to_string),
                external_prefix: path[..m.matched].to_string(),
                internal_prefix,
            });
        }
        Err(ResolveError::NotFound)
    }
}

/// Destination of a plain request whose URL goes through `pre_rewrite` first.
/// A URL the prefix no longer matches is sent as returned.
fn pre_rewritten(route: &UpstreamRoute, pre_rewrite: &PreRewriteFn, ctx: &RequestContext, m: &PrefixMatch) -> String {
    let path = ctx.path();
    let url = match ctx.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    };
    let mut params = m.params.clone();
    params.push(("*".to_string(), path[m.matched..].trim_start_matches('/').to_string()));

    let url = pre_rewrite(&url, &params, &path[..m.matched]);
    rewrite::rewrite(&url, &route.prefix, &route.rewrite_prefix).unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn upstream(prefix: &str, upstream: &str) -> UpstreamConfig {
        UpstreamConfig {
            name: prefix.to_string(),
            prefix: prefix.to_string(),
            upstream: upstream.to_string(),
            ..UpstreamConfig::default()
        }
    }

    fn ctx(method: &str, uri: &str) -> RequestContext {
        let (parts, _) = Request::builder()
            .method(method)
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts();
        RequestContext::from_parts(&parts, None)
    }

    #[test]
    fn longest_prefix_wins() {
        let mut registry = UpstreamRegistry::new();
        registry.register(upstream("/A", "http://127.0.0.1:1")).unwrap();
        registry.register(upstream("/A/B", "http://127.0.0.1:2")).unwrap();
        registry.register(upstream("", "http://127.0.0.1:3")).unwrap();

        assert_eq!(registry.resolve("/A/B/x").unwrap().name, "/A/B");
        assert_eq!(registry.resolve("/A/x?q=1").unwrap().name, "/A");
        assert_eq!(registry.resolve("/other").unwrap().name, "");
        assert_eq!(registry.resolve("/AB").unwrap().name, "");
    }

    #[test]
    fn equal_lengths_keep_registration_order() {
        let mut registry = UpstreamRegistry::new();
        let mut first = upstream("/:a", "http://127.0.0.1:1");
        first.name = "first".into();
        let mut second = upstream("/:b", "http://127.0.0.1:2");
        second.name = "second".into();
        registry.register(first).unwrap();
        registry.register(second).unwrap();

        assert_eq!(registry.resolve("/x").unwrap().name, "first");
    }

    #[test]
    fn missing_upstream_fails_registration() {
        let mut registry = UpstreamRegistry::new();
        let err = registry.register(upstream("/api", "")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingUpstream(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn invalid_policy_fails_registration() {
        let mut config = upstream("/api", "http://127.0.0.1:1");
        config.ws_reconnect = Some(crate::config::ReconnectConfig {
            max_reconnection_retries: Some(0),
            ..Default::default()
        });
        let err = UpstreamRoute::compile(config.into()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPolicy { .. }));
    }

    #[test]
    fn resolves_destination_and_prefixes() {
        let mut registry = UpstreamRegistry::new();
        let mut config = upstream("/api/:id", "http://127.0.0.1:3000");
        config.rewrite_prefix = Some("/variable-api/:id".into());
        registry.register(config).unwrap();

        let resolution = registry
            .resolve_http(&ctx("GET", "/api/123/endpoint?foo=bar&abc=qux"))
            .unwrap();
        assert_eq!(resolution.path, "/variable-api/123/endpoint");
        assert_eq!(resolution.query.as_deref(), Some("foo=bar&abc=qux"));
        assert_eq!(resolution.external_prefix, "/api/123");
        assert_eq!(resolution.internal_prefix, "/variable-api/123");
        assert_eq!(
            resolution.destination(),
            "/variable-api/123/endpoint?foo=bar&abc=qux"
        );
    }

    #[test]
    fn dynamic_resolver_is_consulted_per_request() {
        let mut registry = UpstreamRegistry::new();
        let options = RouteOptions::new(upstream("/dyn", "")).with_resolver(|ctx: &RequestContext| {
            ctx.headers
                .get("x-backend")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| Url::parse(v).ok())
        });
        registry.register(options).unwrap();

        let mut request = ctx("GET", "/dyn/a");
        assert_eq!(
            registry.resolve_http(&request).unwrap_err(),
            ResolveError::NoUpstream("/dyn".into())
        );

        request
            .headers
            .insert("x-backend", HeaderValue::from_static("http://127.0.0.1:4000"));
        let resolution = registry.resolve_http(&request).unwrap();
        assert_eq!(resolution.base.unwrap().as_str(), "http://127.0.0.1:4000/");
        assert_eq!(resolution.path, "/a");
    }

    #[test]
    fn plain_filters_apply() {
        let mut registry = UpstreamRegistry::new();
        let mut config = upstream("/api", "http://127.0.0.1:3000");
        config.routes = vec!["/a".into()];
        config.http_methods = vec!["POST".into()];
        registry.register(config).unwrap();

        assert!(registry.resolve_http(&ctx("POST", "/api/a")).is_ok());
        assert_eq!(
            registry.resolve_http(&ctx("GET", "/api/a")).unwrap_err(),
            ResolveError::NotFound
        );
        assert_eq!(
            registry.resolve_http(&ctx("POST", "/api/b")).unwrap_err(),
            ResolveError::NotFound
        );
    }

    #[test]
    fn pre_rewrite_runs_before_prefix_rewrite() {
        let mut registry = UpstreamRegistry::new();
        let mut config = upstream("/api", "http://127.0.0.1:3000");
        config.rewrite_prefix = Some("/api2/".into());
        config.websocket = true;
        let options = RouteOptions::new(config).with_pre_rewrite(|url, params, prefix| {
            assert_eq!(prefix, "/api");
            assert!(params.contains(&("*".to_string(), "abc".to_string())));
            url.replace("abc", "a")
        });
        registry.register(options).unwrap();

        let resolution = registry.resolve_http(&ctx("GET", "/api/abc?x=1")).unwrap();
        assert_eq!(resolution.destination(), "/api2/a?x=1");
        // Socket dials keep the plain prefix rewrite.
        let resolution = registry.resolve_upgrade(&ctx("GET", "/api/abc")).unwrap();
        assert_eq!(resolution.path, "/api2/abc");
    }

    #[test]
    fn upgrades_only_match_socket_routes() {
        let mut registry = UpstreamRegistry::new();
        registry.register(upstream("/plain", "http://127.0.0.1:1")).unwrap();
        let mut ws_only = upstream("/ws", "");
        ws_only.websocket = true;
        ws_only.ws_upstream = Some("ws://127.0.0.1:2".into());
        registry.register(ws_only).unwrap();

        assert!(registry.resolve_upgrade(&ctx("GET", "/plain")).is_err());
        let resolution = registry.resolve_upgrade(&ctx("GET", "/ws/chat")).unwrap();
        assert!(resolution.base.is_none());
        assert_eq!(resolution.path, "/chat");
        // Socket-only registrations never serve plain requests.
        assert!(registry.resolve_http(&ctx("GET", "/ws/chat")).is_err());
    }
}
