//! Plain HTTP forwarding through the proxy.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::http::{HeaderValue, StatusCode};
use serde_json::{json, Value};

use relay_proxy::config::{ConstraintsConfig, UpstreamConfig};
use relay_proxy::routing::RouteOptions;

mod common;

fn route(prefix: &str, origin: SocketAddr) -> UpstreamConfig {
    UpstreamConfig {
        name: "origin".into(),
        prefix: prefix.into(),
        upstream: format!("http://{origin}"),
        ..UpstreamConfig::default()
    }
}

async fn get_json(url: &str) -> Value {
    let response = common::http_client().get(url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response.json().await.unwrap()
}

#[tokio::test]
async fn test_rewrites_prefix_and_keeps_query() {
    let origin = common::start_origin().await;
    let mut config = route("/api", origin);
    config.rewrite_prefix = Some("/internal".into());
    let proxy = common::start_proxy(vec![config.into()]).await;

    let body = get_json(&proxy.http("/api/users?foo=bar&abc=qux")).await;
    assert_eq!(body["path"], "/internal/users");
    assert_eq!(body["query"], "foo=bar&abc=qux");
    assert_eq!(body["host"], origin.to_string());
}

#[tokio::test]
async fn test_prefix_params_substitute_into_rewrite() {
    let origin = common::start_origin().await;
    let mut config = route("/api/:id", origin);
    config.rewrite_prefix = Some("/variable-api/:id".into());
    let proxy = common::start_proxy(vec![config.into()]).await;

    let body = get_json(&proxy.http("/api/123/endpoint")).await;
    assert_eq!(body["path"], "/variable-api/123/endpoint");
}

#[tokio::test]
async fn test_request_id_is_propagated_and_echoed() {
    let origin = common::start_origin().await;
    let proxy = common::start_proxy(vec![route("/", origin).into()]).await;

    let response = common::http_client()
        .get(proxy.http("/x"))
        .header("x-request-id", "req-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-1");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["request_id"], "req-1");

    let body = get_json(&proxy.http("/y")).await;
    assert!(body["request_id"].is_string());
}

#[tokio::test]
async fn test_location_is_rewritten_to_external_prefix() {
    let origin = common::start_origin().await;
    let mut config = route("/api", origin);
    config.rewrite_prefix = Some("/internal".into());
    let mut raw = route("/raw", origin);
    raw.name = "raw".into();
    raw.rewrite_prefix = Some("/internal".into());
    raw.internal_rewrite_location_header = false;
    let proxy = common::start_proxy(vec![config.into(), raw.into()]).await;

    let client = common::http_client();
    let response = client.get(proxy.http("/api/redirect")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()["location"], "/api/landing");

    let response = client.get(proxy.http("/raw/redirect")).send().await.unwrap();
    assert_eq!(response.headers()["location"], "/internal/landing");
}

#[tokio::test]
async fn test_routes_and_methods_filter_requests() {
    let origin = common::start_origin().await;
    let mut config = route("/api", origin);
    config.routes = vec!["/a".into()];
    config.http_methods = vec!["POST".into()];
    let proxy = common::start_proxy(vec![config.into()]).await;

    let client = common::http_client();
    let response = client.post(proxy.http("/api/a")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client.get(proxy.http("/api/a")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client.post(proxy.http("/api/b")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_constraints_require_host_and_headers() {
    let origin = common::start_origin().await;
    let mut config = route("/", origin);
    config.constraints = ConstraintsConfig {
        host: Some("example.com".into()),
        headers: BTreeMap::from([("x-tenant".to_string(), "a".to_string())]),
    };
    let proxy = common::start_proxy(vec![config.into()]).await;

    let client = common::http_client();
    let response = client
        .get(proxy.http("/"))
        .header("host", "example.com")
        .header("x-tenant", "a")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client
        .get(proxy.http("/"))
        .header("host", "example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = client.get(proxy.http("/")).header("x-tenant", "a").send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let origin = common::start_origin().await;
    let mut config = route("/", origin);
    config.http.timeout_ms = 200;
    let proxy = common::start_proxy(vec![config.into()]).await;

    let response = common::http_client().get(proxy.http("/slow")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_unreachable_upstream_is_unavailable() {
    let proxy = common::start_proxy(vec![route("/", common::free_addr()).into()]).await;

    let response = common::http_client().get(proxy.http("/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_unmatched_prefix_is_not_found() {
    let origin = common::start_origin().await;
    let proxy = common::start_proxy(vec![route("/api", origin).into()]).await;

    let response = common::http_client().get(proxy.http("/apix")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_header_rewrites_apply_both_ways() {
    let origin = common::start_origin().await;
    let options = RouteOptions::new(route("/api", origin))
        .with_forward_request_headers(|mut headers, _| {
            headers.insert("x-forwarded-by", HeaderValue::from_static("relay-proxy"));
            headers
        })
        .with_forward_response_headers(|mut headers, ctx| {
            headers.insert("x-test", HeaderValue::from_static("test"));
            if let Some(value) = ctx.headers.get("x-req") {
                headers.insert("x-req", value.clone());
            }
            headers
        });
    let proxy = common::start_proxy(vec![options]).await;

    let response = common::http_client()
        .get(proxy.http("/api"))
        .header("x-req", "from-header")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["x-test"], "test");
    assert_eq!(response.headers()["x-req"], "from-header");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["forwarded_by"], "relay-proxy");
}

#[tokio::test]
async fn test_pre_rewrite_sees_url_params_and_prefix() {
    let origin = common::start_origin().await;
    let mut config = route("/api", origin);
    config.rewrite_prefix = Some("/api2/".into());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::clone(&seen);
    let options = RouteOptions::new(config).with_pre_rewrite(move |url, params, prefix| {
        calls
            .lock()
            .unwrap()
            .push((url.to_string(), params.to_vec(), prefix.to_string()));
        url.replace("abc", "a")
    });
    let proxy = common::start_proxy(vec![options]).await;

    let body = get_json(&proxy.http("/api/abc")).await;
    assert_eq!(body["path"], "/api2/a");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (url, params, prefix) = &seen[0];
    assert_eq!(url, "/api/abc");
    assert_eq!(prefix, "/api");
    assert!(params.contains(&("*".to_string(), "abc".to_string())));
}

#[tokio::test]
async fn test_pre_handler_can_answer_request() {
    let origin = common::start_origin().await;
    let options = RouteOptions::new(route("/", origin)).with_pre_handler(|_, _| Err(StatusCode::UNAUTHORIZED));
    let proxy = common::start_proxy(vec![options]).await;

    let client = common::http_client();
    for path in ["/", "/a"] {
        let response = client.get(proxy.http(path)).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_buffered_payload_reaches_pre_handler_and_upstream() {
    let origin = common::start_origin().await;
    let mut config = route("/", origin);
    config.http.proxy_payloads = false;
    let seen = Arc::new(Mutex::new(None));
    let body_seen = Arc::clone(&seen);
    let options = RouteOptions::new(config).with_pre_handler(move |_, body| {
        *body_seen.lock().unwrap() = body.map(|b| b.to_vec());
        Ok(())
    });
    let proxy = common::start_proxy(vec![options]).await;

    let response = common::http_client()
        .post(proxy.http("/this-has-data"))
        .json(&json!({ "hello": "world" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["method"], "POST");
    assert_eq!(body["body"], r#"{"hello":"world"}"#);

    let seen = seen.lock().unwrap().clone().unwrap();
    let parsed: Value = serde_json::from_slice(&seen).unwrap();
    assert_eq!(parsed, json!({ "hello": "world" }));
}
