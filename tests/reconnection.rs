//! Sessions surviving backend restarts.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::Message;

use relay_proxy::config::{ReconnectConfig, UpstreamConfig};
use relay_proxy::relay::HookSet;
use relay_proxy::routing::RouteOptions;

mod common;

fn reconnecting_route(backend: SocketAddr, retries: Option<i64>) -> UpstreamConfig {
    UpstreamConfig {
        name: "resilient".into(),
        upstream: format!("http://{backend}"),
        websocket: true,
        ws_reconnect: Some(ReconnectConfig {
            ping_interval_ms: Some(0),
            reconnect_interval_ms: Some(50),
            reconnect_decay: Some(1.0),
            max_reconnection_retries: retries,
            connection_timeout_ms: Some(500),
            logs: Some(true),
            ..ReconnectConfig::default()
        }),
        ..UpstreamConfig::default()
    }
}

#[tokio::test]
async fn test_session_survives_backend_restart() {
    let backend = common::EchoBackend::start().await;
    let reconnects = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&reconnects);
    let hooks = HookSet::new().on_reconnect(move |ctx| {
        seen.store(ctx.attempt(), Ordering::SeqCst);
        ctx.send_to_target(Message::text("replayed"));
        Ok(())
    });
    let proxy = common::start_proxy(vec![
        RouteOptions::new(reconnecting_route(backend.addr, None)).with_hooks(hooks),
    ])
    .await;

    let mut client = common::connect(&proxy.ws("/")).await;
    client.send(Message::text("first")).await.unwrap();
    assert_eq!(common::recv_text(&mut client).await, "first");

    let addr = backend.stop().await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    let _backend = common::EchoBackend::start_on(addr).await;

    // Queued until the replacement target is open.
    client.send(Message::text("second")).await.unwrap();
    assert_eq!(common::recv_text(&mut client).await, "replayed");
    assert_eq!(common::recv_text(&mut client).await, "second");
    assert!(reconnects.load(Ordering::SeqCst) >= 1);
    assert_eq!(proxy.coordinator.active_sessions(), 1);
}

#[tokio::test]
async fn test_exhausted_retries_close_client() {
    let backend = common::EchoBackend::start().await;
    let proxy = common::start_proxy(vec![reconnecting_route(backend.addr, Some(2)).into()]).await;

    let mut client = common::connect(&proxy.ws("/")).await;
    client.send(Message::text("first")).await.unwrap();
    assert_eq!(common::recv_text(&mut client).await, "first");

    backend.stop().await;
    assert_eq!(common::recv_close(&mut client).await, Some(1011));
}

#[tokio::test]
async fn test_normal_close_ends_session_by_default() {
    let backend = common::EchoBackend::start().await;
    let proxy = common::start_proxy(vec![reconnecting_route(backend.addr, None).into()]).await;

    let mut client = common::connect(&proxy.ws("/")).await;
    client.send(Message::text("close")).await.unwrap();
    assert_eq!(common::recv_close(&mut client).await, Some(4000));
}

#[tokio::test]
async fn test_unreachable_backend_is_retried_until_it_starts() {
    let addr = common::free_addr();
    let proxy = common::start_proxy(vec![reconnecting_route(addr, None).into()]).await;

    let mut client = common::connect(&proxy.ws("/")).await;
    client.send(Message::text("waiting")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let _backend = common::EchoBackend::start_on(addr).await;
    assert_eq!(common::recv_text(&mut client).await, "waiting");
}
