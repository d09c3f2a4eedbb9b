//! Failure injection tests for the proxy.

use std::time::{Duration, Instant};

use failover_proxy::config::BackendConfig;

mod common;
use common::{
    client, closed_port, header, proxy_config, start_proxy, start_silent_backend, url, Behavior,
    MockBackend,
};

#[tokio::test]
async fn closed_backend_is_skipped_and_marked() {
    let a = MockBackend::start("A").await;
    let c = MockBackend::start("C").await;
    let b = BackendConfig {
        name: Some("B".into()),
        address: closed_port().await.to_string(),
    };
    let proxy = start_proxy(proxy_config(vec![a.backend_config(), b, c.backend_config()])).await;
    let client = client();

    for _ in 0..6 {
        let res = client.get(url(&proxy, "/")).send().await.unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(header(&res, "x-proxy-error"), None);
        let served = header(&res, "x-served-by").unwrap();
        assert!(served == "A" || served == "C", "served by {served}");
    }
    assert_eq!(a.hits() + c.hits(), 6);

    let snapshot = proxy.registry().snapshot();
    assert!(snapshot[0].health.healthy);
    assert!(!snapshot[1].health.healthy);
    assert_eq!(snapshot[1].health.failure_count, 1, "B is not selected while cooling down");
    assert!(snapshot[2].health.healthy);
    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn silent_backend_times_out_and_fails_over() {
    let silent = BackendConfig {
        name: Some("A".into()),
        address: start_silent_backend().await.to_string(),
    };
    let b = MockBackend::start("B").await;
    let proxy = start_proxy(proxy_config(vec![silent, b.backend_config()])).await;

    let started = Instant::now();
    let res = client().get(url(&proxy, "/")).send().await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(res.status(), 200);
    assert_eq!(header(&res, "x-served-by").as_deref(), Some("B"));
    assert!(elapsed >= Duration::from_millis(900), "failed over too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "failed over too late: {elapsed:?}");

    let snapshot = proxy.registry().snapshot();
    assert!(!snapshot[0].health.healthy);
    assert!(snapshot[1].health.healthy);
    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn no_healthy_backend_answers_all_unhealthy() {
    let backends = vec![
        BackendConfig { name: None, address: closed_port().await.to_string() },
        BackendConfig { name: None, address: closed_port().await.to_string() },
    ];
    let proxy = start_proxy(proxy_config(backends)).await;

    let res = client().get(url(&proxy, "/")).send().await.unwrap();
    assert_eq!(res.status(), 502);
    assert_eq!(header(&res, "x-proxy-error").as_deref(), Some("all_unhealthy"));
    assert_eq!(header(&res, "x-served-by").as_deref(), Some("failover-proxy"));
    assert_eq!(
        header(&res, "content-type").as_deref(),
        Some("text/plain; charset=utf-8")
    );
    assert!(header(&res, "x-request-id").is_some());
    assert!(proxy.registry().all_unhealthy());
    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn attempts_are_capped() {
    let backends = vec![
        BackendConfig { name: None, address: closed_port().await.to_string() },
        BackendConfig { name: None, address: closed_port().await.to_string() },
        BackendConfig { name: None, address: closed_port().await.to_string() },
    ];
    let mut config = proxy_config(backends);
    config.balancing.max_attempts = 2;
    let proxy = start_proxy(config).await;

    let res = client().get(url(&proxy, "/")).send().await.unwrap();
    assert_eq!(res.status(), 502);
    assert_eq!(header(&res, "x-proxy-error").as_deref(), Some("connect_failed"));

    let failed = proxy
        .registry()
        .snapshot()
        .iter()
        .filter(|status| !status.health.healthy)
        .count();
    assert_eq!(failed, 2);
    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn mid_response_close_is_not_retried() {
    let a = MockBackend::start_with("A", Behavior::CloseMidResponse).await;
    let b = MockBackend::start("B").await;
    let proxy = start_proxy(proxy_config(vec![a.backend_config(), b.backend_config()])).await;

    let res = client().get(url(&proxy, "/")).send().await.unwrap();
    assert_eq!(res.status(), 502);
    assert_eq!(
        header(&res, "x-proxy-error").as_deref(),
        Some("upstream_closed_early")
    );
    assert_eq!(b.hits(), 0);
    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn oversized_response_is_refused() {
    let a = MockBackend::start_with("A", Behavior::LargeBody(64 * 1024)).await;
    let b = MockBackend::start("B").await;
    let mut config = proxy_config(vec![a.backend_config(), b.backend_config()]);
    config.limits.max_response_bytes = 16 * 1024;
    let proxy = start_proxy(config).await;

    let res = client().get(url(&proxy, "/")).send().await.unwrap();
    assert_eq!(res.status(), 502);
    assert_eq!(
        header(&res, "x-proxy-error").as_deref(),
        Some("upstream_too_large")
    );
    assert_eq!(a.hits(), 1);
    assert_eq!(b.hits(), 0);
    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn backend_recovers_after_cool_down() {
    let a = MockBackend::start("A").await;
    let b = MockBackend::start("B").await;
    let mut config = proxy_config(vec![a.backend_config(), b.backend_config()]);
    config.health.cool_down_base_secs = 0.2;
    config.health.cool_down_cap_secs = 1.0;
    let proxy = start_proxy(config).await;

    proxy.registry().mark_failure(0, "connect_failed");
    let res = client().get(url(&proxy, "/")).send().await.unwrap();
    assert_eq!(header(&res, "x-served-by").as_deref(), Some("B"));

    tokio::time::sleep(Duration::from_millis(300)).await;
    let mut served = Vec::new();
    for _ in 0..2 {
        let res = client().get(url(&proxy, "/")).send().await.unwrap();
        served.push(header(&res, "x-served-by").unwrap());
    }
    assert!(served.contains(&"A".to_string()), "A never came back: {served:?}");

    let snapshot = proxy.registry().snapshot();
    assert!(snapshot[0].health.healthy);
    assert_eq!(snapshot[0].health.failure_count, 0);
    proxy.shutdown().await.unwrap();
}
