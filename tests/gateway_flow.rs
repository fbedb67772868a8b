//! End-to-end tests: real gateway, raw-TCP mock backends.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::StatusCode;
use crm_gateway::config::{
    BackoffConfig, FilterConfig, GatewayConfig, RouteConfig, ServiceConfig,
};
use serde_json::Value;

mod common;

fn service(name: &str, addr: SocketAddr) -> ServiceConfig {
    ServiceConfig {
        name: name.into(),
        addresses: vec![addr.to_string()],
    }
}

fn breaker(name: &str, fallback: &str) -> FilterConfig {
    FilterConfig::CircuitBreaker {
        name: name.into(),
        fallback_uri: format!("forward:{}", fallback),
    }
}

fn retry(methods: &[&str]) -> FilterConfig {
    FilterConfig::Retry {
        max_attempts: 3,
        methods: methods.iter().map(|m| m.to_string()).collect(),
        backoff: BackoffConfig {
            first_backoff_ms: 10,
            max_backoff_ms: 40,
            factor: 2.0,
            jitter: false,
        },
    }
}

fn customer_gateway(backend: SocketAddr, filters: Vec<FilterConfig>) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.services.push(service("customer-service", backend));
    config.routes.push(RouteConfig {
        id: "customer-service".into(),
        path: "/api/customers/**".into(),
        uri: "lb://customer-service".into(),
        methods: vec![],
        filters,
    });
    config
}

fn counting_backend(
    calls: Arc<AtomicU32>,
    answer: impl Fn(u32) -> (u16, String) + Send + Sync + 'static,
) -> impl Fn(String) -> std::future::Ready<(u16, String)> + Send + Sync + 'static {
    move |_| {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(answer(n))
    }
}

#[tokio::test]
async fn exhausted_retries_serve_customer_fallback() {
    let calls = Arc::new(AtomicU32::new(0));
    let backend = common::start_programmable_backend(counting_backend(calls.clone(), |_| {
        (503, "Service Unavailable".into())
    }))
    .await;

    let config = customer_gateway(
        backend,
        vec![breaker("customer-service", "/fallback/customer"), retry(&["GET"])],
    );
    let (gateway, shutdown) = common::start_gateway(config).await;

    let res = common::client()
        .get(format!("http://{}/api/customers/42", gateway))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(res.headers().contains_key("x-request-id"));
    let json: Value = res.json().await.unwrap();
    assert_eq!(json["status"], 503);
    assert_eq!(json["error"], "Service Unavailable");
    assert_eq!(
        json["message"],
        "Customer service is currently unavailable. Please try again later."
    );
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    shutdown.trigger();
}

#[tokio::test]
async fn transient_failures_are_retried_to_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let backend = common::start_programmable_backend(counting_backend(calls.clone(), |n| {
        if n < 2 {
            (503, "Service Unavailable".into())
        } else {
            (200, "Success".into())
        }
    }))
    .await;

    let config = customer_gateway(
        backend,
        vec![breaker("customer-service", "/fallback/customer"), retry(&["GET"])],
    );
    let (gateway, shutdown) = common::start_gateway(config).await;

    let res = common::client()
        .get(format!("http://{}/api/customers/1", gateway))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "Success");
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    shutdown.trigger();
}

#[tokio::test]
async fn open_breaker_stops_backend_calls() {
    let calls = Arc::new(AtomicU32::new(0));
    let backend = common::start_programmable_backend(counting_backend(calls.clone(), |_| {
        (500, "boom".into())
    }))
    .await;

    let mut config = customer_gateway(backend, vec![breaker("customer-service", "/fallback/customer")]);
    config.circuit_breaker.sliding_window_size = 4;
    config.circuit_breaker.wait_duration_in_open_state_ms = 60_000;
    let (gateway, shutdown) = common::start_gateway(config).await;
    let client = common::client();
    let url = format!("http://{}/api/customers/9", gateway);

    for _ in 0..4 {
        let res = client.get(&url).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    shutdown.trigger();
}

#[tokio::test]
async fn rewrites_path_and_passes_client_errors_through() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();
    let backend = common::start_programmable_backend(move |request_line: String| {
        recorder.lock().unwrap().push(request_line);
        std::future::ready((404, "no such user".to_string()))
    })
    .await;

    let mut config = GatewayConfig::default();
    config.services.push(service("auth-service", backend));
    config.routes.push(RouteConfig {
        id: "auth-service".into(),
        path: "/api/auth/**".into(),
        uri: "lb://auth-service".into(),
        methods: vec![],
        filters: vec![
            FilterConfig::RewritePath {
                regexp: "/api/auth/(?P<segment>.*)".into(),
                replacement: "/auth/${segment}".into(),
            },
            breaker("auth-service", "/fallback/auth"),
        ],
    });
    let (gateway, shutdown) = common::start_gateway(config).await;

    let res = common::client()
        .get(format!("http://{}/api/auth/users/7?verbose=1", gateway))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.text().await.unwrap(), "no such user");
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        ["GET /auth/users/7?verbose=1 HTTP/1.1".to_string()]
    );

    shutdown.trigger();
}

#[tokio::test]
async fn unreachable_backend_serves_auth_fallback() {
    let mut config = GatewayConfig::default();
    config.services.push(service("auth-service", common::closed_port().await));
    config.routes.push(RouteConfig {
        id: "auth-service".into(),
        path: "/api/auth/**".into(),
        uri: "lb://auth-service".into(),
        methods: vec![],
        filters: vec![breaker("auth-service", "/fallback/auth"), retry(&["GET", "POST"])],
    });
    let (gateway, shutdown) = common::start_gateway(config).await;

    let res = common::client()
        .post(format!("http://{}/api/auth/login", gateway))
        .body(r#"{"username":"admin"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = res.json().await.unwrap();
    assert_eq!(
        json["message"],
        "Authentication service is currently unavailable. Please try again later."
    );

    shutdown.trigger();
}

#[tokio::test]
async fn slow_backend_times_out_to_fallback() {
    let backend = common::start_programmable_backend(|_| async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        (200, "late".to_string())
    })
    .await;

    let mut config = customer_gateway(backend, vec![breaker("customer-service", "/fallback/customer")]);
    config.circuit_breaker.call_timeout_ms = 100;
    let (gateway, shutdown) = common::start_gateway(config).await;

    let res = common::client()
        .get(format!("http://{}/api/customers/3", gateway))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);

    shutdown.trigger();
}

#[tokio::test]
async fn unknown_routes_and_fallback_endpoints() {
    let (gateway, shutdown) = common::start_gateway(GatewayConfig::default()).await;
    let client = common::client();

    let res = client
        .get(format!("http://{}/api/orders/1", gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(format!("http://{}/fallback/default", gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = res.json().await.unwrap();
    assert_eq!(
        json["message"],
        "The requested service is currently unavailable. Please try again later."
    );

    let res = client
        .get(format!("http://{}/fallback/billing", gateway))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    shutdown.trigger();
}
