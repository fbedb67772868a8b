//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the proxy and fallback handlers
//! - Wire up middleware (logging, panic catching, timeout, rate limit)
//! - Bind the gateway and admin listeners
//! - Stop accepting on shutdown and drain in-flight requests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer};

use crate::admin::setup_admin_router;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::request::RequestContext;
use crate::lifecycle::Shutdown;
use crate::observability::logging::request_logging;
use crate::proxy::{GatewayEngine, HttpUpstream};
use crate::security::{rate_limit_middleware, RateLimiter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<GatewayEngine<HttpUpstream>>,
    pub config: Arc<GatewayConfig>,
    pub started_at: Instant,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// Fails when a route or filter cannot be compiled.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let engine = Arc::new(GatewayEngine::from_config(&config, HttpUpstream::new())?);

        tracing::info!(
            routes = engine.routes().len(),
            services = config.services.len(),
            "Route table loaded"
        );

        let state = AppState {
            engine,
            config: Arc::new(config),
            started_at: Instant::now(),
        };
        let router = Self::build_router(&state);

        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(state: &AppState) -> Router {
        let config = &state.config;

        let mut router = Router::new()
            .route("/fallback/{name}", get(fallback_handler))
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state.clone());

        if config.rate_limit.enabled {
            let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
            router = router.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));
        }

        router
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(CatchPanicLayer::new())
            .layer(middleware::from_fn(request_logging))
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Also starts the admin listener when enabled. Returns once `shutdown`
    /// fires and in-flight requests have drained.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if self.state.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.state.config.admin.bind_address).await?;
            let admin_addr = admin_listener.local_addr()?;
            let admin = setup_admin_router(self.state.clone());
            let mut rx = shutdown.subscribe();

            tracing::info!(address = %admin_addr, "Admin server starting");
            tokio::spawn(async move {
                let result = axum::serve(admin_listener, admin)
                    .with_graceful_shutdown(async move {
                        let _ = rx.recv().await;
                    })
                    .await;
                if let Err(e) = result {
                    tracing::error!(error = %e, "Admin server failed");
                }
            });
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut rx = shutdown.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }
}

/// Main proxy handler. Hands the request and its context to the engine.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let mut ctx = match request.extensions().get::<RequestContext>() {
        Some(ctx) => ctx.clone(),
        None => RequestContext::new(
            request.method().clone(),
            request.uri().path(),
            SocketAddr::from(([0, 0, 0, 0], 0)),
        ),
    };

    state.engine.handle(&mut ctx, request).await
}

/// `GET /fallback/{name}`: the canonical degraded response for `name`.
async fn fallback_handler(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let path = format!("/fallback/{}", name);
    let fallbacks = state.engine.fallbacks();

    match fallbacks.lookup(&path) {
        Some(_) => fallbacks.respond(&path),
        None => (StatusCode::NOT_FOUND, format!("unknown fallback '{}'", name)).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::ServiceExt;

    fn server() -> HttpServer {
        HttpServer::new(GatewayConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn fallback_endpoints() {
        let response = server()
            .router
            .oneshot(Request::builder().uri("/fallback/auth").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers().contains_key("x-request-id"));

        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            json["message"],
            "Authentication service is currently unavailable. Please try again later."
        );

        let response = server()
            .router
            .oneshot(Request::builder().uri("/fallback/billing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unrouted_path_is_404() {
        let response = server()
            .router
            .oneshot(Request::builder().uri("/api/orders/1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
