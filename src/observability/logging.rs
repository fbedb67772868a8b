//! Structured request logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Log one entry line and one exit line per request
//! - Echo the correlation id to the client
//!
//! # Design Decisions
//! - Exit line comes from a drop guard, so cancelled requests still log
//! - `RUST_LOG` overrides the configured level

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter};
use uuid::Uuid;

use crate::config::schema::ObservabilityConfig;
use crate::http::request::{MatchedRoute, RequestContext, X_REQUEST_ID};
use crate::observability::metrics;

/// Install the global subscriber.
pub fn init_logging(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "crm_gateway={level},tower_http={level}",
            level = config.log_level
        ))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}

/// Emits the exit line when dropped.
struct RequestLog {
    correlation_id: Uuid,
    method: Method,
    start: Instant,
    status: Option<StatusCode>,
    route: Option<String>,
}

impl Drop for RequestLog {
    fn drop(&mut self) {
        let duration_ms = self.start.elapsed().as_millis() as u64;
        let route = self.route.as_deref().unwrap_or(metrics::NO_ROUTE);

        match self.status {
            Some(status) => {
                tracing::info!(
                    correlation_id = %self.correlation_id,
                    status = status.as_u16(),
                    duration_ms,
                    route,
                    "Request completed"
                );
                metrics::record_request(self.method.as_str(), status.as_u16(), route, self.start);
            }
            None => {
                tracing::info!(
                    correlation_id = %self.correlation_id,
                    status = "none",
                    duration_ms,
                    route,
                    "Request cancelled"
                );
            }
        }
    }
}

/// Middleware: correlation id, entry/exit logging and request span.
pub async fn request_logging(mut request: Request<Body>, next: Next) -> Response {
    let remote_address = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));

    let ctx = RequestContext::new(
        request.method().clone(),
        request.uri().path(),
        remote_address,
    );
    let span = tracing::info_span!("request", correlation_id = %ctx.correlation_id);

    async move {
        tracing::info!(
            correlation_id = %ctx.correlation_id,
            method = %ctx.method,
            path = %ctx.path,
            remote_address = %ctx.remote_address,
            "Request received"
        );

        let mut log = RequestLog {
            correlation_id: ctx.correlation_id,
            method: ctx.method.clone(),
            start: ctx.start_time,
            status: None,
            route: None,
        };
        let correlation_id = ctx.correlation_id;
        request.extensions_mut().insert(ctx);

        let mut response = next.run(request).await;

        log.status = Some(response.status());
        log.route = response
            .extensions()
            .get::<MatchedRoute>()
            .map(|MatchedRoute(id)| id.clone());
        if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
            response.headers_mut().insert(X_REQUEST_ID, value);
        }
        response
    }
    .instrument(span)
    .await
}
