//! Request dispatch.
//!
//! # Responsibilities
//! - Match the route and interpret its filter chain
//! - Gate every attempt on the route's circuit breaker
//! - Forward to a resolved backend address under the call time limit
//! - Retry per policy, fall back when the last attempt fails
//!
//! # Design Decisions
//! - Filters are data; the only `match` over `FilterSpec` lives in `plan`
//! - Each attempt records exactly one outcome; breaker rejections record none
//! - The body is buffered once so retries can replay it

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Request, Uri},
    response::{IntoResponse, Response},
};

use crate::config::schema::GatewayConfig;
use crate::discovery::{RoundRobin, ServiceResolver, StaticResolver};
use crate::error::GatewayError;
use crate::http::request::{MatchedRoute, RequestContext, X_REQUEST_ID};
use crate::observability::metrics;
use crate::proxy::fallback::{FallbackResponder, DEFAULT_FALLBACK};
use crate::proxy::upstream::Upstream;
use crate::resilience::circuit_breaker::{
    BreakerSettings, CallOutcome, CircuitBreaker, CircuitBreakerRegistry,
};
use crate::resilience::retries::RetryPolicy;
use crate::resilience::timeouts::{classify, with_call_timeout, CallLimits};
use crate::routing::route::{FilterSpec, RouteDefinition};
use crate::routing::router::{RouteMatch, RouteTable};

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// What a route's filter chain asks for.
struct DispatchPlan<'a> {
    breaker: Option<Arc<CircuitBreaker>>,
    fallback: &'a str,
    path: String,
    retry: Option<&'a RetryPolicy>,
}

/// Routes requests to backends with breaker, retry and fallback handling.
pub struct GatewayEngine<U> {
    routes: Arc<RouteTable>,
    breakers: Arc<CircuitBreakerRegistry>,
    resolver: Arc<dyn ServiceResolver>,
    balancer: RoundRobin,
    fallbacks: Arc<FallbackResponder>,
    upstream: U,
    limits: CallLimits,
    max_body_size: usize,
}

impl<U: Upstream> GatewayEngine<U> {
    pub fn new(
        routes: Arc<RouteTable>,
        breakers: Arc<CircuitBreakerRegistry>,
        resolver: Arc<dyn ServiceResolver>,
        fallbacks: Arc<FallbackResponder>,
        upstream: U,
    ) -> Self {
        Self {
            routes,
            breakers,
            resolver,
            balancer: RoundRobin::new(),
            fallbacks,
            upstream,
            limits: CallLimits::default(),
            max_body_size: 2 * 1024 * 1024,
        }
    }

    /// Build every collaborator from configuration.
    pub fn from_config(config: &GatewayConfig, upstream: U) -> Result<Self, GatewayError> {
        let routes = Arc::new(RouteTable::from_config(&config.routes)?);
        let breakers = Arc::new(CircuitBreakerRegistry::new(BreakerSettings::from(
            &config.circuit_breaker,
        )));
        let resolver: Arc<dyn ServiceResolver> =
            Arc::new(StaticResolver::from_config(&config.services));
        let fallbacks = Arc::new(FallbackResponder::from_config(&config.fallbacks));

        Ok(Self::new(routes, breakers, resolver, fallbacks, upstream)
            .with_limits(CallLimits::from(&config.circuit_breaker))
            .with_max_body_size(config.security.max_body_size))
    }

    pub fn with_limits(mut self, limits: CallLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn fallbacks(&self) -> &Arc<FallbackResponder> {
        &self.fallbacks
    }

    /// Handle one inbound request. Always produces a response.
    pub async fn handle(&self, ctx: &mut RequestContext, request: Request<Body>) -> Response {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let Some(RouteMatch { route, segments }) = self.routes.match_request(&method, &path) else {
            tracing::debug!(correlation_id = %ctx.correlation_id, %method, %path, "No route matched");
            return GatewayError::NoRouteMatch {
                method: method.to_string(),
                path,
            }
            .into_response();
        };

        tracing::debug!(
            correlation_id = %ctx.correlation_id,
            route = %route.id,
            ?segments,
            "Route matched"
        );
        ctx.matched_route = Some(route.id.clone());
        let mut response = match self.dispatch(ctx, &route, request).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        };
        response.extensions_mut().insert(MatchedRoute(route.id.clone()));
        response
    }

    fn plan<'a>(&self, route: &'a RouteDefinition, path: &str) -> DispatchPlan<'a> {
        let mut plan = DispatchPlan {
            breaker: None,
            fallback: DEFAULT_FALLBACK,
            path: path.to_string(),
            retry: None,
        };

        for filter in &route.filters {
            match filter {
                FilterSpec::CircuitBreaker { name, fallback_path } => {
                    plan.breaker = Some(self.breakers.get_or_create(name));
                    plan.fallback = fallback_path.as_str();
                }
                FilterSpec::RewritePath(rewrite) => {
                    plan.path = rewrite.apply(&plan.path).into_owned();
                }
                FilterSpec::Retry(policy) => plan.retry = Some(policy),
            }
        }
        plan
    }

    async fn dispatch(
        &self,
        ctx: &mut RequestContext,
        route: &RouteDefinition,
        request: Request<Body>,
    ) -> Result<Response, GatewayError> {
        let (parts, body) = request.into_parts();
        let body = self.buffer_body(&parts.headers, body).await?;

        let plan = self.plan(route, parts.uri.path());
        let path_and_query = match parts.uri.query() {
            Some(query) => format!("{}?{}", plan.path, query),
            None => plan.path.clone(),
        };

        let mut attempt = 0u32;
        let last_error = loop {
            ctx.attempt = attempt;

            let permit = match &plan.breaker {
                Some(breaker) => match breaker.try_acquire() {
                    Ok(permit) => Some(permit),
                    Err(e) => break e,
                },
                None => None,
            };

            let started = Instant::now();
            let error = match self
                .call(ctx, &route.backend, &parts, &path_and_query, body.clone())
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    let outcome = classify(status, started.elapsed(), &self.limits);
                    if let Some(permit) = permit {
                        permit.record(outcome);
                    }
                    if outcome != CallOutcome::Failure {
                        return Ok(response);
                    }
                    GatewayError::BackendCallFailure {
                        backend: route.backend.clone(),
                        reason: format!("status {}", status.as_u16()),
                    }
                }
                Err(e) => {
                    if let Some(permit) = permit {
                        permit.record(CallOutcome::Failure);
                    }
                    e
                }
            };

            match plan.retry {
                Some(policy) if policy.should_retry(attempt, &parts.method, &error) => {
                    attempt += 1;
                    let delay = policy.next_delay(attempt);
                    tracing::info!(
                        correlation_id = %ctx.correlation_id,
                        route = %route.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying backend call"
                    );
                    metrics::record_retry(&route.id);
                    tokio::time::sleep(delay).await;
                }
                _ => break error,
            }
        };

        tracing::warn!(
            correlation_id = %ctx.correlation_id,
            route = %route.id,
            attempts = attempt + 1,
            fallback = plan.fallback,
            error = %last_error,
            "Serving fallback response"
        );
        metrics::record_fallback(&route.id, last_error.kind());
        Ok(self.fallbacks.respond(plan.fallback))
    }

    async fn buffer_body(&self, headers: &HeaderMap, body: Body) -> Result<Bytes, GatewayError> {
        let too_large = GatewayError::PayloadTooLarge {
            limit: self.max_body_size,
        };

        let declared = headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.max_body_size) {
            return Err(too_large);
        }

        axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, "Failed to read request body");
                too_large
            })
    }

    /// One attempt against one resolved address.
    async fn call(
        &self,
        ctx: &RequestContext,
        backend: &str,
        parts: &Parts,
        path_and_query: &str,
        body: Bytes,
    ) -> Result<Response, GatewayError> {
        let failure = |reason: String| GatewayError::BackendCallFailure {
            backend: backend.to_string(),
            reason,
        };

        let addrs = self.resolver.resolve(backend);
        let addr = self
            .balancer
            .next(backend, &addrs)
            .ok_or_else(|| failure("no addresses available".to_string()))?;

        let uri = Uri::builder()
            .scheme("http")
            .authority(addr.to_string())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| failure(e.to_string()))?;

        let mut request = Request::new(Body::from(body));
        *request.method_mut() = parts.method.clone();
        *request.uri_mut() = uri;
        *request.headers_mut() = forward_headers(&parts.headers, ctx);

        tracing::debug!(
            correlation_id = %ctx.correlation_id,
            backend,
            address = %addr,
            attempt = ctx.attempt,
            path = path_and_query,
            "Forwarding request"
        );

        with_call_timeout(self.limits.call_timeout, backend, async {
            self.upstream
                .send(request)
                .await
                .map_err(|e| failure(e.to_string()))
        })
        .await
    }
}

fn forward_headers(inbound: &HeaderMap, ctx: &RequestContext) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len() + 2);
    for (name, value) in inbound {
        if name == header::HOST || HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    if let Ok(value) = HeaderValue::from_str(&ctx.correlation_id.to_string()) {
        headers.insert(HeaderName::from_static(X_REQUEST_ID), value);
    }

    let client = ctx.remote_address.ip().to_string();
    let forwarded_for = match inbound.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{}, {}", existing, client),
        None => client,
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        headers.insert(HeaderName::from_static("x-forwarded-for"), value);
    }
    headers
}
