// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the outbound gateway.
//!
//! The service exposes one operation, `POST <proxy_path>`, plus health and
//! metrics endpoints.

use crate::config::Config;
use crate::error::GatewayError;
use crate::gateway::{client_id, Gateway, ProxyOutcome};
use crate::metrics::Metrics;
use crate::request::ProxyRequest;
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Response header echoing the request's correlation id.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Shared application state.
pub struct AppState {
    pub gateway: Gateway,
    pub metrics: Option<Metrics>,
    pub config: Config,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Build the router for the given state.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route(
            &state.config.proxy_path,
            post(proxy).fallback(method_not_allowed),
        );

    if state.config.metrics.enabled && state.metrics.is_some() {
        app = app.route(&state.config.metrics.path, get(metrics));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "outbound-gateway",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Proxy one request upstream.
pub async fn proxy(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<ProxyRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let err = GatewayError::InvalidRequest(rejection.body_text());
            return outcome_response(state.gateway.reject(&err));
        }
    };

    let client = client_id(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    outcome_response(state.gateway.proxy(request, &client).await)
}

/// Any method other than POST on the proxy route.
pub async fn method_not_allowed(State(state): State<Arc<AppState>>, method: Method) -> Response {
    let err = GatewayError::MethodNotAllowed(method.to_string());
    let mut response = outcome_response(state.gateway.reject(&err));
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static("POST"));
    response
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let Some(metrics) = state.metrics.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn outcome_response(outcome: ProxyOutcome) -> Response {
    let status = outcome.envelope.status_code();
    let retry_after = outcome.envelope.retry_after();
    let mut response = (status, Json(outcome.envelope)).into_response();

    if let Ok(value) = HeaderValue::from_str(&outcome.correlation_id.to_string()) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    if let Some(secs) = retry_after {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}
