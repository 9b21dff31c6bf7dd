// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the Webmention service.

use crate::config::Config;
use crate::metrics::Metrics;
use crate::receiver::{InboundRequest, ReceiveOutcome, Receiver};
use crate::sender::{SendError, SendOutcome, Sender};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use url::Url;

/// Shared application state.
pub struct AppState {
    pub receiver: Receiver,
    pub sender: Sender,
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

/// Outbound notification request.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub source: String,
    pub target: String,
}

/// Outbound notification response.
#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl SendResponse {
    fn failed(error: String, code: Option<u16>) -> Self {
        Self {
            accepted: false,
            location: None,
            error: Some(error),
            code,
        }
    }
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/webmention", any(receive))
        .route("/send", post(send));

    if state.config.metrics.enabled && state.metrics.is_some() {
        app = app.route(&state.config.metrics.path, get(metrics));
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "webmention-engine",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Receive a Webmention.
pub async fn receive(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    debug!(method = %method, content_type = ?content_type, "Processing Webmention");

    let request = InboundRequest {
        method,
        content_type,
        body: &body,
    };

    match state.receiver.receive(request).await {
        Ok(outcome) => {
            let (label, message) = match outcome {
                ReceiveOutcome::Accepted(_) => ("accepted", "Webmention accepted"),
                ReceiveOutcome::Deleted { .. } => ("deleted", "Webmention deleted"),
            };
            record_received(&state, label);
            (StatusCode::OK, message).into_response()
        }
        Err(err) => {
            let status = err.status_code();
            info!(status = status.as_u16(), code = err.code(), error = %err, "Webmention rejected");
            record_received(&state, err.code());

            if status == StatusCode::METHOD_NOT_ALLOWED {
                return (status, [(header::ALLOW, "POST")], err.to_string()).into_response();
            }
            (status, err.to_string()).into_response()
        }
    }
}

/// Send a Webmention from `source` to `target`.
pub async fn send(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendRequest>,
) -> (StatusCode, Json<SendResponse>) {
    let urls = Url::parse(&req.source)
        .map_err(|_| ("source", &req.source))
        .and_then(|s| Url::parse(&req.target).map(|t| (s, t)).map_err(|_| ("target", &req.target)));

    let (source, target) = match urls {
        Ok(pair) => pair,
        Err((param, url)) => {
            warn!(param, url = %url, "Invalid URL in send request");
            return (
                StatusCode::BAD_REQUEST,
                Json(SendResponse::failed(format!("Invalid URL format for {param}: {url}"), None)),
            );
        }
    };

    match state.sender.send(&source, &target).await {
        Ok(SendOutcome::Accepted { location }) => {
            record_sent(&state, "accepted");
            (
                StatusCode::OK,
                Json(SendResponse {
                    accepted: true,
                    location,
                    error: None,
                    code: None,
                }),
            )
        }
        Err(err) => {
            let (label, code) = match &err {
                SendError::Discovery(e) => ("discovery_failed", e.status()),
                SendError::Request(_) => ("request_failed", None),
                SendError::Rejected { code, .. } => ("rejected", Some(*code)),
            };
            info!(source = %source, target = %target, error = %err, "Webmention not sent");
            record_sent(&state, label);
            (
                StatusCode::BAD_GATEWAY,
                Json(SendResponse::failed(err.to_string(), code)),
            )
        }
    }
}

/// Prometheus metrics endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let Some(metrics) = &state.metrics else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match metrics.render() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn record_received(state: &AppState, outcome: &str) {
    if let Some(metrics) = &state.metrics {
        metrics.record_received(outcome);
    }
}

fn record_sent(state: &AppState, outcome: &str) {
    if let Some(metrics) = &state.metrics {
        metrics.record_sent(outcome);
    }
}
