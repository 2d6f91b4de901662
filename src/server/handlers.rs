//! Request handlers

use super::types::{ErrorBody, HealthResponse, ScrapeBody};
use super::AppState;
use crate::scrape::ScrapeRequest;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;

const URL_REQUIRED: &str = "URL is required";

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ScrapeFlow engine is running".to_string(),
        timestamp: Utc::now(),
    })
}

/// Scrapes the requested URL and returns the structured result
pub async fn scrape(
    State(state): State<AppState>,
    body: Result<Json<ScrapeBody>, JsonRejection>,
) -> Response {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            tracing::debug!("Rejected scrape body: {}", rejection.body_text());
            return error_response(StatusCode::BAD_REQUEST, ErrorBody::new(URL_REQUIRED));
        }
    };

    let Some(url) = body.url.filter(|url| !url.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, ErrorBody::new(URL_REQUIRED));
    };

    let defaults = state.orchestrator.default_options();
    let options = body
        .options
        .map_or(defaults, |patch| patch.apply(defaults));

    match state.orchestrator.scrape(ScrapeRequest::new(url, options)).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => {
            let status = StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            error_response(
                status,
                ErrorBody {
                    error: e.message,
                    retry_after_ms: e.retry_after_ms,
                },
            )
        }
    }
}

fn error_response(status: StatusCode, body: ErrorBody) -> Response {
    let retry_after = body.retry_after_ms;
    let mut response = (status, Json(body)).into_response();

    // Retry-After is whole seconds
    if let Some(ms) = retry_after {
        let secs = ms.div_ceil(1000).max(1);
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }

    response
}
