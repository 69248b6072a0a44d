//! Per-site CORS handling.
//!
//! The allowlist is exact-match. A request without an Origin header is
//! not a browser CORS request and passes through without CORS headers;
//! a request with a disallowed origin is rejected before the body is
//! looked at.

use axum::http::header::{HeaderMap, HeaderValue, ORIGIN, VARY};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Outcome of evaluating a request's Origin against a site allowlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOutcome {
    /// No Origin header; not a CORS request.
    NotCors,
    /// Origin present and allowed; echo it in the response headers.
    Allowed(String),
    Denied,
}

pub fn evaluate(headers: &HeaderMap, allowed: &[String]) -> CorsOutcome {
    let Some(origin) = headers.get(ORIGIN).and_then(|v| v.to_str().ok()) else {
        return CorsOutcome::NotCors;
    };
    if origin.is_empty() {
        return CorsOutcome::NotCors;
    }
    if allowed.iter().any(|a| a == origin) {
        CorsOutcome::Allowed(origin.to_string())
    } else {
        CorsOutcome::Denied
    }
}

/// Attach CORS response headers for an allowed origin.
pub fn apply(mut response: Response, outcome: &CorsOutcome) -> Response {
    if let CorsOutcome::Allowed(origin) = outcome {
        if let Ok(value) = HeaderValue::from_str(origin) {
            let headers = response.headers_mut();
            headers.insert("Access-Control-Allow-Origin", value);
            headers.insert(VARY, HeaderValue::from_static("Origin"));
            headers.insert(
                "Access-Control-Allow-Credentials",
                HeaderValue::from_static("true"),
            );
            headers.insert(
                "Access-Control-Allow-Methods",
                HeaderValue::from_static("POST, OPTIONS"),
            );
            headers.insert(
                "Access-Control-Allow-Headers",
                HeaderValue::from_static("Content-Type, X-Requested-With, Accept, Origin"),
            );
        }
    }
    response
}

/// The 403 returned for a disallowed origin.
pub fn denied_response() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(serde_json::json!({"success": false, "error": "origin_not_allowed"})),
    )
        .into_response()
}
