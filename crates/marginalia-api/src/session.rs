//! Admin session cookies.
//!
//! The cookie value is `base64url(user_id|expiry) "." base64url(HMAC)`
//! signed with `auth.session_secret` — the same shape as decision tokens,
//! so there is no separate session store to manage. Logout clears the
//! cookie; values are not revocable server-side within their lifetime.

use axum::extract::State;
use axum::http::header::{HeaderMap, HeaderValue, COOKIE, SET_COOKIE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use marginalia_core::password::verify_password;
use marginalia_state::epoch_secs;
use serde::Deserialize;
use sha2::Sha256;
use tracing::info;

use crate::cors::{self, CorsOutcome};
use crate::ApiState;

type HmacSha256 = Hmac<Sha256>;

/// Sessions last 12 hours.
pub const SESSION_TTL_SECS: i64 = 12 * 60 * 60;

pub fn sign_session(secret: &str, user_id: i64, expires_at: i64) -> String {
    let payload = format!("{user_id}|{expires_at}");
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(payload.as_bytes());
    format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(payload.as_bytes()),
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    )
}

/// Verify a session value; returns the user id while valid.
pub fn verify_session(secret: &str, value: &str, now: i64) -> Option<i64> {
    let (payload_b64, sig_b64) = value.split_once('.')?;
    let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
    let sig = URL_SAFE_NO_PAD.decode(sig_b64).ok()?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(&payload);
    mac.verify_slice(&sig).ok()?;

    let payload = String::from_utf8(payload).ok()?;
    let (user_id, expires_at) = payload.split_once('|')?;
    let user_id: i64 = user_id.parse().ok()?;
    let expires_at: i64 = expires_at.parse().ok()?;
    (now <= expires_at).then_some(user_id)
}

/// Resolve the authenticated admin user from the request cookies.
pub fn session_user_id(state: &ApiState, headers: &HeaderMap) -> Option<i64> {
    let auth = state.config.auth.as_ref().filter(|a| a.enabled)?;
    let cookie_header = headers.get(COOKIE)?.to_str().ok()?;

    let wanted = auth.session_name();
    for part in cookie_header.split(';') {
        let Some((name, value)) = part.trim().split_once('=') else {
            continue;
        };
        if name == wanted {
            return verify_session(&auth.session_secret, value, epoch_secs());
        }
    }
    None
}

fn session_set_cookie(name: &str, value: &str, max_age: i64) -> HeaderValue {
    let cookie = format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}");
    HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// POST /api/auth/login
pub async fn post_login(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<LoginRequest>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Some(auth) = state.config.auth.as_ref().filter(|a| a.enabled) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let outcome = cors::evaluate(&headers, &auth.cors_allowed_origins);
    if outcome == CorsOutcome::Denied {
        return cors::denied_response();
    }
    let Ok(Json(req)) = body else {
        return cors::apply(
            (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"success": false, "message": "INVALID_JSON"})),
            )
                .into_response(),
            &outcome,
        );
    };

    let unauthorized = || {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"success": false, "message": "INVALID_CREDENTIALS"})),
        )
            .into_response()
    };

    let user = match state.store.get_user_by_email(&req.email) {
        Err(_) => {
            return cors::apply(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({"success": false, "message": "DB_ERROR"})),
                )
                    .into_response(),
                &outcome,
            );
        }
        Ok(None) => return cors::apply(unauthorized(), &outcome),
        Ok(Some(user)) => user,
    };

    if !verify_password(&req.password, &user.password) {
        return cors::apply(unauthorized(), &outcome);
    }

    let expires_at = epoch_secs() + SESSION_TTL_SECS;
    let value = sign_session(&auth.session_secret, user.id, expires_at);

    info!(user_id = user.id, "admin login");
    let mut response = (
        StatusCode::OK,
        Json(serde_json::json!({
            "success": true,
            "user": {
                "id": user.id,
                "email": user.email,
                "first_name": user.first_name,
                "last_name": user.last_name,
            },
        })),
    )
        .into_response();
    response.headers_mut().insert(
        SET_COOKIE,
        session_set_cookie(auth.session_name(), &value, SESSION_TTL_SECS),
    );
    cors::apply(response, &outcome)
}

/// POST /api/auth/logout
pub async fn post_logout(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    let Some(auth) = state.config.auth.as_ref().filter(|a| a.enabled) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let outcome = cors::evaluate(&headers, &auth.cors_allowed_origins);
    if outcome == CorsOutcome::Denied {
        return cors::denied_response();
    }

    let mut response = (
        StatusCode::OK,
        Json(serde_json::json!({"success": true})),
    )
        .into_response();
    response
        .headers_mut()
        .insert(SET_COOKIE, session_set_cookie(auth.session_name(), "", 0));
    cors::apply(response, &outcome)
}
