//! marginalia-api — HTTP layer.
//!
//! Public surface:
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/comments/{site_key}` | Submit a comment (also with trailing slash) |
//! | OPTIONS | `/api/comments/{site_key}` | CORS preflight |
//! | GET | `/api/comments/{site_key}/decision?token=` | Apply a signed moderation decision |
//! | GET | `/health` | Liveness probe |
//!
//! Admin surface (mounted only when `[auth]` is enabled):
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/auth/login` / `/api/auth/logout` | Session cookie management |
//! | GET | `/api/comments/list` | Moderation listing scoped to granted sites |
//! | POST | `/api/comments/{approve,reject,spam,delete}` | Batch moderation |
//! | GET | `/api/sites` | Sites granted to the session user |

pub mod admin;
pub mod comments;
pub mod cors;
pub mod decision;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

use axum::routing::{get, post};
use axum::{Json, Router};
use marginalia_core::Config;
use marginalia_mail::Mailer;
use marginalia_pipeline::Enqueuer;
use marginalia_state::Store;
use std::sync::Arc;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: Store,
    pub config: Arc<Config>,
    /// Absent when the pipeline worker is not running (e.g. tooling that
    /// only serves the intake endpoint).
    pub enqueuer: Option<Arc<dyn Enqueuer>>,
    /// Absent when no SMTP relay is configured; intake then reports
    /// `mail_sent: false`.
    pub mailer: Option<Arc<Mailer>>,
}

/// Build the complete router for the configured state.
pub fn build_router(state: ApiState) -> Router {
    let mut router = Router::new()
        .route(
            "/api/comments/{site_key}",
            post(comments::post_comment).options(comments::options_comment),
        )
        .route(
            "/api/comments/{site_key}/",
            post(comments::post_comment).options(comments::options_comment),
        )
        .route("/api/comments/{site_key}/decision", get(decision::get_decision))
        .route("/health", get(health));

    let auth_enabled = state.config.auth.as_ref().is_some_and(|a| a.enabled);
    if auth_enabled {
        router = router
            .route(
                "/api/auth/login",
                post(session::post_login).options(admin::options_admin),
            )
            .route(
                "/api/auth/logout",
                post(session::post_logout).options(admin::options_admin),
            )
            .route(
                "/api/comments/list",
                get(admin::get_list).options(admin::options_admin),
            )
            .route(
                "/api/comments/approve",
                post(admin::post_approve).options(admin::options_admin),
            )
            .route(
                "/api/comments/reject",
                post(admin::post_reject).options(admin::options_admin),
            )
            .route(
                "/api/comments/spam",
                post(admin::post_spam).options(admin::options_admin),
            )
            .route(
                "/api/comments/delete",
                post(admin::post_delete).options(admin::options_admin),
            )
            .route("/api/sites", get(admin::get_sites).options(admin::options_admin));
    }

    router.with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}
