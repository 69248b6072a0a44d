//! Admin moderation endpoints.
//!
//! Every operation is scoped to the session user's granted sites — the
//! grant set is the only authorization input the core relies on. Batch
//! approvals create at most one pipeline run per affected site.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::header::HeaderMap;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use marginalia_state::{CommentFilter, RunStep, StatusFilter};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use crate::cors::{self, CorsOutcome};
use crate::session::session_user_id;
use crate::ApiState;

fn message_json(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({"success": false, "message": message})),
    )
        .into_response()
}

/// CORS + session gate shared by all admin handlers. Returns the CORS
/// outcome and the authenticated user id, or a ready error response.
fn authorize(state: &ApiState, headers: &HeaderMap) -> Result<(CorsOutcome, i64), Response> {
    let Some(auth) = state.config.auth.as_ref().filter(|a| a.enabled) else {
        return Err(StatusCode::NOT_FOUND.into_response());
    };
    let outcome = cors::evaluate(headers, &auth.cors_allowed_origins);
    if outcome == CorsOutcome::Denied {
        return Err(cors::denied_response());
    }
    match session_user_id(state, headers) {
        Some(user_id) => Ok((outcome, user_id)),
        None => Err(cors::apply(
            message_json(StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            &outcome,
        )),
    }
}

/// OPTIONS handler for all admin routes.
pub async fn options_admin(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    let Some(auth) = state.config.auth.as_ref().filter(|a| a.enabled) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let outcome = cors::evaluate(&headers, &auth.cors_allowed_origins);
    if outcome == CorsOutcome::Denied {
        return cors::denied_response();
    }
    cors::apply(StatusCode::NO_CONTENT.into_response(), &outcome)
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub site_id: Option<i64>,
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// GET /api/comments/list
pub async fn get_list(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Response {
    let (outcome, user_id) = match authorize(&state, &headers) {
        Ok(ok) => ok,
        Err(resp) => return resp,
    };

    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => StatusFilter::One(marginalia_state::CommentStatus::Pending),
        Some(s) => match StatusFilter::parse(&s.to_lowercase()) {
            Some(status) => status,
            None => {
                return cors::apply(message_json(StatusCode::BAD_REQUEST, "INVALID_STATUS"), &outcome);
            }
        },
    };
    let limit = query.limit.unwrap_or(10);
    if limit > 100 {
        return cors::apply(message_json(StatusCode::BAD_REQUEST, "INVALID_LIMIT"), &outcome);
    }
    if let Some(site_id) = query.site_id {
        if site_id <= 0 {
            return cors::apply(message_json(StatusCode::BAD_REQUEST, "INVALID_SITE_ID"), &outcome);
        }
    }

    let allowed = match state.store.list_allowed_site_ids(user_id) {
        Err(e) => {
            warn!(user_id, error = %e, "grant lookup failed");
            return cors::apply(message_json(StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR"), &outcome);
        }
        Ok(allowed) => allowed,
    };
    if allowed.is_empty() {
        return cors::apply(
            (
                StatusCode::OK,
                Json(serde_json::json!({"success": true, "items": [], "count": 0})),
            )
                .into_response(),
            &outcome,
        );
    }

    if let Some(site_id) = query.site_id {
        match state.store.user_has_site_access(user_id, site_id) {
            Err(_) => {
                return cors::apply(
                    message_json(StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR"),
                    &outcome,
                );
            }
            Ok(false) => {
                return cors::apply(message_json(StatusCode::FORBIDDEN, "FORBIDDEN_SITE"), &outcome);
            }
            Ok(true) => {}
        }
    }

    let filter = CommentFilter {
        site_id: query.site_id,
        allowed_site_ids: allowed,
        status,
        limit,
        offset: query.offset.unwrap_or(0),
    };

    let total = match state.store.count_comments(&filter) {
        Err(_) => {
            return cors::apply(message_json(StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR"), &outcome);
        }
        Ok(total) => total,
    };
    let items = match state.store.list_comments(&filter) {
        Err(_) => {
            return cors::apply(message_json(StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR"), &outcome);
        }
        Ok(items) => items,
    };

    cors::apply(
        (
            StatusCode::OK,
            Json(serde_json::json!({"success": true, "items": items, "count": total})),
        )
            .into_response(),
        &outcome,
    )
}

/// GET /api/sites
pub async fn get_sites(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    let (outcome, user_id) = match authorize(&state, &headers) {
        Ok(ok) => ok,
        Err(resp) => return resp,
    };

    match state.store.list_sites_by_user(user_id) {
        Err(_) => cors::apply(message_json(StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR"), &outcome),
        Ok(sites) => cors::apply(
            (
                StatusCode::OK,
                Json(serde_json::json!({"success": true, "sites": sites})),
            )
                .into_response(),
            &outcome,
        ),
    }
}

// ── Batch moderation ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModerationAction {
    Approve,
    Reject,
    Spam,
    Delete,
}

impl ModerationAction {
    fn applied_status(self) -> &'static str {
        match self {
            ModerationAction::Approve => "approved",
            ModerationAction::Reject => "rejected",
            ModerationAction::Spam => "spam",
            ModerationAction::Delete => "deleted",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ModerationItem {
    pub site_id: i64,
    pub comment_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ModerationBatchRequest {
    #[serde(default)]
    pub items: Vec<ModerationItem>,
}

pub async fn post_approve(
    state: State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<ModerationBatchRequest>, JsonRejection>,
) -> Response {
    moderate_batch(state, headers, body, ModerationAction::Approve).await
}

pub async fn post_reject(
    state: State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<ModerationBatchRequest>, JsonRejection>,
) -> Response {
    moderate_batch(state, headers, body, ModerationAction::Reject).await
}

pub async fn post_spam(
    state: State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<ModerationBatchRequest>, JsonRejection>,
) -> Response {
    moderate_batch(state, headers, body, ModerationAction::Spam).await
}

pub async fn post_delete(
    state: State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<ModerationBatchRequest>, JsonRejection>,
) -> Response {
    moderate_batch(state, headers, body, ModerationAction::Delete).await
}

async fn moderate_batch(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<ModerationBatchRequest>, JsonRejection>,
    action: ModerationAction,
) -> Response {
    let (outcome, user_id) = match authorize(&state, &headers) {
        Ok(ok) => ok,
        Err(resp) => return resp,
    };

    let Ok(Json(req)) = body else {
        return cors::apply(message_json(StatusCode::BAD_REQUEST, "INVALID_JSON"), &outcome);
    };

    // Normalize: drop empties, dedupe on (site_id, comment_id).
    let mut seen = BTreeSet::new();
    let items: Vec<ModerationItem> = req
        .items
        .into_iter()
        .filter_map(|item| {
            let comment_id = item.comment_id.trim().to_string();
            if item.site_id <= 0 || comment_id.is_empty() {
                return None;
            }
            seen.insert((item.site_id, comment_id.clone()))
                .then_some(ModerationItem {
                    site_id: item.site_id,
                    comment_id,
                })
        })
        .collect();
    if items.is_empty() {
        return cors::apply(message_json(StatusCode::BAD_REQUEST, "MISSING_ITEMS"), &outcome);
    }

    let allowed: BTreeSet<i64> = match state.store.list_allowed_site_ids(user_id) {
        Err(_) => {
            return cors::apply(message_json(StatusCode::INTERNAL_SERVER_ERROR, "DB_ERROR"), &outcome);
        }
        Ok(ids) => ids.into_iter().collect(),
    };

    let mut results = Vec::with_capacity(items.len());
    let mut approved_changed_sites = BTreeSet::new();

    for item in &items {
        if !allowed.contains(&item.site_id) {
            results.push(serde_json::json!({
                "site_id": item.site_id,
                "comment_id": item.comment_id,
                "changed": false,
                "status": "error",
                "error": "FORBIDDEN_SITE",
            }));
            continue;
        }

        let applied = match action {
            ModerationAction::Approve => state.store.approve_comment(item.site_id, &item.comment_id),
            ModerationAction::Reject => state.store.reject_comment(item.site_id, &item.comment_id),
            ModerationAction::Spam => state.store.spam_comment(item.site_id, &item.comment_id),
            ModerationAction::Delete => state.store.delete_comment(item.site_id, &item.comment_id),
        };
        match applied {
            Err(e) => {
                warn!(site_id = item.site_id, comment_id = %item.comment_id, error = %e, "moderation failed");
                results.push(serde_json::json!({
                    "site_id": item.site_id,
                    "comment_id": item.comment_id,
                    "changed": false,
                    "status": "error",
                    "error": "DB_ERROR",
                }));
            }
            Ok(changed) => {
                if changed && action == ModerationAction::Approve {
                    approved_changed_sites.insert(item.site_id);
                }
                results.push(serde_json::json!({
                    "site_id": item.site_id,
                    "comment_id": item.comment_id,
                    "changed": changed,
                    "status": action.applied_status(),
                }));
            }
        }
    }

    // One pipeline run per site that actually gained approved comments.
    let mut batch_run_ids: BTreeMap<String, i64> = BTreeMap::new();
    let mut warnings: BTreeMap<String, String> = BTreeMap::new();
    if action == ModerationAction::Approve {
        if let Some(enqueuer) = &state.enqueuer {
            for site_id in approved_changed_sites {
                let key = site_id.to_string();

                let site_key = match state.store.get_site_by_id(site_id) {
                    Ok(Some(site)) => site.site_key,
                    _ => {
                        warnings.insert(key, "pipeline_enqueue_failed".to_string());
                        continue;
                    }
                };
                if state.config.site(&site_key).is_none() {
                    warnings.insert(key, "pipeline_enqueue_failed".to_string());
                    continue;
                }

                let run_id = match state.store.create_run(site_id, None) {
                    Err(e) => {
                        warn!(site_id, error = %e, "create run failed");
                        warnings.insert(key, "pipeline_enqueue_failed".to_string());
                        continue;
                    }
                    Ok(run_id) => run_id,
                };
                if let Err(e) = enqueuer.enqueue_run(run_id, &site_key, None) {
                    warn!(site_id, run_id, error = %e, "enqueue failed");
                    if let Err(mark_err) =
                        state.store.mark_run_failed(run_id, RunStep::Enqueue, &e.to_string())
                    {
                        warn!(run_id, error = %mark_err, "failed to mark run failed");
                    }
                    warnings.insert(key, "pipeline_enqueue_failed".to_string());
                    continue;
                }
                batch_run_ids.insert(key, run_id);
            }
        }
    }

    cors::apply(
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "results": results,
                "count": results.len(),
                "batch_run_ids": batch_run_ids,
                "warnings": warnings,
            })),
        )
            .into_response(),
        &outcome,
    )
}
