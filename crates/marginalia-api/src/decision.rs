//! Signed decision links.
//!
//! All terminal outcomes answer 200 in plain text — a second click on the
//! same mail link must not look like an error in the admin's mail client.
//! Only malformed or unauthorized tokens produce 4xx.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use marginalia_core::token::{self, Action, TokenError};
use marginalia_state::{epoch_secs, RunStep};
use serde::Deserialize;
use tracing::{info, warn};

use crate::ApiState;

#[derive(Debug, Deserialize)]
pub struct DecisionQuery {
    #[serde(default)]
    pub token: String,
}

fn text(status: StatusCode, body: impl Into<String>) -> Response {
    (status, body.into()).into_response()
}

/// GET /api/comments/{site_key}/decision?token=...
pub async fn get_decision(
    State(state): State<ApiState>,
    Path(site_key): Path<String>,
    Query(query): Query<DecisionQuery>,
) -> Response {
    let Some(site) = state.config.site(&site_key) else {
        return text(StatusCode::NOT_FOUND, "unknown site");
    };

    let token_value = query.token.trim();
    if token_value.is_empty() {
        return text(StatusCode::BAD_REQUEST, "missing token");
    }

    // Cryptographic verification happens before any store lookup.
    let decision = match token::verify(&site.token_secret, &site_key, token_value, epoch_secs()) {
        Ok(decision) => decision,
        Err(TokenError::Malformed) => return text(StatusCode::BAD_REQUEST, "invalid token"),
        Err(TokenError::BadEncoding) => {
            return text(StatusCode::BAD_REQUEST, "invalid token encoding");
        }
        Err(TokenError::BadSignature) => {
            return text(StatusCode::FORBIDDEN, "invalid token signature");
        }
        Err(TokenError::SiteMismatch) => return text(StatusCode::FORBIDDEN, "site mismatch"),
        Err(TokenError::Expired) => return text(StatusCode::FORBIDDEN, "token expired"),
    };

    let site_id = match state.store.site_id_by_key(&site_key) {
        Err(e) => {
            warn!(%site_key, error = %e, "site lookup failed");
            return text(StatusCode::INTERNAL_SERVER_ERROR, "db query failed");
        }
        Ok(None) => return text(StatusCode::NOT_FOUND, "unknown site"),
        Ok(Some(site_id)) => site_id,
    };

    match decision.action {
        Action::Approve => approve(&state, site_id, &site_key, &decision.comment_id),
        Action::Reject => reject(&state, site_id, &site_key, &decision.comment_id),
    }
}

fn approve(state: &ApiState, site_id: i64, site_key: &str, comment_id: &str) -> Response {
    let changed = match state.store.approve_comment(site_id, comment_id) {
        Err(e) => {
            warn!(%site_key, %comment_id, error = %e, "approve failed");
            return text(StatusCode::INTERNAL_SERVER_ERROR, "db update failed");
        }
        Ok(changed) => changed,
    };
    if !changed {
        return text(StatusCode::OK, "nothing to approve (already decided or not found)");
    }
    info!(%site_key, %comment_id, "comment approved");

    // The decision is never rolled back from here on: the comment stays
    // approved even when the pipeline cannot be enqueued, and the run can
    // be re-driven later.
    let Some(enqueuer) = &state.enqueuer else {
        return text(StatusCode::OK, "approved (pipeline not configured)");
    };

    let run_id = match state.store.create_run(site_id, Some(comment_id)) {
        Err(e) => {
            warn!(%site_key, %comment_id, error = %e, "create run failed");
            return text(StatusCode::OK, "approved (pipeline enqueue failed)");
        }
        Ok(run_id) => run_id,
    };

    if let Err(e) = enqueuer.enqueue_run(run_id, site_key, Some(comment_id)) {
        warn!(%site_key, %comment_id, run_id, error = %e, "enqueue failed");
        if let Err(mark_err) = state.store.mark_run_failed(run_id, RunStep::Enqueue, &e.to_string()) {
            warn!(run_id, error = %mark_err, "failed to mark run failed");
        }
        return text(StatusCode::OK, "approved (pipeline enqueue failed)");
    }

    text(StatusCode::OK, format!("approved (pipeline queued, run_id={run_id})"))
}

fn reject(state: &ApiState, site_id: i64, site_key: &str, comment_id: &str) -> Response {
    match state.store.reject_comment(site_id, comment_id) {
        Err(e) => {
            warn!(%site_key, %comment_id, error = %e, "reject failed");
            text(StatusCode::INTERNAL_SERVER_ERROR, "db update failed")
        }
        Ok(false) => text(StatusCode::OK, "nothing to reject (already decided or not found)"),
        Ok(true) => {
            info!(%site_key, %comment_id, "comment rejected");
            text(StatusCode::OK, "rejected")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seeded_state;
    use marginalia_core::token::sign;
    use marginalia_pipeline::EnqueueError;
    use marginalia_state::{Comment, CommentStatus, RunState};

    const SECRET: &str = "hunter2"; // matches the test config

    fn insert_pending(state: &ApiState, site_id: i64, id: &str) {
        let comment = Comment {
            id: id.to_string(),
            site_id,
            entry_id: None,
            post_path: "/p/x/".to_string(),
            parent_id: None,
            status: CommentStatus::Pending,
            author: "Ada".to_string(),
            email: "a@x.org".to_string(),
            author_url: None,
            body: "Hi".to_string(),
            ip: None,
            created_at: epoch_secs(),
            approved_at: None,
            rejected_at: None,
        };
        state.store.insert_comment(&comment).unwrap();
    }

    async fn decide(state: &ApiState, site_key: &str, token: &str) -> Response {
        get_decision(
            State(state.clone()),
            Path(site_key.to_string()),
            Query(DecisionQuery { token: token.to_string() }),
        )
        .await
    }

    #[tokio::test]
    async fn approve_creates_and_enqueues_run() {
        let (state, site_id, enq) = seeded_state();
        insert_pending(&state, site_id, "c1");

        let token = sign(SECRET, "blog", "c1", Action::Approve, epoch_secs() + 60);
        let resp = decide(&state, "blog", &token).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let comment = state.store.get_comment(site_id, "c1").unwrap().unwrap();
        assert_eq!(comment.status, CommentStatus::Approved);

        let requests = enq.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].1, "blog");
        assert_eq!(requests[0].2.as_deref(), Some("c1"));

        let run = state.store.get_run(requests[0].0).unwrap().unwrap();
        assert_eq!(run.state, RunState::Queued);
    }

    #[tokio::test]
    async fn double_approval_is_idempotent() {
        let (state, site_id, enq) = seeded_state();
        insert_pending(&state, site_id, "c1");

        let token = sign(SECRET, "blog", "c1", Action::Approve, epoch_secs() + 60);
        let first = decide(&state, "blog", &token).await;
        assert_eq!(first.status(), StatusCode::OK);
        let second = decide(&state, "blog", &token).await;
        assert_eq!(second.status(), StatusCode::OK);

        // Exactly one run row exists.
        assert_eq!(enq.requests.lock().unwrap().len(), 1);
        assert_eq!(state.store.list_runs(Some(site_id), 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reject_path() {
        let (state, site_id, enq) = seeded_state();
        insert_pending(&state, site_id, "c1");

        let token = sign(SECRET, "blog", "c1", Action::Reject, epoch_secs() + 60);
        let resp = decide(&state, "blog", &token).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let comment = state.store.get_comment(site_id, "c1").unwrap().unwrap();
        assert_eq!(comment.status, CommentStatus::Rejected);
        // Rejection never enqueues a pipeline run.
        assert!(enq.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_token_leaves_comment_pending() {
        let (state, site_id, _) = seeded_state();
        insert_pending(&state, site_id, "c1");

        let token = sign(SECRET, "blog", "c1", Action::Approve, epoch_secs() - 1);
        let resp = decide(&state, "blog", &token).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let comment = state.store.get_comment(site_id, "c1").unwrap().unwrap();
        assert_eq!(comment.status, CommentStatus::Pending);
    }

    #[tokio::test]
    async fn tampered_token_rejected() {
        let (state, site_id, _) = seeded_state();
        insert_pending(&state, site_id, "c1");

        let mut token = sign(SECRET, "blog", "c1", Action::Approve, epoch_secs() + 60);
        let flipped = if token.ends_with('A') { 'B' } else { 'A' };
        token.pop();
        token.push(flipped);
        let resp = decide(&state, "blog", &token).await;
        assert!(resp.status() == StatusCode::FORBIDDEN || resp.status() == StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn site_mismatch_rejected() {
        let (state, site_id, _) = seeded_state();
        insert_pending(&state, site_id, "c1");

        // Signed for a different site key than the URL carries.
        let token = sign(SECRET, "docs", "c1", Action::Approve, epoch_secs() + 60);
        let resp = decide(&state, "blog", &token).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn missing_token_and_unknown_site() {
        let (state, _, _) = seeded_state();
        let resp = decide(&state, "blog", "").await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = decide(&state, "nope", "whatever").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn enqueue_failure_still_answers_200_and_marks_run() {
        let (state, site_id, enq) = seeded_state();
        insert_pending(&state, site_id, "c1");
        enq.fail_with(EnqueueError::QueueFull);

        let token = sign(SECRET, "blog", "c1", Action::Approve, epoch_secs() + 60);
        let resp = decide(&state, "blog", &token).await;
        assert_eq!(resp.status(), StatusCode::OK);

        // The approval stands, and the run is failed at step enqueue.
        let comment = state.store.get_comment(site_id, "c1").unwrap().unwrap();
        assert_eq!(comment.status, CommentStatus::Approved);

        let runs = state.store.list_runs(Some(site_id), 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].state, RunState::Failed);
        assert_eq!(runs[0].step, Some(RunStep::Enqueue));
    }
}
