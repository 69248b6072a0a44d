//! Public comment intake.

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::header::{HeaderMap, HOST};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use marginalia_captcha::Verifier;
use marginalia_core::netutil;
use marginalia_core::token::{self, Action, DECISION_TOKEN_TTL_SECS};
use marginalia_mail::{build_moderation_mail, ModerationMailInput};
use marginalia_sanitize::{
    sanitize_author_name, sanitize_author_url, sanitize_comment_body, sanitize_email,
    EmailRejection,
};
use marginalia_state::{epoch_secs, Comment, CommentStatus};
use serde::Deserialize;
use std::net::SocketAddr;
use tracing::{info, warn};
use ulid::Ulid;

use crate::cors::{self, CorsOutcome};
use crate::ApiState;

pub const MAX_AUTHOR_CODE_POINTS: usize = 80;
pub const MAX_POST_PATH_BYTES: usize = 512;
pub const MAX_ENTRY_ID_BYTES: usize = 128;
pub const MAX_BODY_BYTES: usize = 20_000;
pub const MAX_AUTHOR_URL_BYTES: usize = 2048;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateCommentRequest {
    pub entry_id: String,
    pub post_path: String,
    pub parent_id: String,
    pub author: String,
    pub email: String,
    pub author_url: String,
    pub body: String,
    pub captcha_token: String,
}

fn error_json(status: StatusCode, code: &str) -> Response {
    (
        status,
        Json(serde_json::json!({"success": false, "error": code})),
    )
        .into_response()
}

/// POST /api/comments/{site_key}
pub async fn post_comment(
    State(state): State<ApiState>,
    Path(site_key): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> Response {
    let Some(site) = state.config.site(&site_key) else {
        return error_json(StatusCode::NOT_FOUND, "unknown_site");
    };

    // CORS comes before anything derived from the body.
    let outcome = cors::evaluate(&headers, &site.cors_allowed_origins);
    if outcome == CorsOutcome::Denied {
        return cors::denied_response();
    }

    let Ok(Json(req)) = body else {
        return cors::apply(error_json(StatusCode::BAD_REQUEST, "invalid_json"), &outcome);
    };

    let client_ip = netutil::resolve_client_ip(
        Some(peer.ip()),
        headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()),
        headers.get("x-real-ip").and_then(|v| v.to_str().ok()),
        &state.config.server.trusted_proxies,
    )
    .map(|ip| ip.to_string());

    // Captcha gate, when the site configures one.
    match Verifier::from_config(site.captcha.as_ref()) {
        Err(e) => {
            warn!(%site_key, error = %e, "captcha configuration error");
            return cors::apply(
                error_json(StatusCode::INTERNAL_SERVER_ERROR, "captcha_verify_failed"),
                &outcome,
            );
        }
        Ok(Some(verifier)) => {
            match verifier
                .verify(req.captcha_token.trim(), client_ip.as_deref())
                .await
            {
                Err(e) => {
                    warn!(%site_key, error = %e, "captcha verification unavailable");
                    return cors::apply(
                        error_json(StatusCode::INTERNAL_SERVER_ERROR, "captcha_verify_failed"),
                        &outcome,
                    );
                }
                Ok(verdict) if !verdict.success => {
                    return cors::apply(
                        (
                            StatusCode::BAD_REQUEST,
                            Json(serde_json::json!({
                                "success": false,
                                "error": "captcha_invalid",
                                "error_codes": verdict.error_codes,
                            })),
                        )
                            .into_response(),
                        &outcome,
                    );
                }
                Ok(_) => {}
            }
        }
        Ok(None) => {}
    }

    // Field sanitation. Order and error codes are part of the contract.
    let raw_author = req.author.trim();
    let (author, author_report) = sanitize_author_name(&req.author, 0);
    if author.is_empty() {
        let code = if raw_author.is_empty() { "missing_author" } else { "invalid_author" };
        return cors::apply(error_json(StatusCode::BAD_REQUEST, code), &outcome);
    }
    if author_report.changed {
        info!(
            %site_key,
            removed_ctrl = author_report.removed_control_chars,
            removed_bad = author_report.removed_disallowed_chars,
            "author sanitized"
        );
    }

    let author_url = match sanitize_author_url(&req.author_url, MAX_AUTHOR_URL_BYTES) {
        Ok((url, _)) => url,
        Err(_) => {
            return cors::apply(error_json(StatusCode::BAD_REQUEST, "invalid_author_url"), &outcome);
        }
    };

    let email = match sanitize_email(&req.email, 254) {
        Ok((email, _)) => email,
        Err(EmailRejection::Empty) => {
            return cors::apply(error_json(StatusCode::BAD_REQUEST, "missing_email"), &outcome);
        }
        Err(_) => {
            return cors::apply(error_json(StatusCode::BAD_REQUEST, "invalid_email"), &outcome);
        }
    };

    let post_path = req.post_path.trim().to_string();
    let entry_id = req.entry_id.trim().to_string();
    let parent_id = req.parent_id.trim().to_string();
    let raw_body = req.body.trim().to_string();

    if post_path.is_empty() {
        return cors::apply(error_json(StatusCode::BAD_REQUEST, "missing_post_path"), &outcome);
    }
    if raw_body.is_empty() {
        return cors::apply(error_json(StatusCode::BAD_REQUEST, "missing_body"), &outcome);
    }
    if author.chars().count() > MAX_AUTHOR_CODE_POINTS {
        return cors::apply(error_json(StatusCode::BAD_REQUEST, "author_too_long"), &outcome);
    }
    if post_path.len() > MAX_POST_PATH_BYTES {
        return cors::apply(error_json(StatusCode::BAD_REQUEST, "post_path_too_long"), &outcome);
    }
    if entry_id.len() > MAX_ENTRY_ID_BYTES {
        return cors::apply(error_json(StatusCode::BAD_REQUEST, "entry_id_too_long"), &outcome);
    }
    if raw_body.len() > MAX_BODY_BYTES {
        return cors::apply(error_json(StatusCode::BAD_REQUEST, "body_too_long"), &outcome);
    }

    let (sanitized_body, body_report) = sanitize_comment_body(&raw_body);

    let comment_id = Ulid::new().to_string();
    let created_at = epoch_secs();

    let site_id = match state.store.site_id_by_key(&site_key) {
        Err(e) => {
            warn!(%site_key, error = %e, "site lookup failed");
            return cors::apply(
                error_json(StatusCode::INTERNAL_SERVER_ERROR, "db_query_failed"),
                &outcome,
            );
        }
        Ok(None) => return cors::apply(error_json(StatusCode::NOT_FOUND, "unknown_site"), &outcome),
        Ok(Some(site_id)) => site_id,
    };

    // A parent must exist, be approved, and sit on the same site + post.
    if !parent_id.is_empty() {
        match state.store.parent_exists(site_id, &parent_id, &post_path, true) {
            Err(e) => {
                warn!(%site_key, %parent_id, error = %e, "parent lookup failed");
                return cors::apply(
                    error_json(StatusCode::INTERNAL_SERVER_ERROR, "db_query_failed"),
                    &outcome,
                );
            }
            Ok(false) => {
                return cors::apply(error_json(StatusCode::BAD_REQUEST, "invalid_parent_id"), &outcome);
            }
            Ok(true) => {}
        }
    }

    let comment = Comment {
        id: comment_id.clone(),
        site_id,
        entry_id: (!entry_id.is_empty()).then(|| entry_id.clone()),
        post_path: post_path.clone(),
        parent_id: (!parent_id.is_empty()).then(|| parent_id.clone()),
        status: CommentStatus::Pending,
        author: author.clone(),
        email: email.clone(),
        author_url: author_url.clone(),
        body: sanitized_body.clone(),
        ip: client_ip.clone(),
        created_at,
        approved_at: None,
        rejected_at: None,
    };
    if let Err(e) = state.store.insert_comment(&comment) {
        warn!(%site_key, %comment_id, error = %e, "comment insert failed");
        return cors::apply(
            error_json(StatusCode::INTERNAL_SERVER_ERROR, "db_insert_failed"),
            &outcome,
        );
    }

    // Signed decision links, 72h expiry.
    let expires_at = created_at + DECISION_TOKEN_TTL_SECS;
    let base = base_url(&headers);
    let approve_token = token::sign(&site.token_secret, &site_key, &comment_id, Action::Approve, expires_at);
    let reject_token = token::sign(&site.token_secret, &site_key, &comment_id, Action::Reject, expires_at);
    let approve_url = format!("{base}/api/comments/{site_key}/decision?token={approve_token}");
    let reject_url = format!("{base}/api/comments/{site_key}/decision?token={reject_token}");

    let (subject, mail_body) = build_moderation_mail(&ModerationMailInput {
        site_key: &site_key,
        post_path: &post_path,
        entry_id: (!entry_id.is_empty()).then_some(entry_id.as_str()),
        parent_id: (!parent_id.is_empty()).then_some(parent_id.as_str()),
        comment_id: &comment_id,
        author: &author,
        author_url: author_url.as_deref(),
        email: &email,
        client_ip: client_ip.as_deref(),
        created_at,
        sanitized_body: &sanitized_body,
        report: &body_report,
        approve_url: &approve_url,
        reject_url: &reject_url,
    });

    // Mail failure never fails the intake; the response says so instead.
    let mail_sent = match &state.mailer {
        Some(mailer) if !site.admin_recipients.is_empty() => {
            match mailer.send_text(&site.admin_recipients, &subject, &mail_body).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(%site_key, %comment_id, error = %e, "moderation mail failed");
                    false
                }
            }
        }
        _ => {
            warn!(%site_key, "no mailer or recipients configured, skipping moderation mail");
            false
        }
    };

    info!(%site_key, %comment_id, "comment accepted as pending");
    cors::apply(
        (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "success": true,
                "site_id": site_id,
                "site_key": site_key,
                "id": comment_id,
                "status": "pending",
                "mail_sent": mail_sent,
            })),
        )
            .into_response(),
        &outcome,
    )
}

/// OPTIONS /api/comments/{site_key} — CORS preflight.
pub async fn options_comment(
    State(state): State<ApiState>,
    Path(site_key): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(site) = state.config.site(&site_key) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let outcome = cors::evaluate(&headers, &site.cors_allowed_origins);
    if outcome == CorsOutcome::Denied {
        return cors::denied_response();
    }
    cors::apply(StatusCode::NO_CONTENT.into_response(), &outcome)
}

/// Scheme + host for the decision links: Host header as-is,
/// X-Forwarded-Proto upgrades the scheme.
fn base_url(headers: &HeaderMap) -> String {
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .filter(|p| !p.is_empty())
        .unwrap_or("http");
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{proto}://{host}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seeded_state;
    use axum::http::header::{HeaderValue, ORIGIN};

    fn peer() -> ConnectInfo<SocketAddr> {
        ConnectInfo("198.51.100.7:4711".parse().unwrap())
    }

    fn host_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("comments.example.org"));
        headers
    }

    fn request(post_path: &str, author: &str, email: &str, body: &str) -> CreateCommentRequest {
        CreateCommentRequest {
            post_path: post_path.to_string(),
            author: author.to_string(),
            email: email.to_string(),
            body: body.to_string(),
            ..Default::default()
        }
    }

    async fn submit(
        state: &ApiState,
        site_key: &str,
        headers: HeaderMap,
        req: CreateCommentRequest,
    ) -> Response {
        post_comment(
            State(state.clone()),
            Path(site_key.to_string()),
            peer(),
            headers,
            Ok(Json(req)),
        )
        .await
    }

    #[tokio::test]
    async fn happy_path_creates_pending_comment() {
        let (state, site_id, _enq) = seeded_state();
        let resp = submit(
            &state,
            "blog",
            host_headers(),
            request("/p/hello/", "Ada", "ada@example.org", "Hi there"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let pending = state
            .store
            .list_comments(&marginalia_state::CommentFilter {
                site_id: None,
                allowed_site_ids: vec![site_id],
                status: marginalia_state::StatusFilter::One(CommentStatus::Pending),
                limit: 0,
                offset: 0,
            })
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].author, "Ada");
        assert_eq!(pending[0].id.len(), 26);
        assert_eq!(pending[0].ip.as_deref(), Some("198.51.100.7"));
    }

    #[tokio::test]
    async fn unknown_site_is_404() {
        let (state, _, _) = seeded_state();
        let resp = submit(
            &state,
            "nope",
            host_headers(),
            request("/p/x/", "Ada", "a@x.org", "Hi"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn disallowed_origin_is_403() {
        let (state, _, _) = seeded_state();
        let mut headers = host_headers();
        headers.insert(ORIGIN, HeaderValue::from_static("https://evil.example"));
        let resp = submit(
            &state,
            "blog",
            headers,
            request("/p/x/", "Ada", "a@x.org", "Hi"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn allowed_origin_gets_cors_headers() {
        let (state, _, _) = seeded_state();
        let mut headers = host_headers();
        headers.insert(ORIGIN, HeaderValue::from_static("https://example.org"));
        let resp = submit(
            &state,
            "blog",
            headers,
            request("/p/x/", "Ada", "a@x.org", "Hi"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(
            resp.headers().get("Access-Control-Allow-Origin").unwrap(),
            "https://example.org"
        );
    }

    #[tokio::test]
    async fn validation_error_codes() {
        let (state, _, _) = seeded_state();

        let cases: Vec<(CreateCommentRequest, StatusCode)> = vec![
            (request("", "Ada", "a@x.org", "Hi"), StatusCode::BAD_REQUEST),
            (request("/p/x/", "", "a@x.org", "Hi"), StatusCode::BAD_REQUEST),
            (request("/p/x/", "Ada", "", "Hi"), StatusCode::BAD_REQUEST),
            (request("/p/x/", "Ada", "not-an-email", "Hi"), StatusCode::BAD_REQUEST),
            (request("/p/x/", "Ada", "a@x.org", ""), StatusCode::BAD_REQUEST),
        ];
        for (req, expected) in cases {
            let resp = submit(&state, "blog", host_headers(), req).await;
            assert_eq!(resp.status(), expected);
        }
    }

    #[tokio::test]
    async fn author_length_boundary_is_code_points() {
        let (state, _, _) = seeded_state();

        // 80 two-byte code points: accepted.
        let ok = "é".repeat(80);
        let resp = submit(&state, "blog", host_headers(), request("/p/x/", &ok, "a@x.org", "Hi")).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let too_long = "é".repeat(81);
        let resp =
            submit(&state, "blog", host_headers(), request("/p/x/", &too_long, "a@x.org", "Hi")).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn body_length_boundary_is_bytes() {
        let (state, _, _) = seeded_state();

        let exactly = "a".repeat(MAX_BODY_BYTES);
        let resp =
            submit(&state, "blog", host_headers(), request("/p/x/", "Ada", "a@x.org", &exactly)).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let over = "a".repeat(MAX_BODY_BYTES + 1);
        let resp =
            submit(&state, "blog", host_headers(), request("/p/x/", "Ada", "a@x.org", &over)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn pending_parent_is_rejected() {
        let (state, site_id, _) = seeded_state();

        let resp = submit(
            &state,
            "blog",
            host_headers(),
            request("/p/x/", "Ada", "a@x.org", "parent post"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let parent = state
            .store
            .list_comments(&marginalia_state::CommentFilter {
                site_id: None,
                allowed_site_ids: vec![site_id],
                status: marginalia_state::StatusFilter::All,
                limit: 0,
                offset: 0,
            })
            .unwrap()
            .remove(0);

        // Parent still pending: reply rejected, nothing inserted.
        let mut reply = request("/p/x/", "Eve", "e@x.org", "reply");
        reply.parent_id = parent.id.clone();
        let resp = submit(&state, "blog", host_headers(), reply).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        // Approve the parent; the same reply now lands.
        assert!(state.store.approve_comment(site_id, &parent.id).unwrap());
        let mut reply = request("/p/x/", "Eve", "e@x.org", "reply");
        reply.parent_id = parent.id.clone();
        let resp = submit(&state, "blog", host_headers(), reply).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn invalid_json_is_bad_input() {
        let (state, _, _) = seeded_state();
        // Sanity: the happy-path request with a parent pointing nowhere.
        let mut req = request("/p/x/", "Ada", "a@x.org", "Hi");
        req.parent_id = "01NOSUCHPARENT".to_string();
        let resp = submit(&state, "blog", host_headers(), req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn options_preflight() {
        let (state, _, _) = seeded_state();

        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, HeaderValue::from_static("https://example.org"));
        let resp = options_comment(State(state.clone()), Path("blog".to_string()), headers).await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let mut headers = HeaderMap::new();
        headers.insert(ORIGIN, HeaderValue::from_static("https://evil.example"));
        let resp = options_comment(State(state.clone()), Path("blog".to_string()), headers).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp =
            options_comment(State(state), Path("nope".to_string()), HeaderMap::new()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn mail_absent_reports_mail_sent_false() {
        let (state, _, _) = seeded_state();
        let resp = submit(
            &state,
            "blog",
            host_headers(),
            request("/p/x/", "Ada", "a@x.org", "Hi"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        // No SMTP configured in the test state; the response must still
        // be 201. (mail_sent=false is part of the JSON body.)
    }

    #[tokio::test]
    async fn forwarding_headers_need_a_trusted_peer() {
        let (state, site_id, _) = seeded_state();
        let mut headers = host_headers();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));

        let resp = submit(
            &state,
            "blog",
            headers,
            request("/p/x/", "Ada", "a@x.org", "Hi"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let stored = state
            .store
            .list_comments(&marginalia_state::CommentFilter {
                site_id: None,
                allowed_site_ids: vec![site_id],
                status: marginalia_state::StatusFilter::All,
                limit: 0,
                offset: 0,
            })
            .unwrap()
            .remove(0);
        // Peer 198.51.100.7 is not a trusted proxy, so the header is ignored.
        assert_eq!(stored.ip.as_deref(), Some("198.51.100.7"));
    }

    #[tokio::test]
    async fn body_is_stored_sanitized() {
        let (state, site_id, _) = seeded_state();
        let resp = submit(
            &state,
            "blog",
            host_headers(),
            request("/p/x/", "Ada", "a@x.org", "hi <script>alert(1)</script>"),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let stored = state
            .store
            .list_comments(&marginalia_state::CommentFilter {
                site_id: None,
                allowed_site_ids: vec![site_id],
                status: marginalia_state::StatusFilter::All,
                limit: 0,
                offset: 0,
            })
            .unwrap()
            .remove(0);
        assert!(!stored.body.contains("<script>"));
    }

    #[tokio::test]
    async fn enqueuer_untouched_by_intake() {
        let (state, _, enq) = seeded_state();
        let _ = submit(
            &state,
            "blog",
            host_headers(),
            request("/p/x/", "Ada", "a@x.org", "Hi"),
        )
        .await;
        assert!(enq.requests.lock().unwrap().is_empty());
    }
}
