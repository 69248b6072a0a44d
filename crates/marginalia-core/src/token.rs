//! Signed decision tokens.
//!
//! A moderation decision link carries an opaque token of the form
//! `base64url(payload) "." base64url(HMAC-SHA256(secret, payload))` where
//! the payload is `{site_key}|{comment_id}|{action}|{expiry_unix}`.
//! Verification checks the signature (constant-time) before looking at
//! any payload field, and callers must verify before touching the store.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Decision links are valid for 72 hours from issuance.
pub const DECISION_TOKEN_TTL_SECS: i64 = 72 * 60 * 60;

/// The moderation action a token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Approve,
    Reject,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Approve => "approve",
            Action::Reject => "reject",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(Action::Approve),
            "reject" => Some(Action::Reject),
            _ => None,
        }
    }
}

/// A verified decision extracted from a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub comment_id: String,
    pub action: Action,
    pub expires_at: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Wrong overall structure or payload field count.
    #[error("malformed token")]
    Malformed,
    /// Payload or signature is not valid base64url.
    #[error("invalid token encoding")]
    BadEncoding,
    #[error("invalid token signature")]
    BadSignature,
    /// The site key in the URL does not match the one signed into the payload.
    #[error("token site mismatch")]
    SiteMismatch,
    #[error("token expired")]
    Expired,
}

/// Sign a decision token for the given site secret.
pub fn sign(secret: &str, site_key: &str, comment_id: &str, action: Action, expires_at: i64) -> String {
    let payload = format!("{site_key}|{comment_id}|{}|{expires_at}", action.as_str());
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(payload.as_bytes());
    let sig = mac.finalize().into_bytes();

    format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(payload.as_bytes()),
        URL_SAFE_NO_PAD.encode(sig)
    )
}

/// Verify a token against the site secret and the site key from the URL.
///
/// The expiry boundary is inclusive: a token is still valid at
/// `now == expires_at` and rejected at `now == expires_at + 1`.
pub fn verify(secret: &str, site_key: &str, token: &str, now: i64) -> Result<Decision, TokenError> {
    let (payload_b64, sig_b64) = token.split_once('.').ok_or(TokenError::Malformed)?;
    if sig_b64.contains('.') {
        return Err(TokenError::Malformed);
    }

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| TokenError::BadEncoding)?;
    let sig = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|_| TokenError::BadEncoding)?;

    // Signature first; nothing in the payload is trusted before this.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(&payload);
    mac.verify_slice(&sig).map_err(|_| TokenError::BadSignature)?;

    let payload = String::from_utf8(payload).map_err(|_| TokenError::Malformed)?;
    let fields: Vec<&str> = payload.split('|').collect();
    let [token_site, comment_id, action, exp] = fields.as_slice() else {
        return Err(TokenError::Malformed);
    };

    if *token_site != site_key {
        return Err(TokenError::SiteMismatch);
    }
    let action = Action::parse(action).ok_or(TokenError::Malformed)?;
    let expires_at: i64 = exp.parse().map_err(|_| TokenError::Malformed)?;
    if now > expires_at {
        return Err(TokenError::Expired);
    }

    Ok(Decision {
        comment_id: (*comment_id).to_string(),
        action,
        expires_at,
    })
}
