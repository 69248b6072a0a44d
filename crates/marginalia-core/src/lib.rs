//! marginalia-core — configuration model and shared primitives.
//!
//! Holds the pieces every other crate leans on: the immutable [`Config`]
//! snapshot loaded at startup, the HMAC decision-token signer/verifier,
//! trusted-proxy client IP resolution, and Argon2id password hashing for
//! admin users.

pub mod config;
pub mod netutil;
pub mod password;
pub mod token;

pub use config::{
    AuthConfig, CaptchaConfig, Config, GitConfig, HugoConfig, ServerConfig, SiteConfig,
    SmtpConfig, SqliteConfig, ThemeConfig, TlsPolicy,
};
pub use token::{Action, Decision, TokenError, DECISION_TOKEN_TTL_SECS};
