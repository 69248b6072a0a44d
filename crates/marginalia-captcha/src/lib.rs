//! marginalia-captcha — captcha provider verification.
//!
//! Supports Cloudflare Turnstile and hCaptcha. A provider verdict of
//! "not human" and a provider being unreachable are different failures:
//! the intake handler maps the former to `captcha_invalid` and the latter
//! to `captcha_verify_failed`.

use marginalia_core::CaptchaConfig;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

const TURNSTILE_VERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";
const HCAPTCHA_VERIFY_URL: &str = "https://api.hcaptcha.com/siteverify";

const VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("unknown captcha provider {0:?}")]
    UnknownProvider(String),
    #[error("captcha secret key is not configured")]
    MissingSecret,
    /// The provider could not be reached or answered garbage.
    #[error("captcha verification failed: {0}")]
    Unavailable(String),
}

/// The provider's verdict for a single token.
#[derive(Debug, Clone, Deserialize)]
pub struct Verdict {
    pub success: bool,
    #[serde(rename = "error-codes", default)]
    pub error_codes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProviderKind {
    Turnstile,
    Hcaptcha,
}

/// A configured captcha verifier for one site.
#[derive(Clone)]
pub struct Verifier {
    kind: ProviderKind,
    secret: String,
    client: reqwest::Client,
}

impl Verifier {
    /// Resolve a site's captcha config into a verifier. Returns `None`
    /// when no captcha is configured or it is disabled.
    pub fn from_config(config: Option<&CaptchaConfig>) -> Result<Option<Self>, CaptchaError> {
        let Some(config) = config else {
            return Ok(None);
        };
        if !config.enabled {
            return Ok(None);
        }

        let kind = match config.provider.trim().to_lowercase().as_str() {
            "turnstile" => ProviderKind::Turnstile,
            "hcaptcha" => ProviderKind::Hcaptcha,
            other => return Err(CaptchaError::UnknownProvider(other.to_string())),
        };
        if config.secret_key.trim().is_empty() {
            return Err(CaptchaError::MissingSecret);
        }

        let client = reqwest::Client::builder()
            .timeout(VERIFY_TIMEOUT)
            .build()
            .map_err(|e| CaptchaError::Unavailable(e.to_string()))?;

        Ok(Some(Self {
            kind,
            secret: config.secret_key.clone(),
            client,
        }))
    }

    /// Verify a token against the provider's siteverify endpoint.
    pub async fn verify(&self, token: &str, remote_ip: Option<&str>) -> Result<Verdict, CaptchaError> {
        let url = match self.kind {
            ProviderKind::Turnstile => TURNSTILE_VERIFY_URL,
            ProviderKind::Hcaptcha => HCAPTCHA_VERIFY_URL,
        };

        let mut form = vec![("secret", self.secret.as_str()), ("response", token)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        let resp = self
            .client
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|e| CaptchaError::Unavailable(e.to_string()))?;

        resp.json::<Verdict>()
            .await
            .map_err(|e| CaptchaError::Unavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled: bool, provider: &str, secret: &str) -> CaptchaConfig {
        CaptchaConfig {
            enabled,
            provider: provider.to_string(),
            secret_key: secret.to_string(),
        }
    }

    #[test]
    fn absent_or_disabled_resolves_to_none() {
        assert!(Verifier::from_config(None).unwrap().is_none());
        let cfg = config(false, "turnstile", "sk");
        assert!(Verifier::from_config(Some(&cfg)).unwrap().is_none());
    }

    #[test]
    fn known_providers_resolve() {
        for provider in ["turnstile", "hcaptcha", "Turnstile"] {
            let cfg = config(true, provider, "sk");
            assert!(Verifier::from_config(Some(&cfg)).unwrap().is_some(), "{provider}");
        }
    }

    #[test]
    fn unknown_provider_rejected() {
        let cfg = config(true, "recaptcha", "sk");
        assert!(matches!(
            Verifier::from_config(Some(&cfg)),
            Err(CaptchaError::UnknownProvider(_))
        ));
    }

    #[test]
    fn missing_secret_rejected() {
        let cfg = config(true, "turnstile", "  ");
        assert!(matches!(
            Verifier::from_config(Some(&cfg)),
            Err(CaptchaError::MissingSecret)
        ));
    }

    #[test]
    fn verdict_parses_provider_payload() {
        let verdict: Verdict =
            serde_json::from_str(r#"{"success": false, "error-codes": ["invalid-input-response"]}"#)
                .unwrap();
        assert!(!verdict.success);
        assert_eq!(verdict.error_codes, vec!["invalid-input-response"]);

        let verdict: Verdict = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(verdict.success);
        assert!(verdict.error_codes.is_empty());
    }
}
