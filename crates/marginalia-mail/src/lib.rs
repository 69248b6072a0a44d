//! marginalia-mail — outbound SMTP and moderation mail composition.

mod moderation;

pub use moderation::{build_moderation_mail, ModerationMailInput};

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use marginalia_core::{SmtpConfig, TlsPolicy};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("no recipients configured")]
    NoRecipients,
    #[error("invalid mail address {0:?}")]
    InvalidAddress(String),
    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("smtp transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Plain-text mail sender over the configured SMTP relay.
#[derive(Clone)]
pub struct Mailer {
    config: SmtpConfig,
}

impl Mailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
        let host = self.config.host.as_str();
        let port = self.config.port.filter(|p| *p > 0);

        let mut builder = match self.config.tls_policy {
            TlsPolicy::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .port(port.unwrap_or(25)),
            TlsPolicy::Opportunistic => {
                let params = TlsParameters::new(host.to_string())?;
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                    .port(port.unwrap_or(587))
                    .tls(Tls::Opportunistic(params))
            }
            TlsPolicy::Mandatory => {
                let params = TlsParameters::new(host.to_string())?;
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                    .port(port.unwrap_or(587))
                    .tls(Tls::Required(params))
            }
        };

        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            if !user.is_empty() && !pass.is_empty() {
                builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
            }
        }

        Ok(builder.build())
    }

    /// Send a plain-text mail to all recipients in one message.
    pub async fn send_text(
        &self,
        recipients: &[String],
        subject: &str,
        body: &str,
    ) -> Result<(), MailError> {
        if recipients.is_empty() {
            return Err(MailError::NoRecipients);
        }

        let from = self
            .config
            .from
            .parse()
            .map_err(|_| MailError::InvalidAddress(self.config.from.clone()))?;

        let mut builder = Message::builder()
            .from(from)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for rcpt in recipients {
            let to = rcpt
                .parse()
                .map_err(|_| MailError::InvalidAddress(rcpt.clone()))?;
            builder = builder.to(to);
        }

        let message = builder.body(body.to_string())?;
        self.transport()?.send(message).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp_config() -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.org".to_string(),
            port: Some(587),
            from: "noreply@example.org".to_string(),
            username: None,
            password: None,
            tls_policy: TlsPolicy::Mandatory,
        }
    }

    #[tokio::test]
    async fn empty_recipients_rejected() {
        let mailer = Mailer::new(smtp_config());
        let err = mailer.send_text(&[], "s", "b").await.unwrap_err();
        assert!(matches!(err, MailError::NoRecipients));
    }

    #[tokio::test]
    async fn invalid_from_rejected_before_transport() {
        let mut config = smtp_config();
        config.from = "not an address".to_string();
        let mailer = Mailer::new(config);
        let err = mailer
            .send_text(&["a@example.org".to_string()], "s", "b")
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn invalid_recipient_rejected_before_transport() {
        let mailer = Mailer::new(smtp_config());
        let err = mailer
            .send_text(&["<<garbage".to_string()], "s", "b")
            .await
            .unwrap_err();
        assert!(matches!(err, MailError::InvalidAddress(_)));
    }
}
