//! Verification code delivery.
//!
//! Uses SMTP via lettre for delivery with Askama templates. Without SMTP
//! configuration the server falls back to [`LogNotifier`].

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use boxlane_core::{CodeDelivery, CodePurpose, Notifier, NotifyError};

use crate::config::EmailConfig;

const EXPIRY_FORMAT: &str = "%H:%M UTC on %d %b %Y";

#[derive(Template)]
#[template(path = "email/verification_code.html")]
struct VerificationCodeEmailHtml<'a> {
    code: &'a str,
    expires_at: &'a str,
}

#[derive(Template)]
#[template(path = "email/verification_code.txt")]
struct VerificationCodeEmailText<'a> {
    code: &'a str,
    expires_at: &'a str,
}

#[derive(Template)]
#[template(path = "email/password_reset.html")]
struct PasswordResetEmailHtml<'a> {
    code: &'a str,
    expires_at: &'a str,
}

#[derive(Template)]
#[template(path = "email/password_reset.txt")]
struct PasswordResetEmailText<'a> {
    code: &'a str,
    expires_at: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Sends codes by email.
#[derive(Clone)]
pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl EmailNotifier {
    /// Create a notifier from SMTP configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    async fn deliver(&self, delivery: &CodeDelivery) -> Result<(), EmailError> {
        let code = delivery.code.as_str();
        let expires = delivery.expires_at.format(EXPIRY_FORMAT).to_string();
        let expires_at = expires.as_str();

        let (subject, text, html) = match delivery.purpose {
            CodePurpose::Registration => (
                "Your Boxlane verification code",
                VerificationCodeEmailText { code, expires_at }.render()?,
                VerificationCodeEmailHtml { code, expires_at }.render()?,
            ),
            CodePurpose::PasswordReset => (
                "Reset your Boxlane password",
                PasswordResetEmailText { code, expires_at }.render()?,
                PasswordResetEmailHtml { code, expires_at }.render()?,
            ),
        };

        self.send_multipart_email(delivery.email.as_str(), subject, &text, &html)
            .await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        self.mailer.send(email).await?;

        Ok(())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send_code(&self, delivery: &CodeDelivery) -> Result<(), NotifyError> {
        self.deliver(delivery)
            .await
            .map_err(|e| NotifyError(e.to_string()))?;

        tracing::info!(
            account_id = %delivery.account_id,
            to = %delivery.email.redacted(),
            purpose = %delivery.purpose,
            "Verification code emailed"
        );
        Ok(())
    }
}

/// Development notifier that writes codes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_code(&self, delivery: &CodeDelivery) -> Result<(), NotifyError> {
        tracing::warn!(
            account_id = %delivery.account_id,
            purpose = %delivery.purpose,
            code = %delivery.code.as_str(),
            expires_at = %delivery.expires_at,
            "SMTP not configured; verification code logged instead of sent"
        );
        Ok(())
    }
}
