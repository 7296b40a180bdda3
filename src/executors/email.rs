//! Email-sending executor.
//!
//! Backed by `lettre`'s SMTP transport when `SMTP_HOST` is configured;
//! otherwise falls back to logging the message it would have sent. This
//! mirrors the notification channel pattern in commerce-style codebases,
//! where an unconfigured channel degrades to a log line rather than
//! failing every job.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;

use super::Executor;

#[derive(Debug, Deserialize)]
struct SendEmailPayload {
    to: String,
    subject: String,
    body: String,
}

enum Transport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    Logging,
}

/// Sends `SEND_EMAIL` jobs. Construct via [`EmailExecutor::from_config`].
pub struct EmailExecutor {
    transport: Transport,
    from: Mailbox,
}

impl EmailExecutor {
    /// Builds an SMTP-backed executor, or a logging fallback when `host`
    /// is `None` (matching an unconfigured notification channel).
    pub fn from_config(
        host: Option<&str>,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        from: &str,
    ) -> Result<Self, String> {
        let from: Mailbox = from.parse().map_err(|e| format!("invalid from address: {e}"))?;

        let transport = match host {
            Some(host) => {
                let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                    .port(port);
                if let (Some(username), Some(password)) = (username, password) {
                    builder = builder
                        .credentials(Credentials::new(username.to_string(), password.to_string()));
                }
                Transport::Smtp(builder.build())
            }
            None => {
                tracing::warn!("SMTP_HOST not set; email executor will log messages instead of sending them");
                Transport::Logging
            }
        };

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Executor for EmailExecutor {
    async fn execute(&self, payload: &serde_json::Value) -> Result<serde_json::Value, String> {
        let request: SendEmailPayload =
            serde_json::from_value(payload.clone()).map_err(|e| format!("invalid payload: {e}"))?;

        let to: Mailbox = request
            .to
            .parse()
            .map_err(|e| format!("invalid recipient address: {e}"))?;

        match &self.transport {
            Transport::Logging => {
                tracing::info!(
                    to = %request.to,
                    subject = %request.subject,
                    "logging email (no SMTP configured)"
                );
                Ok(serde_json::json!({ "delivered": false, "mode": "logged" }))
            }
            Transport::Smtp(transport) => {
                let message = Message::builder()
                    .from(self.from.clone())
                    .to(to)
                    .subject(request.subject)
                    .body(request.body)
                    .map_err(|e| format!("failed to build message: {e}"))?;

                transport
                    .send(message)
                    .await
                    .map_err(|e| format!("smtp send failed: {e}"))?;

                Ok(serde_json::json!({ "delivered": true, "mode": "smtp" }))
            }
        }
    }
}
