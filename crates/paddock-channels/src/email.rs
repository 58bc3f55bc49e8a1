//! Email channel — SMTP sending via async lettre.

use async_trait::async_trait;

use paddock_core::config::EmailConfig;
use paddock_core::model::Channel;

use crate::{ChannelSender, NotificationPayload, SendError};

/// SMTP sender. The target is the recipient address.
pub struct EmailSender {
    config: EmailConfig,
}

impl EmailSender {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), SendError> {
        use lettre::{
            AsyncSmtpTransport, AsyncTransport, Message as LettreMessage, message::Mailbox,
            message::header::ContentType, transport::smtp::authentication::Credentials,
        };

        let from_name = self.config.display_name.as_deref().unwrap_or("Paddock");
        let from_mailbox: Mailbox = format!("{from_name} <{}>", self.config.from_address)
            .parse()
            .map_err(|e| SendError::transport(format!("Invalid from: {e}")))?;

        // An unparseable recipient is a dead target, not a transient fault.
        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e| SendError::invalid_target(format!("Invalid recipient {to}: {e}")))?;

        let email = LettreMessage::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| SendError::transport(format!("Build email: {e}")))?;

        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());

        let mailer =
            AsyncSmtpTransport::<lettre::Tokio1Executor>::starttls_relay(&self.config.smtp_host)
                .map_err(|e| SendError::transport(format!("SMTP relay: {e}")))?
                .port(self.config.smtp_port)
                .credentials(creds)
                .build();

        mailer
            .send(email)
            .await
            .map_err(|e| SendError::transport(format!("SMTP send: {e}")))?;

        tracing::info!("📤 Email sent to: {to}");
        Ok(())
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, target: &str, payload: &NotificationPayload) -> Result<(), SendError> {
        self.send_email(target, &payload.title, &payload.body).await
    }
}
