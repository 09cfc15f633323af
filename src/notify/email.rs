// src/notify/email.rs
use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{NotificationTransport, OutboundMessage};

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailSender {
    /// SMTP relay from `SMTP_HOST` / `SMTP_USER` / `SMTP_PASS`; the sender
    /// address comes from config so dispatch and confirmation share it.
    pub fn from_env(from_email: &str) -> Result<Self> {
        let host = std::env::var("SMTP_HOST").context("SMTP_HOST missing")?;
        let user = std::env::var("SMTP_USER").context("SMTP_USER missing")?;
        let pass = std::env::var("SMTP_PASS").context("SMTP_PASS missing")?;

        let creds = Credentials::new(user, pass);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .context("invalid SMTP_HOST")?
            .credentials(creds)
            .build();

        let from = from_email
            .parse()
            .with_context(|| format!("invalid from address '{from_email}'"))?;
        Ok(Self { mailer, from })
    }
}

#[async_trait::async_trait]
impl NotificationTransport for EmailSender {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        let to: Mailbox = message
            .to
            .parse()
            .with_context(|| format!("invalid recipient '{}'", message.to))?;

        let msg = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&message.subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .context("build email")?;

        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }
}
