// src/notify/mod.rs
//! Outbound notifications. The decision engine talks to the
//! `NotificationTransport` trait; the SMTP implementation lives in
//! `email.rs`. Tests substitute an in-memory transport.

pub mod email;

use anyhow::Result;

/// One outgoing message, already rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait::async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<()>;
}
