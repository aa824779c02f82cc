//! Outbound mail transport.
//!
//! A [`MailTransport`] makes exactly one attempt to hand a message to the
//! relay. Every way that attempt can go wrong (authentication, network,
//! protocol, a recipient the relay refuses) comes back as a
//! [`DeliveryFailure`] carrying a short reason string that is stored on the
//! job as-is.

mod recording;
mod smtp;

pub use recording::RecordingTransport;
pub use smtp::SmtpMailTransport;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::email::EmailJob;

/// Reason recorded when a send exceeds its time budget.
pub const TIMEOUT_REASON: &str = "timeout";

/// Sends one message per call.
#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    /// Open a session, transmit `message`, and close the session.
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryFailure>;
}

/// The parts of a job that go on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl OutboundMessage {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

impl From<&EmailJob> for OutboundMessage {
    fn from(job: &EmailJob) -> Self {
        Self::new(&job.recipient, &job.subject, &job.body)
    }
}

/// A failed send attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("delivery failed: {reason}")]
pub struct DeliveryFailure {
    pub reason: String,
}

impl DeliveryFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::new(TIMEOUT_REASON)
    }

    pub fn is_timeout(&self) -> bool {
        self.reason == TIMEOUT_REASON
    }
}

/// How the session to the relay is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Plain connect, then upgrade with STARTTLS (port 587)
    #[default]
    #[serde(rename = "starttls")]
    StartTls,
    /// TLS from the first byte (port 465)
    Tls,
    /// No encryption; local relays and test servers only
    #[serde(rename = "none")]
    Plain,
}

/// Relay connection parameters handed to [`SmtpMailTransport::from_config`].
#[derive(Clone)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("from", &self.from)
            .field("tls", &self.tls)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::email::NewEmailJob;

    #[test]
    fn test_outbound_message_from_job() {
        let job = EmailJob::create(NewEmailJob::new(" a@example.com ", "Hi", "Test")).unwrap();
        let message = OutboundMessage::from(&job);
        assert_eq!(message, OutboundMessage::new("a@example.com", "Hi", "Test"));
    }

    #[test]
    fn test_timeout_failure() {
        let failure = DeliveryFailure::timeout();
        assert!(failure.is_timeout());
        assert_eq!(failure.reason, "timeout");
        assert!(!DeliveryFailure::new("relay rejected recipient").is_timeout());
    }

    #[test]
    fn test_tls_mode_names() {
        let parse = |s: &str| serde_json::from_str::<TlsMode>(&format!("\"{}\"", s)).unwrap();
        assert_eq!(parse("starttls"), TlsMode::StartTls);
        assert_eq!(parse("tls"), TlsMode::Tls);
        assert_eq!(parse("none"), TlsMode::Plain);
    }
}
