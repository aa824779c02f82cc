//! SMTP relay transport built on lettre.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use super::{DeliveryFailure, MailTransport, OutboundMessage, RelayConfig, TlsMode, TIMEOUT_REASON};
use crate::error::{CourierError, Result};

/// Sends through a configured SMTP relay.
///
/// lettre's connection pool is not compiled in, so each `send` connects,
/// authenticates, transmits and issues `QUIT` on its own session. The session
/// is closed on error paths as well.
#[derive(Clone)]
pub struct SmtpMailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    relay: String,
}

impl SmtpMailTransport {
    pub fn from_config(config: RelayConfig) -> Result<Self> {
        let from: Mailbox = config.from.parse().map_err(|_| {
            CourierError::configuration(format!("invalid sender address: {}", config.from))
        })?;

        let mut builder = match config.tls {
            TlsMode::Plain => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| CourierError::configuration(format!("relay setup failed: {}", e)))?,
            TlsMode::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| CourierError::configuration(format!("relay setup failed: {}", e)))?,
        };

        builder = builder.port(config.port).timeout(Some(config.timeout));

        if let (Some(username), Some(password)) = (config.username, config.password) {
            builder = builder.credentials(Credentials::new(username, password));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            relay: format!("{}:{}", config.host, config.port),
        })
    }

    fn build_message(&self, message: &OutboundMessage) -> std::result::Result<Message, DeliveryFailure> {
        let to: Mailbox = message
            .recipient
            .parse()
            .map_err(|_| DeliveryFailure::new(format!("invalid recipient address: {}", message.recipient)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| DeliveryFailure::new(format!("message build failed: {}", e)))
    }
}

/// Collapse a lettre error into the short reason stored on the job.
fn failure_reason(error: &lettre::transport::smtp::Error) -> String {
    if error.is_timeout() {
        TIMEOUT_REASON.to_string()
    } else if error.is_permanent() {
        format!("relay rejected message: {}", error)
    } else if error.is_transient() {
        format!("relay temporarily unavailable: {}", error)
    } else {
        error.to_string()
    }
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, message: &OutboundMessage) -> std::result::Result<(), DeliveryFailure> {
        let email = self.build_message(message)?;

        debug!(relay = %self.relay, recipient = %message.recipient, "Sending message");

        self.transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(|e| DeliveryFailure::new(failure_reason(&e)))
    }
}
