//! In-process transport that records what it was asked to send.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::{DeliveryFailure, MailTransport, OutboundMessage};

/// Records every message and answers with a configured outcome.
///
/// Clones share the same record, so a test can keep one handle while the
/// orchestrator owns another.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    messages: Mutex<Vec<OutboundMessage>>,
    default_failure: Option<String>,
    failures_by_recipient: HashMap<String, String>,
    delay: Option<Duration>,
}

impl RecordingTransport {
    /// Accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects everything with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self::builder().fail_all(reason).build()
    }

    pub fn builder() -> RecordingTransportBuilder {
        RecordingTransportBuilder::default()
    }

    /// Messages handed to `send`, in call order.
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.inner.messages.lock().clone()
    }

    pub fn send_count(&self) -> usize {
        self.inner.messages.lock().len()
    }
}

#[derive(Default)]
pub struct RecordingTransportBuilder {
    inner: Inner,
}

impl RecordingTransportBuilder {
    pub fn fail_all(mut self, reason: impl Into<String>) -> Self {
        self.inner.default_failure = Some(reason.into());
        self
    }

    pub fn fail_recipient(mut self, recipient: impl Into<String>, reason: impl Into<String>) -> Self {
        self.inner
            .failures_by_recipient
            .insert(recipient.into(), reason.into());
        self
    }

    /// Sleep before answering; a long delay stands in for a hung relay.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.inner.delay = Some(delay);
        self
    }

    pub fn build(self) -> RecordingTransport {
        RecordingTransport {
            inner: Arc::new(self.inner),
        }
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryFailure> {
        self.inner.messages.lock().push(message.clone());

        if let Some(delay) = self.inner.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(reason) = self.inner.failures_by_recipient.get(&message.recipient) {
            return Err(DeliveryFailure::new(reason.clone()));
        }
        match &self.inner.default_failure {
            Some(reason) => Err(DeliveryFailure::new(reason.clone())),
            None => Ok(()),
        }
    }
}
