//! The email job record and its lifecycle.
//!
//! An [`EmailJob`] starts `Pending` and moves exactly once to either `Sent`
//! or `Failed`. The transition methods are the only way to change `status`,
//! and they keep `sent_time` / `delivery_error` consistent with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{CourierError, Result};

/// Maximum recipient length, in characters.
pub const MAX_RECIPIENT_CHARS: usize = 100;

/// Maximum subject length, in characters.
pub const MAX_SUBJECT_CHARS: usize = 200;

// ═══════════════════════════════════════════════════════════════════════════════
// Identification
// ═══════════════════════════════════════════════════════════════════════════════

/// Unique identifier for an email job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailJobId(pub Uuid);

impl EmailJobId {
    /// Create a new random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EmailJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EmailJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EmailJobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Delivery status of an email job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    /// Waiting for its single delivery attempt
    Pending,
    /// Accepted by the relay
    Sent,
    /// The delivery attempt failed
    Failed,
}

impl EmailStatus {
    /// `Sent` and `Failed` never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmailStatus {
    type Err = CourierError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => Err(CourierError::internal(format!(
                "unknown email status in storage: {}",
                other
            ))),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Creation Input
// ═══════════════════════════════════════════════════════════════════════════════

/// Input for creating an email job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEmailJob {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub scheduled_time: Option<DateTime<Utc>>,
}

impl NewEmailJob {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            scheduled_time: None,
        }
    }

    /// Defer delivery until `at`.
    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_time = Some(at);
        self
    }

    /// Reject blank or oversized fields.
    ///
    /// Address syntax is deliberately not checked here; the relay is the
    /// authority on what it accepts and a rejection is recorded on the job.
    pub fn validate(&self) -> Result<()> {
        if self.recipient.trim().is_empty() {
            return Err(CourierError::missing_field("recipient"));
        }
        if self.subject.trim().is_empty() {
            return Err(CourierError::missing_field("subject"));
        }
        if self.body.trim().is_empty() {
            return Err(CourierError::missing_field("body"));
        }
        if self.recipient.trim().chars().count() > MAX_RECIPIENT_CHARS {
            return Err(CourierError::field_too_long("recipient", MAX_RECIPIENT_CHARS));
        }
        if self.subject.chars().count() > MAX_SUBJECT_CHARS {
            return Err(CourierError::field_too_long("subject", MAX_SUBJECT_CHARS));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Email Job
// ═══════════════════════════════════════════════════════════════════════════════

/// One outbound message request and the outcome of its delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailJob {
    pub id: EmailJobId,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub status: EmailStatus,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub sent_time: Option<DateTime<Utc>>,
    pub delivery_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EmailJob {
    /// Build a fresh `Pending` job from validated input.
    pub fn create(input: NewEmailJob) -> Result<Self> {
        input.validate()?;
        Ok(Self {
            id: EmailJobId::new(),
            recipient: input.recipient.trim().to_string(),
            subject: input.subject,
            body: input.body,
            status: EmailStatus::Pending,
            scheduled_time: input.scheduled_time,
            sent_time: None,
            delivery_error: None,
            created_at: Utc::now(),
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the job may be attempted at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == EmailStatus::Pending
            && self.scheduled_time.map_or(true, |at| at <= now)
    }

    /// `Pending -> Sent`.
    pub fn mark_sent(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.ensure_pending()?;
        self.status = EmailStatus::Sent;
        self.sent_time = Some(at);
        self.delivery_error = None;
        Ok(())
    }

    /// `Pending -> Failed`.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<()> {
        self.ensure_pending()?;
        self.status = EmailStatus::Failed;
        self.sent_time = None;
        self.delivery_error = Some(reason.into());
        Ok(())
    }

    fn ensure_pending(&self) -> Result<()> {
        if self.is_terminal() {
            return Err(CourierError::email_job_conflict(self.id, self.status));
        }
        Ok(())
    }
}
