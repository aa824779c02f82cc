//! Email job domain types.

pub mod job;

pub use job::{
    EmailJob, EmailJobId, EmailStatus, NewEmailJob, MAX_RECIPIENT_CHARS, MAX_SUBJECT_CHARS,
};
