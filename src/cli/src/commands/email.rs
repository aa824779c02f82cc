//! Email job commands.
//!
//! Provides send, get, list, and deliver operations for email jobs.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use uuid::Uuid;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

const EMAILS_PATH: &str = "/api/v1/emails";

#[derive(Subcommand)]
pub enum EmailCommands {
    /// Queue a new email job
    Send {
        /// Recipient address
        #[arg(short, long)]
        to: String,

        /// Subject line
        #[arg(short, long)]
        subject: String,

        /// Message body
        #[arg(short, long)]
        body: String,

        /// Send no earlier than this RFC 3339 timestamp
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Show a single email job
    Get {
        /// Email job ID
        id: Uuid,
    },

    /// List email jobs, newest first
    List {
        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Number of jobs to skip
        #[arg(long, default_value = "0")]
        offset: usize,
    },

    /// Trigger delivery of a pending job
    Deliver {
        /// Email job ID
        id: Uuid,

        /// Wait for the send attempt to finish and report its outcome
        #[arg(short, long)]
        wait: bool,
    },
}

// ── API types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CreateEmailRequest {
    recipient: String,
    subject: String,
    body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scheduled_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Serialize)]
struct EmailJob {
    id: Uuid,
    recipient: String,
    subject: String,
    body: String,
    status: String,
    scheduled_time: Option<DateTime<Utc>>,
    sent_time: Option<DateTime<Utc>>,
    delivery_error: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize)]
struct EmailJobPage {
    items: Vec<EmailJob>,
    total: u64,
    limit: usize,
    offset: usize,
}

#[derive(Debug, Deserialize, Serialize)]
struct DeliveryOutcome {
    outcome: String,
    job: EmailJob,
}

#[derive(Tabled, Serialize)]
struct EmailRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Recipient")]
    recipient: String,
    #[tabled(rename = "Subject")]
    subject: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Scheduled")]
    scheduled: String,
    #[tabled(rename = "Sent")]
    sent: String,
    #[tabled(rename = "Error")]
    error: String,
}

impl From<&EmailJob> for EmailRow {
    fn from(job: &EmailJob) -> Self {
        Self {
            id: short_id(&job.id),
            recipient: job.recipient.clone(),
            subject: truncate(&job.subject, 40),
            status: job.status.clone(),
            scheduled: format_time(job.scheduled_time),
            sent: format_time(job.sent_time),
            error: job
                .delivery_error
                .as_deref()
                .map(|e| truncate(e, 40))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

fn short_id(id: &Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn format_time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

fn print_job_details(job: &EmailJob) {
    output::print_detail("ID", &job.id.to_string());
    output::print_detail("Recipient", &job.recipient);
    output::print_detail("Subject", &job.subject);
    output::print_detail("Status", &job.status);
    output::print_detail("Scheduled", &format_time(job.scheduled_time));
    output::print_detail("Sent", &format_time(job.sent_time));
    if let Some(error) = &job.delivery_error {
        output::print_detail("Error", error);
    }
    output::print_detail("Created", &format_time(Some(job.created_at)));
}

// ── Execution ───────────────────────────────────────────────────────────────

pub async fn execute(cmd: EmailCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        EmailCommands::Send {
            to,
            subject,
            body,
            at,
        } => {
            let request = CreateEmailRequest {
                recipient: to,
                subject,
                body,
                scheduled_time: at,
            };

            let job: EmailJob = client.post(EMAILS_PATH, &request).await?;

            match format {
                OutputFormat::Table => {
                    output::print_success("Email job queued");
                    print_job_details(&job);
                }
                _ => output::print_item(&job, format)?,
            }
        }

        EmailCommands::Get { id } => {
            let job: EmailJob = client.get(&format!("{}/{}", EMAILS_PATH, id)).await?;

            match format {
                OutputFormat::Table => {
                    output::print_header(&format!("Email job: {}", id));
                    print_job_details(&job);
                }
                _ => output::print_item(&job, format)?,
            }
        }

        EmailCommands::List { limit, offset } => {
            let page: EmailJobPage = client
                .get(&format!("{}?limit={}&offset={}", EMAILS_PATH, limit, offset))
                .await?;

            match format {
                OutputFormat::Table => {
                    let rows: Vec<EmailRow> = page.items.iter().map(EmailRow::from).collect();
                    output::print_list(&rows, format)?;
                    output::print_info(&format!(
                        "Showing {} of {} job(s) from offset {}",
                        page.items.len(),
                        page.total,
                        page.offset
                    ));
                }
                _ => output::print_item(&page, format)?,
            }
        }

        EmailCommands::Deliver { id, wait } => {
            let path = format!("{}/{}/deliver", EMAILS_PATH, id);

            if wait {
                let outcome: DeliveryOutcome =
                    client.post_empty(&format!("{}?wait=true", path)).await?;

                match format {
                    OutputFormat::Table => {
                        match outcome.outcome.as_str() {
                            "sent" => output::print_success("Email sent"),
                            "failed" => output::print_error("Delivery failed"),
                            _ => output::print_info(&format!(
                                "Job already {}, nothing to do",
                                outcome.job.status
                            )),
                        }
                        print_job_details(&outcome.job);
                    }
                    _ => output::print_item(&outcome, format)?,
                }
            } else {
                let job: EmailJob = client.post_empty(&path).await?;

                match format {
                    OutputFormat::Table => {
                        if job.status == "pending" {
                            output::print_success(&format!("Delivery of {} queued", id));
                        } else {
                            output::print_info(&format!("Job already {}, nothing to do", job.status));
                        }
                    }
                    _ => output::print_item(&job, format)?,
                }
            }
        }
    }

    Ok(())
}
