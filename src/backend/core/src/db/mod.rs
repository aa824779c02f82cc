//! Database layer for Courier.
//!
//! Uses PostgreSQL for persistent storage with sqlx.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::email::{EmailJob, EmailJobId, EmailStatus, NewEmailJob};
use crate::error::{CourierError, Result};
use crate::store::EmailJobStore;

/// Database connection and operations.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check connectivity with a trivial round trip.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn fetch_status(&self, id: EmailJobId) -> Result<Option<String>> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM email_jobs WHERE id = $1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(status)
    }
}

#[async_trait]
impl EmailJobStore for Database {
    async fn create(&self, input: NewEmailJob) -> Result<EmailJob> {
        let job = EmailJob::create(input)?;

        sqlx::query(
            r#"
            INSERT INTO email_jobs (id, recipient, subject, body, status, scheduled_time, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(job.id.0)
        .bind(&job.recipient)
        .bind(&job.subject)
        .bind(&job.body)
        .bind(job.status.as_str())
        .bind(job.scheduled_time)
        .bind(job.created_at)
        .execute(&self.pool)
        .await?;

        Ok(job)
    }

    async fn get_by_id(&self, id: EmailJobId) -> Result<EmailJob> {
        let row = sqlx::query_as::<_, EmailJobRow>(
            r#"
            SELECT id, recipient, subject, body, status,
                   scheduled_time, sent_time, delivery_error, created_at
            FROM email_jobs
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| CourierError::email_job_not_found(id))?
            .try_into()
    }

    async fn update(&self, job: &EmailJob) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE email_jobs
            SET status = $2, sent_time = $3, delivery_error = $4
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(job.id.0)
        .bind(job.status.as_str())
        .bind(job.sent_time)
        .bind(&job.delivery_error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        match self.fetch_status(job.id).await? {
            None => Err(CourierError::email_job_not_found(job.id)),
            Some(status) => Err(CourierError::email_job_conflict(job.id, status)),
        }
    }

    async fn due_jobs(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<EmailJob>> {
        let rows = sqlx::query_as::<_, EmailJobRow>(
            r#"
            SELECT id, recipient, subject, body, status,
                   scheduled_time, sent_time, delivery_error, created_at
            FROM email_jobs
            WHERE status = 'pending'
              AND (scheduled_time IS NULL OR scheduled_time <= $1)
            ORDER BY COALESCE(scheduled_time, created_at), created_at
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EmailJob::try_from).collect()
    }

    async fn list(&self, limit: usize, offset: usize) -> Result<Vec<EmailJob>> {
        let rows = sqlx::query_as::<_, EmailJobRow>(
            r#"
            SELECT id, recipient, subject, body, status,
                   scheduled_time, sent_time, delivery_error, created_at
            FROM email_jobs
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EmailJob::try_from).collect()
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM email_jobs")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Row Types (for sqlx queries)
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
pub struct EmailJobRow {
    pub id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub status: String,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub sent_time: Option<DateTime<Utc>>,
    pub delivery_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<EmailJobRow> for EmailJob {
    type Error = CourierError;

    fn try_from(row: EmailJobRow) -> Result<Self> {
        Ok(Self {
            id: EmailJobId(row.id),
            recipient: row.recipient,
            subject: row.subject,
            body: row.body,
            status: row.status.parse::<EmailStatus>()?,
            scheduled_time: row.scheduled_time,
            sent_time: row.sent_time,
            delivery_error: row.delivery_error,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> EmailJobRow {
        EmailJobRow {
            id: Uuid::new_v4(),
            recipient: "a@example.com".to_string(),
            subject: "Hi".to_string(),
            body: "Test".to_string(),
            status: status.to_string(),
            scheduled_time: None,
            sent_time: None,
            delivery_error: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_conversion() {
        let row = row("pending");
        let id = row.id;
        let job = EmailJob::try_from(row).unwrap();
        assert_eq!(job.id, EmailJobId(id));
        assert_eq!(job.status, EmailStatus::Pending);
    }

    #[test]
    fn test_row_with_unknown_status_is_rejected() {
        assert!(EmailJob::try_from(row("delivered")).is_err());
    }
}
