//! Mail outbox drain.
//!
//! Issuance writes one `mail_outbox` row per login token, in the same
//! transaction that stores the token, so the dispatch signal and the token
//! cannot disagree. This module only drains that queue: due rows are handed
//! to an [`EmailSender`], and delivery itself belongs to whatever implements
//! the trait (the default implementation logs, which is what local dev
//! wants).
//!
//! Claiming a batch bumps each row's attempt counter and parks it past the
//! retry delay in the same statement. A worker that crashes mid-delivery
//! leaves its rows schedulable again, and a second worker cannot grab them
//! in the meantime.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// One outbox row on its way to a sender.
#[derive(Clone, Debug)]
pub struct OutboxMail {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

/// Delivery seam; implement this to wire a real transport.
pub trait EmailSender: Send + Sync {
    /// Deliver a mail or return an error to get the row retried.
    fn send(&self, mail: &OutboxMail) -> Result<()>;
}

/// Default sender for local development: log, don't deliver.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, mail: &OutboxMail) -> Result<()> {
        info!(
            to_email = %mail.to_email,
            template = %mail.template,
            payload = %mail.payload_json,
            "would send mail"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MailerConfig {
    poll_interval: Duration,
    batch_size: i64,
    max_attempts: i32,
    retry_delay: Duration,
}

impl MailerConfig {
    /// Defaults: poll every 5s, claim 10 rows, 5 attempts, 60s between retries.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            retry_delay: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds.max(1));
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = i64::try_from(batch_size).unwrap_or(i64::MAX).max(1);
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = i32::try_from(max_attempts).unwrap_or(i32::MAX).max(1);
        self
    }

    /// A zero delay would let a second worker claim a row mid-delivery,
    /// so the floor is one second.
    #[must_use]
    pub fn with_retry_delay_seconds(mut self, seconds: u64) -> Self {
        self.retry_delay = Duration::from_secs(seconds.max(1));
        self
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn batch_size(&self) -> i64 {
        self.batch_size
    }

    #[must_use]
    pub fn max_attempts(&self) -> i32 {
        self.max_attempts
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self::new()
    }
}

struct ClaimedMail {
    id: Uuid,
    attempts: i32,
    mail: OutboxMail,
}

/// Spawn the background task that drains the mail outbox.
pub fn spawn_outbox_worker(
    pool: PgPool,
    sender: Arc<dyn EmailSender>,
    config: MailerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match drain_due_mail(&pool, sender.as_ref(), &config).await {
                Ok(0) => {}
                Ok(drained) => info!(drained, "mail outbox drained"),
                Err(err) => error!("mail outbox drain failed: {err}"),
            }
        }
    })
}

async fn drain_due_mail(
    pool: &PgPool,
    sender: &dyn EmailSender,
    config: &MailerConfig,
) -> Result<usize> {
    let claimed = claim_due_mail(pool, config).await?;
    let drained = claimed.len();

    for ClaimedMail { id, attempts, mail } in claimed {
        match sender.send(&mail) {
            Ok(()) => mark_sent(pool, id).await?,
            // `attempts` is already bumped for this try, so hitting the
            // budget here means this was the last allowed attempt.
            Err(err) if attempts >= config.max_attempts() => {
                warn!(to_email = %mail.to_email, attempts, "giving up on mail: {err}");
                mark_failed(pool, id, &err.to_string()).await?;
            }
            Err(err) => {
                warn!(to_email = %mail.to_email, attempts, "mail delivery failed, will retry: {err}");
                record_attempt_error(pool, id, &err.to_string()).await?;
            }
        }
    }

    Ok(drained)
}

async fn claim_due_mail(pool: &PgPool, config: &MailerConfig) -> Result<Vec<ClaimedMail>> {
    let query = r"
        WITH due AS (
            SELECT id
            FROM mail_outbox
            WHERE status = 'pending'
              AND next_attempt_at <= NOW()
            ORDER BY next_attempt_at ASC, created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        UPDATE mail_outbox
        SET attempts = mail_outbox.attempts + 1,
            next_attempt_at = NOW() + ($2 * INTERVAL '1 second')
        FROM due
        WHERE mail_outbox.id = due.id
        RETURNING mail_outbox.id,
                  mail_outbox.to_email,
                  mail_outbox.template,
                  mail_outbox.payload_json::text AS payload_json,
                  mail_outbox.attempts
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let retry_seconds = i64::try_from(config.retry_delay().as_secs()).unwrap_or(i64::MAX);
    let rows = sqlx::query(query)
        .bind(config.batch_size())
        .bind(retry_seconds)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to claim due mail")?;

    Ok(rows
        .into_iter()
        .map(|row| ClaimedMail {
            id: row.get("id"),
            attempts: row.get("attempts"),
            mail: OutboxMail {
                to_email: row.get("to_email"),
                template: row.get("template"),
                payload_json: row.get("payload_json"),
            },
        })
        .collect())
}

async fn mark_sent(pool: &PgPool, id: Uuid) -> Result<()> {
    let query = r"
        UPDATE mail_outbox
        SET status = 'sent', sent_at = NOW(), last_error = NULL
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to mark mail sent")?;
    Ok(())
}

async fn mark_failed(pool: &PgPool, id: Uuid, last_error: &str) -> Result<()> {
    let query = r"
        UPDATE mail_outbox
        SET status = 'failed', last_error = $2
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(last_error)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to mark mail failed")?;
    Ok(())
}

/// The claim already parked the row past the retry delay; only the error
/// text needs recording.
async fn record_attempt_error(pool: &PgPool, id: Uuid, last_error: &str) -> Result<()> {
    let query = "UPDATE mail_outbox SET last_error = $2 WHERE id = $1";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(last_error)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to record mail attempt error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sender_accepts_mail() {
        let sender = LogEmailSender;
        let mail = OutboxMail {
            to_email: "a@example.com".to_string(),
            template: "login_link".to_string(),
            payload_json: "{}".to_string(),
        };
        assert!(sender.send(&mail).is_ok());
    }

    #[test]
    fn config_defaults() {
        let config = MailerConfig::new();
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.batch_size(), 10);
        assert_eq!(config.max_attempts(), 5);
        assert_eq!(config.retry_delay(), Duration::from_secs(60));
    }

    #[test]
    fn builders_floor_degenerate_settings() {
        let config = MailerConfig::new()
            .with_poll_interval_seconds(0)
            .with_batch_size(0)
            .with_max_attempts(0)
            .with_retry_delay_seconds(0);

        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.batch_size(), 1);
        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
    }

    #[test]
    fn builders_apply_overrides() {
        let config = MailerConfig::new()
            .with_poll_interval_seconds(2)
            .with_batch_size(25)
            .with_max_attempts(3)
            .with_retry_delay_seconds(120);

        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.batch_size(), 25);
        assert_eq!(config.max_attempts(), 3);
        assert_eq!(config.retry_delay(), Duration::from_secs(120));
    }
}
