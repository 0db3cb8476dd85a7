// Import-run ledger and per-account leases
//
// The ledger answers "when did the last successful import finish" for
// MODIFIED fetches. Leases serialize imports for one account across
// processes sharing the database.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Pool, Row, Sqlite};

use crate::error::QrzError;

/// One finished run, as written to the ledger
#[derive(Debug, Clone)]
pub struct ImportRun {
    pub account: String,
    pub fetch_option: String,
    pub dry_run: bool,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub fetched_count: usize,
    pub inserted_count: usize,
    pub duplicate_count: usize,
    pub error_count: usize,
    pub error: Option<String>,
}

#[async_trait]
pub trait ImportLedger: Send + Sync {
    /// Completion time of the latest successful, non-dry run
    async fn last_successful_completion(&self, account: &str)
        -> Result<Option<DateTime<Utc>>, QrzError>;

    async fn record_run(&self, run: &ImportRun) -> Result<(), QrzError>;

    /// Take the account's lease unless another holder has an unexpired one
    async fn try_acquire_lease(&self, account: &str, holder: &str, ttl: Duration)
        -> Result<bool, QrzError>;

    async fn release_lease(&self, account: &str, holder: &str) -> Result<(), QrzError>;
}

#[derive(Clone)]
pub struct SqliteImportLedger {
    pool: Pool<Sqlite>,
}

impl SqliteImportLedger {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }
}

/// Fixed-width UTC form so string comparison orders correctly
fn ledger_time(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

#[async_trait]
impl ImportLedger for SqliteImportLedger {
    async fn last_successful_completion(
        &self,
        account: &str,
    ) -> Result<Option<DateTime<Utc>>, QrzError> {
        let row = sqlx::query(
            r#"SELECT completed_at FROM import_runs
               WHERE account = ? AND success = 1 AND dry_run = 0
               ORDER BY completed_at DESC
               LIMIT 1"#,
        )
        .bind(account)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let completed: String = row.get("completed_at");
        match DateTime::parse_from_rfc3339(&completed) {
            Ok(ts) => Ok(Some(ts.with_timezone(&Utc))),
            Err(e) => {
                log::warn!("Ignoring unparsable ledger time {:?}: {}", completed, e);
                Ok(None)
            }
        }
    }

    async fn record_run(&self, run: &ImportRun) -> Result<(), QrzError> {
        sqlx::query(
            r#"INSERT INTO import_runs (
                account, fetch_option, dry_run, success, started_at, completed_at,
                fetched_count, inserted_count, duplicate_count, error_count, error
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&run.account)
        .bind(&run.fetch_option)
        .bind(run.dry_run)
        .bind(run.success)
        .bind(ledger_time(&run.started_at))
        .bind(ledger_time(&run.completed_at))
        .bind(run.fetched_count as i64)
        .bind(run.inserted_count as i64)
        .bind(run.duplicate_count as i64)
        .bind(run.error_count as i64)
        .bind(&run.error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn try_acquire_lease(
        &self,
        account: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<bool, QrzError> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"INSERT INTO import_leases (account, holder, acquired_at, expires_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(account) DO UPDATE SET
                 holder = excluded.holder,
                 acquired_at = excluded.acquired_at,
                 expires_at = excluded.expires_at
               WHERE import_leases.expires_at < ?"#,
        )
        .bind(account)
        .bind(holder)
        .bind(ledger_time(&now))
        .bind(ledger_time(&(now + ttl)))
        .bind(ledger_time(&now))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn release_lease(&self, account: &str, holder: &str) -> Result<(), QrzError> {
        sqlx::query("DELETE FROM import_leases WHERE account = ? AND holder = ?")
            .bind(account)
            .bind(holder)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
