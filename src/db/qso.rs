// QSO database operations

use async_trait::async_trait;
use sqlx::{Pool, Sqlite};

use super::schema::{DedupKey, QsoRecord};
use crate::adif::time_utils::format_timestamp;
use crate::error::QrzError;

/// Outcome of a guarded insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// Repository of imported QSOs
///
/// `insert_if_absent` must perform the duplicate check and the insert as one
/// atomic step.
#[async_trait]
pub trait QsoStore: Send + Sync {
    async fn contains(&self, key: &DedupKey) -> Result<bool, QrzError>;

    async fn insert_if_absent(&self, qso: &QsoRecord) -> Result<InsertOutcome, QrzError>;
}

/// SQLite-backed store; the UNIQUE(call_key, timestamp, band) constraint
/// makes the conflict-ignoring insert the duplicate check
#[derive(Clone)]
pub struct SqliteQsoStore {
    pool: Pool<Sqlite>,
}

impl SqliteQsoStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> Result<i64, QrzError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM qsos")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl QsoStore for SqliteQsoStore {
    async fn contains(&self, key: &DedupKey) -> Result<bool, QrzError> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM qsos WHERE call_key = ? AND timestamp = ? AND band = ? LIMIT 1",
        )
        .bind(&key.call_key)
        .bind(&key.timestamp)
        .bind(&key.band)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    async fn insert_if_absent(&self, qso: &QsoRecord) -> Result<InsertOutcome, QrzError> {
        let key = qso.dedup_key();
        let now = chrono::Utc::now().to_rfc3339();
        let adif_fields = serde_json::to_string(&qso.extensions)
            .map_err(|e| QrzError::Decode(format!("extension fields not serializable: {}", e)))?;

        let result = sqlx::query(
            r#"INSERT INTO qsos (
                uuid, call, call_key, timestamp, band, mode, freq,
                rst_sent, rst_rcvd, station_callsign, my_gridsquare, tx_pwr,
                name, email, country, gridsquare, sota_ref, pota_ref,
                qrz_logid, adif_fields, source, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'qrz', ?, ?)
            ON CONFLICT(call_key, timestamp, band) DO NOTHING"#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(qso.call.trim())
        .bind(&key.call_key)
        .bind(format_timestamp(&qso.timestamp))
        .bind(&qso.band)
        .bind(&qso.mode)
        .bind(qso.freq)
        .bind(&qso.rst_sent)
        .bind(&qso.rst_rcvd)
        .bind(&qso.station_callsign)
        .bind(&qso.my_gridsquare)
        .bind(qso.tx_pwr)
        .bind(&qso.name)
        .bind(&qso.email)
        .bind(&qso.country)
        .bind(&qso.gridsquare)
        .bind(&qso.sota_ref)
        .bind(&qso.pota_ref)
        .bind(&qso.qrz_logid)
        .bind(&adif_fields)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::Duplicate)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn sample_qso(call: &str, band: &str) -> QsoRecord {
        QsoRecord {
            call: call.to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 7, 30, 21, 0, 0).unwrap(),
            band: band.to_string(),
            mode: "FM".to_string(),
            freq: Some(438.95),
            rst_sent: None,
            rst_rcvd: None,
            station_callsign: Some("W1TEST".to_string()),
            my_gridsquare: None,
            tx_pwr: Some(8.0),
            name: None,
            email: None,
            country: None,
            gridsquare: None,
            sota_ref: None,
            pota_ref: None,
            qrz_logid: None,
            extensions: BTreeMap::from([("qth".to_string(), "Anywhere".to_string())]),
        }
    }

    #[tokio::test]
    async fn test_insert_then_duplicate() {
        let store = SqliteQsoStore::new(open_in_memory().await.unwrap());
        let qso = sample_qso("K2TEST", "70cm");

        assert!(!store.contains(&qso.dedup_key()).await.unwrap());
        assert_eq!(store.insert_if_absent(&qso).await.unwrap(), InsertOutcome::Inserted);
        assert!(store.contains(&qso.dedup_key()).await.unwrap());

        // Same key with different callsign case is still a duplicate
        let lower = sample_qso("k2test", "70cm");
        assert_eq!(store.insert_if_absent(&lower).await.unwrap(), InsertOutcome::Duplicate);

        let other_band = sample_qso("K2TEST", "2m");
        assert_eq!(store.insert_if_absent(&other_band).await.unwrap(), InsertOutcome::Inserted);

        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_extensions_stored_as_json() {
        let pool = open_in_memory().await.unwrap();
        let store = SqliteQsoStore::new(pool.clone());
        store.insert_if_absent(&sample_qso("K2TEST", "70cm")).await.unwrap();

        let json: String = sqlx::query_scalar("SELECT adif_fields FROM qsos")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(json, r#"{"qth":"Anywhere"}"#);
    }
}
