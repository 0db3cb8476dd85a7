// Reconcile decoded records against the QSO store
//
// One bad record never aborts the run: decode, validation and storage
// failures are counted and described in the report, and processing moves on.

use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

use super::mapping::map_record;
use super::report::{ErrorDescriptor, ImportReport};
use crate::adif::parser::DecodedRecord;
use crate::db::qso::{InsertOutcome, QsoStore};
use crate::db::schema::DedupKey;
use crate::error::ErrorKind;

pub struct Reconciler<'a> {
    store: &'a dyn QsoStore,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn QsoStore) -> Self {
        Self { store }
    }

    /// Process records in decoded order.
    ///
    /// Dry runs never write; keys "inserted" earlier in the same dry run
    /// count as duplicates so the numbers match a live run.
    pub async fn reconcile<I>(&self, records: I, dry_run: bool, cancel: &CancellationToken) -> ImportReport
    where
        I: IntoIterator<Item = DecodedRecord>,
    {
        let mut report = ImportReport::new(dry_run);
        let mut dry_run_keys: HashSet<DedupKey> = HashSet::new();

        for (index, item) in records.into_iter().enumerate() {
            if cancel.is_cancelled() {
                log::warn!("Import cancelled after {} records", index);
                report.cancelled = true;
                break;
            }

            let raw = match item {
                Ok(raw) => raw,
                Err(e) => {
                    log::warn!("Skipping undecodable record: {}", e);
                    report.push_error(ErrorDescriptor {
                        kind: ErrorKind::RecordDecode,
                        record_index: Some(index),
                        call: None,
                        message: e.to_string(),
                    });
                    continue;
                }
            };
            report.fetched_count += 1;

            let qso = match map_record(&raw) {
                Ok(qso) => qso,
                Err(message) => {
                    log::warn!("Skipping invalid record {}: {}", index, message);
                    report.push_error(ErrorDescriptor {
                        kind: ErrorKind::Validation,
                        record_index: Some(index),
                        call: raw.call().map(str::to_string),
                        message,
                    });
                    continue;
                }
            };

            let key = qso.dedup_key();

            let outcome = if dry_run {
                match self.store.contains(&key).await {
                    Ok(true) => Ok(InsertOutcome::Duplicate),
                    Ok(false) => {
                        if dry_run_keys.insert(key) {
                            log::info!("Would import: {} on {} at {}", qso.call, qso.band, qso.timestamp);
                            Ok(InsertOutcome::Inserted)
                        } else {
                            Ok(InsertOutcome::Duplicate)
                        }
                    }
                    Err(e) => Err(e),
                }
            } else {
                self.store.insert_if_absent(&qso).await
            };

            match outcome {
                Ok(InsertOutcome::Inserted) => {
                    report.inserted_count += 1;
                    if !dry_run {
                        log::debug!("Imported: {} on {} at {}", qso.call, qso.band, qso.timestamp);
                    }
                }
                Ok(InsertOutcome::Duplicate) => {
                    report.duplicate_count += 1;
                    log::debug!("Duplicate: {} on {} at {}", qso.call, qso.band, qso.timestamp);
                }
                Err(e) => {
                    log::error!("Failed to store {}: {}", qso.call, e);
                    report.push_error(ErrorDescriptor {
                        kind: e.kind(),
                        record_index: Some(index),
                        call: Some(qso.call.clone()),
                        message: e.to_string(),
                    });
                }
            }
        }

        log::info!("Reconcile complete: {}", report.summary());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adif::envelope::decode_response;
    use crate::db::schema::QsoRecord;
    use crate::db::{open_in_memory, SqliteQsoStore};
    use crate::error::QrzError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const W1AW_BODY: &str = "RESULT=OK&COUNT=1&ADIF=%3Ccall%3A4%3EW1AW%3Cqso_date%3A8%3E20230101%3Ctime_on%3A4%3E1200%3Ceor%3E";

    const THREE_RECORDS: &str = "RESULT=OK&COUNT=3&ADIF=\
&lt;call:6&gt;K2TEST&lt;qso_date:8&gt;20250730&lt;time_on:4&gt;2100&lt;band:4&gt;70cm&lt;mode:2&gt;FM&lt;eor&gt;\n\
&lt;call:6&gt;N3TEST&lt;qso_date:8&gt;20250803&lt;time_on:4&gt;1530&lt;band:3&gt;20m&lt;mode:3&gt;SSB&lt;eor&gt;\n\
&lt;call:5&gt;K4TST&lt;qso_date:8&gt;20250805&lt;time_on:6&gt;093000&lt;band:3&gt;40m&lt;mode:2&gt;CW&lt;eor&gt;\n";

    fn decode(body: &str) -> Vec<DecodedRecord> {
        decode_response(body).unwrap().records().collect()
    }

    async fn store() -> SqliteQsoStore {
        SqliteQsoStore::new(open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_w1aw_example() {
        let records = decode(W1AW_BODY);
        assert_eq!(records.len(), 1);
        let rec = records[0].as_ref().unwrap();
        assert_eq!(rec.call(), Some("W1AW"));
        assert_eq!(rec.qso_date(), Some("20230101"));
        assert_eq!(rec.time_on(), Some("1200"));

        let store = store().await;
        let report = Reconciler::new(&store)
            .reconcile(records, false, &CancellationToken::new())
            .await;

        assert_eq!(report.fetched_count, 1);
        assert_eq!(report.inserted_count, 1);
        assert_eq!(report.duplicate_count, 0);
        assert_eq!(report.error_count, 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_second_pass_is_all_duplicates() {
        let store = store().await;
        let reconciler = Reconciler::new(&store);
        let cancel = CancellationToken::new();

        let first = reconciler.reconcile(decode(THREE_RECORDS), false, &cancel).await;
        assert_eq!(first.inserted_count, 3);

        let second = reconciler.reconcile(decode(THREE_RECORDS), false, &cancel).await;
        assert_eq!(second.fetched_count, 3);
        assert_eq!(second.duplicate_count, second.fetched_count);
        assert_eq!(second.inserted_count, 0);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_dry_run_never_writes() {
        let store = store().await;
        let reconciler = Reconciler::new(&store);
        let cancel = CancellationToken::new();

        let report = reconciler.reconcile(decode(THREE_RECORDS), true, &cancel).await;
        assert!(report.dry_run);
        assert_eq!(report.inserted_count, 3);
        assert_eq!(store.count().await.unwrap(), 0);

        // Would-be inserts still respect existing rows and in-run repeats
        reconciler
            .reconcile(decode(W1AW_BODY), false, &cancel)
            .await;
        let mut records = decode(THREE_RECORDS);
        records.extend(decode(THREE_RECORDS));
        records.extend(decode(W1AW_BODY));
        let report = reconciler.reconcile(records, true, &cancel).await;
        assert_eq!(report.fetched_count, 7);
        assert_eq!(report.inserted_count, 3);
        assert_eq!(report.duplicate_count, 4);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_malformed_record_is_isolated() {
        let body = "RESULT=OK&COUNT=3&ADIF=\
<call:4>W1AW<qso_date:8>20230101<time_on:4>1200<eor>\
<call:x>K2AB<qso_date:8>20230101<time_on:4>1300<eor>\
<call:4>N3CD<qso_date:8>20230101<time_on:4>1400<eor>";

        let store = store().await;
        let report = Reconciler::new(&store)
            .reconcile(decode(body), false, &CancellationToken::new())
            .await;

        assert_eq!(report.error_count, 1);
        assert_eq!(report.errors[0].kind, ErrorKind::RecordDecode);
        assert_eq!(report.errors[0].record_index, Some(1));
        assert_eq!(report.fetched_count, 2);
        assert_eq!(report.inserted_count + report.duplicate_count, 2);
    }

    #[tokio::test]
    async fn test_validation_failure_is_isolated() {
        let body = "RESULT=OK&COUNT=2&ADIF=\
<call:4>W1AW<qso_date:8>20230101<eor>\
<call:4>N3CD<qso_date:8>20230101<time_on:4>1400<eor>";

        let store = store().await;
        let report = Reconciler::new(&store)
            .reconcile(decode(body), false, &CancellationToken::new())
            .await;

        assert_eq!(report.fetched_count, 2);
        assert_eq!(report.inserted_count, 1);
        assert_eq!(report.error_count, 1);
        assert_eq!(report.errors[0].kind, ErrorKind::Validation);
        assert_eq!(report.errors[0].call.as_deref(), Some("W1AW"));
    }

    #[tokio::test]
    async fn test_callsign_case_is_ignored_for_duplicates() {
        let upper = "RESULT=OK&COUNT=1&ADIF=<call:4>W1AW<qso_date:8>20230101<time_on:4>1200<band:3>20m<eor>";
        let lower = "RESULT=OK&COUNT=1&ADIF=<call:4>w1aw<qso_date:8>20230101<time_on:6>120000<band:3>20M<eor>";

        let store = store().await;
        let reconciler = Reconciler::new(&store);
        let cancel = CancellationToken::new();
        reconciler.reconcile(decode(upper), false, &cancel).await;
        let report = reconciler.reconcile(decode(lower), false, &cancel).await;

        assert_eq!(report.duplicate_count, 1);
        assert_eq!(report.inserted_count, 0);
    }

    #[tokio::test]
    async fn test_cancelled_run_returns_partial_report() {
        let store = store().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = Reconciler::new(&store)
            .reconcile(decode(THREE_RECORDS), false, &cancel)
            .await;

        assert!(report.cancelled);
        assert_eq!(report.fetched_count, 0);
        assert_eq!(report.error_count, 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    /// Cancels the token once `limit` rows have been written
    struct CancellingStore {
        inner: SqliteQsoStore,
        cancel: CancellationToken,
        limit: usize,
        inserted: AtomicUsize,
    }

    #[async_trait]
    impl QsoStore for CancellingStore {
        async fn contains(&self, key: &DedupKey) -> Result<bool, QrzError> {
            self.inner.contains(key).await
        }

        async fn insert_if_absent(&self, qso: &QsoRecord) -> Result<InsertOutcome, QrzError> {
            let outcome = self.inner.insert_if_absent(qso).await?;
            if self.inserted.fetch_add(1, Ordering::SeqCst) + 1 >= self.limit {
                self.cancel.cancel();
            }
            Ok(outcome)
        }
    }

    #[tokio::test]
    async fn test_cancel_between_records_keeps_processed_ones() {
        let cancel = CancellationToken::new();
        let store = CancellingStore {
            inner: store().await,
            cancel: cancel.clone(),
            limit: 2,
            inserted: AtomicUsize::new(0),
        };

        let report = Reconciler::new(&store)
            .reconcile(decode(THREE_RECORDS), false, &cancel)
            .await;

        assert!(report.cancelled);
        assert_eq!(report.fetched_count, 2);
        assert_eq!(report.inserted_count, 2);
        assert_eq!(report.error_count, 0);
        assert_eq!(store.inner.count().await.unwrap(), 2);
    }
}
