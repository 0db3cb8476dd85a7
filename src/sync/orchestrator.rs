// Import orchestrator: the entry point for one QRZ Logbook import
//
// Lock account -> resolve credential -> fetch -> reconcile -> ledger.
// Always returns an ImportReport; failures that stop the run become a
// report with fetched_count = 0 and a single run-level error.

use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::locks::{AccountLocks, LockMode};
use super::reconcile::Reconciler;
use super::report::ImportReport;
use crate::db::ledger::{ImportLedger, ImportRun};
use crate::db::qso::QsoStore;
use crate::error::QrzError;
use crate::qrz::client::QrzTransport;
use crate::qrz::credentials::{Credential, CredentialProvider};
use crate::qrz::fetch::{FetchOption, FetchStrategy, RetryPolicy};

#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub retry: RetryPolicy,
    /// MAX records per request; None lets QRZ decide
    pub page_size: Option<usize>,
    pub lock_mode: LockMode,
    /// Lifetime of the storage lease; a crashed run blocks the account at most this long
    pub lease_ttl: chrono::Duration,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            page_size: None,
            lock_mode: LockMode::Wait,
            lease_ttl: chrono::Duration::minutes(30),
        }
    }
}

/// Parameters of one import run
#[derive(Debug, Clone, Default)]
pub struct ImportRequest {
    pub account: String,
    pub option: FetchOption,
    pub dry_run: bool,
    /// Takes precedence over the stored credential
    pub credential: Option<Credential>,
    /// Overrides the account's configured logbook ids when non-empty
    pub book_ids: Vec<String>,
}

pub struct Importer {
    transport: Arc<dyn QrzTransport>,
    store: Arc<dyn QsoStore>,
    ledger: Arc<dyn ImportLedger>,
    credentials: Arc<dyn CredentialProvider>,
    locks: AccountLocks,
    settings: ImportSettings,
}

impl Importer {
    pub fn new(
        transport: Arc<dyn QrzTransport>,
        store: Arc<dyn QsoStore>,
        ledger: Arc<dyn ImportLedger>,
        credentials: Arc<dyn CredentialProvider>,
        settings: ImportSettings,
    ) -> Self {
        Self {
            transport,
            store,
            ledger,
            credentials,
            locks: AccountLocks::new(),
            settings,
        }
    }

    pub async fn import(&self, request: &ImportRequest, cancel: &CancellationToken) -> ImportReport {
        // Locks, ledger rows, leases and settings keys all use one spelling
        let account_key = normalize_account(&request.account);
        let account = account_key.as_str();
        if account.is_empty() {
            let e = QrzError::Configuration("account must not be empty".to_string());
            log::error!("{}", e);
            return ImportReport::aborted(&e, request.dry_run);
        }

        log::info!(
            "Starting QSO import from QRZ.com for {} (option: {}{})",
            account,
            request.option,
            if request.dry_run { ", dry run" } else { "" }
        );

        let _guard = match self.locks.acquire(account, self.settings.lock_mode).await {
            Ok(guard) => guard,
            Err(e) => {
                log::warn!("{}", e);
                return ImportReport::aborted(&e, request.dry_run);
            }
        };

        let holder = uuid::Uuid::new_v4().to_string();
        match self
            .ledger
            .try_acquire_lease(account, &holder, self.settings.lease_ttl)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                let e = QrzError::LockContention(account.to_string());
                log::warn!("{} (lease held elsewhere)", e);
                return ImportReport::aborted(&e, request.dry_run);
            }
            Err(e) => {
                log::error!("Could not take import lease for {}: {}", account, e);
                return ImportReport::aborted(&e, request.dry_run);
            }
        }

        let started_at = Utc::now();
        let report = self.run_locked(account, request, cancel).await;

        let run = ImportRun {
            account: account.to_string(),
            fetch_option: request.option.to_string(),
            dry_run: request.dry_run,
            success: !report.is_aborted() && !report.cancelled,
            started_at,
            completed_at: Utc::now(),
            fetched_count: report.fetched_count,
            inserted_count: report.inserted_count,
            duplicate_count: report.duplicate_count,
            error_count: report.error_count,
            error: report
                .errors
                .iter()
                .find(|e| e.record_index.is_none())
                .map(|e| e.message.clone()),
        };
        if let Err(e) = self.ledger.record_run(&run).await {
            log::warn!("Failed to record import run for {}: {}", account, e);
        }
        if let Err(e) = self.ledger.release_lease(account, &holder).await {
            log::warn!("Failed to release import lease for {}: {}", account, e);
        }

        log::info!("Import summary for {}: {}", account, report.summary());
        report
    }

    async fn run_locked(
        &self,
        account: &str,
        request: &ImportRequest,
        cancel: &CancellationToken,
    ) -> ImportReport {
        let credential = match self.resolve_credential(account, request).await {
            Ok(credential) => credential,
            Err(e) => {
                log::error!("{}", e);
                return ImportReport::aborted(&e, request.dry_run);
            }
        };

        let book_ids = if request.book_ids.is_empty() {
            match self.credentials.book_ids(account).await {
                Ok(ids) => ids,
                Err(e) => return ImportReport::aborted(&e, request.dry_run),
            }
        } else {
            request.book_ids.clone()
        };

        let option = match &request.option {
            FetchOption::Modified { since: None } => {
                let since = self
                    .ledger
                    .last_successful_completion(account)
                    .await
                    .unwrap_or_else(|e| {
                        log::warn!("Could not read import ledger, fetching ALL: {}", e);
                        None
                    });
                FetchOption::Modified { since }
            }
            other => other.clone(),
        };

        let strategy = FetchStrategy::new(
            self.transport.as_ref(),
            self.settings.retry.clone(),
            self.settings.page_size,
        );

        let outcome = match strategy.run(&option, &credential, &book_ids, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("QRZ fetch failed for {}: {}", account, e);
                return ImportReport::aborted(&e, request.dry_run);
            }
        };

        let mut report = Reconciler::new(self.store.as_ref())
            .reconcile(outcome.records, request.dry_run, cancel)
            .await;

        let mut warnings = outcome.warnings;
        warnings.append(&mut report.warnings);
        report.warnings = warnings;
        report
    }

    async fn resolve_credential(
        &self,
        account: &str,
        request: &ImportRequest,
    ) -> Result<Credential, QrzError> {
        if let Some(credential) = &request.credential {
            if credential.is_usable() {
                return Ok(credential.clone());
            }
            return Err(QrzError::Configuration(
                "explicit credential has no API key".to_string(),
            ));
        }

        match self.credentials.credential(account).await? {
            Some(credential) if credential.is_usable() => Ok(credential),
            _ => Err(QrzError::Configuration(format!(
                "no QRZ API key configured for account {}",
                account
            ))),
        }
    }
}

/// Account ids are callsigns: case-insensitive, surrounding space ignored
pub fn normalize_account(account: &str) -> String {
    account.trim().to_uppercase()
}
