// Fetch strategy: fetch modes, pagination and retries
//
// One request series per logbook id. A page is complete when COUNT is not
// larger than the records parsed from it and it is not a full page; anything
// else asks for a continuation with AFTERLOGID.

use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::client::QrzTransport;
use super::credentials::Credential;
use crate::adif::envelope::decode_response;
use crate::adif::parser::DecodedRecord;
use crate::error::QrzError;

/// Consecutive continuations without records before giving up
const MAX_EMPTY_CONTINUATIONS: u32 = 3;

/// What to fetch from the logbook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOption {
    All,
    /// Records modified since the given time; None falls back to ALL
    Modified { since: Option<DateTime<Utc>> },
    Range { start: NaiveDate, end: NaiveDate },
}

impl Default for FetchOption {
    fn default() -> Self {
        FetchOption::Modified { since: None }
    }
}

impl FetchOption {
    /// OPTION value sent to QRZ (before paging modifiers)
    pub fn wire_value(&self) -> String {
        match self {
            FetchOption::All | FetchOption::Modified { since: None } => "ALL".to_string(),
            FetchOption::Modified { since: Some(since) } => {
                format!("MODSINCE:{}", since.format("%Y-%m-%d"))
            }
            FetchOption::Range { start, end } => format!(
                "RANGE:{}:{}",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            ),
        }
    }
}

impl fmt::Display for FetchOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchOption::All => write!(f, "ALL"),
            FetchOption::Modified { .. } => write!(f, "MODIFIED"),
            FetchOption::Range { start, end } => write!(f, "RANGE:{}:{}", start, end),
        }
    }
}

impl FromStr for FetchOption {
    type Err = QrzError;

    /// "ALL", "MODIFIED" or "RANGE:start:end" with YYYY-MM-DD or YYYYMMDD dates
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        match upper.as_str() {
            "ALL" => return Ok(FetchOption::All),
            "MODIFIED" => return Ok(FetchOption::Modified { since: None }),
            _ => {}
        }

        let parts: Vec<&str> = upper.split(':').collect();
        match parts.as_slice() {
            ["RANGE", start, end] => {
                let start = parse_option_date(start)?;
                let end = parse_option_date(end)?;
                if start > end {
                    return Err(QrzError::Configuration(format!(
                        "RANGE start {} is after end {}",
                        start, end
                    )));
                }
                Ok(FetchOption::Range { start, end })
            }
            _ => Err(QrzError::Configuration(format!(
                "unknown fetch option {:?} (expected ALL, MODIFIED or RANGE:start:end)",
                s
            ))),
        }
    }
}

fn parse_option_date(s: &str) -> Result<NaiveDate, QrzError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
        .map_err(|_| QrzError::Configuration(format!("invalid date {:?} in RANGE option", s)))
}

/// Exponential backoff for transport errors
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            factor: 2,
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts (tests)
    pub fn immediate() -> Self {
        Self { base_delay: Duration::ZERO, ..Self::default() }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * self.factor.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Everything one strategy run produced
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub records: Vec<DecodedRecord>,
    pub requests: usize,
    pub warnings: Vec<String>,
}

pub struct FetchStrategy<'a> {
    transport: &'a dyn QrzTransport,
    retry: RetryPolicy,
    page_size: Option<usize>,
}

impl<'a> FetchStrategy<'a> {
    pub fn new(transport: &'a dyn QrzTransport, retry: RetryPolicy, page_size: Option<usize>) -> Self {
        Self {
            transport,
            retry,
            page_size: page_size.filter(|&n| n > 0),
        }
    }

    /// Fetch every record for the option across the given logbooks.
    ///
    /// Not resumable: a failed run is repeated by calling again.
    pub async fn run(
        &self,
        option: &FetchOption,
        credential: &Credential,
        book_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, QrzError> {
        let option = match option {
            FetchOption::Modified { since: None } => {
                log::info!("No previous successful import, fetching ALL");
                FetchOption::All
            }
            other => other.clone(),
        };

        let mut outcome = FetchOutcome::default();

        if book_ids.is_empty() {
            self.fetch_book(&option, credential, None, cancel, &mut outcome).await?;
        } else {
            for book_id in book_ids {
                self.fetch_book(&option, credential, Some(book_id), cancel, &mut outcome)
                    .await?;
            }
        }

        log::info!(
            "Fetched {} records in {} requests",
            outcome.records.len(),
            outcome.requests
        );
        Ok(outcome)
    }

    async fn fetch_book(
        &self,
        option: &FetchOption,
        credential: &Credential,
        book_id: Option<&str>,
        cancel: &CancellationToken,
        outcome: &mut FetchOutcome,
    ) -> Result<(), QrzError> {
        let book_label = book_id.unwrap_or("default");
        let mut cursor: Option<u64> = None;
        let mut empty_continuations = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(QrzError::Cancelled);
            }

            let params = self.build_params(option, book_id, cursor);
            let body = self.fetch_with_retry(credential, &params, cancel).await?;
            outcome.requests += 1;

            let envelope = decode_response(&body)?;
            let page: Vec<DecodedRecord> = envelope.records().collect();
            let parsed = page.len();
            let announced = envelope.count.unwrap_or(0);
            let page_max_logid = page
                .iter()
                .filter_map(|r| r.as_ref().ok().and_then(|rec| rec.logid()))
                .max();

            log::debug!(
                "Book {}: page with COUNT={} parsed={} cursor={:?}",
                book_label,
                announced,
                parsed,
                cursor
            );
            if let Some(logids) = envelope.extra.get("LOGIDS") {
                log::debug!("Book {}: LOGIDS={}", book_label, logids);
            }
            outcome.records.extend(page);

            let truncated = announced > parsed;
            let full_page = self.page_size.map_or(false, |n| parsed >= n);

            if truncated {
                let msg = format!(
                    "Book {}: server announced COUNT={} but {} records were decoded",
                    book_label, announced, parsed
                );
                log::warn!("{}", msg);
                outcome.warnings.push(msg);
            } else if announced < parsed {
                // Keep the extra records; they decoded cleanly
                let msg = format!(
                    "Book {}: server announced COUNT={} but {} records were decoded, keeping all",
                    book_label, announced, parsed
                );
                log::warn!("{}", msg);
                outcome.warnings.push(msg);
            }

            if !truncated && !full_page {
                break;
            }

            if parsed == 0 {
                empty_continuations += 1;
                if empty_continuations >= MAX_EMPTY_CONTINUATIONS {
                    let msg = format!(
                        "Book {}: giving up after {} empty continuations",
                        book_label, empty_continuations
                    );
                    log::warn!("{}", msg);
                    outcome.warnings.push(msg);
                    break;
                }
                continue;
            }
            empty_continuations = 0;

            match page_max_logid {
                Some(id) if cursor.map_or(true, |c| id > c) => cursor = Some(id),
                _ => {
                    let msg = format!(
                        "Book {}: cannot continue, no log id beyond {:?} in page",
                        book_label, cursor
                    );
                    log::warn!("{}", msg);
                    outcome.warnings.push(msg);
                    break;
                }
            }
        }

        Ok(())
    }

    fn build_params(
        &self,
        option: &FetchOption,
        book_id: Option<&str>,
        cursor: Option<u64>,
    ) -> Vec<(String, String)> {
        let mut value = option.wire_value();
        if let Some(n) = self.page_size {
            value.push_str(&format!(",MAX:{}", n));
        }
        if let Some(id) = cursor {
            value.push_str(&format!(",AFTERLOGID:{}", id));
        }

        let mut params = vec![("OPTION".to_string(), value)];
        if let Some(id) = book_id {
            params.push(("BOOKID".to_string(), id.to_string()));
        }
        params
    }

    async fn fetch_with_retry(
        &self,
        credential: &Credential,
        params: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<String, QrzError> {
        let mut attempt = 0;
        loop {
            match self.transport.fetch(credential, params).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt);
                    log::warn!(
                        "QRZ request failed ({}), retry {}/{} in {:?}",
                        e,
                        attempt,
                        self.retry.max_retries,
                        delay
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(QrzError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
