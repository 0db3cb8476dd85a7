// Import report returned for every run, including aborted ones

use serde::Serialize;

use crate::error::{ErrorKind, QrzError};

/// One failure recorded during a run
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    /// Position in the decoded sequence; None for run-level errors
    pub record_index: Option<usize>,
    pub call: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub fetched_count: usize,
    pub inserted_count: usize,
    pub duplicate_count: usize,
    pub error_count: usize,
    pub errors: Vec<ErrorDescriptor>,
    pub warnings: Vec<String>,
    pub dry_run: bool,
    pub cancelled: bool,
}

impl ImportReport {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run, ..Default::default() }
    }

    /// Report for a run that never got usable records: fetched=0, one error
    pub fn aborted(err: &QrzError, dry_run: bool) -> Self {
        let mut report = Self::new(dry_run);
        report.cancelled = matches!(err, QrzError::Cancelled);
        report.push_error(ErrorDescriptor {
            kind: err.kind(),
            record_index: None,
            call: None,
            message: err.to_string(),
        });
        report
    }

    pub fn push_error(&mut self, error: ErrorDescriptor) {
        self.error_count += 1;
        self.errors.push(error);
    }

    /// True when a run-level error stopped the import
    pub fn is_aborted(&self) -> bool {
        self.errors.iter().any(|e| e.record_index.is_none())
    }

    pub fn summary(&self) -> String {
        format!(
            "fetched={} inserted={} duplicates={} errors={}{}{}",
            self.fetched_count,
            self.inserted_count,
            self.duplicate_count,
            self.error_count,
            if self.dry_run { " (dry run)" } else { "" },
            if self.cancelled { " (cancelled)" } else { "" },
        )
    }
}
