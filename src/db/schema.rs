// Domain records persisted by the sync

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::adif::time_utils::format_timestamp;

/// QSO record imported from QRZ - ADIF compatible
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QsoRecord {
    // Required fields
    pub call: String,
    pub timestamp: DateTime<Utc>,
    pub band: String,          // lowercase, e.g. "20m"; may be empty
    pub mode: String,

    // Frequency
    pub freq: Option<f64>,     // MHz

    // Signal reports
    pub rst_sent: Option<String>,
    pub rst_rcvd: Option<String>,

    // Station info
    pub station_callsign: Option<String>,
    pub my_gridsquare: Option<String>,
    pub tx_pwr: Option<f64>,

    // Contact info
    pub name: Option<String>,
    pub email: Option<String>,
    pub country: Option<String>,
    pub gridsquare: Option<String>,
    pub sota_ref: Option<String>,
    pub pota_ref: Option<String>,

    /// QRZ's APP_QRZLOG_LOGID
    pub qrz_logid: Option<String>,

    /// ADIF fields without a column, carried through verbatim
    pub extensions: BTreeMap<String, String>,
}

impl QsoRecord {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(&self.call, &self.timestamp, &self.band)
    }
}

/// Natural key of a QSO: (callsign, timestamp, band)
///
/// Callsign compares case-insensitively, timestamp and band exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub call_key: String,
    pub timestamp: String,
    pub band: String,
}

impl DedupKey {
    pub fn new(call: &str, timestamp: &DateTime<Utc>, band: &str) -> Self {
        Self {
            call_key: call.trim().to_uppercase(),
            timestamp: format_timestamp(timestamp),
            band: band.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_dedup_key_ignores_call_case_only() {
        let ts = Utc.with_ymd_and_hms(2025, 7, 30, 21, 0, 0).unwrap();
        assert_eq!(DedupKey::new("k2test", &ts, "70cm"), DedupKey::new("K2TEST", &ts, "70cm"));
        assert_ne!(DedupKey::new("K2TEST", &ts, "70cm"), DedupKey::new("K2TEST", &ts, "2m"));

        let later = Utc.with_ymd_and_hms(2025, 7, 30, 21, 0, 1).unwrap();
        assert_ne!(DedupKey::new("K2TEST", &ts, "70cm"), DedupKey::new("K2TEST", &later, "70cm"));
    }
}
