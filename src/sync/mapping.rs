// Map decoded QRZ ADIF records onto QsoRecord
//
// Known ADIF fields become columns; everything else lands in the
// extension container untouched.

use std::collections::BTreeMap;

use crate::adif::bands::{freq_to_band, normalize_band};
use crate::adif::parser::RawAdifRecord;
use crate::adif::time_utils::parse_qso_timestamp;
use crate::db::schema::QsoRecord;

/// Fields consumed by the mapping (lowercase ADIF names)
const MAPPED_FIELDS: &[&str] = &[
    "call",
    "qso_date",
    "time_on",
    "band",
    "mode",
    "freq",
    "rst_sent",
    "rst_rcvd",
    "station_callsign",
    "my_gridsquare",
    "tx_pwr",
    "name",
    "email",
    "country",
    "gridsquare",
    "sota_ref",
    "pota_ref",
    "app_qrzlog_logid",
];

/// Validate and convert one record. Err carries a human-readable reason.
pub fn map_record(raw: &RawAdifRecord) -> Result<QsoRecord, String> {
    let call = raw
        .call()
        .ok_or_else(|| "record has no CALL".to_string())?
        .to_string();

    let qso_date = raw
        .qso_date()
        .ok_or_else(|| format!("{}: record has no QSO_DATE", call))?;
    let time_on = raw
        .time_on()
        .ok_or_else(|| format!("{}: record has no TIME_ON", call))?;
    let timestamp = parse_qso_timestamp(qso_date, time_on).map_err(|e| format!("{}: {}", call, e))?;

    let mut extensions: BTreeMap<String, String> = raw
        .fields
        .iter()
        .filter(|(k, _)| !MAPPED_FIELDS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let freq = parse_number(raw, "freq", &mut extensions);
    let tx_pwr = parse_number(raw, "tx_pwr", &mut extensions);

    let band = match raw.band() {
        Some(band) => normalize_band(band),
        None => freq
            .and_then(freq_to_band)
            .map(str::to_string)
            .unwrap_or_default(),
    };

    let text = |key: &str| raw.get_non_empty(key).map(str::to_string);

    Ok(QsoRecord {
        call,
        timestamp,
        band,
        mode: raw.get("mode").unwrap_or_default().to_string(),
        freq,
        rst_sent: text("rst_sent"),
        rst_rcvd: text("rst_rcvd"),
        station_callsign: text("station_callsign"),
        my_gridsquare: text("my_gridsquare"),
        tx_pwr,
        name: text("name"),
        email: text("email"),
        country: text("country"),
        gridsquare: text("gridsquare"),
        sota_ref: text("sota_ref"),
        pota_ref: text("pota_ref"),
        qrz_logid: text("app_qrzlog_logid"),
        extensions,
    })
}

/// Numeric field; unparsable values are kept verbatim as extensions
fn parse_number(
    raw: &RawAdifRecord,
    key: &str,
    extensions: &mut BTreeMap<String, String>,
) -> Option<f64> {
    let value = raw.get_non_empty(key)?;
    match value.parse::<f64>() {
        Ok(n) => Some(n),
        Err(_) => {
            log::debug!("Keeping non-numeric {} {:?} as extension field", key, value);
            extensions.insert(key.to_string(), value.to_string());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn raw(fields: &[(&str, &str)]) -> RawAdifRecord {
        let mut rec = RawAdifRecord::new();
        for (k, v) in fields {
            rec.insert(k, v.to_string());
        }
        rec
    }

    #[test]
    fn test_map_qrz_record() {
        let rec = raw(&[
            ("station_callsign", "W1TEST"),
            ("call", "K2TEST"),
            ("qso_date", "20250730"),
            ("time_on", "2100"),
            ("band", "70CM"),
            ("mode", "FM"),
            ("freq", "438.95"),
            ("rst_sent", ""),
            ("tx_pwr", "8"),
            ("name", "Jane Smith"),
            ("email", "test@example.com"),
            ("country", "United States"),
            ("app_qrzlog_logid", "1301863042"),
            ("qth", "Anywhere"),
            ("cqz", "05"),
        ]);

        let qso = map_record(&rec).unwrap();
        assert_eq!(qso.call, "K2TEST");
        assert_eq!(qso.timestamp, Utc.with_ymd_and_hms(2025, 7, 30, 21, 0, 0).unwrap());
        assert_eq!(qso.band, "70cm");
        assert_eq!(qso.mode, "FM");
        assert_eq!(qso.freq, Some(438.95));
        assert_eq!(qso.tx_pwr, Some(8.0));
        assert_eq!(qso.rst_sent, None);
        assert_eq!(qso.station_callsign.as_deref(), Some("W1TEST"));
        assert_eq!(qso.name.as_deref(), Some("Jane Smith"));
        assert_eq!(qso.qrz_logid.as_deref(), Some("1301863042"));
        assert_eq!(qso.extensions.len(), 2);
        assert_eq!(qso.extensions.get("qth").map(String::as_str), Some("Anywhere"));
        assert_eq!(qso.extensions.get("cqz").map(String::as_str), Some("05"));
    }

    #[test]
    fn test_band_from_frequency() {
        let rec = raw(&[("call", "N3TEST"), ("qso_date", "20250803"), ("time_on", "1530"), ("freq", "14.25")]);
        assert_eq!(map_record(&rec).unwrap().band, "20m");
    }

    #[test]
    fn test_missing_required_fields() {
        let no_call = raw(&[("qso_date", "20250803"), ("time_on", "1530")]);
        assert!(map_record(&no_call).unwrap_err().contains("CALL"));

        let no_time = raw(&[("call", "N3TEST"), ("qso_date", "20250803")]);
        assert!(map_record(&no_time).unwrap_err().contains("TIME_ON"));

        let bad_date = raw(&[("call", "N3TEST"), ("qso_date", "2025-08-03"), ("time_on", "1530")]);
        assert!(map_record(&bad_date).unwrap_err().contains("qso_date"));
    }

    #[test]
    fn test_bad_number_kept_as_extension() {
        let rec = raw(&[("call", "N3TEST"), ("qso_date", "20250803"), ("time_on", "1530"), ("tx_pwr", "QRP")]);
        let qso = map_record(&rec).unwrap();
        assert_eq!(qso.tx_pwr, None);
        assert_eq!(qso.extensions.get("tx_pwr").map(String::as_str), Some("QRP"));
    }
}
