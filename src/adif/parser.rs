// ADIF tokenizer for QRZ Logbook payloads
//
// Tokens are <name:length[:type]>value, records end with <eor>. The scanner is
// an explicit state machine so malformed lengths and truncated payloads fail a
// single record instead of the whole download.

use std::collections::HashMap;
use std::fmt;

/// A single decoded ADIF record (one QSO), field names lowercased
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAdifRecord {
    pub fields: HashMap<String, String>,
}

impl RawAdifRecord {
    pub fn new() -> Self {
        Self { fields: HashMap::new() }
    }

    /// Get a field value (case-insensitive lookup)
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(&key.to_lowercase()).map(String::as_str)
    }

    /// Get a field, treating empty values as absent
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn insert(&mut self, key: &str, value: String) {
        self.fields.insert(key.to_lowercase(), value);
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn call(&self) -> Option<&str> { self.get_non_empty("call") }
    pub fn qso_date(&self) -> Option<&str> { self.get_non_empty("qso_date") }
    pub fn time_on(&self) -> Option<&str> { self.get_non_empty("time_on") }
    pub fn band(&self) -> Option<&str> { self.get_non_empty("band") }

    /// QRZ's internal id for the record, used as the pagination cursor
    pub fn logid(&self) -> Option<u64> {
        self.get_non_empty("app_qrzlog_logid").and_then(|s| s.parse().ok())
    }
}

/// A record that could not be tokenized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordDecodeError {
    /// Zero-based position of the record in the payload
    pub index: usize,
    pub message: String,
}

impl fmt::Display for RecordDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record {}: {}", self.index, self.message)
    }
}

impl std::error::Error for RecordDecodeError {}

pub type DecodedRecord = Result<RawAdifRecord, RecordDecodeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekingTag,
    ReadingName,
    ReadingLength,
    ReadingValue,
}

/// Lazy iterator over the records of an ADIF payload
pub struct AdifRecords<'a> {
    input: &'a str,
    pos: usize,
    index: usize,
}

impl<'a> AdifRecords<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0, index: 0 }
    }

    fn next_record(&mut self) -> Option<DecodedRecord> {
        let bytes = self.input.as_bytes();
        let mut record = RawAdifRecord::new();
        let mut state = State::SeekingTag;
        let mut name_start = 0;
        let mut name = String::new();
        let mut length = 0usize;

        loop {
            match state {
                State::SeekingTag => {
                    match bytes[self.pos..].iter().position(|&b| b == b'<') {
                        Some(offset) => {
                            self.pos += offset + 1;
                            name_start = self.pos;
                            state = State::ReadingName;
                        }
                        None => {
                            self.pos = bytes.len();
                            if record.is_empty() {
                                return None;
                            }
                            return Some(self.fail("payload ended before <eor>"));
                        }
                    }
                }
                State::ReadingName => {
                    let offset = match bytes[self.pos..]
                        .iter()
                        .position(|&b| b == b':' || b == b'>' || b == b'<')
                    {
                        Some(offset) => offset,
                        None => {
                            self.pos = bytes.len();
                            // Trailing noise after the last record
                            if record.is_empty() {
                                return None;
                            }
                            return Some(self.fail("unterminated tag at end of payload"));
                        }
                    };
                    let end = self.pos + offset;
                    if bytes[end] == b'<' {
                        self.pos = end;
                        // A stray '<' before any field is noise; retry at the new tag
                        if record.is_empty() {
                            state = State::SeekingTag;
                            continue;
                        }
                        let broken = self.input[name_start..end].trim().to_string();
                        return Some(self.fail_and_resync(&format!("malformed tag <{}", broken)));
                    }
                    name = self.input[name_start..end].trim().to_lowercase();
                    self.pos = end + 1;

                    if bytes[end] == b':' {
                        state = State::ReadingLength;
                        continue;
                    }

                    // Bare tag: <eor>, <eoh> or a field without length
                    match name.as_str() {
                        "eor" => {
                            if record.is_empty() {
                                state = State::SeekingTag;
                                continue;
                            }
                            self.index += 1;
                            return Some(Ok(record));
                        }
                        "eoh" => record = RawAdifRecord::new(),
                        "" => {}
                        _ => record.insert(&name, String::new()),
                    }
                    state = State::SeekingTag;
                }
                State::ReadingLength => {
                    let offset = match bytes[self.pos..].iter().position(|&b| b == b'>' || b == b'<') {
                        Some(offset) => offset,
                        None => {
                            self.pos = bytes.len();
                            return Some(self.fail(&format!("unterminated <{}> tag", name)));
                        }
                    };
                    let end = self.pos + offset;
                    if bytes[end] == b'<' {
                        self.pos = end;
                        return Some(self.fail_and_resync(&format!("malformed <{}> tag", name)));
                    }
                    let spec = &self.input[self.pos..end];
                    self.pos = end + 1;

                    // Optional data type indicator after a second ':'
                    let length_str = spec.split(':').next().unwrap_or("").trim();
                    length = match length_str.parse::<usize>() {
                        Ok(n) => n,
                        Err(_) => {
                            return Some(self.fail_and_resync(&format!(
                                "field {} has non-numeric length {:?}",
                                name, length_str
                            )))
                        }
                    };
                    state = State::ReadingValue;
                }
                State::ReadingValue => {
                    let remaining = bytes.len() - self.pos;
                    if length > remaining {
                        return Some(self.fail_and_resync(&format!(
                            "field {} declares {} bytes but only {} remain",
                            name, length, remaining
                        )));
                    }
                    let raw = &bytes[self.pos..self.pos + length];
                    let value = String::from_utf8_lossy(raw).trim().to_string();
                    self.pos += length;
                    record.insert(&name, value);
                    state = State::SeekingTag;
                }
            }
        }
    }

    fn fail(&mut self, message: &str) -> DecodedRecord {
        let err = RecordDecodeError { index: self.index, message: message.to_string() };
        self.index += 1;
        Err(err)
    }

    /// Fail the current record and skip past its <eor>
    fn fail_and_resync(&mut self, message: &str) -> DecodedRecord {
        self.pos = match find_eor(&self.input[self.pos..]) {
            Some(offset) => self.pos + offset + "<eor>".len(),
            None => self.input.len(),
        };
        self.fail(message)
    }
}

impl<'a> Iterator for AdifRecords<'a> {
    type Item = DecodedRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.input.len() {
            return None;
        }
        self.next_record()
    }
}

/// Byte offset of the next <eor> (case-insensitive)
fn find_eor(s: &str) -> Option<usize> {
    s.as_bytes()
        .windows(5)
        .position(|w| w.eq_ignore_ascii_case(b"<eor>"))
}

/// Tokenize a whole payload eagerly
pub fn parse_adif(content: &str) -> Vec<DecodedRecord> {
    AdifRecords::new(content).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_record() {
        let adif = r#"
<CALL:5>W1ABC
<BAND:3>20M
<MODE:3>FT8
<QSO_DATE:8>20260103
<TIME_ON:6>152600
<RST_SENT:3>-12
<GRIDSQUARE:4>FN31
<EOR>
"#;

        let records = parse_adif(adif);
        assert_eq!(records.len(), 1);

        let rec = records[0].as_ref().unwrap();
        assert_eq!(rec.call(), Some("W1ABC"));
        assert_eq!(rec.band(), Some("20M"));
        assert_eq!(rec.get("mode"), Some("FT8"));
        assert_eq!(rec.get("GridSquare"), Some("FN31"));
    }

    #[test]
    fn test_records_in_source_order() {
        let adif = "<call:5>W1ABC<band:3>20m<eor>\n<call:5>N2XYZ<band:3>40m<EOR>\n<call:4>K3AB<band:3>15m<Eor>";
        let calls: Vec<String> = parse_adif(adif)
            .into_iter()
            .map(|r| r.unwrap().call().unwrap().to_string())
            .collect();
        assert_eq!(calls, vec!["W1ABC", "N2XYZ", "K3AB"]);
    }

    #[test]
    fn test_header_is_discarded() {
        let adif = "QRZ export <programid:3>QRZ<eoh>\n<call:4>W1AW<eor>";
        let records = parse_adif(adif);
        assert_eq!(records.len(), 1);
        let rec = records[0].as_ref().unwrap();
        assert_eq!(rec.get("programid"), None);
        assert_eq!(rec.call(), Some("W1AW"));
    }

    #[test]
    fn test_type_indicator_and_unknown_fields() {
        let adif = "<call:4>W1AW<freq:6:N>14.074<app_custom_thing:3>xyz<eor>";
        let rec = parse_adif(adif).remove(0).unwrap();
        assert_eq!(rec.get("freq"), Some("14.074"));
        assert_eq!(rec.get("app_custom_thing"), Some("xyz"));
    }

    #[test]
    fn test_values_trimmed_not_uppercased() {
        let adif = "<name:10> jane doe <call:4>w1aw<eor>";
        let rec = parse_adif(adif).remove(0).unwrap();
        assert_eq!(rec.get("name"), Some("jane doe"));
        assert_eq!(rec.call(), Some("w1aw"));
    }

    #[test]
    fn test_length_counts_bytes() {
        // "Jos\u{e9}" is 5 bytes in UTF-8
        let adif = "<name:5>Jos\u{e9}<call:4>EA1A<eor>";
        let rec = parse_adif(adif).remove(0).unwrap();
        assert_eq!(rec.get("name"), Some("Jos\u{e9}"));
        assert_eq!(rec.call(), Some("EA1A"));
    }

    #[test]
    fn test_non_numeric_length_fails_single_record() {
        let adif = "<call:4>W1AW<eor><call:x>K2AB<band:3>20m<eor><call:4>N3CD<eor>";
        let records = parse_adif(adif);
        assert_eq!(records.len(), 3);
        assert!(records[0].is_ok());
        let err = records[1].as_ref().unwrap_err();
        assert_eq!(err.index, 1);
        assert!(err.message.contains("non-numeric"));
        assert_eq!(records[2].as_ref().unwrap().call(), Some("N3CD"));
    }

    #[test]
    fn test_length_past_end_of_payload() {
        let adif = "<call:4>W1AW<eor><call:40>K2AB<eor>";
        let records = parse_adif(adif);
        assert_eq!(records.len(), 2);
        assert!(records[0].is_ok());
        assert!(records[1].as_ref().unwrap_err().message.contains("only"));
    }

    #[test]
    fn test_truncated_payload() {
        let records = parse_adif("<call:4>W1AW<eor><call:4>K2AB<band:3>20");
        assert_eq!(records.len(), 2);
        assert!(records[1].is_err());

        let records = parse_adif("<call:4>W1AW<eor><call:4>K2AB");
        assert_eq!(records.len(), 2);
        assert!(records[1].as_ref().unwrap_err().message.contains("<eor>"));
    }

    #[test]
    fn test_broken_tag_fails_only_its_record() {
        let records = parse_adif("<call:4>W1AW<qso_date<eor><call:4>K2AB<eor>");
        assert_eq!(records.len(), 2);
        let err = records[0].as_ref().unwrap_err();
        assert_eq!(err.index, 0);
        assert!(err.message.contains("qso_date"));
        assert_eq!(records[1].as_ref().unwrap().call(), Some("K2AB"));

        let records = parse_adif("<call:4>W1AW<eor><band:3<eor><call:4>K2AB<eor>");
        assert_eq!(records.len(), 3);
        assert!(records[0].is_ok());
        assert!(records[1].is_err());
        assert_eq!(records[2].as_ref().unwrap().call(), Some("K2AB"));

        let records = parse_adif("a < b <call:4>W1AW<eor>");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].as_ref().unwrap().call(), Some("W1AW"));
    }

    #[test]
    fn test_trailing_noise_after_last_record() {
        let records = parse_adif("<call:4>W1AW<eor>\n<");
        assert_eq!(records.len(), 1);
        assert!(records[0].is_ok());

        let records = parse_adif("<call:4>W1AW<eor>\n<app_trailer");
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_empty_and_whitespace_payload() {
        assert!(parse_adif("").is_empty());
        assert!(parse_adif("\n\n  ").is_empty());
        assert!(parse_adif("<eor><eor>").is_empty());
    }

    #[test]
    fn test_decoding_is_idempotent() {
        let adif = "<call:4>W1AW<qso_date:8>20230101<eor><call:x>BAD<eor><call:4>K2AB<eor>";
        assert_eq!(parse_adif(adif), parse_adif(adif));
    }
}
