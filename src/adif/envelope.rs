// QRZ Logbook response envelope
//
// The logbook API answers with a form-style body:
//   RESULT=OK&COUNT=2&ADIF=<url- and entity-encoded ADIF text>
// The ADIF payload is always last and may itself contain '&' (from
// entities such as &lt;), so everything after "ADIF=" belongs to it.

use std::collections::HashMap;

use super::parser::AdifRecords;
use crate::error::QrzError;

/// RESULT field of a QRZ response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrzResult {
    Ok,
    AuthFailed,
    Fail,
    Other(String),
}

impl QrzResult {
    fn parse(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "OK" => QrzResult::Ok,
            "AUTH_FAILED" | "AUTH" => QrzResult::AuthFailed,
            "FAIL" => QrzResult::Fail,
            other => QrzResult::Other(other.to_string()),
        }
    }
}

/// Parsed response envelope with a decoded ADIF payload
#[derive(Debug, Clone)]
pub struct QrzEnvelope {
    pub result: QrzResult,
    /// Record count announced by the server. Not trusted as a loop bound.
    pub count: Option<usize>,
    pub reason: Option<String>,
    /// ADIF text after URL and HTML-entity decoding
    pub adif: Option<String>,
    /// Any other envelope fields (e.g. LOGIDS)
    pub extra: HashMap<String, String>,
}

impl QrzEnvelope {
    /// Lazily tokenize the ADIF payload
    pub fn records(&self) -> AdifRecords<'_> {
        AdifRecords::new(self.adif.as_deref().unwrap_or(""))
    }

    pub fn reason_or_unknown(&self) -> String {
        self.reason.clone().unwrap_or_else(|| "Unknown error".to_string())
    }
}

/// Split a raw response body into its envelope fields.
///
/// Only RESULT is mandatory here; OK responses are further checked by
/// `decode_response`.
pub fn parse_envelope(body: &str) -> Result<QrzEnvelope, QrzError> {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut adif: Option<String> = None;
    let mut rest = body.trim();

    while !rest.is_empty() {
        let (raw_key, after_eq) = match rest.split_once('=') {
            Some(pair) => pair,
            None => break,
        };
        // Stray segments without '=' end up glued to the next key
        let key = raw_key.rsplit('&').next().unwrap_or(raw_key).trim().to_uppercase();

        if key == "ADIF" {
            adif = Some(decode_html_entities(&url_decode(after_eq)));
            break;
        }

        let (value, next) = after_eq.split_once('&').unwrap_or((after_eq, ""));
        fields.insert(key, url_decode(value).trim().to_string());
        rest = next;
    }

    let result = fields
        .remove("RESULT")
        .map(|v| QrzResult::parse(&v))
        .ok_or_else(|| QrzError::Decode(format!(
            "response has no RESULT field: {}",
            truncate_string(body, 200)
        )))?;

    let count = match fields.remove("COUNT") {
        Some(v) => Some(v.parse::<usize>().map_err(|_| {
            QrzError::Decode(format!("COUNT is not a number: {:?}", v))
        })?),
        None => None,
    };

    let reason = fields.remove("REASON");

    Ok(QrzEnvelope {
        result,
        count,
        reason,
        adif,
        extra: fields,
    })
}

/// Parse and validate an OK response.
///
/// RESULT=OK must carry COUNT, and ADIF unless COUNT is zero.
pub fn decode_response(body: &str) -> Result<QrzEnvelope, QrzError> {
    let envelope = parse_envelope(body)?;

    match envelope.result {
        QrzResult::Ok => {}
        QrzResult::AuthFailed => return Err(QrzError::Auth(envelope.reason_or_unknown())),
        QrzResult::Fail => return Err(QrzError::Api(envelope.reason_or_unknown())),
        QrzResult::Other(ref other) => {
            return Err(QrzError::Decode(format!("unexpected RESULT={}", other)))
        }
    }

    let count = envelope
        .count
        .ok_or_else(|| QrzError::Decode("RESULT=OK response has no COUNT field".to_string()))?;

    if count > 0 && envelope.adif.is_none() {
        return Err(QrzError::Decode(format!(
            "COUNT={} but response has no ADIF field",
            count
        )));
    }

    Ok(envelope)
}

/// Percent-decode without treating '+' as a space
fn url_decode(value: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(value.as_bytes())).into_owned()
}

/// Decode the HTML entities QRZ uses to escape ADIF tags.
///
/// Single pass: "&amp;lt;" becomes "&lt;", not "<". Unknown entities are
/// kept verbatim.
pub fn decode_html_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        let decoded = tail
            .find(';')
            .filter(|&semi| (2..=10).contains(&semi))
            .and_then(|semi| decode_entity(&tail[1..semi]).map(|c| (c, semi)));

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Truncate a string for error messages
pub(crate) fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
