// ADIF (Amateur Data Interchange Format) decoding for QRZ Logbook responses
// Reference: https://adif.org/

pub mod bands;
pub mod envelope;
pub mod parser;
pub mod time_utils;

pub use bands::{freq_to_band, normalize_band};
pub use envelope::{decode_html_entities, decode_response, parse_envelope, QrzEnvelope, QrzResult};
pub use parser::{parse_adif, AdifRecords, DecodedRecord, RawAdifRecord, RecordDecodeError};
