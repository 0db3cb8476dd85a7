pub mod init;
pub mod ledger;
pub mod migrations;
pub mod qso;
pub mod schema;
pub mod settings;

pub use init::{open_db, open_in_memory};
pub use ledger::{ImportLedger, ImportRun, SqliteImportLedger};
pub use qso::{InsertOutcome, QsoStore, SqliteQsoStore};
pub use schema::{DedupKey, QsoRecord};
