// qrzsync library
// Re-export modules for use in main.rs

pub mod adif;
pub mod db;
pub mod error;
pub mod qrz;
pub mod sync;
