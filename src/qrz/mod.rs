pub mod client;       // QRZ Logbook API transport
pub mod credentials;
pub mod fetch;        // Fetch modes, pagination, retries

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use client::{QrzClient, QrzTransport, DEFAULT_TIMEOUT, QRZ_LOGBOOK_URL};
pub use credentials::{Credential, CredentialProvider, SettingsCredentialProvider};
pub use fetch::{FetchOption, FetchOutcome, FetchStrategy, RetryPolicy};
