// QRZ Logbook API Client
// Implements the FETCH action of the logbook API
// See: https://www.qrz.com/docs/logbook/QRZLogbookAPI.html
//
// IMPORTANT: This module ONLY implements read operations (ACTION=FETCH).
// No INSERT/DELETE actions are sent to QRZ.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use super::credentials::Credential;
use crate::adif::envelope::{parse_envelope, truncate_string, QrzResult};
use crate::error::QrzError;

/// QRZ Logbook API endpoint
pub const QRZ_LOGBOOK_URL: &str = "https://logbook.qrz.com/api";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// One authenticated exchange with the logbook API.
///
/// Implementations must not retry; that is the fetch strategy's call.
#[async_trait]
pub trait QrzTransport: Send + Sync {
    /// POST a FETCH request with the given extra form parameters and return
    /// the raw body of an OK response
    async fn fetch(
        &self,
        credential: &Credential,
        params: &[(String, String)],
    ) -> Result<String, QrzError>;
}

/// reqwest-backed transport
pub struct QrzClient {
    http: Client,
    url: String,
}

impl QrzClient {
    /// Create a client with a bounded request timeout
    pub fn new(timeout: Duration) -> Result<Self, QrzError> {
        Self::with_url(QRZ_LOGBOOK_URL, timeout)
    }

    pub fn with_url(url: &str, timeout: Duration) -> Result<Self, QrzError> {
        let http = Client::builder()
            .user_agent(concat!("qrzsync/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| QrzError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, url: url.to_string() })
    }
}

#[async_trait]
impl QrzTransport for QrzClient {
    async fn fetch(
        &self,
        credential: &Credential,
        params: &[(String, String)],
    ) -> Result<String, QrzError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("KEY", credential.api_key.as_str()),
            ("ACTION", "FETCH"),
        ];
        form.extend(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        // Never log the KEY
        log::info!("Querying QRZ logbook: {}", describe_params(params));

        let response = self
            .http
            .post(&self.url)
            .form(&form)
            .send()
            .await
            .map_err(|e| QrzError::Transport(e.to_string()))?;

        let status = response.status();
        log::debug!("QRZ response status: {}", status);

        let body = response
            .text()
            .await
            .map_err(|e| QrzError::Transport(e.to_string()))?;

        log::info!("QRZ response size: {} bytes", body.len());

        classify_response(status, body)
    }
}

/// Map an HTTP status and body to the error taxonomy
pub fn classify_response(status: StatusCode, body: String) -> Result<String, QrzError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(QrzError::Auth(format!("HTTP {}", status)));
    }
    if status.is_server_error() {
        return Err(QrzError::Transport(format!(
            "QRZ returned HTTP {}: {}",
            status,
            truncate_string(&body, 200)
        )));
    }
    if !status.is_success() {
        return Err(QrzError::Api(format!(
            "QRZ returned HTTP {}: {}",
            status,
            truncate_string(&body, 200)
        )));
    }

    let envelope = parse_envelope(&body)?;
    match envelope.result {
        QrzResult::Ok => Ok(body),
        QrzResult::AuthFailed => Err(QrzError::Auth(envelope.reason_or_unknown())),
        QrzResult::Fail => Err(QrzError::Api(envelope.reason_or_unknown())),
        QrzResult::Other(other) => Err(QrzError::Api(format!("unexpected RESULT={}", other))),
    }
}

/// Parameters for log output
fn describe_params(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}
