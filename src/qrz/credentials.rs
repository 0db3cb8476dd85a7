// QRZ account credentials
//
// Stored in the settings table under qrz.<account>.* keys:
//   qrz.<account>.api_key, .username, .password, .book_ids (comma separated)

use async_trait::async_trait;
use sqlx::{Pool, Sqlite};
use std::fmt;

use crate::db::settings::{get_setting, set_setting};
use crate::error::QrzError;

/// QRZ credentials for one account. Debug output never shows secrets.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
    pub api_key: String,
}

impl Credential {
    pub fn new(username: &str, password: &str, api_key: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Credential from an API key alone (CLI/env override)
    pub fn from_api_key(api_key: &str) -> Self {
        Self::new("", "", api_key)
    }

    /// The logbook API only needs the key
    pub fn is_usable(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"***")
            .field("api_key", &"***")
            .finish()
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credential(&self, account: &str) -> Result<Option<Credential>, QrzError>;

    /// Logbook ids configured for the account; empty means the default book
    async fn book_ids(&self, account: &str) -> Result<Vec<String>, QrzError>;
}

fn setting_key(account: &str, name: &str) -> String {
    format!("qrz.{}.{}", account.to_uppercase(), name)
}

/// Reads credentials from the settings table
#[derive(Clone)]
pub struct SettingsCredentialProvider {
    pool: Pool<Sqlite>,
}

impl SettingsCredentialProvider {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn store(
        &self,
        account: &str,
        credential: &Credential,
        book_ids: &[String],
    ) -> Result<(), QrzError> {
        set_setting(&self.pool, &setting_key(account, "api_key"), &credential.api_key).await?;
        set_setting(&self.pool, &setting_key(account, "username"), &credential.username).await?;
        set_setting(&self.pool, &setting_key(account, "password"), &credential.password).await?;
        set_setting(&self.pool, &setting_key(account, "book_ids"), &book_ids.join(",")).await?;
        Ok(())
    }
}

#[async_trait]
impl CredentialProvider for SettingsCredentialProvider {
    async fn credential(&self, account: &str) -> Result<Option<Credential>, QrzError> {
        let api_key = get_setting(&self.pool, &setting_key(account, "api_key")).await?;
        let Some(api_key) = api_key else {
            return Ok(None);
        };
        let username = get_setting(&self.pool, &setting_key(account, "username"))
            .await?
            .unwrap_or_default();
        let password = get_setting(&self.pool, &setting_key(account, "password"))
            .await?
            .unwrap_or_default();

        Ok(Some(Credential { username, password, api_key }))
    }

    async fn book_ids(&self, account: &str) -> Result<Vec<String>, QrzError> {
        let raw = get_setting(&self.pool, &setting_key(account, "book_ids"))
            .await?
            .unwrap_or_default();

        Ok(raw
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect())
    }
}
