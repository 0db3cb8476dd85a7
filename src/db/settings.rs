// Key-value settings storage

use sqlx::{Pool, Sqlite};

use crate::error::QrzError;

pub async fn get_setting(pool: &Pool<Sqlite>, key: &str) -> Result<Option<String>, QrzError> {
    let value = sqlx::query_scalar::<_, Option<String>>("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(value.flatten())
}

pub async fn set_setting(pool: &Pool<Sqlite>, key: &str, value: &str) -> Result<(), QrzError> {
    log::info!(
        "Setting {} = {}",
        key,
        if key.contains("password") || key.contains("api_key") {
            "***"
        } else {
            value
        }
    );

    sqlx::query(
        r#"INSERT INTO settings (key, value, updated_at)
           VALUES (?, ?, datetime('now'))
           ON CONFLICT(key) DO UPDATE SET
             value = excluded.value,
             updated_at = datetime('now')"#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    #[tokio::test]
    async fn test_set_and_overwrite() {
        let pool = open_in_memory().await.unwrap();
        assert_eq!(get_setting(&pool, "qrz.W1TEST.api_key").await.unwrap(), None);

        set_setting(&pool, "qrz.W1TEST.api_key", "AAAA-BBBB").await.unwrap();
        set_setting(&pool, "qrz.W1TEST.api_key", "CCCC-DDDD").await.unwrap();
        assert_eq!(
            get_setting(&pool, "qrz.W1TEST.api_key").await.unwrap().as_deref(),
            Some("CCCC-DDDD")
        );
    }
}
