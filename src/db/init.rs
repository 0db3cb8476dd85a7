// Database initialization and migration handling
use sqlx::{sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use std::path::Path;

use crate::db::migrations::MIGRATION_001;
use crate::error::QrzError;

/// Open (or create) the database file and apply migrations
pub async fn open_db(path: &Path) -> Result<Pool<Sqlite>, QrzError> {
    let db_url = format!("sqlite:{}?mode=rwc", path.display());

    log::info!("Initializing database at: {}", path.display());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    // Enable WAL mode for better performance
    sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;

    run_migrations(&pool).await?;

    log::info!("Database initialization complete");

    Ok(pool)
}

/// In-memory database on a single connection (each connection would
/// otherwise get its own empty database)
pub async fn open_in_memory() -> Result<Pool<Sqlite>, QrzError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// Run all pending migrations
async fn run_migrations(pool: &Pool<Sqlite>) -> Result<(), QrzError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    let applied: bool =
        sqlx::query("SELECT COUNT(*) as count FROM _migrations WHERE name = 'migration_001'")
            .fetch_one(pool)
            .await
            .map(|row| row.get::<i64, _>("count") > 0)?;

    if !applied {
        log::info!("Applying migration_001...");

        let mut tx = pool.begin().await?;

        // SQLite executes one statement per query
        for statement in MIGRATION_001.split(';') {
            let stmt = strip_sql_comments(statement);
            if !stmt.is_empty() {
                sqlx::query(&stmt).execute(&mut *tx).await?;
            }
        }

        sqlx::query("INSERT INTO _migrations (name, applied_at) VALUES ('migration_001', datetime('now'))")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        log::info!("Migration 001 applied successfully");
    }

    Ok(())
}

fn strip_sql_comments(statement: &str) -> String {
    statement
        .lines()
        .map(|line| match line.find("--") {
            Some(idx) => &line[..idx],
            None => line,
        })
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
