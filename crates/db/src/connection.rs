use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

use loanbot_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

// Intake turns are many short writes against one file, so every connection
// opts into WAL with a busy timeout: a reader polling /loans must not fail
// a writer mid-turn. The schema carries no foreign keys (loan_id is a loose
// reference), so no enforcement pragma is needed.
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Open a pool shaped by the `[database]` section of the configuration.
pub async fn connect(database: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(database.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(database.timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&database.url)
        .await
}
