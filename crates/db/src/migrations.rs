use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}

#[cfg(test)]
mod tests {
    use loanbot_core::config::DatabaseConfig;
    use sqlx::Row;

    use super::run_pending;
    use crate::{connect, migrations::MIGRATOR};

    fn memory_database() -> DatabaseConfig {
        DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            timeout_secs: 30,
        }
    }

    #[tokio::test]
    async fn migrations_create_baseline_tables() {
        let pool = connect(&memory_database()).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        let table_count = sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master \
             WHERE type = 'table' AND name IN ('loans', 'loan_sessions')",
        )
        .fetch_one(&pool)
        .await
        .expect("check intake tables")
        .get::<i64, _>("count");

        assert_eq!(table_count, 2);
    }

    #[tokio::test]
    async fn migrations_are_reversible() {
        let pool = connect(&memory_database()).await.expect("connect");
        run_pending(&pool).await.expect("run migrations");

        MIGRATOR.undo(&pool, 0).await.expect("undo migrations");

        let table_count = sqlx::query(
            "SELECT COUNT(*) AS count FROM sqlite_master \
             WHERE type = 'table' AND name IN ('loans', 'loan_sessions')",
        )
        .fetch_one(&pool)
        .await
        .expect("check intake tables removed")
        .get::<i64, _>("count");

        assert_eq!(table_count, 0);
    }
}
