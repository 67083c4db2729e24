use crate::commands::CommandResult;
use loanbot_core::config::{AppConfig, LoadOptions};
use loanbot_db::{connect, migrations, DbPool};

enum MigrateFailure {
    Connect(sqlx::Error),
    Apply(sqlx::migrate::MigrateError),
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "migrate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    match runtime.block_on(apply(&config)) {
        Ok(()) => CommandResult::success(
            "migrate",
            format!("schema is current for `{}`", config.database.url),
        ),
        Err(MigrateFailure::Connect(error)) => {
            CommandResult::failure("migrate", "db_connectivity", error.to_string(), 4)
        }
        Err(MigrateFailure::Apply(error)) => {
            CommandResult::failure("migrate", "migration", error.to_string(), 5)
        }
    }
}

async fn apply(config: &AppConfig) -> Result<(), MigrateFailure> {
    let pool: DbPool = connect(&config.database).await.map_err(MigrateFailure::Connect)?;
    let outcome = migrations::run_pending(&pool).await.map_err(MigrateFailure::Apply);
    pool.close().await;
    outcome
}
