use std::sync::Arc;

use loanbot_agent::{Extractor, IntakeEngine, LlmExtractor, OpenAiChatClient, RuleBasedExtractor};
use loanbot_core::config::{AppConfig, ConfigError, LlmProvider, LoadOptions};
use loanbot_db::repositories::{SqlConversationRepository, SqlLoanRepository};
use loanbot_db::{connect, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<IntakeEngine>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client construction failed: {0}")]
    LlmClient(#[source] anyhow::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let extractor = build_extractor(&config)?;
    let engine = Arc::new(IntakeEngine::new(
        extractor,
        Arc::new(SqlConversationRepository::new(db_pool.clone())),
        Arc::new(SqlLoanRepository::new(db_pool.clone())),
    ));
    info!(
        event_name = "system.bootstrap.engine_ready",
        provider = ?config.llm.provider,
        "intake engine initialized"
    );

    Ok(Application { config, db_pool, engine })
}

fn build_extractor(config: &AppConfig) -> Result<Arc<dyn Extractor>, BootstrapError> {
    match config.llm.provider {
        LlmProvider::RuleBased => Ok(Arc::new(RuleBasedExtractor::new())),
        LlmProvider::OpenAi | LlmProvider::Ollama => {
            let client =
                OpenAiChatClient::new(&config.llm).map_err(BootstrapError::LlmClient)?;
            Ok(Arc::new(LlmExtractor::new(client)))
        }
    }
}

#[cfg(test)]
mod tests {
    use loanbot_core::config::{ConfigOverrides, LlmProvider, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn rule_based_options(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                llm_provider: Some(LlmProvider::RuleBased),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_builds_the_engine() {
        let app = bootstrap(rule_based_options("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('loans', 'loan_sessions')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("baseline tables should be available after bootstrap");
        assert_eq!(table_count, 2, "bootstrap should expose the intake tables");

        let turn = app.engine.execute_turn(None, None).await.expect("first turn should succeed");
        assert!(!turn.completed);
        assert_eq!(turn.pending_fields.len(), 4);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_when_credentials_are_missing() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                llm_provider: Some(LlmProvider::OpenAi),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("missing api key should fail").to_string();
        assert!(message.contains("llm.api_key"));
    }
}
