use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use vitalia_agent::prompts::PromptError;
use vitalia_agent::{ProviderChain, ProviderError};
use vitalia_core::config::{AppConfig, ConfigError, LoadOptions};
use vitalia_core::privacy::crypto::CryptoError;
use vitalia_db::{connect_with_config, migrations, DbPool};

use crate::state::AppState;

pub struct Application {
    pub config: Arc<AppConfig>,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("encryption key rejected: {0}")]
    Cipher(#[source] CryptoError),
    #[error("provider chain could not be built: {0}")]
    Provider(#[source] ProviderError),
    #[error("prompt templates failed to load: {0}")]
    Prompt(#[source] PromptError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let chain =
        Arc::new(ProviderChain::from_config(&config.providers).map_err(BootstrapError::Provider)?);
    info!(
        event_name = "system.bootstrap.providers_ready",
        correlation_id = "bootstrap",
        tiers = ?chain.kinds(),
        "provider chain assembled"
    );

    let state = AppState::assemble(config, db_pool.clone(), chain)?;
    Ok(Application { config: state.config.clone(), db_pool, state })
}
