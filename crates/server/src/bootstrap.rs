use std::sync::Arc;

use reengage_agent::build_oracle;
use reengage_core::clock::{Clock, SystemClock};
use reengage_core::config::{AppConfig, ConfigError, LoadOptions};
use reengage_core::notify::LogNotifier;
use reengage_core::scheduler::{RecommendationScheduler, SchedulerSettings};
use reengage_core::workflow::WorkflowSettings;
use reengage_core::RecommendationAdmin;
use reengage_db::repositories::sql_collaborators;
use reengage_db::{connect_with_config, migrations, DbPool};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub scheduler: RecommendationScheduler,
    pub admin: RecommendationAdmin,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
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

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let collaborators = sql_collaborators(&db_pool, build_oracle(&config.oracle), clock);
    let admin = RecommendationAdmin::new(
        collaborators.store.clone(),
        collaborators.oracle.clone(),
        collaborators.clock.clone(),
    );
    let scheduler = RecommendationScheduler::new(
        collaborators,
        WorkflowSettings::from(&config.workflow),
        SchedulerSettings {
            schedule: config.scheduler.schedule()?,
            retention: config.workflow.retention(),
        },
        Arc::new(LogNotifier),
    );
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        oracle_kind = config.oracle.kind.as_str(),
        oracle_configured = scheduler.oracle_configured(),
        schedule = %config.scheduler.cron,
        "recommendation services wired"
    );

    Ok(Application { config, db_pool, scheduler, admin })
}
