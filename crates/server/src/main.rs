mod bootstrap;
mod health;
mod routes;

use std::time::Duration;

use anyhow::Result;
use axum::Router;
use reengage_core::config::{AppConfig, LoadOptions};
use reengage_core::scheduler::RecommendationScheduler;
use tracing::{error, info, warn};

fn init_logging(config: &AppConfig) {
    use reengage_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging must be up before bootstrap emits its first event.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    if app.config.scheduler.enabled {
        app.scheduler.start()?;
    }
    if app.config.scheduler.run_on_startup {
        spawn_startup_pass(app.scheduler.clone());
    }

    let router = Router::new()
        .merge(health::router(app.db_pool.clone(), app.scheduler.clone()))
        .merge(routes::router(routes::ApiState {
            scheduler: app.scheduler.clone(),
            admin: app.admin.clone(),
        }));

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "reengage-server listening"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "reengage-server stopping"
    );
    app.scheduler.stop();
    drain(&app.scheduler, Duration::from_secs(app.config.server.graceful_shutdown_secs)).await;
    app.db_pool.close().await;

    Ok(())
}

fn spawn_startup_pass(scheduler: RecommendationScheduler) {
    tokio::spawn(async move {
        match scheduler.trigger_manual(false).await {
            Ok(outcome) => info!(
                event_name = "system.startup_run.completed",
                correlation_id = %outcome.run_id,
                processed = outcome.processed.len(),
                total_generated = outcome.total_generated,
                "startup recommendation pass finished"
            ),
            Err(error) => error!(
                event_name = "system.startup_run.failed",
                correlation_id = "bootstrap",
                error = %error,
                "startup recommendation pass failed"
            ),
        }
    });
}

/// Lets an in-flight pass finish before the pool closes.
async fn drain(scheduler: &RecommendationScheduler, grace: Duration) {
    let deadline = tokio::time::Instant::now() + grace;
    while scheduler.status().running {
        if tokio::time::Instant::now() >= deadline {
            warn!(
                event_name = "system.shutdown.pass_abandoned",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "recommendation pass still running at shutdown deadline"
            );
            return;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        error!(
            event_name = "system.shutdown.signal_failed",
            correlation_id = "shutdown",
            error = %error,
            "could not listen for ctrl-c"
        );
    }
}
