use std::sync::Arc;

use chrono::{DateTime, Utc};
use reengage_agent::build_oracle;
use reengage_core::clock::{Clock, SystemClock};
use reengage_core::domain::query::SystemStatus;
use reengage_core::RecommendationAdmin;
use reengage_db::repositories::SqlRecommendationStore;
use serde::Serialize;

use crate::commands::{finish, open_pool, prepare, CommandResult, StepFailure};

#[derive(Debug, Serialize)]
struct StatusReport {
    system: SystemStatus,
    scheduler_enabled: bool,
    schedule: String,
    next_run: Option<DateTime<Utc>>,
    next_run_in_secs: Option<u64>,
}

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("status") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let schedule = config
            .scheduler
            .schedule()
            .map_err(|error| ("config_validation", error.to_string(), 2u8))?;
        let pool = open_pool(&config).await?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let admin = RecommendationAdmin::new(
            Arc::new(SqlRecommendationStore::new(pool.clone())),
            build_oracle(&config.oracle),
            clock.clone(),
        );

        let system = admin
            .system_status()
            .await
            .map_err(|error| ("persistence", error.to_string(), 8u8))?;
        pool.close().await;

        let now = clock.now();
        Ok::<StatusReport, StepFailure>(StatusReport {
            system,
            scheduler_enabled: config.scheduler.enabled,
            schedule: schedule.to_string(),
            next_run: schedule.next_after(now),
            next_run_in_secs: schedule.delay_from(now).map(|delay| delay.as_secs()),
        })
    });

    finish("status", result, |report| {
        let message = if report.system.system_healthy { "system healthy" } else { "system degraded" };
        CommandResult::success_with_data("status", message, Some(report))
    })
}
