use chrono::Utc;
use reengage_core::domain::recommendation::RecommendationStatus;
use reengage_core::ports::RecommendationStore;
use reengage_db::repositories::SqlRecommendationStore;
use serde::Serialize;

use crate::commands::{finish, open_pool, prepare, CommandResult, StepFailure};

#[derive(Debug, Serialize)]
struct SweepReport {
    expired: u64,
    deleted: u64,
    retention_days: u64,
}

/// Expires past-due records, then deletes terminal ones older than the retention window.
pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("sweep") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let store = SqlRecommendationStore::new(pool.clone());
        let now = Utc::now();

        let expired = store
            .expire_past_due(now)
            .await
            .map_err(|error| ("expire_sweep", error.to_string(), 8u8))?;
        let deleted = store
            .delete_terminal_older_than(&RecommendationStatus::TERMINAL, now - config.workflow.retention())
            .await
            .map_err(|error| ("retention_cleanup", error.to_string(), 8u8))?;
        pool.close().await;

        Ok::<SweepReport, StepFailure>(SweepReport {
            expired,
            deleted,
            retention_days: config.workflow.retention_days,
        })
    });

    finish("sweep", result, |report| {
        let message = format!(
            "expired {} recommendations, deleted {} older than {} days",
            report.expired, report.deleted, report.retention_days
        );
        CommandResult::success_with_data("sweep", message, Some(report))
    })
}
