use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::errors::ApplicationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Scheduled,
    Manual,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }
}

/// Summary handed to admins after a pass finishes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub trigger: TriggerKind,
    pub finished_at: DateTime<Utc>,
    pub processed_customers: usize,
    pub total_recommendations: u64,
    pub failed_customers: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub run_id: String,
    pub trigger: TriggerKind,
    pub finished_at: DateTime<Utc>,
    pub error_message: String,
}

/// Best-effort admin notification. Errors are logged by the caller and never fail a pass.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn run_succeeded(&self, summary: &RunSummary) -> Result<(), ApplicationError>;

    async fn run_failed(&self, failure: &RunFailure) -> Result<(), ApplicationError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn run_succeeded(&self, summary: &RunSummary) -> Result<(), ApplicationError> {
        info!(
            event_name = "notify.run.succeeded",
            correlation_id = %summary.run_id,
            trigger = summary.trigger.as_str(),
            processed_customers = summary.processed_customers,
            total_recommendations = summary.total_recommendations,
            failed_customers = summary.failed_customers,
            "recommendation generation summary"
        );
        Ok(())
    }

    async fn run_failed(&self, failure: &RunFailure) -> Result<(), ApplicationError> {
        error!(
            event_name = "notify.run.failed",
            correlation_id = %failure.run_id,
            trigger = failure.trigger.as_str(),
            error = %failure.error_message,
            "recommendation generation failed"
        );
        Ok(())
    }
}
