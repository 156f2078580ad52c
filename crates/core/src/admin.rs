//! Operator-facing reads and mutations over stored recommendations.

use std::sync::Arc;

use tracing::info;

use crate::clock::Clock;
use crate::domain::customer::CustomerId;
use crate::domain::query::{Page, RecommendationAnalytics, RecommendationQuery, SystemStatus};
use crate::domain::recommendation::{RecommendationId, RecommendationRecord, RecommendationStatus};
use crate::errors::ApplicationError;
use crate::ports::{RecommendationOracle, RecommendationStore};

/// Window used by [`RecommendationAdmin::system_status`] for "expiring soon".
pub const EXPIRING_SOON_WINDOW_HOURS: i64 = 24;

#[derive(Clone)]
pub struct RecommendationAdmin {
    store: Arc<dyn RecommendationStore>,
    oracle: Arc<dyn RecommendationOracle>,
    clock: Arc<dyn Clock>,
}

impl RecommendationAdmin {
    pub fn new(
        store: Arc<dyn RecommendationStore>,
        oracle: Arc<dyn RecommendationOracle>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, oracle, clock }
    }

    pub async fn list(
        &self,
        query: RecommendationQuery,
    ) -> Result<Page<RecommendationRecord>, ApplicationError> {
        self.store.list(&query.normalized()).await
    }

    pub async fn list_for_customer(
        &self,
        customer_id: &CustomerId,
        status: Option<RecommendationStatus>,
    ) -> Result<Vec<RecommendationRecord>, ApplicationError> {
        self.store
            .list_for_customer(customer_id, status.unwrap_or(RecommendationStatus::Active))
            .await
    }

    /// Manual status change. Records can never be moved back to `active`.
    pub async fn update_status(
        &self,
        id: &RecommendationId,
        status: RecommendationStatus,
        notes: Option<&str>,
    ) -> Result<RecommendationRecord, ApplicationError> {
        let current = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("recommendation {id}")))?;
        current.status.check_manual_transition(status)?;

        let updated = self
            .store
            .update_status(id, status, notes, self.clock.now())
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("recommendation {id}")))?;

        info!(
            event_name = "admin.recommendation.status_updated",
            correlation_id = %id,
            customer_id = %updated.customer_id,
            from = current.status.as_str(),
            to = status.as_str(),
            "recommendation status updated"
        );
        Ok(updated)
    }

    pub async fn analytics(&self) -> Result<RecommendationAnalytics, ApplicationError> {
        self.store.analytics().await
    }

    pub async fn system_status(&self) -> Result<SystemStatus, ApplicationError> {
        let now = self.clock.now();
        let last_generation = self.store.latest_generated_at().await?;
        let expiring_soon = self
            .store
            .count_expiring_between(now, now + chrono::Duration::hours(EXPIRING_SOON_WINDOW_HOURS))
            .await?;
        Ok(SystemStatus::new(self.oracle.is_configured(), last_generation, expiring_soon))
    }

    /// Deletes expired and dismissed records whose expiry has passed.
    pub async fn cleanup(&self) -> Result<u64, ApplicationError> {
        let deleted = self.store.delete_expired_terminal(self.clock.now()).await?;
        info!(
            event_name = "admin.recommendation.cleanup",
            correlation_id = "admin",
            deleted,
            "deleted expired recommendations"
        );
        Ok(deleted)
    }
}
