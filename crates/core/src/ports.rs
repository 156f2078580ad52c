//! Collaborator seams consumed by behaviour analysis, the workflow runner and the scheduler.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::customer::{CustomerId, CustomerInfo};
use crate::domain::order::{CompletedOrder, ProductId};
use crate::domain::profile::CustomerBehaviorProfile;
use crate::domain::query::{Page, RecommendationAnalytics, RecommendationQuery};
use crate::domain::recommendation::{
    RecommendationCandidate, RecommendationId, RecommendationRecord, RecommendationStatus,
};
use crate::errors::ApplicationError;

pub type PortResult<T> = Result<T, ApplicationError>;

#[async_trait]
pub trait OrderSource: Send + Sync {
    /// Delivered orders for one customer, newest first.
    async fn find_completed_orders(&self, customer_id: &CustomerId)
        -> PortResult<Vec<CompletedOrder>>;

    /// Distinct customers with at least one delivered order, in a stable order.
    async fn list_customers_with_completed_orders(&self) -> PortResult<Vec<CustomerId>>;
}

#[async_trait]
pub trait CategoryResolver: Send + Sync {
    async fn category_of(&self, product_id: &ProductId) -> PortResult<Option<String>>;
}

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn basic_info(&self, customer_id: &CustomerId) -> PortResult<Option<CustomerInfo>>;
}

/// Pluggable scoring function. Implementations may be slow and non-deterministic.
#[async_trait]
pub trait RecommendationOracle: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn score(
        &self,
        profile: &CustomerBehaviorProfile,
    ) -> PortResult<Vec<RecommendationCandidate>>;
}

/// Durable recommendation repository. Every write is keyed by record id and independent.
#[async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn find_active_unexpired(
        &self,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<RecommendationRecord>>;

    async fn insert(&self, record: RecommendationRecord) -> PortResult<RecommendationId>;

    /// Marks every active record as expired, for one customer or for all of them.
    async fn expire_active(
        &self,
        customer_id: Option<&CustomerId>,
        now: DateTime<Utc>,
    ) -> PortResult<u64>;

    /// Expires active records whose `expires_at` is before `now`.
    async fn expire_past_due(&self, now: DateTime<Utc>) -> PortResult<u64>;

    /// Deletes records in `statuses` whose `last_updated` is before `cutoff`.
    async fn delete_terminal_older_than(
        &self,
        statuses: &[RecommendationStatus],
        cutoff: DateTime<Utc>,
    ) -> PortResult<u64>;

    /// Sets `status`, stamps `last_updated`, and replaces the personalization notes when given.
    async fn update_status(
        &self,
        id: &RecommendationId,
        status: RecommendationStatus,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> PortResult<Option<RecommendationRecord>>;

    async fn find_by_id(&self, id: &RecommendationId) -> PortResult<Option<RecommendationRecord>>;

    async fn list(&self, query: &RecommendationQuery) -> PortResult<Page<RecommendationRecord>>;

    /// Records for one customer in `status`, highest priority first.
    async fn list_for_customer(
        &self,
        customer_id: &CustomerId,
        status: RecommendationStatus,
    ) -> PortResult<Vec<RecommendationRecord>>;

    async fn analytics(&self) -> PortResult<RecommendationAnalytics>;

    async fn latest_generated_at(&self) -> PortResult<Option<DateTime<Utc>>>;

    /// Active records with `from <= expires_at <= until`.
    async fn count_expiring_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> PortResult<u64>;

    /// Deletes expired or dismissed records whose `expires_at` is before `now`.
    async fn delete_expired_terminal(&self, now: DateTime<Utc>) -> PortResult<u64>;
}
