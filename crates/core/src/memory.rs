//! In-memory collaborators for tests and local runs without a database.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::customer::{CustomerId, CustomerInfo};
use crate::domain::order::{CompletedOrder, ProductId};
use crate::domain::query::{Page, RecommendationAnalytics, RecommendationQuery};
use crate::domain::recommendation::{
    RecommendationId, RecommendationRecord, RecommendationStatus,
};
use crate::errors::ApplicationError;
use crate::ports::{
    CategoryResolver, CustomerDirectory, OrderSource, PortResult, RecommendationStore,
};

#[derive(Default)]
pub struct InMemoryOrderSource {
    orders: RwLock<Vec<CompletedOrder>>,
    unavailable: RwLock<HashSet<CustomerId>>,
}

impl InMemoryOrderSource {
    pub async fn add(&self, order: CompletedOrder) {
        self.orders.write().await.push(order);
    }

    /// Makes order lookups for `customer_id` fail with a persistence error.
    pub async fn make_unavailable(&self, customer_id: CustomerId) {
        self.unavailable.write().await.insert(customer_id);
    }
}

#[async_trait::async_trait]
impl OrderSource for InMemoryOrderSource {
    async fn find_completed_orders(
        &self,
        customer_id: &CustomerId,
    ) -> PortResult<Vec<CompletedOrder>> {
        if self.unavailable.read().await.contains(customer_id) {
            return Err(ApplicationError::Persistence(format!(
                "order history for {customer_id} is unavailable"
            )));
        }
        let orders = self.orders.read().await;
        let mut matching: Vec<CompletedOrder> =
            orders.iter().filter(|order| &order.customer_id == customer_id).cloned().collect();
        matching.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(matching)
    }

    async fn list_customers_with_completed_orders(&self) -> PortResult<Vec<CustomerId>> {
        let orders = self.orders.read().await;
        let distinct: BTreeSet<CustomerId> =
            orders.iter().map(|order| order.customer_id.clone()).collect();
        Ok(distinct.into_iter().collect())
    }
}

#[derive(Default)]
pub struct InMemoryCatalog {
    categories: RwLock<HashMap<ProductId, String>>,
}

impl InMemoryCatalog {
    pub async fn assign(&self, product_id: ProductId, category: impl Into<String>) {
        self.categories.write().await.insert(product_id, category.into());
    }
}

#[async_trait::async_trait]
impl CategoryResolver for InMemoryCatalog {
    async fn category_of(&self, product_id: &ProductId) -> PortResult<Option<String>> {
        Ok(self.categories.read().await.get(product_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryCustomerDirectory {
    customers: RwLock<HashMap<CustomerId, CustomerInfo>>,
}

impl InMemoryCustomerDirectory {
    pub async fn add(&self, info: CustomerInfo) {
        self.customers.write().await.insert(info.id.clone(), info);
    }
}

#[async_trait::async_trait]
impl CustomerDirectory for InMemoryCustomerDirectory {
    async fn basic_info(&self, customer_id: &CustomerId) -> PortResult<Option<CustomerInfo>> {
        Ok(self.customers.read().await.get(customer_id).cloned())
    }
}

/// Keeps records in insertion order.
#[derive(Default)]
pub struct InMemoryRecommendationStore {
    records: RwLock<Vec<RecommendationRecord>>,
}

impl InMemoryRecommendationStore {
    pub async fn all(&self) -> Vec<RecommendationRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait::async_trait]
impl RecommendationStore for InMemoryRecommendationStore {
    async fn find_active_unexpired(
        &self,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<RecommendationRecord>> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|record| &record.customer_id == customer_id && record.is_active_at(now))
            .cloned()
            .collect())
    }

    async fn insert(&self, record: RecommendationRecord) -> PortResult<RecommendationId> {
        record.validate()?;
        let id = record.id.clone();
        self.records.write().await.push(record);
        Ok(id)
    }

    async fn expire_active(
        &self,
        customer_id: Option<&CustomerId>,
        now: DateTime<Utc>,
    ) -> PortResult<u64> {
        let mut records = self.records.write().await;
        let mut expired = 0;
        for record in records.iter_mut().filter(|record| {
            record.status == RecommendationStatus::Active
                && customer_id.map_or(true, |id| &record.customer_id == id)
        }) {
            record.status = RecommendationStatus::Expired;
            record.last_updated = now;
            expired += 1;
        }
        Ok(expired)
    }

    async fn expire_past_due(&self, now: DateTime<Utc>) -> PortResult<u64> {
        let mut records = self.records.write().await;
        let mut expired = 0;
        for record in records.iter_mut().filter(|record| record.is_past_due(now)) {
            record.status = RecommendationStatus::Expired;
            record.last_updated = now;
            expired += 1;
        }
        Ok(expired)
    }

    async fn delete_terminal_older_than(
        &self,
        statuses: &[RecommendationStatus],
        cutoff: DateTime<Utc>,
    ) -> PortResult<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|record| !(statuses.contains(&record.status) && record.last_updated < cutoff));
        Ok((before - records.len()) as u64)
    }

    async fn update_status(
        &self,
        id: &RecommendationId,
        status: RecommendationStatus,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> PortResult<Option<RecommendationRecord>> {
        let mut records = self.records.write().await;
        let Some(record) = records.iter_mut().find(|record| &record.id == id) else {
            return Ok(None);
        };
        record.status = status;
        record.last_updated = now;
        if let Some(notes) = notes {
            record.ai_analysis.personalization_notes = notes.to_owned();
        }
        Ok(Some(record.clone()))
    }

    async fn find_by_id(&self, id: &RecommendationId) -> PortResult<Option<RecommendationRecord>> {
        let records = self.records.read().await;
        Ok(records.iter().find(|record| &record.id == id).cloned())
    }

    async fn list(&self, query: &RecommendationQuery) -> PortResult<Page<RecommendationRecord>> {
        let records = self.records.read().await;
        Ok(query.apply(records.iter().cloned()))
    }

    async fn list_for_customer(
        &self,
        customer_id: &CustomerId,
        status: RecommendationStatus,
    ) -> PortResult<Vec<RecommendationRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<RecommendationRecord> = records
            .iter()
            .filter(|record| &record.customer_id == customer_id && record.status == status)
            .cloned()
            .collect();
        matching.sort_by(|left, right| right.priority_score.cmp(&left.priority_score));
        Ok(matching)
    }

    async fn analytics(&self) -> PortResult<RecommendationAnalytics> {
        let records = self.records.read().await;
        Ok(RecommendationAnalytics::from_records(&records))
    }

    async fn latest_generated_at(&self) -> PortResult<Option<DateTime<Utc>>> {
        let records = self.records.read().await;
        Ok(records.iter().map(|record| record.generated_at).max())
    }

    async fn count_expiring_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> PortResult<u64> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|record| {
                record.status == RecommendationStatus::Active
                    && record.expires_at >= from
                    && record.expires_at <= until
            })
            .count() as u64)
    }

    async fn delete_expired_terminal(&self, now: DateTime<Utc>) -> PortResult<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|record| {
            !(matches!(record.status, RecommendationStatus::Expired | RecommendationStatus::Dismissed)
                && record.expires_at < now)
        });
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::InMemoryRecommendationStore;
    use crate::domain::customer::CustomerId;
    use crate::domain::recommendation::tests::{sample_candidate, sample_profile};
    use crate::domain::recommendation::{
        RecommendationRecord, RecommendationStatus, RecommendationType,
    };
    use crate::ports::RecommendationStore;

    #[tokio::test]
    async fn update_status_replaces_notes_and_stamps_last_updated() {
        let store = InMemoryRecommendationStore::default();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().expect("valid timestamp");
        let record = RecommendationRecord::from_candidate(
            &sample_profile("c-1"),
            sample_candidate(RecommendationType::WinBack, 60),
            None,
            now,
            Duration::days(2),
        )
        .expect("valid record");
        let id = store.insert(record).await.expect("insert");

        let later = now + Duration::hours(3);
        let updated = store
            .update_status(&id, RecommendationStatus::Processed, Some("called the customer"), later)
            .await
            .expect("update")
            .expect("record exists");

        assert_eq!(updated.status, RecommendationStatus::Processed);
        assert_eq!(updated.last_updated, later);
        assert_eq!(updated.ai_analysis.personalization_notes, "called the customer");
        assert!(store
            .find_active_unexpired(&CustomerId::new("c-1"), later)
            .await
            .expect("query")
            .is_empty());
    }

    #[tokio::test]
    async fn expire_active_scopes_to_one_customer() {
        let store = InMemoryRecommendationStore::default();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().expect("valid timestamp");
        for customer in ["c-1", "c-2"] {
            let record = RecommendationRecord::from_candidate(
                &sample_profile(customer),
                sample_candidate(RecommendationType::Upsell, 50),
                None,
                now,
                Duration::days(2),
            )
            .expect("valid record");
            store.insert(record).await.expect("insert");
        }

        let expired =
            store.expire_active(Some(&CustomerId::new("c-1")), now).await.expect("expire");
        assert_eq!(expired, 1);
        let remaining =
            store.find_active_unexpired(&CustomerId::new("c-2"), now).await.expect("query");
        assert_eq!(remaining.len(), 1);
    }
}
