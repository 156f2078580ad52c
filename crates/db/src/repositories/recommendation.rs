use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;

use reengage_core::domain::customer::CustomerId;
use reengage_core::domain::query::{
    Page, Pagination, RecommendationAnalytics, RecommendationQuery,
};
use reengage_core::domain::recommendation::{
    RecommendationId, RecommendationRecord, RecommendationStatus, RecommendationType,
};
use reengage_core::errors::ApplicationError;
use reengage_core::ports::{PortResult, RecommendationStore};

use super::{column, decode_timestamp, encode_timestamp, RepositoryError};
use crate::DbPool;

const COLUMNS: &str = "id, customer_id, customer_email, customer_name, recommendation_type,
    priority_score, reasons_json, suggested_actions_json, customer_insights_json,
    ai_analysis_json, status, generated_at, expires_at, last_updated";

pub struct SqlRecommendationStore {
    pool: DbPool,
}

impl SqlRecommendationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn persistence(error: sqlx::Error) -> ApplicationError {
    RepositoryError::from(error).into()
}

fn decode_json<T: DeserializeOwned>(column_name: &str, raw: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|error| RepositoryError::Decode(format!("{column_name}: {error}")))
}

fn encode_json<T: serde::Serialize>(column_name: &str, value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|error| RepositoryError::Decode(format!("{column_name}: {error}")))
}

fn row_to_record(row: &SqliteRow) -> Result<RecommendationRecord, RepositoryError> {
    let kind: String = column(row, "recommendation_type")?;
    let status: String = column(row, "status")?;
    let priority: i64 = column(row, "priority_score")?;
    let reasons: String = column(row, "reasons_json")?;
    let actions: String = column(row, "suggested_actions_json")?;
    let insights: String = column(row, "customer_insights_json")?;
    let analysis: String = column(row, "ai_analysis_json")?;
    let generated_at: String = column(row, "generated_at")?;
    let expires_at: String = column(row, "expires_at")?;
    let last_updated: String = column(row, "last_updated")?;

    Ok(RecommendationRecord {
        id: RecommendationId(column(row, "id")?),
        customer_id: CustomerId(column(row, "customer_id")?),
        customer_email: column(row, "customer_email")?,
        customer_name: column(row, "customer_name")?,
        recommendation_type: RecommendationType::parse(&kind)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown recommendation type `{kind}`")))?,
        priority_score: u8::try_from(priority)
            .map_err(|_| RepositoryError::Decode(format!("priority out of range: {priority}")))?,
        reasons: decode_json("reasons_json", &reasons)?,
        suggested_actions: decode_json("suggested_actions_json", &actions)?,
        customer_insights: decode_json("customer_insights_json", &insights)?,
        ai_analysis: decode_json("ai_analysis_json", &analysis)?,
        status: RecommendationStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown status `{status}`")))?,
        generated_at: decode_timestamp("generated_at", &generated_at)?,
        expires_at: decode_timestamp("expires_at", &expires_at)?,
        last_updated: decode_timestamp("last_updated", &last_updated)?,
    })
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, query: &RecommendationQuery) {
    builder.push(" WHERE 1 = 1");
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(kind) = query.recommendation_type {
        builder.push(" AND recommendation_type = ").push_bind(kind.as_str());
    }
    if let Some(min) = query.min_priority {
        builder.push(" AND priority_score >= ").push_bind(i64::from(min));
    }
    if let Some(max) = query.max_priority {
        builder.push(" AND priority_score <= ").push_bind(i64::from(max));
    }
}

#[async_trait::async_trait]
impl RecommendationStore for SqlRecommendationStore {
    async fn find_active_unexpired(
        &self,
        customer_id: &CustomerId,
        now: DateTime<Utc>,
    ) -> PortResult<Vec<RecommendationRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM recommendation
             WHERE customer_id = ? AND status = 'active' AND expires_at > ?
             ORDER BY priority_score DESC, generated_at ASC"
        ))
        .bind(customer_id.as_str())
        .bind(encode_timestamp(now))
        .fetch_all(&self.pool)
        .await
        .map_err(persistence)?;

        Ok(rows.iter().map(row_to_record).collect::<Result<_, _>>()?)
    }

    async fn insert(&self, record: RecommendationRecord) -> PortResult<RecommendationId> {
        record.validate()?;
        sqlx::query(&format!(
            "INSERT INTO recommendation ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&record.id.0)
        .bind(record.customer_id.as_str())
        .bind(&record.customer_email)
        .bind(&record.customer_name)
        .bind(record.recommendation_type.as_str())
        .bind(i64::from(record.priority_score))
        .bind(encode_json("reasons_json", &record.reasons)?)
        .bind(encode_json("suggested_actions_json", &record.suggested_actions)?)
        .bind(encode_json("customer_insights_json", &record.customer_insights)?)
        .bind(encode_json("ai_analysis_json", &record.ai_analysis)?)
        .bind(record.status.as_str())
        .bind(encode_timestamp(record.generated_at))
        .bind(encode_timestamp(record.expires_at))
        .bind(encode_timestamp(record.last_updated))
        .execute(&self.pool)
        .await
        .map_err(persistence)?;

        Ok(record.id)
    }

    async fn expire_active(
        &self,
        customer_id: Option<&CustomerId>,
        now: DateTime<Utc>,
    ) -> PortResult<u64> {
        let result = match customer_id {
            Some(customer_id) => {
                sqlx::query(
                    "UPDATE recommendation SET status = 'expired', last_updated = ?
                     WHERE status = 'active' AND customer_id = ?",
                )
                .bind(encode_timestamp(now))
                .bind(customer_id.as_str())
                .execute(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "UPDATE recommendation SET status = 'expired', last_updated = ?
                     WHERE status = 'active'",
                )
                .bind(encode_timestamp(now))
                .execute(&self.pool)
                .await
            }
        }
        .map_err(persistence)?;

        Ok(result.rows_affected())
    }

    async fn expire_past_due(&self, now: DateTime<Utc>) -> PortResult<u64> {
        let now = encode_timestamp(now);
        let result = sqlx::query(
            "UPDATE recommendation SET status = 'expired', last_updated = ?
             WHERE status = 'active' AND expires_at < ?",
        )
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(persistence)?;

        debug!(
            event_name = "store.recommendation.expired_past_due",
            rows = result.rows_affected(),
            "expired past-due recommendations"
        );
        Ok(result.rows_affected())
    }

    async fn delete_terminal_older_than(
        &self,
        statuses: &[RecommendationStatus],
        cutoff: DateTime<Utc>,
    ) -> PortResult<u64> {
        if statuses.is_empty() {
            return Ok(0);
        }
        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM recommendation WHERE status IN (");
        {
            let mut separated = builder.separated(", ");
            for status in statuses {
                separated.push_bind(status.as_str());
            }
        }
        builder.push(") AND last_updated < ").push_bind(encode_timestamp(cutoff));

        let result = builder.build().execute(&self.pool).await.map_err(persistence)?;
        debug!(
            event_name = "store.recommendation.retention_deleted",
            rows = result.rows_affected(),
            cutoff = %cutoff,
            "deleted terminal recommendations past retention"
        );
        Ok(result.rows_affected())
    }

    async fn update_status(
        &self,
        id: &RecommendationId,
        status: RecommendationStatus,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> PortResult<Option<RecommendationRecord>> {
        let mut tx = self.pool.begin().await.map_err(persistence)?;

        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM recommendation WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(persistence)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut record = row_to_record(&row)?;
        record.status = status;
        record.last_updated = now;
        if let Some(notes) = notes {
            record.ai_analysis.personalization_notes = notes.to_owned();
        }

        sqlx::query(
            "UPDATE recommendation SET status = ?, last_updated = ?, ai_analysis_json = ?
             WHERE id = ?",
        )
        .bind(record.status.as_str())
        .bind(encode_timestamp(record.last_updated))
        .bind(encode_json("ai_analysis_json", &record.ai_analysis)?)
        .bind(&id.0)
        .execute(&mut *tx)
        .await
        .map_err(persistence)?;

        tx.commit().await.map_err(persistence)?;
        Ok(Some(record))
    }

    async fn find_by_id(&self, id: &RecommendationId) -> PortResult<Option<RecommendationRecord>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM recommendation WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(persistence)?;

        match row {
            Some(ref row) => Ok(Some(row_to_record(row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, query: &RecommendationQuery) -> PortResult<Page<RecommendationRecord>> {
        let query = query.clone().normalized();

        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total FROM recommendation");
        push_filters(&mut count, &query);
        let total_row = count.build().fetch_one(&self.pool).await.map_err(persistence)?;
        let total: i64 = column(&total_row, "total")?;

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM recommendation"));
        push_filters(&mut select, &query);
        select
            .push(format!(" ORDER BY {} {}, id ASC", query.sort_by.as_str(), query.direction.as_sql()))
            .push(" LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(query.offset()).unwrap_or(i64::MAX));
        let rows = select.build().fetch_all(&self.pool).await.map_err(persistence)?;

        let items = rows.iter().map(row_to_record).collect::<Result<Vec<_>, _>>()?;
        Ok(Page {
            items,
            pagination: Pagination::new(query.page, query.limit, u64::try_from(total).unwrap_or(0)),
        })
    }

    async fn list_for_customer(
        &self,
        customer_id: &CustomerId,
        status: RecommendationStatus,
    ) -> PortResult<Vec<RecommendationRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM recommendation
             WHERE customer_id = ? AND status = ?
             ORDER BY priority_score DESC, generated_at DESC"
        ))
        .bind(customer_id.as_str())
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(persistence)?;

        Ok(rows.iter().map(row_to_record).collect::<Result<_, _>>()?)
    }

    async fn analytics(&self) -> PortResult<RecommendationAnalytics> {
        let rows = sqlx::query(&format!("SELECT {COLUMNS} FROM recommendation"))
            .fetch_all(&self.pool)
            .await
            .map_err(persistence)?;
        let records = rows.iter().map(row_to_record).collect::<Result<Vec<_>, _>>()?;
        Ok(RecommendationAnalytics::from_records(&records))
    }

    async fn latest_generated_at(&self) -> PortResult<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT MAX(generated_at) AS latest FROM recommendation")
            .fetch_one(&self.pool)
            .await
            .map_err(persistence)?;
        let latest: Option<String> = column(&row, "latest")?;
        Ok(latest.map(|raw| decode_timestamp("generated_at", &raw)).transpose()?)
    }

    async fn count_expiring_between(
        &self,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> PortResult<u64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total FROM recommendation
             WHERE status = 'active' AND expires_at >= ? AND expires_at <= ?",
        )
        .bind(encode_timestamp(from))
        .bind(encode_timestamp(until))
        .fetch_one(&self.pool)
        .await
        .map_err(persistence)?;
        let total: i64 = column(&row, "total")?;
        Ok(u64::try_from(total).unwrap_or(0))
    }

    async fn delete_expired_terminal(&self, now: DateTime<Utc>) -> PortResult<u64> {
        let result = sqlx::query(
            "DELETE FROM recommendation
             WHERE status IN ('expired', 'dismissed') AND expires_at < ?",
        )
        .bind(encode_timestamp(now))
        .execute(&self.pool)
        .await
        .map_err(persistence)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use reengage_core::domain::customer::CustomerId;
    use reengage_core::domain::profile::CustomerBehaviorProfile;
    use reengage_core::domain::query::{RecommendationQuery, SortDirection, SortField};
    use reengage_core::domain::recommendation::{
        CandidateAnalysis, InsightOverrides, RecommendationCandidate, RecommendationRecord,
        RecommendationStatus, RecommendationType,
    };
    use reengage_core::errors::ApplicationError;
    use reengage_core::ports::RecommendationStore;
    use rust_decimal::Decimal;

    use super::SqlRecommendationStore;
    use crate::{connect_with_settings, migrations};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 2, 0, 0).single().expect("valid timestamp")
    }

    async fn setup() -> SqlRecommendationStore {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlRecommendationStore::new(pool)
    }

    fn profile(customer: &str) -> CustomerBehaviorProfile {
        CustomerBehaviorProfile {
            customer_id: CustomerId::new(customer),
            total_spent: Decimal::from(900),
            order_count: 3,
            average_order_value: Decimal::from(300),
            last_order_date: Some(now() - Duration::days(10)),
            days_since_last_order: Some(10),
            purchase_frequency: Decimal::new(15, 1),
            favorite_categories: Vec::new(),
            customer_lifetime_value: Decimal::from(6750),
            order_trends: Default::default(),
        }
    }

    fn record(
        customer: &str,
        kind: RecommendationType,
        priority: u8,
        generated_at: DateTime<Utc>,
    ) -> RecommendationRecord {
        let candidate = RecommendationCandidate {
            recommendation_type: kind,
            priority_score: priority,
            reasons: vec!["steady buyer".to_string()],
            suggested_actions: vec!["send a thank-you offer".to_string()],
            insights: InsightOverrides::default(),
            analysis: CandidateAnalysis {
                behavioral_pattern: "regular".to_string(),
                personalization_notes: "mention the lamp collection".to_string(),
                ..CandidateAnalysis::default()
            },
        };
        RecommendationRecord::from_candidate(
            &profile(customer),
            candidate,
            None,
            generated_at,
            Duration::days(2),
        )
        .expect("valid record")
    }

    #[tokio::test]
    async fn insert_then_read_back_preserves_snapshots() {
        let store = setup().await;
        let original = record("c-1", RecommendationType::LoyaltyReward, 70, now());
        let id = store.insert(original.clone()).await.expect("insert");

        let loaded = store.find_by_id(&id).await.expect("query").expect("exists");
        assert_eq!(loaded, original);

        let active = store
            .find_active_unexpired(&CustomerId::new("c-1"), now() + Duration::hours(1))
            .await
            .expect("active");
        assert_eq!(active.len(), 1);
        let after_expiry = store
            .find_active_unexpired(&CustomerId::new("c-1"), now() + Duration::days(3))
            .await
            .expect("active");
        assert!(after_expiry.is_empty());
    }

    #[tokio::test]
    async fn insert_rejects_invalid_records() {
        let store = setup().await;
        let mut invalid = record("c-1", RecommendationType::Upsell, 40, now());
        invalid.reasons.clear();

        let error = store.insert(invalid).await.expect_err("must be rejected");
        assert!(matches!(error, ApplicationError::Domain(_)));
    }

    #[tokio::test]
    async fn expiry_sweeps_and_retention_cleanup() {
        let store = setup().await;
        let past_due = record("c-1", RecommendationType::WinBack, 50, now() - Duration::days(5));
        let fresh = record("c-2", RecommendationType::WinBack, 50, now());
        let past_due_id = store.insert(past_due).await.expect("insert");
        let fresh_id = store.insert(fresh).await.expect("insert");

        assert_eq!(store.expire_past_due(now()).await.expect("sweep"), 1);
        let swept = store.find_by_id(&past_due_id).await.expect("query").expect("exists");
        assert_eq!(swept.status, RecommendationStatus::Expired);
        assert_eq!(swept.last_updated, now());

        store
            .update_status(&fresh_id, RecommendationStatus::Dismissed, None, now() - Duration::days(31))
            .await
            .expect("dismiss");
        let deleted = store
            .delete_terminal_older_than(&RecommendationStatus::TERMINAL, now() - Duration::days(30))
            .await
            .expect("cleanup");
        assert_eq!(deleted, 1);
        assert!(store.find_by_id(&fresh_id).await.expect("query").is_none());
        assert!(store.find_by_id(&past_due_id).await.expect("query").is_some());
    }

    #[tokio::test]
    async fn expire_active_for_one_customer_only() {
        let store = setup().await;
        store.insert(record("c-1", RecommendationType::Upsell, 40, now())).await.expect("insert");
        store.insert(record("c-1", RecommendationType::CrossSell, 30, now())).await.expect("insert");
        store.insert(record("c-2", RecommendationType::Upsell, 40, now())).await.expect("insert");

        let expired =
            store.expire_active(Some(&CustomerId::new("c-1")), now()).await.expect("expire");
        assert_eq!(expired, 2);
        assert_eq!(store.expire_active(None, now()).await.expect("expire all"), 1);
    }

    #[tokio::test]
    async fn update_status_replaces_notes_and_missing_id_is_none() {
        let store = setup().await;
        let id = store
            .insert(record("c-1", RecommendationType::Upsell, 40, now()))
            .await
            .expect("insert");

        let updated = store
            .update_status(&id, RecommendationStatus::Processed, Some("called"), now())
            .await
            .expect("update")
            .expect("exists");
        assert_eq!(updated.ai_analysis.personalization_notes, "called");
        let reloaded = store.find_by_id(&id).await.expect("query").expect("exists");
        assert_eq!(reloaded, updated);

        let missing = store
            .update_status(
                &reengage_core::domain::recommendation::RecommendationId("nope".to_string()),
                RecommendationStatus::Processed,
                None,
                now(),
            )
            .await
            .expect("update");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn list_filters_sorts_and_paginates() {
        let store = setup().await;
        for (index, priority) in [10_u8, 80, 45, 95, 60].into_iter().enumerate() {
            let customer = format!("c-{index}");
            store
                .insert(record(&customer, RecommendationType::Upsell, priority, now()))
                .await
                .expect("insert");
        }
        store
            .insert(record("c-9", RecommendationType::WinBack, 99, now()))
            .await
            .expect("insert");

        let page = store
            .list(&RecommendationQuery {
                recommendation_type: Some(RecommendationType::Upsell),
                min_priority: Some(40),
                limit: 2,
                page: 2,
                ..RecommendationQuery::default()
            })
            .await
            .expect("list");

        assert_eq!(page.pagination.total_items, 4);
        assert_eq!(page.pagination.total_pages, 2);
        let priorities: Vec<u8> = page.items.iter().map(|record| record.priority_score).collect();
        assert_eq!(priorities, vec![60, 45]);

        let ascending = store
            .list(&RecommendationQuery {
                sort_by: SortField::PriorityScore,
                direction: SortDirection::Asc,
                ..RecommendationQuery::default()
            })
            .await
            .expect("list");
        assert_eq!(ascending.items.first().map(|record| record.priority_score), Some(10));
    }

    #[tokio::test]
    async fn system_queries_and_manual_cleanup() {
        let store = setup().await;
        assert_eq!(store.latest_generated_at().await.expect("latest"), None);

        let early = store
            .insert(record("c-1", RecommendationType::Upsell, 40, now() - Duration::days(4)))
            .await
            .expect("insert");
        store.insert(record("c-2", RecommendationType::Upsell, 40, now())).await.expect("insert");
        store
            .update_status(&early, RecommendationStatus::Dismissed, None, now())
            .await
            .expect("dismiss");

        assert_eq!(store.latest_generated_at().await.expect("latest"), Some(now()));
        let expiring = store
            .count_expiring_between(now() + Duration::days(1), now() + Duration::days(2))
            .await
            .expect("count");
        assert_eq!(expiring, 1);

        assert_eq!(store.delete_expired_terminal(now()).await.expect("cleanup"), 1);
        let analytics = store.analytics().await.expect("analytics");
        assert_eq!(analytics.total_recommendations, 1);
        assert_eq!(analytics.active_recommendations, 1);
    }
}
