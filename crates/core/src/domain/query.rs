use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;
use crate::domain::recommendation::{
    RecommendationRecord, RecommendationStatus, RecommendationType,
};

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 200;
pub const TOP_CUSTOMER_LIMIT: usize = 10;
pub const RECENT_ACTIVITY_LIMIT: usize = 10;
pub const EXPIRING_SOON_HEALTH_LIMIT: u64 = 100;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    PriorityScore,
    GeneratedAt,
    ExpiresAt,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriorityScore => "priority_score",
            Self::GeneratedAt => "generated_at",
            Self::ExpiresAt => "expires_at",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "priority_score" => Some(Self::PriorityScore),
            "generated_at" => Some(Self::GeneratedAt),
            "expires_at" => Some(Self::ExpiresAt),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Filtered, sorted page request over stored recommendations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationQuery {
    /// `None` lists every status.
    pub status: Option<RecommendationStatus>,
    pub recommendation_type: Option<RecommendationType>,
    pub min_priority: Option<u8>,
    pub max_priority: Option<u8>,
    pub sort_by: SortField,
    pub direction: SortDirection,
    pub page: u32,
    pub limit: u32,
}

impl Default for RecommendationQuery {
    fn default() -> Self {
        Self {
            status: Some(RecommendationStatus::Active),
            recommendation_type: None,
            min_priority: None,
            max_priority: None,
            sort_by: SortField::default(),
            direction: SortDirection::default(),
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl RecommendationQuery {
    /// Page and limit clamped to usable values.
    pub fn normalized(mut self) -> Self {
        self.page = self.page.max(1);
        self.limit = self.limit.clamp(1, MAX_PAGE_LIMIT);
        self
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    pub fn matches(&self, record: &RecommendationRecord) -> bool {
        self.status.map_or(true, |status| record.status == status)
            && self.recommendation_type.map_or(true, |kind| record.recommendation_type == kind)
            && self.min_priority.map_or(true, |min| record.priority_score >= min)
            && self.max_priority.map_or(true, |max| record.priority_score <= max)
    }

    /// Applies filter, sort and paging to an in-memory record set.
    pub fn apply(&self, records: impl IntoIterator<Item = RecommendationRecord>) -> Page<RecommendationRecord> {
        let query = self.clone().normalized();
        let mut matched: Vec<RecommendationRecord> =
            records.into_iter().filter(|record| query.matches(record)).collect();

        matched.sort_by(|left, right| {
            let ordering = match query.sort_by {
                SortField::PriorityScore => left.priority_score.cmp(&right.priority_score),
                SortField::GeneratedAt => left.generated_at.cmp(&right.generated_at),
                SortField::ExpiresAt => left.expires_at.cmp(&right.expires_at),
            };
            match query.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(query.limit as usize)
            .collect();
        Page { items, pagination: Pagination::new(query.page, query.limit, total) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u64,
    pub total_items: u64,
    pub items_per_page: u32,
}

impl Pagination {
    pub fn new(current_page: u32, items_per_page: u32, total_items: u64) -> Self {
        let per_page = u64::from(items_per_page.max(1));
        Self {
            current_page,
            total_pages: total_items.div_ceil(per_page),
            total_items,
            items_per_page,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityBucket {
    pub lower: u8,
    pub upper: u8,
    pub count: u64,
}

impl PriorityBucket {
    /// Lower bounds of `[0,25) [25,50) [50,75) [75,100]`.
    pub const LOWER_BOUNDS: [u8; 4] = [0, 25, 50, 75];

    pub fn index_of(priority: u8) -> usize {
        match priority {
            0..=24 => 0,
            25..=49 => 1,
            50..=74 => 2,
            _ => 3,
        }
    }

    pub fn empty_set() -> Vec<PriorityBucket> {
        Self::LOWER_BOUNDS
            .iter()
            .enumerate()
            .map(|(index, lower)| PriorityBucket {
                lower: *lower,
                upper: Self::LOWER_BOUNDS.get(index + 1).copied().unwrap_or(100),
                count: 0,
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopCustomer {
    pub customer_id: CustomerId,
    pub customer_name: Option<String>,
    pub recommendation_count: u64,
    pub average_priority: Decimal,
    pub customer_lifetime_value: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentRecommendation {
    pub id: String,
    pub customer_id: CustomerId,
    pub customer_name: Option<String>,
    pub recommendation_type: RecommendationType,
    pub priority_score: u8,
    pub generated_at: DateTime<Utc>,
}

impl From<&RecommendationRecord> for RecentRecommendation {
    fn from(record: &RecommendationRecord) -> Self {
        Self {
            id: record.id.0.clone(),
            customer_id: record.customer_id.clone(),
            customer_name: record.customer_name.clone(),
            recommendation_type: record.recommendation_type,
            priority_score: record.priority_score,
            generated_at: record.generated_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationAnalytics {
    pub total_recommendations: u64,
    pub active_recommendations: u64,
    pub processed_recommendations: u64,
    pub average_priority_score: Decimal,
    pub by_type: BTreeMap<RecommendationType, u64>,
    pub priority_distribution: Vec<PriorityBucket>,
    pub top_customers: Vec<TopCustomer>,
    pub recent_activity: Vec<RecentRecommendation>,
}

impl RecommendationAnalytics {
    pub fn from_records(records: &[RecommendationRecord]) -> Self {
        let mut by_type = BTreeMap::new();
        let mut priority_distribution = PriorityBucket::empty_set();
        let mut priority_sum = 0_u64;
        for record in records {
            *by_type.entry(record.recommendation_type).or_insert(0) += 1;
            priority_distribution[PriorityBucket::index_of(record.priority_score)].count += 1;
            priority_sum += u64::from(record.priority_score);
        }

        let active: Vec<&RecommendationRecord> =
            records.iter().filter(|record| record.status == RecommendationStatus::Active).collect();

        let mut grouped: HashMap<&CustomerId, Vec<&RecommendationRecord>> = HashMap::new();
        for record in &active {
            grouped.entry(&record.customer_id).or_default().push(record);
        }
        let mut top_customers: Vec<TopCustomer> = grouped
            .into_iter()
            .map(|(customer_id, group)| {
                let sum: u64 = group.iter().map(|record| u64::from(record.priority_score)).sum();
                TopCustomer {
                    customer_id: customer_id.clone(),
                    customer_name: group.iter().find_map(|record| record.customer_name.clone()),
                    recommendation_count: group.len() as u64,
                    average_priority: average(sum, group.len() as u64),
                    customer_lifetime_value: group[0].customer_insights.customer_lifetime_value,
                }
            })
            .collect();
        top_customers.sort_by(|left, right| {
            right
                .recommendation_count
                .cmp(&left.recommendation_count)
                .then_with(|| left.customer_id.cmp(&right.customer_id))
        });
        top_customers.truncate(TOP_CUSTOMER_LIMIT);

        let mut recent = active;
        recent.sort_by(|left, right| right.generated_at.cmp(&left.generated_at));
        let recent_activity =
            recent.into_iter().take(RECENT_ACTIVITY_LIMIT).map(RecentRecommendation::from).collect();

        Self {
            total_recommendations: records.len() as u64,
            active_recommendations: count_status(records, RecommendationStatus::Active),
            processed_recommendations: count_status(records, RecommendationStatus::Processed),
            average_priority_score: average(priority_sum, records.len() as u64),
            by_type,
            priority_distribution,
            top_customers,
            recent_activity,
        }
    }
}

fn count_status(records: &[RecommendationRecord], status: RecommendationStatus) -> u64 {
    records.iter().filter(|record| record.status == status).count() as u64
}

/// Mean rounded half away from zero to two decimal places; zero for an empty set.
pub fn average(sum: u64, count: u64) -> Decimal {
    if count == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(sum) / Decimal::from(count))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub oracle_configured: bool,
    pub last_generation: Option<DateTime<Utc>>,
    pub recommendations_expiring_soon: u64,
    pub system_healthy: bool,
}

impl SystemStatus {
    pub fn new(
        oracle_configured: bool,
        last_generation: Option<DateTime<Utc>>,
        recommendations_expiring_soon: u64,
    ) -> Self {
        Self {
            oracle_configured,
            last_generation,
            recommendations_expiring_soon,
            system_healthy: oracle_configured
                && recommendations_expiring_soon < EXPIRING_SOON_HEALTH_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{
        average, Pagination, PriorityBucket, RecommendationAnalytics, RecommendationQuery,
        SortDirection, SortField, SystemStatus,
    };
    use crate::domain::recommendation::tests::{sample_candidate, sample_profile};
    use crate::domain::recommendation::{
        RecommendationRecord, RecommendationStatus, RecommendationType,
    };

    fn record(customer: &str, kind: RecommendationType, priority: u8, hour: u32) -> RecommendationRecord {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).single().expect("valid timestamp");
        RecommendationRecord::from_candidate(
            &sample_profile(customer),
            sample_candidate(kind, priority),
            None,
            now,
            Duration::days(2),
        )
        .expect("valid record")
    }

    #[test]
    fn pagination_rounds_total_pages_up() {
        assert_eq!(Pagination::new(1, 20, 41).total_pages, 3);
        assert_eq!(Pagination::new(1, 20, 0).total_pages, 0);
    }

    #[test]
    fn apply_filters_sorts_and_pages() {
        let mut dismissed = record("c-3", RecommendationType::Upsell, 90, 3);
        dismissed.status = RecommendationStatus::Dismissed;
        let records = vec![
            record("c-1", RecommendationType::Upsell, 30, 1),
            record("c-2", RecommendationType::WinBack, 80, 2),
            dismissed,
            record("c-4", RecommendationType::Upsell, 55, 4),
        ];

        let page = RecommendationQuery::default().apply(records.clone());
        let priorities: Vec<u8> = page.items.iter().map(|item| item.priority_score).collect();
        assert_eq!(priorities, vec![80, 55, 30]);
        assert_eq!(page.pagination.total_items, 3);

        let query = RecommendationQuery {
            recommendation_type: Some(RecommendationType::Upsell),
            min_priority: Some(40),
            sort_by: SortField::GeneratedAt,
            direction: SortDirection::Asc,
            status: None,
            ..RecommendationQuery::default()
        };
        let page = query.apply(records.clone());
        let customers: Vec<&str> = page.items.iter().map(|item| item.customer_id.as_str()).collect();
        assert_eq!(customers, vec!["c-3", "c-4"]);

        let query = RecommendationQuery { page: 2, limit: 2, ..RecommendationQuery::default() };
        let page = query.apply(records);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.pagination.total_pages, 2);
    }

    #[test]
    fn analytics_buckets_top_customers_and_average() {
        let mut processed = record("c-2", RecommendationType::WinBack, 100, 5);
        processed.status = RecommendationStatus::Processed;
        let records = vec![
            record("c-1", RecommendationType::Upsell, 10, 1),
            record("c-1", RecommendationType::CrossSell, 60, 2),
            record("c-2", RecommendationType::Upsell, 75, 3),
            processed,
        ];

        let analytics = RecommendationAnalytics::from_records(&records);
        assert_eq!(analytics.total_recommendations, 4);
        assert_eq!(analytics.active_recommendations, 3);
        assert_eq!(analytics.processed_recommendations, 1);
        assert_eq!(analytics.by_type.get(&RecommendationType::Upsell), Some(&2));
        let counts: Vec<u64> = analytics.priority_distribution.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 0, 1, 2]);
        assert_eq!(analytics.average_priority_score, Decimal::new(6125, 2));
        assert_eq!(analytics.top_customers[0].customer_id.as_str(), "c-1");
        assert_eq!(analytics.top_customers[0].recommendation_count, 2);
        assert_eq!(analytics.top_customers[0].average_priority, Decimal::new(35, 0));
        assert_eq!(analytics.recent_activity[0].priority_score, 75);
    }

    #[test]
    fn average_rounds_to_two_places() {
        assert_eq!(average(10, 3), Decimal::new(333, 2));
        assert_eq!(average(0, 0), Decimal::ZERO);
        assert_eq!(PriorityBucket::index_of(100), 3);
    }

    #[test]
    fn system_health_requires_configured_oracle_and_few_expiring() {
        assert!(SystemStatus::new(true, None, 99).system_healthy);
        assert!(!SystemStatus::new(true, None, 100).system_healthy);
        assert!(!SystemStatus::new(false, None, 0).system_healthy);
    }
}
