use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::customer::{CustomerId, CustomerInfo};
use crate::domain::order::ProductId;
use crate::domain::profile::CustomerBehaviorProfile;
use crate::errors::DomainError;

pub const MAX_PRIORITY_SCORE: u8 = 100;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecommendationId(pub String);

impl RecommendationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecommendationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    ChurnRisk,
    WinBack,
    Upsell,
    CrossSell,
    LoyaltyReward,
    FirstTimeBuyer,
    HighValueInactive,
}

impl RecommendationType {
    pub const ALL: [RecommendationType; 7] = [
        Self::ChurnRisk,
        Self::WinBack,
        Self::Upsell,
        Self::CrossSell,
        Self::LoyaltyReward,
        Self::FirstTimeBuyer,
        Self::HighValueInactive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChurnRisk => "churn_risk",
            Self::WinBack => "win_back",
            Self::Upsell => "upsell",
            Self::CrossSell => "cross_sell",
            Self::LoyaltyReward => "loyalty_reward",
            Self::FirstTimeBuyer => "first_time_buyer",
            Self::HighValueInactive => "high_value_inactive",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.as_str() == normalized)
    }
}

impl std::str::FromStr for RecommendationType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| DomainError::UnknownRecommendationType(value.to_owned()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    Active,
    Processed,
    Expired,
    Dismissed,
}

impl RecommendationStatus {
    /// Statuses eligible for retention cleanup.
    pub const TERMINAL: [RecommendationStatus; 3] = [Self::Processed, Self::Dismissed, Self::Expired];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Processed => "processed",
            Self::Expired => "expired",
            Self::Dismissed => "dismissed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "processed" => Some(Self::Processed),
            "expired" => Some(Self::Expired),
            "dismissed" => Some(Self::Dismissed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Manual status updates may move a record anywhere except back to `active`;
    /// only a fresh insert creates active records.
    pub fn check_manual_transition(&self, to: RecommendationStatus) -> Result<(), DomainError> {
        if to == Self::Active {
            return Err(DomainError::InvalidStatusTransition { from: *self, to });
        }
        Ok(())
    }
}

impl std::str::FromStr for RecommendationStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| DomainError::UnknownRecommendationStatus(value.to_owned()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementLevel {
    High,
    Medium,
    Low,
    Dormant,
}

impl EngagementLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Dormant => "dormant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            "dormant" => Some(Self::Dormant),
            _ => None,
        }
    }

    pub fn from_recency(days_since_last_order: Option<i64>) -> Self {
        match days_since_last_order {
            Some(days) if days < 30 => Self::High,
            Some(days) if days < 90 => Self::Medium,
            Some(days) if days < 180 => Self::Low,
            _ => Self::Dormant,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyLabel {
    High,
    Medium,
    Low,
}

impl FrequencyLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn from_orders_per_month(frequency: Decimal) -> Self {
        if frequency >= Decimal::TWO {
            Self::High
        } else if frequency >= Decimal::new(5, 1) {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// 0 for an order placed today, rising linearly to 100 at six months of silence.
pub fn churn_risk_from_recency(days_since_last_order: Option<i64>) -> u8 {
    match days_since_last_order {
        Some(days) => {
            let clamped = days.clamp(0, 180);
            // 0..=180 scaled onto 0..=100 always fits a u8.
            u8::try_from(clamped * 100 / 180).unwrap_or(MAX_PRIORITY_SCORE)
        }
        None => MAX_PRIORITY_SCORE,
    }
}

/// Insight fields an oracle may set on a candidate; absent values fall back to the profile.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightOverrides {
    pub purchase_frequency_label: Option<FrequencyLabel>,
    pub churn_risk_score: Option<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateAnalysis {
    pub behavioral_pattern: String,
    pub engagement_level: Option<EngagementLevel>,
    pub predicted_next_purchase_window: Option<String>,
    pub recommended_products: Vec<ProductId>,
    pub personalization_notes: String,
}

/// One scored suggestion produced by a recommendation oracle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationCandidate {
    pub recommendation_type: RecommendationType,
    pub priority_score: u8,
    pub reasons: Vec<String>,
    pub suggested_actions: Vec<String>,
    pub insights: InsightOverrides,
    pub analysis: CandidateAnalysis,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInsights {
    pub total_orders: u32,
    pub total_spent: Decimal,
    pub last_order_date: Option<DateTime<Utc>>,
    pub days_since_last_order: Option<i64>,
    pub average_order_value: Decimal,
    pub favorite_categories: Vec<String>,
    pub purchase_frequency: FrequencyLabel,
    pub customer_lifetime_value: Decimal,
    pub churn_risk_score: u8,
}

impl CustomerInsights {
    pub fn snapshot(profile: &CustomerBehaviorProfile, overrides: &InsightOverrides) -> Self {
        Self {
            total_orders: profile.order_count,
            total_spent: profile.total_spent,
            last_order_date: profile.last_order_date,
            days_since_last_order: profile.days_since_last_order,
            average_order_value: profile.average_order_value,
            favorite_categories: profile.top_categories(3),
            purchase_frequency: overrides.purchase_frequency_label.unwrap_or_else(|| {
                FrequencyLabel::from_orders_per_month(profile.purchase_frequency)
            }),
            customer_lifetime_value: profile.customer_lifetime_value,
            churn_risk_score: overrides
                .churn_risk_score
                .map(|score| score.min(MAX_PRIORITY_SCORE))
                .unwrap_or_else(|| churn_risk_from_recency(profile.days_since_last_order)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiAnalysis {
    pub behavioral_pattern: String,
    pub engagement_level: EngagementLevel,
    pub predicted_next_purchase_window: Option<String>,
    pub recommended_products: Vec<ProductId>,
    pub personalization_notes: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub id: RecommendationId,
    pub customer_id: CustomerId,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub recommendation_type: RecommendationType,
    pub priority_score: u8,
    pub reasons: Vec<String>,
    pub suggested_actions: Vec<String>,
    pub customer_insights: CustomerInsights,
    pub ai_analysis: AiAnalysis,
    pub status: RecommendationStatus,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl RecommendationRecord {
    /// Builds a fresh active record from an oracle candidate, stamped at `now`.
    pub fn from_candidate(
        profile: &CustomerBehaviorProfile,
        candidate: RecommendationCandidate,
        contact: Option<&CustomerInfo>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, DomainError> {
        let engagement_level = candidate
            .analysis
            .engagement_level
            .unwrap_or_else(|| EngagementLevel::from_recency(profile.days_since_last_order));

        let record = Self {
            id: RecommendationId::generate(),
            customer_id: profile.customer_id.clone(),
            customer_email: contact.map(|info| info.email.clone()),
            customer_name: contact.map(CustomerInfo::display_name),
            recommendation_type: candidate.recommendation_type,
            priority_score: candidate.priority_score,
            reasons: candidate.reasons,
            suggested_actions: candidate.suggested_actions,
            customer_insights: CustomerInsights::snapshot(profile, &candidate.insights),
            ai_analysis: AiAnalysis {
                behavioral_pattern: candidate.analysis.behavioral_pattern,
                engagement_level,
                predicted_next_purchase_window: candidate.analysis.predicted_next_purchase_window,
                recommended_products: candidate.analysis.recommended_products,
                personalization_notes: candidate.analysis.personalization_notes,
            },
            status: RecommendationStatus::Active,
            generated_at: now,
            expires_at: now + ttl,
            last_updated: now,
        };
        record.validate()?;
        Ok(record)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.priority_score > MAX_PRIORITY_SCORE {
            return Err(DomainError::PriorityOutOfRange(i64::from(self.priority_score)));
        }
        if self.expires_at < self.generated_at {
            return Err(DomainError::InvariantViolation(format!(
                "recommendation {} expires before it was generated",
                self.id
            )));
        }
        if self.status == RecommendationStatus::Active {
            if self.reasons.iter().all(|reason| reason.trim().is_empty()) {
                return Err(DomainError::InvariantViolation(format!(
                    "active recommendation {} has no reasons",
                    self.id
                )));
            }
            if self.suggested_actions.iter().all(|action| action.trim().is_empty()) {
                return Err(DomainError::InvariantViolation(format!(
                    "active recommendation {} has no suggested actions",
                    self.id
                )));
            }
        }
        Ok(())
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == RecommendationStatus::Active && self.expires_at > now
    }

    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.status == RecommendationStatus::Active && self.expires_at < now
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{
        churn_risk_from_recency, CandidateAnalysis, EngagementLevel, FrequencyLabel,
        InsightOverrides, RecommendationCandidate, RecommendationRecord, RecommendationStatus,
        RecommendationType,
    };
    use crate::domain::customer::{CustomerId, CustomerInfo};
    use crate::domain::profile::{CategoryAffinity, CustomerBehaviorProfile, OrderTrends};
    use crate::errors::DomainError;

    pub(crate) fn sample_profile(customer: &str) -> CustomerBehaviorProfile {
        CustomerBehaviorProfile {
            customer_id: CustomerId::new(customer),
            total_spent: Decimal::new(900, 0),
            order_count: 3,
            average_order_value: Decimal::new(300, 0),
            last_order_date: None,
            days_since_last_order: Some(10),
            purchase_frequency: Decimal::new(15, 1),
            favorite_categories: vec![
                CategoryAffinity {
                    category: "sofas".to_string(),
                    unit_count: 2,
                    category_spend: Decimal::new(600, 0),
                },
                CategoryAffinity {
                    category: "lamps".to_string(),
                    unit_count: 4,
                    category_spend: Decimal::new(300, 0),
                },
            ],
            customer_lifetime_value: Decimal::new(6750, 0),
            order_trends: OrderTrends::default(),
        }
    }

    pub(crate) fn sample_candidate(kind: RecommendationType, priority: u8) -> RecommendationCandidate {
        RecommendationCandidate {
            recommendation_type: kind,
            priority_score: priority,
            reasons: vec!["recent repeat purchases".to_string()],
            suggested_actions: vec!["send a loyalty coupon".to_string()],
            insights: InsightOverrides::default(),
            analysis: CandidateAnalysis {
                behavioral_pattern: "steady buyer".to_string(),
                ..CandidateAnalysis::default()
            },
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid timestamp")
    }

    #[test]
    fn type_and_status_round_trip_from_storage_encoding() {
        for kind in RecommendationType::ALL {
            assert_eq!(RecommendationType::parse(kind.as_str()), Some(kind));
        }
        for status in [
            RecommendationStatus::Active,
            RecommendationStatus::Processed,
            RecommendationStatus::Expired,
            RecommendationStatus::Dismissed,
        ] {
            assert_eq!(RecommendationStatus::parse(status.as_str()), Some(status));
        }
        assert!("bogus".parse::<RecommendationType>().is_err());
    }

    #[test]
    fn manual_transition_back_to_active_is_rejected() {
        assert!(RecommendationStatus::Active
            .check_manual_transition(RecommendationStatus::Dismissed)
            .is_ok());
        assert!(RecommendationStatus::Dismissed
            .check_manual_transition(RecommendationStatus::Dismissed)
            .is_ok());
        assert_eq!(
            RecommendationStatus::Expired.check_manual_transition(RecommendationStatus::Active),
            Err(DomainError::InvalidStatusTransition {
                from: RecommendationStatus::Expired,
                to: RecommendationStatus::Active,
            })
        );
    }

    #[test]
    fn from_candidate_stamps_timestamps_and_contact_snapshot() {
        let contact = CustomerInfo {
            id: CustomerId::new("c-1"),
            email: "ada@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: Some("Lovelace".to_string()),
        };
        let record = RecommendationRecord::from_candidate(
            &sample_profile("c-1"),
            sample_candidate(RecommendationType::LoyaltyReward, 70),
            Some(&contact),
            now(),
            Duration::days(2),
        )
        .expect("valid record");

        assert_eq!(record.status, RecommendationStatus::Active);
        assert_eq!(record.generated_at, now());
        assert_eq!(record.last_updated, now());
        assert_eq!(record.expires_at, now() + Duration::days(2));
        assert_eq!(record.customer_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(record.customer_insights.favorite_categories, vec!["sofas", "lamps"]);
        assert_eq!(record.customer_insights.purchase_frequency, FrequencyLabel::Medium);
        assert_eq!(record.ai_analysis.engagement_level, EngagementLevel::High);
        assert!(record.is_active_at(now()));
        assert!(!record.is_active_at(now() + Duration::days(3)));
        assert!(record.is_past_due(now() + Duration::days(3)));
    }

    #[test]
    fn from_candidate_rejects_out_of_range_priority_and_empty_reasons() {
        let error = RecommendationRecord::from_candidate(
            &sample_profile("c-1"),
            sample_candidate(RecommendationType::Upsell, 140),
            None,
            now(),
            Duration::days(2),
        )
        .expect_err("priority above 100");
        assert_eq!(error, DomainError::PriorityOutOfRange(140));

        let mut candidate = sample_candidate(RecommendationType::Upsell, 40);
        candidate.reasons = vec!["  ".to_string()];
        let error = RecommendationRecord::from_candidate(
            &sample_profile("c-1"),
            candidate,
            None,
            now(),
            Duration::days(2),
        )
        .expect_err("blank reasons");
        assert!(matches!(error, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn derived_labels_follow_thresholds() {
        assert_eq!(FrequencyLabel::from_orders_per_month(Decimal::TWO), FrequencyLabel::High);
        assert_eq!(FrequencyLabel::from_orders_per_month(Decimal::new(5, 1)), FrequencyLabel::Medium);
        assert_eq!(FrequencyLabel::from_orders_per_month(Decimal::new(4, 1)), FrequencyLabel::Low);
        assert_eq!(EngagementLevel::from_recency(Some(29)), EngagementLevel::High);
        assert_eq!(EngagementLevel::from_recency(Some(179)), EngagementLevel::Low);
        assert_eq!(EngagementLevel::from_recency(None), EngagementLevel::Dormant);
        assert_eq!(churn_risk_from_recency(Some(0)), 0);
        assert_eq!(churn_risk_from_recency(Some(90)), 50);
        assert_eq!(churn_risk_from_recency(Some(400)), 100);
    }
}
