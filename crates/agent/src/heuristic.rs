use async_trait::async_trait;
use rust_decimal::Decimal;

use reengage_core::domain::profile::CustomerBehaviorProfile;
use reengage_core::domain::recommendation::{
    churn_risk_from_recency, CandidateAnalysis, EngagementLevel, InsightOverrides,
    RecommendationCandidate, RecommendationType, MAX_PRIORITY_SCORE,
};
use reengage_core::ports::{PortResult, RecommendationOracle};

const NEW_CUSTOMER_WINDOW_DAYS: i64 = 30;
const CHURN_WATCH_DAYS: i64 = 60;
const WIN_BACK_DAYS: i64 = 120;
const INACTIVE_DAYS: i64 = 180;
const LOYAL_ORDER_COUNT: u32 = 4;
const HIGH_VALUE_SPEND: i64 = 1_000;
const UPSELL_ORDER_VALUE: i64 = 200;

/// Deterministic recency, frequency and value rules.
#[derive(Clone, Debug)]
pub struct HeuristicOracle {
    max_candidates: usize,
}

impl Default for HeuristicOracle {
    fn default() -> Self {
        Self { max_candidates: 3 }
    }
}

impl HeuristicOracle {
    pub fn new(max_candidates: usize) -> Self {
        Self { max_candidates: max_candidates.max(1) }
    }

    pub fn evaluate(&self, profile: &CustomerBehaviorProfile) -> Vec<RecommendationCandidate> {
        let Some(days) = profile.days_since_last_order else {
            return Vec::new();
        };
        let high_value = profile.total_spent >= Decimal::from(HIGH_VALUE_SPEND);
        let top_category = profile.top_categories(1).into_iter().next();
        let mut candidates = Vec::new();

        if profile.order_count == 1 && days <= NEW_CUSTOMER_WINDOW_DAYS {
            candidates.push(candidate(
                profile,
                RecommendationType::FirstTimeBuyer,
                70,
                vec![format!("first order placed {days} days ago")],
                vec![
                    "send a welcome series with care tips for the first purchase".to_string(),
                    "offer a small incentive on the second order".to_string(),
                ],
                "new customer with a single delivered order",
            ));
        }

        if days >= INACTIVE_DAYS && high_value {
            candidates.push(candidate(
                profile,
                RecommendationType::HighValueInactive,
                90,
                vec![
                    format!("lifetime spend of {:.2}", profile.total_spent),
                    format!("no delivered order for {days} days"),
                ],
                vec![
                    "assign a personal outreach from the account team".to_string(),
                    "send an exclusive preview of the new collection".to_string(),
                ],
                "valuable customer who has gone quiet",
            ));
        } else if days >= WIN_BACK_DAYS {
            candidates.push(candidate(
                profile,
                RecommendationType::WinBack,
                80,
                vec![format!("no delivered order for {days} days")],
                vec!["send a comeback offer with a time-limited discount".to_string()],
                "lapsed customer",
            ));
        } else if days >= CHURN_WATCH_DAYS {
            let risk = churn_risk_from_recency(Some(days));
            candidates.push(candidate(
                profile,
                RecommendationType::ChurnRisk,
                (40 + risk / 2).min(MAX_PRIORITY_SCORE),
                vec![format!("ordering gap of {days} days is widening")],
                vec!["send a reminder featuring recently viewed categories".to_string()],
                "engagement is declining",
            ));
        }

        if days < CHURN_WATCH_DAYS && profile.order_count >= LOYAL_ORDER_COUNT {
            candidates.push(candidate(
                profile,
                RecommendationType::LoyaltyReward,
                60,
                vec![format!("{} delivered orders", profile.order_count)],
                vec!["enrol in the loyalty programme with bonus points".to_string()],
                "repeat buyer",
            ));
        }

        if days < WIN_BACK_DAYS && profile.average_order_value >= Decimal::from(UPSELL_ORDER_VALUE) {
            candidates.push(candidate(
                profile,
                RecommendationType::Upsell,
                50,
                vec![format!("average order value of {:.2}", profile.average_order_value)],
                vec!["promote premium lines in their favourite categories".to_string()],
                "comfortable with larger baskets",
            ));
        }

        if days < WIN_BACK_DAYS && profile.order_count >= 2 {
            if let Some(category) = top_category {
                candidates.push(candidate(
                    profile,
                    RecommendationType::CrossSell,
                    40,
                    vec![format!("most purchases fall in {category}")],
                    vec![format!("suggest items that complement {category}")],
                    "focused on a single category",
                ));
            }
        }

        candidates.sort_by(|left, right| {
            right
                .priority_score
                .cmp(&left.priority_score)
                .then(left.recommendation_type.cmp(&right.recommendation_type))
        });
        candidates.truncate(self.max_candidates);
        candidates
    }
}

fn candidate(
    profile: &CustomerBehaviorProfile,
    recommendation_type: RecommendationType,
    priority_score: u8,
    reasons: Vec<String>,
    suggested_actions: Vec<String>,
    pattern: &str,
) -> RecommendationCandidate {
    RecommendationCandidate {
        recommendation_type,
        priority_score,
        reasons,
        suggested_actions,
        insights: InsightOverrides::default(),
        analysis: CandidateAnalysis {
            behavioral_pattern: pattern.to_string(),
            engagement_level: Some(EngagementLevel::from_recency(profile.days_since_last_order)),
            predicted_next_purchase_window: None,
            recommended_products: Vec::new(),
            personalization_notes: String::new(),
        },
    }
}

#[async_trait]
impl RecommendationOracle for HeuristicOracle {
    fn is_configured(&self) -> bool {
        true
    }

    async fn score(
        &self,
        profile: &CustomerBehaviorProfile,
    ) -> PortResult<Vec<RecommendationCandidate>> {
        Ok(self.evaluate(profile))
    }
}
