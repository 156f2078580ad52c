use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAffinity {
    pub category: String,
    pub unit_count: u64,
    pub category_spend: Decimal,
}

/// Spend for one calendar month, keyed `YYYY-MM`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlySpend {
    pub month: String,
    pub amount: Decimal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SeasonTag {
    #[serde(rename = "spring")]
    Spring,
    #[serde(rename = "summer")]
    Summer,
    #[serde(rename = "fall")]
    Fall,
    #[serde(rename = "winter")]
    Winter,
    #[serde(rename = "year-round")]
    YearRound,
}

impl SeasonTag {
    pub const SEASONS: [SeasonTag; 4] = [Self::Spring, Self::Summer, Self::Fall, Self::Winter];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spring => "spring",
            Self::Summer => "summer",
            Self::Fall => "fall",
            Self::Winter => "winter",
            Self::YearRound => "year-round",
        }
    }

    /// Maps a calendar month (1-12) onto its fixed three-month season.
    pub fn for_month(month: u32) -> Self {
        match month {
            3..=5 => Self::Spring,
            6..=8 => Self::Summer,
            9..=11 => Self::Fall,
            _ => Self::Winter,
        }
    }

    /// Index into [`SeasonTag::SEASONS`].
    pub fn season_index(&self) -> Option<usize> {
        match self {
            Self::Spring => Some(0),
            Self::Summer => Some(1),
            Self::Fall => Some(2),
            Self::Winter => Some(3),
            Self::YearRound => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTrends {
    pub monthly_spend: Vec<MonthlySpend>,
    pub seasonal_patterns: Vec<SeasonTag>,
}

/// Purchase-history profile derived fresh for every analysis call. Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerBehaviorProfile {
    pub customer_id: CustomerId,
    pub total_spent: Decimal,
    pub order_count: u32,
    pub average_order_value: Decimal,
    pub last_order_date: Option<DateTime<Utc>>,
    pub days_since_last_order: Option<i64>,
    /// Orders per month across the active span.
    pub purchase_frequency: Decimal,
    /// Sorted by `category_spend`, highest first.
    pub favorite_categories: Vec<CategoryAffinity>,
    pub customer_lifetime_value: Decimal,
    pub order_trends: OrderTrends,
}

impl CustomerBehaviorProfile {
    pub fn top_categories(&self, limit: usize) -> Vec<String> {
        self.favorite_categories.iter().take(limit).map(|entry| entry.category.clone()).collect()
    }

    pub fn recent_monthly_spend(&self, limit: usize) -> &[MonthlySpend] {
        let spend = &self.order_trends.monthly_spend;
        &spend[spend.len().saturating_sub(limit)..]
    }
}

#[cfg(test)]
mod tests {
    use super::SeasonTag;

    #[test]
    fn months_fold_into_fixed_seasons() {
        let expected = [
            (1, SeasonTag::Winter),
            (2, SeasonTag::Winter),
            (3, SeasonTag::Spring),
            (5, SeasonTag::Spring),
            (6, SeasonTag::Summer),
            (8, SeasonTag::Summer),
            (9, SeasonTag::Fall),
            (11, SeasonTag::Fall),
            (12, SeasonTag::Winter),
        ];
        for (month, season) in expected {
            assert_eq!(SeasonTag::for_month(month), season, "month {month}");
        }
    }

    #[test]
    fn year_round_serializes_with_hyphen() {
        let encoded = serde_json::to_string(&SeasonTag::YearRound).expect("serialize");
        assert_eq!(encoded, "\"year-round\"");
        assert_eq!(SeasonTag::YearRound.season_index(), None);
    }
}
