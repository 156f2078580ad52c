use reengage_core::domain::profile::CustomerBehaviorProfile;
use reengage_core::domain::recommendation::RecommendationType;

const MONTHS_IN_PROMPT: usize = 6;
const CATEGORIES_IN_PROMPT: usize = 3;

fn money(value: rust_decimal::Decimal) -> String {
    format!("{value:.2}")
}

fn seasonal_patterns(profile: &CustomerBehaviorProfile) -> String {
    profile
        .order_trends
        .seasonal_patterns
        .iter()
        .map(|season| season.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn render_analysis_prompt(profile: &CustomerBehaviorProfile) -> String {
    let days_since_last_order = profile
        .days_since_last_order
        .map(|days| days.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    let favorite_categories = profile
        .favorite_categories
        .iter()
        .take(CATEGORIES_IN_PROMPT)
        .map(|entry| format!("{} (${})", entry.category, money(entry.category_spend)))
        .collect::<Vec<_>>()
        .join(", ");
    let monthly_spending = profile
        .recent_monthly_spend(MONTHS_IN_PROMPT)
        .iter()
        .map(|month| format!("{}: ${}", month.month, money(month.amount)))
        .collect::<Vec<_>>()
        .join(", ");
    let types = RecommendationType::ALL
        .iter()
        .map(|kind| kind.as_str())
        .collect::<Vec<_>>()
        .join("|");

    format!(
        "You are an expert e-commerce customer analyst for a furniture store. Analyze the \
following customer behavior data and provide actionable remarketing recommendations.

Customer Data:
- Customer ID: {customer_id}
- Total Orders: {order_count}
- Total Spent: ${total_spent}
- Average Order Value: ${average_order_value}
- Days Since Last Order: {days_since_last_order}
- Purchase Frequency: {purchase_frequency} orders per month
- Customer Lifetime Value: ${lifetime_value}
- Favorite Categories: {favorite_categories}
- Monthly Spending Trend: {monthly_spending}
- Seasonal Patterns: {seasonal_patterns}

Respond with JSON only, in this shape:
{{
  \"recommendations\": [
    {{
      \"recommendation_type\": \"{types}\",
      \"priority_score\": 1-100,
      \"reasons\": [\"reason\"],
      \"suggested_actions\": [\"action\"],
      \"customer_insights\": {{
        \"purchase_frequency\": \"high|medium|low\",
        \"churn_risk_score\": 1-100,
        \"engagement_level\": \"high|medium|low|dormant\"
      }},
      \"ai_analysis\": {{
        \"behavioral_pattern\": \"description of the behaviour pattern\",
        \"predicted_next_purchase_window\": \"timeframe prediction\",
        \"personalization_notes\": \"specific personalization advice\"
      }}
    }}
  ]
}}

Guidelines:
1. Generate 1-3 recommendations based on the behaviour above.
2. Priority score reflects urgency and potential impact.
3. Be specific with reasons and actions.
",
        customer_id = profile.customer_id,
        order_count = profile.order_count,
        total_spent = money(profile.total_spent),
        average_order_value = money(profile.average_order_value),
        purchase_frequency = money(profile.purchase_frequency),
        lifetime_value = money(profile.customer_lifetime_value),
        seasonal_patterns = seasonal_patterns(profile),
    )
}

/// Direction of the last two monthly spend buckets.
pub fn recent_trend(profile: &CustomerBehaviorProfile) -> &'static str {
    match profile.recent_monthly_spend(2) {
        [previous, latest] if latest.amount > previous.amount => "increasing",
        [_, _] => "decreasing",
        _ => "stable",
    }
}

pub fn render_product_prompt(
    profile: &CustomerBehaviorProfile,
    recommendation_type: RecommendationType,
) -> String {
    format!(
        "Based on the customer's purchase history and the recommendation type, suggest specific \
product types that would be most relevant for remarketing.

Customer Profile:
- Favorite Categories: {categories}
- Average Order Value: ${average_order_value}
- Seasonal Patterns: {seasonal_patterns}
- Recent Purchase Trend: {trend}

Recommendation Type: {kind}

Respond with JSON only: {{\"products\": [\"product_type_1\", \"product_type_2\", \"product_type_3\"]}}
",
        categories = profile.top_categories(CATEGORIES_IN_PROMPT).join(", "),
        average_order_value = money(profile.average_order_value),
        seasonal_patterns = seasonal_patterns(profile),
        trend = recent_trend(profile),
        kind = recommendation_type.as_str(),
    )
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use reengage_core::domain::customer::CustomerId;
    use reengage_core::domain::profile::{
        CategoryAffinity, CustomerBehaviorProfile, MonthlySpend, OrderTrends, SeasonTag,
    };
    use reengage_core::domain::recommendation::RecommendationType;

    use super::{recent_trend, render_analysis_prompt, render_product_prompt};

    fn profile(months: &[(&str, i64)], days_since: Option<i64>) -> CustomerBehaviorProfile {
        CustomerBehaviorProfile {
            customer_id: CustomerId::new("cust-7"),
            total_spent: Decimal::new(90_050, 2),
            order_count: 3,
            average_order_value: Decimal::new(30_017, 2),
            last_order_date: Some(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).single().expect("ts")),
            days_since_last_order: days_since,
            purchase_frequency: Decimal::new(15, 1),
            favorite_categories: vec![
                CategoryAffinity {
                    category: "sofas".to_string(),
                    unit_count: 1,
                    category_spend: Decimal::from(600),
                },
                CategoryAffinity {
                    category: "lamps".to_string(),
                    unit_count: 2,
                    category_spend: Decimal::new(30_050, 2),
                },
            ],
            customer_lifetime_value: Decimal::from(6_754),
            order_trends: OrderTrends {
                monthly_spend: months
                    .iter()
                    .map(|(month, amount)| MonthlySpend {
                        month: month.to_string(),
                        amount: Decimal::from(*amount),
                    })
                    .collect(),
                seasonal_patterns: vec![SeasonTag::Winter],
            },
        }
    }

    #[test]
    fn analysis_prompt_carries_formatted_profile() {
        let months = [
            ("2025-08", 10),
            ("2025-09", 20),
            ("2025-10", 30),
            ("2025-11", 40),
            ("2025-12", 50),
            ("2026-01", 60),
            ("2026-02", 70),
        ];
        let prompt = render_analysis_prompt(&profile(&months, Some(28)));

        assert!(prompt.contains("Customer ID: cust-7"));
        assert!(prompt.contains("Total Spent: $900.50"));
        assert!(prompt.contains("Days Since Last Order: 28"));
        assert!(prompt.contains("Purchase Frequency: 1.50 orders per month"));
        assert!(prompt.contains("Favorite Categories: sofas ($600.00), lamps ($300.50)"));
        assert!(!prompt.contains("2025-08"), "only the last six months are included");
        assert!(prompt.contains("2026-02: $70.00"));
        assert!(prompt.contains("Seasonal Patterns: winter"));
        assert!(prompt.contains("high_value_inactive"));
    }

    #[test]
    fn missing_recency_renders_not_available() {
        let prompt = render_analysis_prompt(&profile(&[], None));
        assert!(prompt.contains("Days Since Last Order: N/A"));
    }

    #[test]
    fn trend_compares_last_two_months() {
        assert_eq!(recent_trend(&profile(&[("2026-01", 10), ("2026-02", 30)], None)), "increasing");
        assert_eq!(recent_trend(&profile(&[("2026-01", 30), ("2026-02", 10)], None)), "decreasing");
        assert_eq!(recent_trend(&profile(&[("2026-02", 10)], None)), "stable");

        let prompt = render_product_prompt(
            &profile(&[("2026-01", 10), ("2026-02", 30)], None),
            RecommendationType::CrossSell,
        );
        assert!(prompt.contains("Recent Purchase Trend: increasing"));
        assert!(prompt.contains("Recommendation Type: cross_sell"));
    }
}
