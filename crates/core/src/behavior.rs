//! Purchase-history analysis.
//!
//! A profile is derived from a customer's delivered orders on every call and
//! never stored. Customers without delivered orders yield
//! [`BehaviorAnalysis::NoData`], which callers treat as a valid negative
//! outcome rather than a failure.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::clock::Clock;
use crate::domain::customer::CustomerId;
use crate::domain::order::{CompletedOrder, ProductId};
use crate::domain::profile::{
    CategoryAffinity, CustomerBehaviorProfile, MonthlySpend, OrderTrends, SeasonTag,
};
use crate::errors::ApplicationError;
use crate::ports::{CategoryResolver, OrderSource};

const MILLIS_PER_DAY: i64 = 86_400_000;
const DAYS_PER_MONTH: i64 = 30;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BehaviorAnalysis {
    Profile(Box<CustomerBehaviorProfile>),
    NoData,
}

pub struct BehaviorAnalyzer {
    orders: Arc<dyn OrderSource>,
    categories: Arc<dyn CategoryResolver>,
    clock: Arc<dyn Clock>,
}

impl BehaviorAnalyzer {
    pub fn new(
        orders: Arc<dyn OrderSource>,
        categories: Arc<dyn CategoryResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { orders, categories, clock }
    }

    pub async fn analyze(
        &self,
        customer_id: &CustomerId,
    ) -> Result<BehaviorAnalysis, ApplicationError> {
        let orders = self.orders.find_completed_orders(customer_id).await?;
        if orders.is_empty() {
            return Ok(BehaviorAnalysis::NoData);
        }

        let mut categories: HashMap<ProductId, Option<String>> = HashMap::new();
        for line in orders.iter().flat_map(|order| order.lines.iter()) {
            if categories.contains_key(&line.product_id) {
                continue;
            }
            let category = self.categories.category_of(&line.product_id).await?;
            categories.insert(line.product_id.clone(), category);
        }

        let profile = build_profile(customer_id, &orders, &categories, self.clock.now());
        Ok(profile.map_or(BehaviorAnalysis::NoData, |profile| {
            BehaviorAnalysis::Profile(Box::new(profile))
        }))
    }
}

/// Pure profile computation over already-fetched orders and resolved categories.
/// Products without a category are left out of the affinity ranking.
pub fn build_profile(
    customer_id: &CustomerId,
    orders: &[CompletedOrder],
    categories: &HashMap<ProductId, Option<String>>,
    now: DateTime<Utc>,
) -> Option<CustomerBehaviorProfile> {
    let first_order = orders.iter().map(|order| order.created_at).min()?;
    let last_order = orders.iter().map(|order| order.created_at).max()?;

    let order_count = u32::try_from(orders.len()).unwrap_or(u32::MAX);
    let total_spent: Decimal = orders.iter().map(|order| order.total).sum();
    let average_order_value = total_spent / Decimal::from(order_count);
    let days_since_last_order = (now - last_order).num_days().max(0);

    let purchase_frequency = Decimal::from(order_count) / months_active(first_order, now);

    Some(CustomerBehaviorProfile {
        customer_id: customer_id.clone(),
        total_spent,
        order_count,
        average_order_value,
        last_order_date: Some(last_order),
        days_since_last_order: Some(days_since_last_order),
        purchase_frequency,
        favorite_categories: category_affinity(orders, categories),
        customer_lifetime_value: customer_lifetime_value(
            total_spent,
            purchase_frequency,
            days_since_last_order,
        ),
        order_trends: OrderTrends {
            monthly_spend: monthly_spend(orders),
            seasonal_patterns: seasonal_patterns(season_totals(orders)),
        },
    })
}

/// Fractional 30-day months from the first order to `now`, never below one.
fn months_active(first_order: DateTime<Utc>, now: DateTime<Utc>) -> Decimal {
    let elapsed = Decimal::from((now - first_order).num_milliseconds().max(0));
    let months = elapsed / Decimal::from(DAYS_PER_MONTH * MILLIS_PER_DAY);
    months.max(Decimal::ONE)
}

fn category_affinity(
    orders: &[CompletedOrder],
    categories: &HashMap<ProductId, Option<String>>,
) -> Vec<CategoryAffinity> {
    let mut totals: HashMap<&str, (u64, Decimal)> = HashMap::new();
    for line in orders.iter().flat_map(|order| order.lines.iter()) {
        let Some(Some(category)) = categories.get(&line.product_id) else {
            continue;
        };
        let entry = totals.entry(category.as_str()).or_insert((0, Decimal::ZERO));
        entry.0 += u64::from(line.quantity);
        entry.1 += line.line_total();
    }

    let mut affinity: Vec<CategoryAffinity> = totals
        .into_iter()
        .map(|(category, (unit_count, category_spend))| CategoryAffinity {
            category: category.to_owned(),
            unit_count,
            category_spend,
        })
        .collect();
    affinity.sort_by(|left, right| {
        right.category_spend.cmp(&left.category_spend).then_with(|| left.category.cmp(&right.category))
    });
    affinity
}

fn monthly_spend(orders: &[CompletedOrder]) -> Vec<MonthlySpend> {
    let mut months: BTreeMap<String, Decimal> = BTreeMap::new();
    for order in orders {
        let key = format!("{:04}-{:02}", order.created_at.year(), order.created_at.month());
        *months.entry(key).or_insert(Decimal::ZERO) += order.total;
    }
    months.into_iter().map(|(month, amount)| MonthlySpend { month, amount }).collect()
}

fn season_totals(orders: &[CompletedOrder]) -> [Decimal; 4] {
    let mut totals = [Decimal::ZERO; 4];
    for order in orders {
        if let Some(index) = SeasonTag::for_month(order.created_at.month()).season_index() {
            totals[index] += order.total;
        }
    }
    totals
}

/// Flags every season whose spend exceeds 1.2x the mean of the four seasons,
/// or reports `year-round` when none does.
pub fn seasonal_patterns(season_spend: [Decimal; 4]) -> Vec<SeasonTag> {
    let mean = season_spend.iter().copied().sum::<Decimal>() / Decimal::from(4);
    let threshold = mean * Decimal::new(12, 1);

    let flagged: Vec<SeasonTag> = SeasonTag::SEASONS
        .into_iter()
        .zip(season_spend)
        .filter(|(_, spend)| *spend > threshold)
        .map(|(season, _)| season)
        .collect();

    if flagged.is_empty() {
        vec![SeasonTag::YearRound]
    } else {
        flagged
    }
}

pub fn engagement_multiplier(days_since_last_order: i64) -> Decimal {
    match days_since_last_order {
        days if days < 30 => Decimal::new(25, 1),
        days if days < 90 => Decimal::new(18, 1),
        days if days < 180 => Decimal::new(12, 1),
        _ => Decimal::new(8, 1),
    }
}

/// Engagement-weighted projection: monthly value times an estimated lifespan in months.
pub fn customer_lifetime_value(
    total_spent: Decimal,
    purchase_frequency: Decimal,
    days_since_last_order: i64,
) -> Decimal {
    let lifespan_months = (purchase_frequency
        * Decimal::from(24)
        * engagement_multiplier(days_since_last_order))
    .max(Decimal::from(12));
    let monthly_value =
        (total_spent / purchase_frequency.max(Decimal::ONE)) * (purchase_frequency / Decimal::from(12));

    (monthly_value * lifespan_months).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
