use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::Row;

use reengage_core::domain::customer::{CustomerId, CustomerInfo};
use reengage_core::domain::order::{CompletedOrder, OrderId, OrderLine, OrderStatus, ProductId};

use crate::connection::DbPool;
use crate::repositories::{
    CatalogProduct, RepositoryError, SqlCustomerRepository, SqlOrderRepository,
    SqlProductRepository,
};

struct DemoCustomer {
    id: &'static str,
    email: &'static str,
    first_name: &'static str,
    last_name: Option<&'static str>,
    profile: &'static str,
}

struct DemoProduct {
    id: &'static str,
    name: &'static str,
    category: Option<&'static str>,
    unit_price_cents: i64,
}

struct DemoOrder {
    id: &'static str,
    customer_id: &'static str,
    status: OrderStatus,
    days_ago: i64,
    lines: &'static [(&'static str, u32)],
}

const DEMO_CUSTOMERS: &[DemoCustomer] = &[
    DemoCustomer {
        id: "cust-regular-001",
        email: "maya.chen@example.com",
        first_name: "Maya",
        last_name: Some("Chen"),
        profile: "frequent recent buyer across several categories",
    },
    DemoCustomer {
        id: "cust-dormant-001",
        email: "jonas.berg@example.com",
        first_name: "Jonas",
        last_name: Some("Berg"),
        profile: "high spender with no orders for half a year",
    },
    DemoCustomer {
        id: "cust-newbie-001",
        email: "ines.duarte@example.com",
        first_name: "Ines",
        last_name: None,
        profile: "single recent purchase",
    },
    DemoCustomer {
        id: "cust-cancelled-001",
        email: "lee.park@example.com",
        first_name: "Lee",
        last_name: Some("Park"),
        profile: "only cancelled orders, never eligible",
    },
];

const DEMO_PRODUCTS: &[DemoProduct] = &[
    DemoProduct { id: "prod-sofa-oslo", name: "Oslo Sofa", category: Some("sofas"), unit_price_cents: 89_900 },
    DemoProduct { id: "prod-lamp-arc", name: "Arc Floor Lamp", category: Some("lighting"), unit_price_cents: 12_950 },
    DemoProduct { id: "prod-rug-wool", name: "Wool Rug", category: Some("textiles"), unit_price_cents: 24_000 },
    DemoProduct { id: "prod-mug-set", name: "Stoneware Mug Set", category: Some("kitchen"), unit_price_cents: 3_400 },
    DemoProduct { id: "prod-gift-card", name: "Gift Card", category: None, unit_price_cents: 5_000 },
];

const DEMO_ORDERS: &[DemoOrder] = &[
    DemoOrder { id: "ord-reg-001", customer_id: "cust-regular-001", status: OrderStatus::Delivered, days_ago: 95, lines: &[("prod-sofa-oslo", 1)] },
    DemoOrder { id: "ord-reg-002", customer_id: "cust-regular-001", status: OrderStatus::Delivered, days_ago: 60, lines: &[("prod-lamp-arc", 2), ("prod-mug-set", 1)] },
    DemoOrder { id: "ord-reg-003", customer_id: "cust-regular-001", status: OrderStatus::Delivered, days_ago: 31, lines: &[("prod-rug-wool", 1)] },
    DemoOrder { id: "ord-reg-004", customer_id: "cust-regular-001", status: OrderStatus::Delivered, days_ago: 6, lines: &[("prod-mug-set", 3), ("prod-gift-card", 1)] },
    DemoOrder { id: "ord-reg-005", customer_id: "cust-regular-001", status: OrderStatus::Shipped, days_ago: 1, lines: &[("prod-lamp-arc", 1)] },
    DemoOrder { id: "ord-dor-001", customer_id: "cust-dormant-001", status: OrderStatus::Delivered, days_ago: 400, lines: &[("prod-sofa-oslo", 2)] },
    DemoOrder { id: "ord-dor-002", customer_id: "cust-dormant-001", status: OrderStatus::Delivered, days_ago: 200, lines: &[("prod-rug-wool", 2), ("prod-lamp-arc", 1)] },
    DemoOrder { id: "ord-new-001", customer_id: "cust-newbie-001", status: OrderStatus::Delivered, days_ago: 12, lines: &[("prod-lamp-arc", 1)] },
    DemoOrder { id: "ord-can-001", customer_id: "cust-cancelled-001", status: OrderStatus::Cancelled, days_ago: 20, lines: &[("prod-sofa-oslo", 1)] },
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeededCustomer {
    pub customer_id: &'static str,
    pub profile: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeedResult {
    pub customers: Vec<SeededCustomer>,
    pub products: usize,
    pub orders: usize,
    pub eligible_customers: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SeedCheck {
    pub name: &'static str,
    pub expected: i64,
    pub actual: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub checks: Vec<SeedCheck>,
}

impl VerificationResult {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|check| check.expected == check.actual)
    }
}

/// Deterministic demo customers, products and orders, dated relative to `now`.
pub struct DemoDataset;

impl DemoDataset {
    pub async fn load(pool: &DbPool, now: DateTime<Utc>) -> Result<SeedResult, RepositoryError> {
        let customers = SqlCustomerRepository::new(pool.clone());
        let products = SqlProductRepository::new(pool.clone());
        let orders = SqlOrderRepository::new(pool.clone());

        for customer in DEMO_CUSTOMERS {
            let info = CustomerInfo {
                id: CustomerId::new(customer.id),
                email: customer.email.to_string(),
                first_name: customer.first_name.to_string(),
                last_name: customer.last_name.map(str::to_string),
            };
            customers.save(&info, now - Duration::days(500)).await?;
        }

        for product in DEMO_PRODUCTS {
            products
                .save(&CatalogProduct {
                    id: ProductId(product.id.to_string()),
                    name: product.name.to_string(),
                    category: product.category.map(str::to_string),
                    unit_price: Decimal::new(product.unit_price_cents, 2),
                })
                .await?;
        }

        for order in DEMO_ORDERS {
            orders.save(&demo_order(order, now)?, order.status).await?;
        }

        Ok(SeedResult {
            customers: DEMO_CUSTOMERS
                .iter()
                .map(|customer| SeededCustomer { customer_id: customer.id, profile: customer.profile })
                .collect(),
            products: DEMO_PRODUCTS.len(),
            orders: DEMO_ORDERS.len(),
            eligible_customers: eligible_customer_count(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();
        for (name, sql, expected) in [
            ("customers", "SELECT COUNT(*) AS count FROM customer", DEMO_CUSTOMERS.len()),
            ("products", "SELECT COUNT(*) AS count FROM product", DEMO_PRODUCTS.len()),
            ("orders", "SELECT COUNT(*) AS count FROM customer_order", DEMO_ORDERS.len()),
            (
                "eligible_customers",
                "SELECT COUNT(DISTINCT customer_id) AS count FROM customer_order WHERE status = 'delivered'",
                eligible_customer_count(),
            ),
        ] {
            let actual: i64 = sqlx::query(sql).fetch_one(pool).await?.try_get("count")?;
            checks.push(SeedCheck { name, expected: expected as i64, actual });
        }
        Ok(VerificationResult { checks })
    }

    /// Removes demo rows. Recommendations for demo customers are removed too.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        for customer in DEMO_CUSTOMERS {
            sqlx::query("DELETE FROM recommendation WHERE customer_id = ?")
                .bind(customer.id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM customer WHERE id = ?").bind(customer.id).execute(&mut *tx).await?;
        }
        for product in DEMO_PRODUCTS {
            sqlx::query("DELETE FROM product WHERE id = ?").bind(product.id).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn eligible_customer_count() -> usize {
    DEMO_CUSTOMERS
        .iter()
        .filter(|customer| {
            DEMO_ORDERS.iter().any(|order| {
                order.customer_id == customer.id && order.status.is_completed()
            })
        })
        .count()
}

fn demo_order(order: &DemoOrder, now: DateTime<Utc>) -> Result<CompletedOrder, RepositoryError> {
    let mut lines = Vec::with_capacity(order.lines.len());
    for (product_id, quantity) in order.lines {
        let product = DEMO_PRODUCTS
            .iter()
            .find(|product| product.id == *product_id)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown demo product {product_id}")))?;
        lines.push(OrderLine {
            product_id: ProductId(product.id.to_string()),
            quantity: *quantity,
            unit_price: Decimal::new(product.unit_price_cents, 2),
        });
    }
    let total = lines.iter().map(OrderLine::line_total).sum();
    Ok(CompletedOrder {
        id: OrderId(order.id.to_string()),
        customer_id: CustomerId::new(order.customer_id),
        lines,
        total,
        created_at: now - Duration::days(order.days_ago),
    })
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use reengage_core::domain::customer::CustomerId;
    use reengage_core::ports::OrderSource;

    use super::DemoDataset;
    use crate::repositories::SqlOrderRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn load_is_idempotent_and_verifies() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single().expect("valid timestamp");

        let first = DemoDataset::load(&pool, now).await.expect("seed");
        DemoDataset::load(&pool, now).await.expect("reseed");
        assert_eq!(first.eligible_customers, 3);

        let verification = DemoDataset::verify(&pool).await.expect("verify");
        assert!(verification.passed(), "{verification:?}");

        let eligible = SqlOrderRepository::new(pool.clone())
            .list_customers_with_completed_orders()
            .await
            .expect("discovery");
        assert!(!eligible.contains(&CustomerId::new("cust-cancelled-001")));

        DemoDataset::clean(&pool).await.expect("clean");
        let after_clean = DemoDataset::verify(&pool).await.expect("verify");
        assert!(!after_clean.passed());
    }
}
