use sqlx::sqlite::SqliteRow;

use reengage_core::domain::customer::CustomerId;
use reengage_core::domain::order::{CompletedOrder, OrderId, OrderLine, OrderStatus, ProductId};
use reengage_core::ports::{OrderSource, PortResult};

use super::{column, decode_decimal, decode_timestamp, encode_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Upserts the order header and replaces its lines.
    pub async fn save(&self, order: &CompletedOrder, status: OrderStatus) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO customer_order (id, customer_id, status, total, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 total = excluded.total",
        )
        .bind(&order.id.0)
        .bind(order.customer_id.as_str())
        .bind(status.as_str())
        .bind(order.total.to_string())
        .bind(encode_timestamp(order.created_at))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM order_item WHERE order_id = ?")
            .bind(&order.id.0)
            .execute(&mut *tx)
            .await?;

        for (line_no, line) in order.lines.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_item (order_id, line_no, product_id, quantity, unit_price)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&order.id.0)
            .bind(line_no as i64)
            .bind(&line.product_id.0)
            .bind(i64::from(line.quantity))
            .bind(line.unit_price.to_string())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn completed_orders(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<CompletedOrder>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT o.id, o.total, o.created_at, i.product_id, i.quantity, i.unit_price
             FROM customer_order o
             LEFT JOIN order_item i ON i.order_id = o.id
             WHERE o.customer_id = ? AND o.status = ?
             ORDER BY o.created_at DESC, o.id ASC, i.line_no ASC",
        )
        .bind(customer_id.as_str())
        .bind(OrderStatus::Delivered.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut orders: Vec<CompletedOrder> = Vec::new();
        for row in &rows {
            let order_id: String = column(row, "id")?;
            let continues_previous =
                orders.last().is_some_and(|previous| previous.id.0 == order_id);
            if !continues_previous {
                let total: String = column(row, "total")?;
                let created_at: String = column(row, "created_at")?;
                orders.push(CompletedOrder {
                    id: OrderId(order_id),
                    customer_id: customer_id.clone(),
                    lines: Vec::new(),
                    total: decode_decimal("total", &total)?,
                    created_at: decode_timestamp("created_at", &created_at)?,
                });
            }
            if let (Some(line), Some(order)) = (row_to_line(row)?, orders.last_mut()) {
                order.lines.push(line);
            }
        }
        Ok(orders)
    }

    pub async fn customers_with_completed_orders(&self) -> Result<Vec<CustomerId>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT DISTINCT customer_id FROM customer_order WHERE status = ? ORDER BY customer_id",
        )
        .bind(OrderStatus::Delivered.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| column(row, "customer_id").map(CustomerId)).collect()
    }
}

fn row_to_line(row: &SqliteRow) -> Result<Option<OrderLine>, RepositoryError> {
    let product_id: Option<String> = column(row, "product_id")?;
    let Some(product_id) = product_id else {
        return Ok(None);
    };
    let quantity: i64 = column(row, "quantity")?;
    let unit_price: String = column(row, "unit_price")?;
    Ok(Some(OrderLine {
        product_id: ProductId(product_id),
        quantity: u32::try_from(quantity)
            .map_err(|_| RepositoryError::Decode(format!("quantity out of range: {quantity}")))?,
        unit_price: decode_decimal("unit_price", &unit_price)?,
    }))
}

#[async_trait::async_trait]
impl OrderSource for SqlOrderRepository {
    async fn find_completed_orders(
        &self,
        customer_id: &CustomerId,
    ) -> PortResult<Vec<CompletedOrder>> {
        Ok(self.completed_orders(customer_id).await?)
    }

    async fn list_customers_with_completed_orders(&self) -> PortResult<Vec<CustomerId>> {
        Ok(self.customers_with_completed_orders().await?)
    }
}
