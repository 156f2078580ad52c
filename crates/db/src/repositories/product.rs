use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use reengage_core::domain::order::ProductId;
use reengage_core::ports::{CategoryResolver, PortResult};

use super::{column, decode_decimal, RepositoryError};
use crate::DbPool;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: ProductId,
    pub name: String,
    pub category: Option<String>,
    pub unit_price: Decimal,
}

pub struct SqlProductRepository {
    pool: DbPool,
}

impl SqlProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save(&self, product: &CatalogProduct) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO product (id, name, category, unit_price, active)
             VALUES (?, ?, ?, ?, 1)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 category = excluded.category,
                 unit_price = excluded.unit_price",
        )
        .bind(&product.id.0)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.unit_price.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: &ProductId) -> Result<Option<CatalogProduct>, RepositoryError> {
        let row = sqlx::query("SELECT id, name, category, unit_price FROM product WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => {
                let unit_price: String = column(row, "unit_price")?;
                Ok(Some(CatalogProduct {
                    id: ProductId(column(row, "id")?),
                    name: column(row, "name")?,
                    category: column(row, "category")?,
                    unit_price: decode_decimal("unit_price", &unit_price)?,
                }))
            }
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl CategoryResolver for SqlProductRepository {
    async fn category_of(&self, product_id: &ProductId) -> PortResult<Option<String>> {
        Ok(self.find_by_id(product_id).await?.and_then(|product| product.category))
    }
}
