use chrono::{DateTime, Utc};

use reengage_core::domain::customer::{CustomerId, CustomerInfo};
use reengage_core::ports::{CustomerDirectory, PortResult};

use super::{column, encode_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlCustomerRepository {
    pool: DbPool,
}

impl SqlCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn save(
        &self,
        info: &CustomerInfo,
        created_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO customer (id, email, first_name, last_name, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 email = excluded.email,
                 first_name = excluded.first_name,
                 last_name = excluded.last_name",
        )
        .bind(info.id.as_str())
        .bind(&info.email)
        .bind(&info.first_name)
        .bind(&info.last_name)
        .bind(encode_timestamp(created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, id: &CustomerId) -> Result<Option<CustomerInfo>, RepositoryError> {
        let row = sqlx::query("SELECT id, email, first_name, last_name FROM customer WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref row) => Ok(Some(CustomerInfo {
                id: CustomerId(column(row, "id")?),
                email: column(row, "email")?,
                first_name: column(row, "first_name")?,
                last_name: column(row, "last_name")?,
            })),
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl CustomerDirectory for SqlCustomerRepository {
    async fn basic_info(&self, customer_id: &CustomerId) -> PortResult<Option<CustomerInfo>> {
        Ok(self.find_by_id(customer_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use reengage_core::domain::customer::{CustomerId, CustomerInfo};
    use reengage_core::ports::CustomerDirectory;

    use super::SqlCustomerRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn save_then_lookup_and_missing_customer() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlCustomerRepository::new(pool);

        let info = CustomerInfo {
            id: CustomerId::new("cust-1"),
            email: "ada@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: Some("Lovelace".to_string()),
        };
        repo.save(&info, Utc::now()).await.expect("save");

        let found = repo.basic_info(&CustomerId::new("cust-1")).await.expect("lookup");
        assert_eq!(found, Some(info));
        assert_eq!(repo.basic_info(&CustomerId::new("ghost")).await.expect("lookup"), None);
    }
}
