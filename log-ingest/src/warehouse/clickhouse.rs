use async_trait::async_trait;
use clickhouse::sql::Identifier;
use clickhouse::Client;
use tracing::info;

use super::{Warehouse, WarehouseError};
use crate::row::WarehouseRow;

/// ClickHouse over HTTP. The dataset identifier is the ClickHouse database.
#[derive(Clone)]
pub struct ClickHouseWarehouse {
    client: Client,
}

impl ClickHouseWarehouse {
    pub fn new(url: &str, user: &str, password: &str) -> Self {
        let client = Client::default()
            .with_url(url)
            .with_user(user)
            .with_password(password);

        Self { client }
    }

    pub async fn ensure_table(&self, dataset: &str, table: &str) -> Result<(), WarehouseError> {
        self.client
            .query(&WarehouseRow::create_table_sql(dataset, table))
            .execute()
            .await?;

        info!(dataset = %dataset, table = %table, "ensured warehouse table exists");
        Ok(())
    }
}

#[async_trait]
impl Warehouse for ClickHouseWarehouse {
    async fn insert_rows(
        &self,
        dataset: &str,
        table: &str,
        rows: &[WarehouseRow],
    ) -> Result<(), WarehouseError> {
        let mut insert = self
            .client
            .clone()
            .with_database(dataset)
            .insert::<WarehouseRow>(table)?;

        for row in rows {
            insert.write(row).await?;
        }
        insert.end().await?;

        Ok(())
    }

    async fn recent_rows(
        &self,
        dataset: &str,
        table: &str,
        limit: usize,
    ) -> Result<Vec<WarehouseRow>, WarehouseError> {
        let rows = self
            .client
            .clone()
            .with_database(dataset)
            .query("SELECT ?fields FROM ? ORDER BY timestamp DESC LIMIT ?")
            .bind(Identifier(table))
            .bind(limit as u64)
            .fetch_all::<WarehouseRow>()
            .await?;

        Ok(rows)
    }

    async fn health_check(&self) -> Result<(), WarehouseError> {
        self.client.query("SELECT 1").execute().await?;
        Ok(())
    }
}
