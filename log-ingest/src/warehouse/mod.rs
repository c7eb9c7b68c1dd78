mod clickhouse;

pub use self::clickhouse::ClickHouseWarehouse;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::error::InsertError;
use crate::metrics_consts::ROWS_INSERTED;
use crate::row::WarehouseRow;

#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("ClickHouse error: {0}")]
    ClickHouse(#[from] ::clickhouse::error::Error),

    #[error("batch rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn insert_rows(
        &self,
        dataset: &str,
        table: &str,
        rows: &[WarehouseRow],
    ) -> Result<(), WarehouseError>;

    /// The newest `limit` rows of the table, latest first.
    async fn recent_rows(
        &self,
        dataset: &str,
        table: &str,
        limit: usize,
    ) -> Result<Vec<WarehouseRow>, WarehouseError>;

    async fn health_check(&self) -> Result<(), WarehouseError>;
}

/// Commits a whole batch to one table with a single warehouse call.
pub struct BatchInserter {
    warehouse: Arc<dyn Warehouse>,
    dataset: String,
    table: String,
}

impl BatchInserter {
    pub fn new(warehouse: Arc<dyn Warehouse>, dataset: &str, table: &str) -> Self {
        Self {
            warehouse,
            dataset: dataset.to_string(),
            table: table.to_string(),
        }
    }

    pub fn warehouse(&self) -> &Arc<dyn Warehouse> {
        &self.warehouse
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// An empty batch is a successful no-op. There is no chunking and no retry:
    /// on failure the whole batch counts as not inserted.
    pub async fn insert(&self, rows: &[WarehouseRow]) -> Result<(), InsertError> {
        if rows.is_empty() {
            return Ok(());
        }
        if self.dataset.is_empty() {
            return Err(InsertError::MissingParameter("dataset"));
        }
        if self.table.is_empty() {
            return Err(InsertError::MissingParameter("table"));
        }

        self.warehouse
            .insert_rows(&self.dataset, &self.table, rows)
            .await
            .map_err(|source| InsertError::Rejected {
                rows: rows.len(),
                source,
            })?;

        metrics::counter!(ROWS_INSERTED).increment(rows.len() as u64);
        info!(
            rows = rows.len(),
            dataset = %self.dataset,
            table = %self.table,
            "inserted rows into warehouse"
        );

        Ok(())
    }
}
