//! Database collaborator: converting and detaching a day partition.
//!
//! The exporter only needs two DDL statements executed, so the database is
//! hidden behind [`PartitionDatabase`] and the statements are built by
//! [`PartitionStatements`].

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::error::ExportError;
use crate::location::PartitionDate;

/// Executes a single statement, discarding any result rows.
#[async_trait]
pub trait PartitionDatabase: Send + Sync {
    async fn execute(&self, statement: &str) -> Result<(), sqlx::Error>;
}

/// [`PartitionDatabase`] over the PostgreSQL wire protocol.
///
/// Statements go through the simple query protocol, the DDL involved takes
/// no bind parameters.
#[derive(Debug, Clone)]
pub struct PgPartitionDatabase {
    pool: PgPool,
}

impl PgPartitionDatabase {
    pub async fn connect(
        dsn: &str,
        max_connections: u32,
        connect_timeout: Duration,
    ) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(connect_timeout)
            .connect(dsn)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl PartitionDatabase for PgPartitionDatabase {
    async fn execute(&self, statement: &str) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(statement).execute(&self.pool).await?;
        Ok(())
    }
}

/// Builds the convert and detach statements for one table.
///
/// Identifiers are interpolated into the SQL, so only plain identifiers
/// (ASCII letters, digits and `_`, not starting with a digit) are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionStatements {
    table: String,
    partition_column: String,
}

impl PartitionStatements {
    pub fn new(table: &str, partition_column: &str) -> Result<Self, ExportError> {
        validate_identifier("table", table)?;
        validate_identifier("partition column", partition_column)?;

        Ok(Self {
            table: table.to_string(),
            partition_column: partition_column.to_string(),
        })
    }

    pub fn convert_to_parquet(&self, date: PartitionDate) -> String {
        format!(
            "ALTER TABLE {} CONVERT PARTITION TO PARQUET WHERE {} = '{}'",
            self.table, self.partition_column, date
        )
    }

    pub fn detach(&self, date: PartitionDate) -> String {
        format!(
            "ALTER TABLE {} DETACH PARTITION WHERE {} = '{}'",
            self.table, self.partition_column, date
        )
    }
}

fn validate_identifier(kind: &'static str, value: &str) -> Result<(), ExportError> {
    let mut chars = value.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ExportError::InvalidIdentifier {
            kind,
            value: value.to_string(),
        })
    }
}
