//! SQL executor
//!
//! Every statement of a sync cycle goes through [`SqlExecutor`]. The production
//! implementation is [`SyncTransaction`], one open `sqlx` transaction per
//! connection.

use async_trait::async_trait;
use sqlx::{Executor, MySql, Postgres, Sqlite, Transaction};

use crate::db::connection::DriverKind;
use crate::error::Result;

/// Statement execution inside a single transaction
#[async_trait]
pub trait SqlExecutor: Send {
    /// Dialect of the underlying connection
    fn driver(&self) -> DriverKind;

    /// Execute raw SQL (possibly several statements), returning affected rows
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Fetch the first column of every row as text
    async fn fetch_strings(&mut self, sql: &str) -> Result<Vec<String>>;

    /// Fetch a single integer value
    async fn fetch_i64(&mut self, sql: &str) -> Result<i64>;

    /// Check whether a table exists in the current database
    async fn table_exists(&mut self, table: &str) -> Result<bool> {
        let driver = self.driver();
        let sql = driver.table_exists_query(table);
        Ok(self.fetch_i64(&sql).await? > 0)
    }
}

/// An open transaction on one of the supported drivers
pub enum SyncTransaction {
    Postgres(Transaction<'static, Postgres>),
    MySql(Transaction<'static, MySql>),
    Sqlite(Transaction<'static, Sqlite>),
}

impl SyncTransaction {
    /// Commit every statement executed so far
    pub async fn commit(self) -> Result<()> {
        match self {
            SyncTransaction::Postgres(tx) => tx.commit().await?,
            SyncTransaction::MySql(tx) => tx.commit().await?,
            SyncTransaction::Sqlite(tx) => tx.commit().await?,
        }
        Ok(())
    }

    /// Discard every statement executed so far
    pub async fn rollback(self) -> Result<()> {
        match self {
            SyncTransaction::Postgres(tx) => tx.rollback().await?,
            SyncTransaction::MySql(tx) => tx.rollback().await?,
            SyncTransaction::Sqlite(tx) => tx.rollback().await?,
        }
        Ok(())
    }
}

#[async_trait]
impl SqlExecutor for SyncTransaction {
    fn driver(&self) -> DriverKind {
        match self {
            SyncTransaction::Postgres(_) => DriverKind::Postgres,
            SyncTransaction::MySql(_) => DriverKind::MySql,
            SyncTransaction::Sqlite(_) => DriverKind::Sqlite,
        }
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        // A plain &str runs unprepared, so files holding several statements work
        let affected = match self {
            SyncTransaction::Postgres(tx) => (&mut **tx).execute(sql).await?.rows_affected(),
            SyncTransaction::MySql(tx) => (&mut **tx).execute(sql).await?.rows_affected(),
            SyncTransaction::Sqlite(tx) => (&mut **tx).execute(sql).await?.rows_affected(),
        };
        Ok(affected)
    }

    async fn fetch_strings(&mut self, sql: &str) -> Result<Vec<String>> {
        let values = match self {
            SyncTransaction::Postgres(tx) => {
                sqlx::query_scalar::<_, String>(sql)
                    .fetch_all(&mut **tx)
                    .await?
            }
            SyncTransaction::MySql(tx) => {
                sqlx::query_scalar::<_, String>(sql)
                    .fetch_all(&mut **tx)
                    .await?
            }
            SyncTransaction::Sqlite(tx) => {
                sqlx::query_scalar::<_, String>(sql)
                    .fetch_all(&mut **tx)
                    .await?
            }
        };
        Ok(values)
    }

    async fn fetch_i64(&mut self, sql: &str) -> Result<i64> {
        let value = match self {
            SyncTransaction::Postgres(tx) => {
                sqlx::query_scalar::<_, i64>(sql).fetch_one(&mut **tx).await?
            }
            SyncTransaction::MySql(tx) => {
                sqlx::query_scalar::<_, i64>(sql).fetch_one(&mut **tx).await?
            }
            SyncTransaction::Sqlite(tx) => {
                sqlx::query_scalar::<_, i64>(sql).fetch_one(&mut **tx).await?
            }
        };
        Ok(value)
    }
}
