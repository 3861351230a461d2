//! Connection, statement and transaction traits

use crate::{QueryResult, Result, Row, StatementResult, Value};
use async_trait::async_trait;

/// A physical data-store connection
///
/// Implementations wrap exactly one driver handle. The pool guarantees that a
/// connection is used by one caller at a time, so implementations do not need
/// to serialize concurrent callers themselves.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite", "postgresql", "mysql")
    fn driver_name(&self) -> &str;

    /// Prepare a statement for repeated execution
    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>>;

    /// Run a statement that modifies data (INSERT/UPDATE/DELETE)
    async fn run(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Run a query and collect every row it returns
    async fn query_all(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Run a query and return its first row, if any
    ///
    /// Drivers with a cheaper single-row path should override this.
    async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        let result = self.query_all(sql, params).await?;
        tracing::trace!(rows = result.row_count(), "query_one via query_all");
        Ok(result.into_first())
    }

    /// Begin a transaction
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// A database transaction
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;

    /// Run a query within the transaction
    async fn query_all(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Run a statement within the transaction
    async fn run(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;
}

/// A prepared statement
#[async_trait]
pub trait PreparedStatement: Send + Sync {
    /// Run the prepared statement with parameters
    async fn run(&self, params: &[Value]) -> Result<StatementResult>;

    /// Query the prepared statement with parameters
    async fn query_all(&self, params: &[Value]) -> Result<QueryResult>;

    /// Close/deallocate the prepared statement
    async fn close(self: Box<Self>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DbError;

    struct TwoRows;

    #[async_trait]
    impl Connection for TwoRows {
        fn driver_name(&self) -> &str {
            "fixture"
        }

        async fn prepare(&self, _sql: &str) -> Result<Box<dyn PreparedStatement>> {
            Err(DbError::NotSupported("prepare".into()))
        }

        async fn run(&self, _sql: &str, _params: &[Value]) -> Result<StatementResult> {
            Ok(StatementResult::default())
        }

        async fn query_all(&self, _sql: &str, params: &[Value]) -> Result<QueryResult> {
            let columns = vec!["n".to_string()];
            let rows = params
                .iter()
                .map(|p| Row::new(columns.clone(), vec![p.clone()]))
                .collect();
            Ok(QueryResult::with_rows(columns, rows))
        }

        async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
            Err(DbError::NotSupported("transactions".into()))
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_query_one_returns_first_row() {
        let conn = TwoRows;
        let row = conn
            .query_one("SELECT n", &[Value::Int64(1), Value::Int64(2)])
            .await
            .expect("query_one");
        assert_eq!(row.and_then(|r| r.get(0).cloned()), Some(Value::Int64(1)));
    }

    #[tokio::test]
    async fn test_query_one_empty_result() {
        let conn = TwoRows;
        let row = conn.query_one("SELECT n", &[]).await.expect("query_one");
        assert!(row.is_none());
    }
}
