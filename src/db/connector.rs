use async_trait::async_trait;

use super::row::Row;
use crate::error::Result;
use crate::sql::Statement;

/// Hands out sessions for one backend. Implementations own their pool.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Short driver name used in logs (`postgres`, `mysql`, ...).
    fn driver(&self) -> &'static str;

    async fn acquire(&self) -> Result<Box<dyn Session>>;
}

/// One exclusively held backend connection.
///
/// Dropping a session releases it. A session dropped between `begin` and
/// `commit`/`rollback` must not be handed out again with the transaction
/// still open.
#[async_trait]
pub trait Session: Send {
    /// Run a row-returning statement; rows are conformed to its declared columns.
    async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>>;

    /// Run a write and return the affected row count.
    async fn execute(&mut self, statement: &Statement) -> Result<u64>;

    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}
