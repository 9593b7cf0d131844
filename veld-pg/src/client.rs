//! The narrow driver capability set the backend consumes.
//!
//! The crate does not depend on a particular PostgreSQL driver; it talks
//! to these traits. Implementations adapt their pool, connection and
//! transaction types. Cancellation and timeouts are the caller's
//! business: drop the future or wrap it in `tokio::time::timeout`.

use bytes::Bytes;
use sha1::{Digest, Sha1};
use veld_core::Value;

use crate::codec::{encode, Format};
use crate::error::{PgError, PgResult};

/// A prepared statement description.
#[derive(Debug, Clone, Default)]
pub struct StmtDesc {
    pub param_oids: Vec<u32>,
    pub field_oids: Vec<u32>,
}

/// One column of a result row description.
#[derive(Debug, Clone)]
pub struct FieldDescription {
    pub name: String,
    pub type_oid: u32,
    pub format: Format,
}

/// One bound statement argument: the encoded field body, or the null
/// marker.
#[derive(Debug, Clone)]
pub struct Arg {
    pub oid: u32,
    pub format: Format,
    pub body: Option<Bytes>,
}

/// A streaming query result.
pub trait Rows: Send {
    /// Advances to the next row. Returns false when the result set is
    /// exhausted.
    fn next(&mut self) -> impl std::future::Future<Output = PgResult<bool>> + Send;

    /// The raw field bodies of the current row. The slices borrow the
    /// row buffer and are only valid until the next `next` call.
    fn raw_values(&self) -> &[Option<Bytes>];

    fn field_descriptions(&self) -> &[FieldDescription];
}

/// A client capable of running statements: a pool, a connection or a
/// transaction.
pub trait Client: Send {
    type Rows: Rows;

    /// Runs a query. `stmt` is SQL text or the name of a statement
    /// prepared on this client.
    fn query(
        &mut self,
        stmt: &str,
        args: &[Arg],
    ) -> impl std::future::Future<Output = PgResult<Self::Rows>> + Send;

    /// Executes a statement, returning the affected row count.
    fn exec(
        &mut self,
        stmt: &str,
        args: &[Arg],
    ) -> impl std::future::Future<Output = PgResult<u64>> + Send;

    /// Prepares a named statement. Drivers no-op when the name is
    /// already prepared on the connection.
    fn prepare(
        &mut self,
        name: &str,
        sql: &str,
    ) -> impl std::future::Future<Output = PgResult<StmtDesc>> + Send;

    /// Bulk-copies rows into a table.
    fn copy_from(
        &mut self,
        table: &str,
        columns: &[String],
        rows: Vec<Vec<Value>>,
    ) -> impl std::future::Future<Output = PgResult<i64>> + Send;
}

/// A database handle that can open transactions.
pub trait Db: Client {
    type Tx: Tx;

    fn begin(&mut self) -> impl std::future::Future<Output = PgResult<Self::Tx>> + Send;
}

/// An open database transaction.
pub trait Tx: Client {
    fn commit(self) -> impl std::future::Future<Output = PgResult<()>> + Send;
    fn rollback(self) -> impl std::future::Future<Output = PgResult<()>> + Send;
}

/// Runs `f` inside a transaction: commit on success, rollback on any
/// error path.
pub async fn with_tx<D, T, F>(db: &mut D, f: F) -> PgResult<T>
where
    D: Db,
    F: AsyncFnOnce(&mut D::Tx) -> PgResult<T>,
{
    let mut tx = db.begin().await?;
    match f(&mut tx).await {
        Ok(res) => {
            tx.commit().await?;
            Ok(res)
        }
        Err(err) => {
            let _ = tx.rollback().await;
            Err(err)
        }
    }
}

/// The statement name for a SQL text: its hex SHA-1.
///
/// Content addressing lets any connection find the prepared form without
/// extra bookkeeping; collision resistance is all that is needed here.
pub fn stmt_name(sql: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(sql.as_bytes());
    hex::encode(hasher.finalize())
}

/// Prepares the statement under its content name and encodes the
/// arguments with the encoders chosen from the prepared parameter OIDs.
async fn prep<C: Client>(c: &mut C, sql: &str, args: &[Value]) -> PgResult<(String, Vec<Arg>)> {
    let name = stmt_name(sql);
    let desc = c.prepare(&name, sql).await?;
    if desc.param_oids.len() != args.len() {
        return Err(PgError::ArgCount { want: desc.param_oids.len(), got: args.len() });
    }
    let mut res = Vec::with_capacity(args.len());
    for (o, val) in desc.param_oids.iter().zip(args) {
        res.push(Arg {
            oid: *o,
            format: Format::Binary,
            body: encode(*o, val, Format::Binary)?,
        });
    }
    Ok((name, res))
}

/// Runs a query with value arguments through the prepared-statement
/// cache.
pub async fn query_vals<C: Client>(c: &mut C, sql: &str, args: &[Value]) -> PgResult<C::Rows> {
    let (name, wrapped) = prep(c, sql, args).await?;
    c.query(&name, &wrapped).await
}

/// Executes a statement with value arguments through the
/// prepared-statement cache.
pub async fn exec_vals<C: Client>(c: &mut C, sql: &str, args: &[Value]) -> PgResult<u64> {
    let (name, wrapped) = prep(c, sql, args).await?;
    c.exec(&name, &wrapped).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stmt_name() {
        let a = stmt_name("SELECT 1");
        let b = stmt_name("SELECT 1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
        assert_ne!(a, stmt_name("SELECT 2"));
    }
}
