//! Error types of the PostgreSQL backend.

use thiserror::Error;
use veld_core::CoreError;

/// Errors raised by codecs, writers, the planner and the event ledger.
///
/// Driver failures are wrapped, not replaced, so callers can still reach
/// the underlying error through `source()`.
#[derive(Debug, Error)]
pub enum PgError {
    /// A fixed-width binary field body has the wrong length.
    #[error("invalid length for {typ}: {len}")]
    WireSize { typ: &'static str, len: usize },

    /// A malformed text, jsonb or array payload.
    #[error("invalid {typ} format: {msg}")]
    WireFormat { typ: &'static str, msg: String },

    /// No codec for the field's type OID.
    #[error("no codec for oid {0}")]
    UnsupportedOid(u32),

    /// Prepared parameter count does not match the argument count.
    #[error("invalid number of params: statement wants {want}, got {got}")]
    ArgCount { want: usize, got: usize },

    /// The cached ledger revision does not match the stored one.
    #[error("ledger revision out of sync")]
    SyncRev,

    /// A transaction claims a base revision ahead of the ledger.
    #[error("publish future base revision")]
    FutureBase,

    /// Events with the affected keys exist since the transaction's base
    /// revision.
    #[error("{0} conflicting events since base revision")]
    Conflict(usize),

    /// A query expected rows and got none.
    #[error("no query results")]
    NoRows,

    /// A query expected a single row and got more.
    #[error("additional query results")]
    ExtraRows,

    #[error("{0}")]
    Unexpected(String),

    #[error("driver: {0}")]
    Driver(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl PgError {
    pub fn unexpected(msg: impl Into<String>) -> PgError {
        PgError::Unexpected(msg.into())
    }

    pub fn format(typ: &'static str, msg: impl Into<String>) -> PgError {
        PgError::WireFormat { typ, msg: msg.into() }
    }

    pub fn driver(err: impl std::error::Error + Send + Sync + 'static) -> PgError {
        PgError::Driver(Box::new(err))
    }
}

pub type PgResult<T> = Result<T, PgError>;
