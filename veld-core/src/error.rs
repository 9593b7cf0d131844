//! Error types for the core value model.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// A value could not be coerced to the requested kind.
    #[error("cannot convert {from} to {to}")]
    Convert { from: String, to: &'static str },

    /// A keyed lookup did not find the key.
    #[error("key {0:?} not found")]
    KeyNotFound(String),

    /// The target of a mutation does not support the operation.
    #[error("value is not {0}")]
    NotA(&'static str),

    #[error("invalid uuid: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected type {0}")]
    UnexpectedType(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
