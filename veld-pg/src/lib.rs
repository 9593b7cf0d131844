//! PostgreSQL backend for the veld data-access framework.
//!
//! The crate turns schema definitions, declarative queries and events
//! into PostgreSQL statements and round-trips values across the wire:
//!
//! - [`codec`] — per-OID text and binary field codecs, including
//!   multi-dimensional arrays.
//! - [`scan`] — reading result rows back into values.
//! - [`write`] — SQL literals and expression trees with
//!   precedence-correct parenthesization.
//! - [`ddl`] — `CREATE SCHEMA / TYPE / TABLE / INDEX` generation.
//! - [`plan`] / [`gen`] — the declarative query planner and SELECT
//!   generator.
//! - [`evt`] — the append-only event ledger and replicator.
//!
//! The underlying driver is consumed through the capability traits in
//! [`client`]; no concrete driver dependency is taken.

pub mod client;
pub mod codec;
pub mod ddl;
pub mod error;
pub mod evt;
pub mod gen;
pub mod oid;
pub mod plan;
pub mod scan;
pub mod write;

pub use client::{exec_vals, query_vals, stmt_name, with_tx, Arg, Client, Db, FieldDescription, Rows, StmtDesc, Tx};
pub use codec::{encode, field_decoder, field_encoder, Format};
pub use error::{PgError, PgResult};
pub use gen::{gen_query, Backend};
pub use plan::{analyse, Batch, Query, QueryKind};
pub use scan::{scan_many, scan_one, Scanner};
pub use write::{write_expr, write_val, ExpEnv, ExtParam, SqlWriter, Translate};
