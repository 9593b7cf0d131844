//! The event ledger: an append-only transactional event log with
//! monotonic revisions, optional state projection and local/remote
//! replication.

pub mod ledger;
pub mod publisher;
pub mod replicator;

pub use ledger::Ledger;
pub use publisher::{ApplyMode, ConflictPolicy, Publisher};
pub use replicator::{replay, Replicator};
