//! The event model: append-only actions over topics with monotonic
//! revisions.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::value::{zero_time, Value};

/// The three event commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cmd {
    New,
    Mod,
    Del,
}

impl Cmd {
    pub fn as_str(self) -> &'static str {
        match self {
            Cmd::New => "new",
            Cmd::Mod => "mod",
            Cmd::Del => "del",
        }
    }

    pub fn parse(s: &str) -> Option<Cmd> {
        match s {
            "new" => Some(Cmd::New),
            "mod" => Some(Cmd::Mod),
            "del" => Some(Cmd::Del),
            _ => None,
        }
    }
}

impl std::fmt::Display for Cmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One action of a transaction: a command on a topic and key.
///
/// The `arg` is ignored for `del`, must hold all non-key, non-rev fields
/// for `new`, and holds only the changed fields for `mod`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Qualified model name.
    pub top: String,
    pub key: String,
    pub cmd: Cmd,
    #[serde(default)]
    pub arg: Value,
}

impl Action {
    pub fn new(top: &str, key: &str, cmd: Cmd, arg: Value) -> Action {
        Action { top: top.to_string(), key: key.to_string(), cmd, arg }
    }
}

/// A published action, stamped with its ledger id and revision.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: i64,
    pub rev: DateTime<Utc>,
    pub action: Action,
}

impl std::ops::Deref for Event {
    type Target = Action;
    fn deref(&self) -> &Action {
        &self.action
    }
}

/// The audit portion of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Audit {
    pub rev: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub arrived: DateTime<Utc>,
    pub usr: String,
    pub extra: Value,
}

impl Default for Audit {
    fn default() -> Audit {
        Audit {
            rev: zero_time(),
            created: zero_time(),
            arrived: zero_time(),
            usr: String::new(),
            extra: Value::Null,
        }
    }
}

/// A transaction: a batch of actions published atomically.
#[derive(Debug, Clone)]
pub struct Trans {
    pub id: i64,
    /// The ledger revision this transaction is based on.
    pub base: DateTime<Utc>,
    pub audit: Audit,
    pub acts: Vec<Action>,
}

impl Default for Trans {
    fn default() -> Trans {
        Trans { id: 0, base: zero_time(), audit: Audit::default(), acts: vec![] }
    }
}

impl Trans {
    pub fn with_acts(acts: Vec<Action>) -> Trans {
        Trans { acts, ..Trans::default() }
    }
}

/// The next ledger revision: at least one microsecond after the previous
/// one, and never behind the clock.
///
/// Revisions are truncated to whole microseconds, the storage precision,
/// so a revision compares equal to itself after a wire round-trip.
pub fn next_rev(prev: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now);
    let min = prev + TimeDelta::microseconds(1);
    if now > min {
        now
    } else {
        min
    }
}
