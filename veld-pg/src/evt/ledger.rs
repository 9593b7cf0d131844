//! Reading the event log.

use chrono::{DateTime, Utc};
use veld_core::{zero_time, Action, Audit, Cmd, Event, List, Project, Trans, Type, Value};

use crate::client::{query_vals, Client, Db};
use crate::error::{PgError, PgResult};
use crate::scan::{scan_many, scan_one};

/// A read handle on the event log with the last known revision cached.
pub struct Ledger<D> {
    pub db: D,
    pub project: Project,
    pub(crate) rev: DateTime<Utc>,
}

impl<D: Db> Ledger<D> {
    /// Opens the ledger and caches the current max revision.
    pub async fn new(mut db: D, project: Project) -> PgResult<Ledger<D>> {
        let rev = query_max_rev(&mut db).await?;
        Ok(Ledger { db, project, rev })
    }

    /// The cached ledger revision.
    pub fn rev(&self) -> DateTime<Utc> {
        self.rev
    }

    /// Queries events after the given revision, optionally restricted
    /// to the given topics.
    pub async fn events(
        &mut self,
        rev: DateTime<Utc>,
        tops: &[String],
    ) -> PgResult<Vec<Event>> {
        if rev == zero_time() && tops.is_empty() {
            return query_events(&mut self.db, "", &[]).await;
        }
        if tops.is_empty() {
            return query_events(&mut self.db, "WHERE rev > $1", &[Value::Time(rev)]).await;
        }
        let tops = Value::List(List::new(
            Type::str(),
            tops.iter().map(|t| Value::Str(t.clone())).collect(),
        ));
        query_events(
            &mut self.db,
            "WHERE rev > $1 AND top = ANY($2)",
            &[Value::Time(rev), tops],
        )
        .await
    }
}

/// The stored max event revision, or the zero instant on an empty log.
pub(crate) async fn query_max_rev<C: Client>(c: &mut C) -> PgResult<DateTime<Utc>> {
    let mut rows = c
        .query("SELECT rev FROM evt.event ORDER BY rev DESC LIMIT 1", &[])
        .await?;
    match scan_one(false, &mut rows).await? {
        Value::Null => Ok(zero_time()),
        v => Ok(v.key("rev").cloned().unwrap_or(Value::Null).to_time()?),
    }
}

pub(crate) async fn query_events<C: Client>(
    c: &mut C,
    whr: &str,
    args: &[Value],
) -> PgResult<Vec<Event>> {
    let sql = if whr.is_empty() {
        "SELECT id, rev, top, key, cmd, arg FROM evt.event ORDER BY id".to_string()
    } else {
        format!("SELECT id, rev, top, key, cmd, arg FROM evt.event {whr} ORDER BY id")
    };
    let mut rows = if args.is_empty() {
        c.query(&sql, &[]).await?
    } else {
        query_vals(c, &sql, args).await?
    };
    let list = match scan_many(&Type::dict(), false, &mut rows).await? {
        Value::List(l) => l,
        v => return Err(PgError::unexpected(format!("expect rows got {v:?}"))),
    };
    list.vals.iter().map(event_from_val).collect()
}

fn str_key(v: &Value, key: &str) -> PgResult<String> {
    v.key(key)
        .ok_or_else(|| PgError::unexpected(format!("missing column {key}")))?
        .to_str()
        .map_err(PgError::from)
}

fn time_key(v: &Value, key: &str) -> PgResult<DateTime<Utc>> {
    v.key(key)
        .ok_or_else(|| PgError::unexpected(format!("missing column {key}")))?
        .to_time()
        .map_err(PgError::from)
}

fn int_key(v: &Value, key: &str) -> PgResult<i64> {
    v.key(key)
        .ok_or_else(|| PgError::unexpected(format!("missing column {key}")))?
        .to_int()
        .map_err(PgError::from)
}

pub(crate) fn event_from_val(v: &Value) -> PgResult<Event> {
    let cmd = str_key(v, "cmd")?;
    let cmd = Cmd::parse(&cmd)
        .ok_or_else(|| PgError::unexpected(format!("unexpected command {cmd}")))?;
    Ok(Event {
        id: int_key(v, "id")?,
        rev: time_key(v, "rev")?,
        action: Action {
            top: str_key(v, "top")?,
            key: str_key(v, "key")?,
            cmd,
            arg: v.key("arg").cloned().unwrap_or(Value::Null),
        },
    })
}

pub(crate) fn trans_from_val(v: &Value) -> PgResult<Trans> {
    let acts = v.key("acts").cloned().unwrap_or(Value::Null);
    let acts: Vec<Action> = if acts.is_null() {
        vec![]
    } else {
        let json = serde_json::to_value(&acts).map_err(veld_core::CoreError::from)?;
        serde_json::from_value(json).map_err(veld_core::CoreError::from)?
    };
    Ok(Trans {
        id: int_key(v, "id")?,
        base: time_key(v, "base")?,
        audit: Audit {
            rev: time_key(v, "rev")?,
            created: time_key(v, "created")?,
            arrived: time_key(v, "arrived")?,
            usr: str_key(v, "usr").unwrap_or_default(),
            extra: v.key("extra").cloned().unwrap_or(Value::Null),
        },
        acts,
    })
}
