//! Publishing transactions into the event log.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use veld_core::{next_rev, zero_time, Audit, Cmd, Event, List, Model, Project, Trans, Type, Value};

use super::ledger::{query_events, query_max_rev, Ledger};
use crate::client::{exec_vals, query_vals, with_tx, Client, Db};
use crate::error::{PgError, PgResult};
use crate::scan::scan_one;

/// How published events reach the base tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Only insert events into the log.
    Stateless,
    /// Project each event into its topic's table before inserting it.
    Stateful,
}

/// What to do when events with the affected keys exist between a
/// transaction's base revision and the ledger head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Detect and log only.
    #[default]
    Ignore,
    /// Fail the publish with [`PgError::Conflict`].
    Abort,
}

/// A single-writer publisher over the event log.
pub struct Publisher<D> {
    pub ledger: Ledger<D>,
    pub(crate) mode: ApplyMode,
    policy: ConflictPolicy,
    /// Cached insert statements by topic.
    pub(crate) ins_top: HashMap<String, String>,
}

impl<D: Db> Publisher<D> {
    /// A publisher that only appends events.
    pub async fn new(db: D, project: Project) -> PgResult<Publisher<D>> {
        Self::with_mode(db, project, ApplyMode::Stateless).await
    }

    /// A publisher that also projects events into the base tables.
    pub async fn new_stateful(db: D, project: Project) -> PgResult<Publisher<D>> {
        Self::with_mode(db, project, ApplyMode::Stateful).await
    }

    async fn with_mode(db: D, project: Project, mode: ApplyMode) -> PgResult<Publisher<D>> {
        Ok(Publisher {
            ledger: Ledger::new(db, project).await?,
            mode,
            policy: ConflictPolicy::default(),
            ins_top: HashMap::new(),
        })
    }

    pub fn policy(mut self, policy: ConflictPolicy) -> Publisher<D> {
        self.policy = policy;
        self
    }

    pub fn rev(&self) -> DateTime<Utc> {
        self.ledger.rev()
    }

    pub async fn events(
        &mut self,
        rev: DateTime<Utc>,
        tops: &[String],
    ) -> PgResult<Vec<Event>> {
        self.ledger.events(rev, tops).await
    }

    /// Publishes a transaction: stamps the next revision, applies and
    /// inserts its events and the audit row atomically, and advances
    /// the cached revision on commit.
    pub async fn publish(&mut self, mut t: Trans) -> PgResult<(DateTime<Utc>, Vec<Event>)> {
        let prev = self.ledger.rev;
        if t.base == zero_time() {
            t.base = prev;
        } else if t.base > prev {
            return Err(PgError::FutureBase);
        }
        let now = Utc::now();
        if t.audit.arrived == zero_time() {
            t.audit.arrived = now;
        }
        if t.audit.created == zero_time() {
            t.audit.created = now;
        }
        let rev = next_rev(prev, now);
        let check = prev > t.base;
        let mut keys = Vec::new();
        let mut evs = Vec::with_capacity(t.acts.len());
        for act in &t.acts {
            if check && act.cmd != Cmd::New {
                // collect the keys to look for conflicts
                keys.push(Value::Str(act.key.clone()));
            }
            evs.push(Event { id: 0, rev, action: act.clone() });
        }
        let base = t.base;
        let audit = t.audit.clone();
        let policy = self.policy;
        let mode = self.mode;
        let ins_top = &mut self.ins_top;
        let Ledger { db, project, .. } = &mut self.ledger;
        let project = &*project;
        let evs = with_tx(db, async move |tx| {
            let cur = query_max_rev(tx).await?;
            if cur != prev {
                return Err(PgError::SyncRev);
            }
            if !keys.is_empty() {
                // query events with affected keys since the base revision
                let diff = query_events(
                    tx,
                    "WHERE rev > $1 AND key = ANY($2)",
                    &[Value::Time(base), Value::List(List::new(Type::str(), keys))],
                )
                .await?;
                if !diff.is_empty() {
                    match policy {
                        ConflictPolicy::Abort => return Err(PgError::Conflict(diff.len())),
                        ConflictPolicy::Ignore => {
                            tracing::debug!(count = diff.len(), "events since base revision")
                        }
                    }
                }
            }
            let mut evs = evs;
            if let Err(err) = apply_events(tx, project, mode, ins_top, &mut evs).await {
                tracing::error!(error = %err, "apply failed");
                return Err(err);
            }
            if let Err(err) = insert_audit(tx, rev, &audit).await {
                tracing::error!(error = %err, "insert audit failed");
                return Err(err);
            }
            Ok(evs)
        })
        .await?;
        self.ledger.rev = rev;
        Ok((rev, evs))
    }
}

/// Applies events per mode and appends them to the log, stamping their
/// assigned ids.
pub(crate) async fn apply_events<C: Client>(
    c: &mut C,
    project: &Project,
    mode: ApplyMode,
    ins_top: &mut HashMap<String, String>,
    evs: &mut [Event],
) -> PgResult<()> {
    if mode == ApplyMode::Stateful {
        for ev in evs.iter() {
            apply_event(c, project, ins_top, ev)
                .await
                .map_err(|e| PgError::unexpected(format!("apply event: {e}")))?;
        }
    }
    insert_events(c, evs).await
}

async fn insert_events<C: Client>(c: &mut C, evs: &mut [Event]) -> PgResult<()> {
    for ev in evs {
        let mut rows = query_vals(
            c,
            "INSERT INTO evt.event (rev, top, key, cmd, arg) \
             VALUES ($1, $2, $3, $4, $5) returning id",
            &[
                Value::Time(ev.rev),
                Value::Str(ev.top.clone()),
                Value::Str(ev.key.clone()),
                Value::Str(ev.cmd.as_str().to_string()),
                ev.arg.clone(),
            ],
        )
        .await?;
        ev.id = scan_one(true, &mut rows).await?.to_int()?;
    }
    Ok(())
}

/// Projects one event into its topic's base table.
///
/// Zero-valued arg keys of a `mod` are skipped, so a field cannot be
/// cleared through an event.
pub(crate) async fn apply_event<C: Client>(
    c: &mut C,
    project: &Project,
    ins_top: &mut HashMap<String, String>,
    ev: &Event,
) -> PgResult<()> {
    let m = project
        .model(&ev.top)
        .ok_or_else(|| PgError::unexpected(format!("no model found for topic {}", ev.top)))?;
    match ev.cmd {
        Cmd::Del => {
            let stmt = format!("DELETE FROM {} WHERE id = $1", m.qualified());
            exec_vals(c, &stmt, &[key_to_id(m, &ev.key)?]).await?;
        }
        Cmd::New => {
            let stmt = ins_top
                .entry(ev.top.clone())
                .or_insert_with(|| insert_model(m))
                .clone();
            let args = insert_args(m, ev)?;
            exec_vals(c, &stmt, &args).await?;
        }
        Cmd::Mod => {
            let (stmt, args) = update_model(m, ev)?;
            exec_vals(c, &stmt, &args).await?;
        }
    }
    Ok(())
}

async fn insert_audit<C: Client>(c: &mut C, rev: DateTime<Utc>, audit: &Audit) -> PgResult<()> {
    exec_vals(
        c,
        "INSERT INTO evt.audit (rev, created, arrived, usr, extra) \
         VALUES ($1, $2, $3, $4, $5)",
        &[
            Value::Time(rev),
            Value::Time(audit.created),
            Value::Time(audit.arrived),
            Value::Str(audit.usr.clone()),
            audit.extra.clone(),
        ],
    )
    .await
    .map(|_| ())
    .map_err(|e| PgError::unexpected(format!("insert audit: {e}")))
}

fn insert_model(m: &Model) -> String {
    let cols: Vec<String> = m.elems.iter().map(|e| e.key()).collect();
    let params: Vec<String> = (1..=cols.len()).map(|i| format!("${i}")).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        m.qualified(),
        cols.join(", "),
        params.join(", ")
    )
}

/// Parses an event key into the model's id value.
pub(crate) fn key_to_id(m: &Model, key: &str) -> PgResult<Value> {
    use veld_core::{ElemBits, Kind};
    let id = m
        .elems
        .iter()
        .find(|e| e.bits.contains(ElemBits::PK))
        .or_else(|| m.elem("id"))
        .ok_or_else(|| PgError::unexpected(format!("no id element on {}", m.qualified())))?;
    let k = id.typ.kind.data();
    if k.intersects(Kind::INT) {
        let n: i64 = key
            .parse()
            .map_err(|_| PgError::unexpected(format!("invalid int key {key}")))?;
        Ok(Value::Int(n))
    } else if k.intersects(Kind::STR) {
        Ok(Value::Str(key.to_string()))
    } else if k == Kind::UUID {
        let u = uuid::Uuid::parse_str(key)
            .map_err(|_| PgError::unexpected(format!("invalid uuid key {key}")))?;
        Ok(Value::Uuid(u))
    } else if k == Kind::TIME {
        let t = DateTime::parse_from_rfc3339(key)
            .map_err(|_| PgError::unexpected(format!("invalid time key {key}")))?;
        Ok(Value::Time(t.with_timezone(&Utc)))
    } else {
        Err(PgError::unexpected(format!("unexpected id type {:?}", id.typ)))
    }
}

fn insert_args(m: &Model, ev: &Event) -> PgResult<Vec<Value>> {
    let mut args = Vec::with_capacity(m.elems.len());
    for el in &m.elems {
        let k = el.key();
        if k == "id" {
            args.push(key_to_id(m, &ev.key)?);
        } else if k == "rev" {
            args.push(Value::Time(ev.rev));
        } else {
            let v = ev
                .arg
                .key(&k)
                .ok_or_else(|| PgError::unexpected(format!("missing arg key {k}")))?;
            args.push(v.clone());
        }
    }
    Ok(args)
}

fn update_model(m: &Model, ev: &Event) -> PgResult<(String, Vec<Value>)> {
    let mut args = vec![key_to_id(m, &ev.key)?];
    let mut b = format!("UPDATE {} SET ", m.qualified());
    for el in &m.elems {
        let k = el.key();
        if k == "id" {
            continue;
        }
        let arg = if k == "rev" {
            Value::Time(ev.rev)
        } else {
            match ev.arg.key(&k) {
                Some(v) if !v.is_zero() => v.clone(),
                _ => continue,
            }
        };
        if args.len() > 1 {
            b.push_str(", ");
        }
        args.push(arg);
        b.push_str(&format!("{k} = ${}", args.len()));
    }
    b.push_str(" WHERE id = $1");
    Ok((b, args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use veld_core::{Action, Dict, Elem, ElemBits, KeyVal, Kind};

    fn cat_model() -> Model {
        Model {
            name: "Cat".to_string(),
            schema: "prod".to_string(),
            kind: Kind::OBJ,
            elems: vec![
                Elem::new("ID", veld_core::Type::int())
                    .with_bits(ElemBits::PK | ElemBits::AUTO),
                Elem::new("Name", veld_core::Type::str()),
            ],
            consts: vec![],
            indices: vec![],
            extra: None,
        }
    }

    fn new_event(cmd: Cmd, key: &str, arg: Value) -> Event {
        Event {
            id: 0,
            rev: Utc::now(),
            action: Action::new("prod.cat", key, cmd, arg),
        }
    }

    #[test]
    fn test_insert_model() {
        assert_eq!(
            insert_model(&cat_model()),
            "INSERT INTO prod.cat (id, name) VALUES ($1, $2)"
        );
    }

    #[test]
    fn test_insert_args() {
        let ev = new_event(
            Cmd::New,
            "7",
            Value::Dict(Dict::new(vec![KeyVal::new("name", Value::Str("a".into()))])),
        );
        let args = insert_args(&cat_model(), &ev).unwrap();
        assert_eq!(args, vec![Value::Int(7), Value::Str("a".to_string())]);

        // a new event must carry all non-key fields
        let ev = new_event(Cmd::New, "7", Value::Dict(Dict::default()));
        assert!(insert_args(&cat_model(), &ev).is_err());
    }

    #[test]
    fn test_update_skips_zero_values() {
        let ev = new_event(
            Cmd::Mod,
            "7",
            Value::Dict(Dict::new(vec![KeyVal::new("name", Value::Str(String::new()))])),
        );
        let (sql, args) = update_model(&cat_model(), &ev).unwrap();
        assert_eq!(sql, "UPDATE prod.cat SET  WHERE id = $1");
        assert_eq!(args, vec![Value::Int(7)]);

        let ev = new_event(
            Cmd::Mod,
            "7",
            Value::Dict(Dict::new(vec![KeyVal::new("name", Value::Str("b".into()))])),
        );
        let (sql, args) = update_model(&cat_model(), &ev).unwrap();
        assert_eq!(sql, "UPDATE prod.cat SET name = $2 WHERE id = $1");
        assert_eq!(args, vec![Value::Int(7), Value::Str("b".to_string())]);
    }

    #[test]
    fn test_key_to_id() {
        assert_eq!(key_to_id(&cat_model(), "25").unwrap(), Value::Int(25));
        assert!(key_to_id(&cat_model(), "x").is_err());
    }
}
