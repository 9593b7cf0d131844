//! Local publishing and replication of upstream event batches.

use chrono::{DateTime, Utc};
use veld_core::{next_rev, zero_time, Action, Event, Trans, Type, Value};

use super::ledger::{query_max_rev, trans_from_val, Ledger};
use super::publisher::{apply_event, apply_events, Publisher};
use crate::client::{query_vals, with_tx, Client, Db};
use crate::error::{PgError, PgResult};
use crate::scan::{scan_many, scan_one};

/// A replicator: publishes transactions locally and folds in upstream
/// event batches, tracking which local transactions are still
/// unacknowledged.
pub struct Replicator<D> {
    pub p: Publisher<D>,
    local: Vec<Trans>,
    lrev: DateTime<Utc>,
}

/// Applies a stored event batch onto a fresh ledger.
pub async fn replay<D: Db>(p: Publisher<D>, evs: &mut [Event]) -> PgResult<Replicator<D>> {
    let first = evs
        .first()
        .ok_or_else(|| PgError::unexpected("no events"))?
        .rev;
    let mut r = Replicator::new(p).await?;
    if r.rev() > first {
        return Err(PgError::unexpected("replay events before ledger rev"));
    }
    let last = evs[evs.len() - 1].rev;
    r.replicate(last, evs).await?;
    Ok(r)
}

impl<D: Db> Replicator<D> {
    /// Wraps a publisher and loads the locally published transactions
    /// still waiting for replication.
    pub async fn new(mut p: Publisher<D>) -> PgResult<Replicator<D>> {
        let local = query_local(&mut p.ledger.db).await?;
        let mut lrev = p.rev();
        for t in &local {
            if t.audit.rev > lrev {
                lrev = t.audit.rev;
            }
        }
        Ok(Replicator { p, local, lrev })
    }

    /// The replicated ledger revision.
    pub fn rev(&self) -> DateTime<Utc> {
        self.p.rev()
    }

    /// The local revision; at least the ledger revision.
    pub fn local_rev(&self) -> DateTime<Utc> {
        self.lrev
    }

    /// The local transactions not yet covered by a replication batch.
    pub fn locals(&self) -> &[Trans] {
        &self.local
    }

    /// Publishes a transaction locally: the actions apply to the base
    /// tables and the transaction is parked in `evt.trans` until a
    /// replication batch covers it. No event or audit rows are written.
    pub async fn publish_local(&mut self, t: Trans) -> PgResult<(DateTime<Utc>, Vec<Event>)> {
        let mut t = t;
        t.base = self.lrev;
        let prev = self.p.ledger.rev;
        let ins_top = &mut self.p.ins_top;
        let Ledger { db, project, .. } = &mut self.p.ledger;
        let project = &*project;
        let (t, evs) = with_tx(db, async move |tx| {
            let srev = query_max_rev(tx).await?;
            if srev != prev {
                return Err(PgError::SyncRev);
            }
            // the rev this transaction would get if published now; it
            // is kept on sync if no events arrived in between
            let now = Utc::now();
            if t.audit.created == zero_time() {
                t.audit.created = now;
            }
            t.audit.rev = next_rev(srev, now);
            let evs: Vec<Event> = t
                .acts
                .iter()
                .map(|act| Event { id: 0, rev: t.audit.rev, action: act.clone() })
                .collect();
            let acts = acts_value(&t.acts)?;
            let mut rows = query_vals(
                tx,
                "INSERT INTO evt.trans (base, rev, created, arrived, usr, extra, acts) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) returning id",
                &[
                    Value::Time(t.base),
                    Value::Time(t.audit.rev),
                    Value::Time(t.audit.created),
                    Value::Time(t.audit.arrived),
                    Value::Str(t.audit.usr.clone()),
                    t.audit.extra.clone(),
                    acts,
                ],
            )
            .await?;
            t.id = scan_one(true, &mut rows).await?.to_int()?;
            // all went well, only apply the events
            for ev in &evs {
                apply_event(tx, project, ins_top, ev)
                    .await
                    .map_err(|e| PgError::unexpected(format!("apply: {e}")))?;
            }
            Ok((t, evs))
        })
        .await?;
        self.lrev = t.audit.rev;
        self.local.push(t);
        Ok((self.lrev, evs))
    }

    /// Applies an upstream event batch in the given order and drops the
    /// local transactions it covers. The revisions advance only when
    /// the transaction commits.
    pub async fn replicate(&mut self, new_rev: DateTime<Utc>, evs: &mut [Event]) -> PgResult<()> {
        let drop = self.check_local(evs);
        let mode = self.p.mode;
        let ins_top = &mut self.p.ins_top;
        let Ledger { db, project, .. } = &mut self.p.ledger;
        let project = &*project;
        let dropped = drop.clone();
        with_tx(db, async move |tx| {
            apply_events(tx, project, mode, ins_top, evs).await?;
            if let Err(err) = delete_local(tx, &dropped).await {
                tracing::error!(error = %err, "local trans purge error");
                return Err(err);
            }
            Ok(())
        })
        .await?;
        self.p.ledger.rev = new_rev;
        if new_rev > self.lrev {
            self.lrev = new_rev;
        }
        self.drop_local(&drop);
        Ok(())
    }

    /// Collects the local transactions covered by the batch. A local
    /// transaction is covered when each of its actions has a matching
    /// event at or after the local revision; zero-action locals are
    /// always covered. Partially covered transactions are logged and
    /// still dropped.
    fn check_local(&self, evs: &[Event]) -> Vec<i64> {
        if self.local.is_empty() {
            return vec![];
        }
        let mut drop = Vec::with_capacity(self.local.len());
        for t in &self.local {
            let found = t
                .acts
                .iter()
                .filter(|act| covered_by(t.audit.rev, act, evs))
                .count();
            if found > 0 || t.acts.is_empty() {
                drop.push(t.id);
            }
            if found < t.acts.len() {
                tracing::error!(trans = t.id, "local trans misses events");
            }
        }
        drop
    }

    fn drop_local(&mut self, drop: &[i64]) {
        if drop.is_empty() {
            return;
        }
        self.local.retain(|t| !drop.contains(&t.id));
    }
}

fn covered_by(rev: DateTime<Utc>, act: &Action, evs: &[Event]) -> bool {
    evs.iter()
        .any(|e| e.top == act.top && e.key == act.key && e.rev >= rev)
}

fn acts_value(acts: &[Action]) -> PgResult<Value> {
    let json = serde_json::to_value(acts).map_err(veld_core::CoreError::from)?;
    Ok(Value::from(json))
}

async fn query_local<C: Client>(c: &mut C) -> PgResult<Vec<Trans>> {
    let mut rows = c
        .query(
            "SELECT id, base, rev, created, arrived, usr, extra, acts \
             FROM evt.trans ORDER BY id",
            &[],
        )
        .await?;
    let list = match scan_many(&Type::dict(), false, &mut rows).await? {
        Value::List(l) => l,
        v => return Err(PgError::unexpected(format!("expect rows got {v:?}"))),
    };
    list.vals.iter().map(trans_from_val).collect()
}

async fn delete_local<C: Client>(c: &mut C, drop: &[i64]) -> PgResult<()> {
    if drop.is_empty() {
        return Ok(());
    }
    let ids: Vec<String> = drop.iter().map(i64::to_string).collect();
    c.exec(
        &format!("DELETE FROM evt.trans WHERE id in ({})", ids.join(", ")),
        &[],
    )
    .await
    .map(|_| ())
}
