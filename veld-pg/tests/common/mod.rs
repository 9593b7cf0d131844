//! An in-memory driver implementing the capability traits, enough to
//! exercise the ledger end to end. Arguments arrive binary-encoded and
//! are decoded with the crate's own codecs, so the wire formats are
//! exercised on every statement.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use veld_core::{zero_time, Value};
use veld_pg::codec::{encode, Format};
use veld_pg::oid::oid;
use veld_pg::{field_decoder, Arg, Client, Db, FieldDescription, PgError, PgResult, Rows, StmtDesc, Tx};

#[derive(Debug, Clone)]
pub struct EventRow {
    pub id: i64,
    pub rev: DateTime<Utc>,
    pub top: String,
    pub key: String,
    pub cmd: String,
    pub arg: Value,
}

#[derive(Debug, Clone)]
pub struct TransRow {
    pub id: i64,
    pub base: DateTime<Utc>,
    pub rev: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub arrived: DateTime<Utc>,
    pub usr: String,
    pub extra: Value,
    pub acts: Value,
}

#[derive(Debug, Clone, Default)]
pub struct State {
    pub events: Vec<EventRow>,
    pub trans: Vec<TransRow>,
    pub audits: usize,
    pub tables: HashMap<String, i64>,
}

/// The shared database handle. Clones share the committed state, like
/// pool handles share a server.
#[derive(Clone, Default)]
pub struct MockDb {
    committed: Arc<Mutex<State>>,
    stmts: Arc<Mutex<HashMap<String, String>>>,
}

impl MockDb {
    pub fn new() -> MockDb {
        MockDb::default()
    }

    pub fn snapshot(&self) -> State {
        self.committed.lock().unwrap().clone()
    }

    pub fn count(&self, table: &str) -> i64 {
        self.snapshot().tables.get(table).copied().unwrap_or(0)
    }

    fn resolve(&self, stmt: &str) -> String {
        self.stmts
            .lock()
            .unwrap()
            .get(stmt)
            .cloned()
            .unwrap_or_else(|| stmt.to_string())
    }
}

pub struct MockTx {
    committed: Arc<Mutex<State>>,
    stmts: Arc<Mutex<HashMap<String, String>>>,
    work: State,
}

impl MockTx {
    fn resolve(&self, stmt: &str) -> String {
        self.stmts
            .lock()
            .unwrap()
            .get(stmt)
            .cloned()
            .unwrap_or_else(|| stmt.to_string())
    }
}

#[derive(Debug)]
pub struct MockRows {
    fields: Vec<FieldDescription>,
    rows: std::vec::IntoIter<Vec<Option<Bytes>>>,
    current: Vec<Option<Bytes>>,
}

impl MockRows {
    fn empty() -> MockRows {
        MockRows { fields: vec![], rows: vec![].into_iter(), current: vec![] }
    }
}

impl Rows for MockRows {
    async fn next(&mut self) -> PgResult<bool> {
        match self.rows.next() {
            Some(row) => {
                self.current = row;
                Ok(true)
            }
            None => {
                self.current = vec![];
                Ok(false)
            }
        }
    }

    fn raw_values(&self) -> &[Option<Bytes>] {
        &self.current
    }

    fn field_descriptions(&self) -> &[FieldDescription] {
        &self.fields
    }
}

fn mk_rows(cols: &[(&str, u32)], rows: Vec<Vec<Value>>) -> PgResult<MockRows> {
    let fields = cols
        .iter()
        .map(|(name, o)| FieldDescription {
            name: name.to_string(),
            type_oid: *o,
            format: Format::Binary,
        })
        .collect();
    let mut data = Vec::with_capacity(rows.len());
    for row in rows {
        let mut out = Vec::with_capacity(row.len());
        for (v, (_, o)) in row.iter().zip(cols) {
            out.push(encode(*o, v, Format::Binary)?);
        }
        data.push(out);
    }
    Ok(MockRows { fields, rows: data.into_iter(), current: vec![] })
}

fn argv(args: &[Arg], i: usize) -> PgResult<Value> {
    let arg = args
        .get(i)
        .ok_or_else(|| PgError::unexpected(format!("missing arg {i}")))?;
    match &arg.body {
        Some(body) => field_decoder(arg.oid, arg.format)?.decode(body),
        None => Ok(Value::Null),
    }
}

fn str_list(v: &Value) -> Vec<String> {
    match v {
        Value::List(l) => l
            .vals
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect(),
        _ => vec![],
    }
}

/// The statement parameter OIDs the ledger's SQL uses.
fn param_oids(sql: &str) -> Vec<u32> {
    if sql.starts_with("INSERT INTO evt.event") {
        vec![oid::TIMESTAMPTZ, oid::TEXT, oid::TEXT, oid::TEXT, oid::JSONB]
    } else if sql.starts_with("INSERT INTO evt.audit") {
        vec![oid::TIMESTAMPTZ, oid::TIMESTAMPTZ, oid::TIMESTAMPTZ, oid::TEXT, oid::JSONB]
    } else if sql.starts_with("INSERT INTO evt.trans") {
        vec![
            oid::TIMESTAMPTZ,
            oid::TIMESTAMPTZ,
            oid::TIMESTAMPTZ,
            oid::TIMESTAMPTZ,
            oid::TEXT,
            oid::JSONB,
            oid::JSONB,
        ]
    } else if sql.starts_with("INSERT INTO prod.cat") {
        vec![oid::INT8, oid::TEXT]
    } else if sql.starts_with("INSERT INTO prod.prod") {
        vec![oid::INT8, oid::TEXT, oid::INT8]
    } else if sql.starts_with("UPDATE prod.") {
        let n = sql.matches('$').count();
        let mut oids = vec![oid::INT8];
        oids.extend(std::iter::repeat(oid::TEXT).take(n.saturating_sub(1)));
        oids
    } else if sql.starts_with("DELETE FROM prod.") {
        vec![oid::INT8]
    } else if sql.contains("key = ANY($2)") || sql.contains("top = ANY($2)") {
        vec![oid::TIMESTAMPTZ, oid::TEXT_ARRAY]
    } else if sql.contains("rev > $1") {
        vec![oid::TIMESTAMPTZ]
    } else {
        vec![]
    }
}

fn event_rows(evs: Vec<&EventRow>) -> PgResult<MockRows> {
    mk_rows(
        &[
            ("id", oid::INT8),
            ("rev", oid::TIMESTAMPTZ),
            ("top", oid::TEXT),
            ("key", oid::TEXT),
            ("cmd", oid::TEXT),
            ("arg", oid::JSONB),
        ],
        evs.iter()
            .map(|e| {
                vec![
                    Value::Int(e.id),
                    Value::Time(e.rev),
                    Value::Str(e.top.clone()),
                    Value::Str(e.key.clone()),
                    Value::Str(e.cmd.clone()),
                    e.arg.clone(),
                ]
            })
            .collect(),
    )
}

fn run(state: &mut State, sql: &str, args: &[Arg]) -> PgResult<MockRows> {
    if sql.starts_with("SELECT rev FROM evt.event") {
        let max = state.events.iter().map(|e| e.rev).max();
        return match max {
            Some(rev) => mk_rows(&[("rev", oid::TIMESTAMPTZ)], vec![vec![Value::Time(rev)]]),
            None => mk_rows(&[("rev", oid::TIMESTAMPTZ)], vec![]),
        };
    }
    if sql.starts_with("SELECT id, rev, top, key, cmd, arg FROM evt.event") {
        let since = if sql.contains("rev > $1") {
            argv(args, 0)?.to_time()?
        } else {
            zero_time()
        };
        let keys = sql
            .contains("key = ANY($2)")
            .then(|| argv(args, 1).map(|v| str_list(&v)))
            .transpose()?;
        let tops = sql
            .contains("top = ANY($2)")
            .then(|| argv(args, 1).map(|v| str_list(&v)))
            .transpose()?;
        let evs = state
            .events
            .iter()
            .filter(|e| e.rev > since)
            .filter(|e| keys.as_ref().map(|ks| ks.contains(&e.key)).unwrap_or(true))
            .filter(|e| tops.as_ref().map(|ts| ts.contains(&e.top)).unwrap_or(true))
            .collect();
        return event_rows(evs);
    }
    if sql.starts_with("SELECT id, base, rev, created, arrived, usr, extra, acts FROM evt.trans") {
        return mk_rows(
            &[
                ("id", oid::INT8),
                ("base", oid::TIMESTAMPTZ),
                ("rev", oid::TIMESTAMPTZ),
                ("created", oid::TIMESTAMPTZ),
                ("arrived", oid::TIMESTAMPTZ),
                ("usr", oid::TEXT),
                ("extra", oid::JSONB),
                ("acts", oid::JSONB),
            ],
            state
                .trans
                .iter()
                .map(|t| {
                    vec![
                        Value::Int(t.id),
                        Value::Time(t.base),
                        Value::Time(t.rev),
                        Value::Time(t.created),
                        Value::Time(t.arrived),
                        Value::Str(t.usr.clone()),
                        t.extra.clone(),
                        t.acts.clone(),
                    ]
                })
                .collect(),
        );
    }
    if sql.starts_with("INSERT INTO evt.event") {
        let id = state.events.len() as i64 + 1;
        state.events.push(EventRow {
            id,
            rev: argv(args, 0)?.to_time()?,
            top: argv(args, 1)?.to_str()?,
            key: argv(args, 2)?.to_str()?,
            cmd: argv(args, 3)?.to_str()?,
            arg: argv(args, 4)?,
        });
        return mk_rows(&[("id", oid::INT8)], vec![vec![Value::Int(id)]]);
    }
    if sql.starts_with("INSERT INTO evt.audit") {
        state.audits += 1;
        return Ok(MockRows::empty());
    }
    if sql.starts_with("INSERT INTO evt.trans") {
        let id = state.trans.len() as i64 + 1;
        state.trans.push(TransRow {
            id,
            base: argv(args, 0)?.to_time()?,
            rev: argv(args, 1)?.to_time()?,
            created: argv(args, 2)?.to_time()?,
            arrived: argv(args, 3)?.to_time()?,
            usr: argv(args, 4)?.to_str().unwrap_or_default(),
            extra: argv(args, 5)?,
            acts: argv(args, 6)?,
        });
        return mk_rows(&[("id", oid::INT8)], vec![vec![Value::Int(id)]]);
    }
    if let Some(rest) = sql.strip_prefix("DELETE FROM evt.trans WHERE id in (") {
        let ids: Vec<i64> = rest
            .trim_end_matches(')')
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        state.trans.retain(|t| !ids.contains(&t.id));
        return Ok(MockRows::empty());
    }
    if let Some(rest) = sql.strip_prefix("INSERT INTO ") {
        let table = rest.split([' ', '(']).next().unwrap_or_default().to_string();
        *state.tables.entry(table).or_insert(0) += 1;
        return Ok(MockRows::empty());
    }
    if let Some(rest) = sql.strip_prefix("DELETE FROM ") {
        let table = rest.split(' ').next().unwrap_or_default().to_string();
        *state.tables.entry(table).or_insert(0) -= 1;
        return Ok(MockRows::empty());
    }
    if sql.starts_with("UPDATE ") || sql.starts_with("CREATE ") || sql.starts_with("DROP ") {
        return Ok(MockRows::empty());
    }
    Err(PgError::unexpected(format!("mock cannot run: {sql}")))
}

impl Client for MockDb {
    type Rows = MockRows;

    async fn query(&mut self, stmt: &str, args: &[Arg]) -> PgResult<MockRows> {
        let sql = self.resolve(stmt);
        run(&mut self.committed.lock().unwrap(), &sql, args)
    }

    async fn exec(&mut self, stmt: &str, args: &[Arg]) -> PgResult<u64> {
        let sql = self.resolve(stmt);
        run(&mut self.committed.lock().unwrap(), &sql, args)?;
        Ok(1)
    }

    async fn prepare(&mut self, name: &str, sql: &str) -> PgResult<StmtDesc> {
        self.stmts
            .lock()
            .unwrap()
            .insert(name.to_string(), sql.to_string());
        Ok(StmtDesc { param_oids: param_oids(sql), field_oids: vec![] })
    }

    async fn copy_from(
        &mut self,
        table: &str,
        _columns: &[String],
        rows: Vec<Vec<Value>>,
    ) -> PgResult<i64> {
        let n = rows.len() as i64;
        *self
            .committed
            .lock()
            .unwrap()
            .tables
            .entry(table.to_string())
            .or_insert(0) += n;
        Ok(n)
    }
}

impl Db for MockDb {
    type Tx = MockTx;

    async fn begin(&mut self) -> PgResult<MockTx> {
        let work = self.committed.lock().unwrap().clone();
        Ok(MockTx {
            committed: self.committed.clone(),
            stmts: self.stmts.clone(),
            work,
        })
    }
}

impl Client for MockTx {
    type Rows = MockRows;

    async fn query(&mut self, stmt: &str, args: &[Arg]) -> PgResult<MockRows> {
        let sql = self.resolve(stmt);
        run(&mut self.work, &sql, args)
    }

    async fn exec(&mut self, stmt: &str, args: &[Arg]) -> PgResult<u64> {
        let sql = self.resolve(stmt);
        run(&mut self.work, &sql, args)?;
        Ok(1)
    }

    async fn prepare(&mut self, name: &str, sql: &str) -> PgResult<StmtDesc> {
        self.stmts
            .lock()
            .unwrap()
            .insert(name.to_string(), sql.to_string());
        Ok(StmtDesc { param_oids: param_oids(sql), field_oids: vec![] })
    }

    async fn copy_from(
        &mut self,
        table: &str,
        _columns: &[String],
        rows: Vec<Vec<Value>>,
    ) -> PgResult<i64> {
        let n = rows.len() as i64;
        *self.work.tables.entry(table.to_string()).or_insert(0) += n;
        Ok(n)
    }
}

impl Tx for MockTx {
    async fn commit(self) -> PgResult<()> {
        *self.committed.lock().unwrap() = self.work;
        Ok(())
    }

    async fn rollback(self) -> PgResult<()> {
        Ok(())
    }
}
