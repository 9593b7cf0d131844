//! Query classification and aliasing.
//!
//! A [`Doc`](veld_core::Doc)'s jobs are flattened into [`Query`] records
//! whose kind bitset captures join, inline, scalar, json and alias
//! participation. One-subs of another query render as comma-joins;
//! many-subs and non-trivial scalars render as correlated subqueries.

use std::collections::{HashMap, HashSet};

use bitflags::bitflags;
use veld_core::{Doc, Expr, Job, JobKind, Project};

use crate::error::{PgError, PgResult};

bitflags! {
    /// The classification bitset of a planned query.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct QueryKind: u16 {
        const MANY = 1 << 0;
        const ONE = 1 << 1;
        const COUNT = 1 << 2;
        /// The result is a single value.
        const SCALAR = 1 << 3;
        /// Has joined children.
        const JOIN = 1 << 4;
        /// Is a joined child of another query.
        const JOINED = 1 << 5;
        /// Has inlined children.
        const INLINE = 1 << 6;
        /// Is rendered as a correlated subquery in the select list.
        const INLINED = 1 << 7;
        /// The inlined scalar needs a jsonb aggregate.
        const JSON = 1 << 8;
        /// Participates in a join and needs a table alias.
        const ALIAS = 1 << 9;
    }
}

/// One projected column of a query. Either a raw key, a translated
/// expression, or an inlined subquery.
#[derive(Debug, Clone)]
pub struct Column {
    /// The owning query, used for alias qualification and symbol scope.
    pub query: usize,
    pub key: String,
    pub expr: Option<Expr>,
    /// Index of an inlined subquery.
    pub sub: Option<usize>,
}

/// A planned query over one model.
#[derive(Debug, Clone)]
pub struct Query {
    pub kind: QueryKind,
    pub job: Job,
    pub parent: Option<usize>,
    /// Indices of joined child queries.
    pub join: Vec<usize>,
    pub cols: Vec<Column>,
}

/// A batch of planned root queries with their shared alias map.
#[derive(Debug, Default)]
pub struct Batch {
    /// All queries, roots and subs, in creation order.
    pub all: Vec<Query>,
    /// Indices of the root queries.
    pub list: Vec<usize>,
    /// Table aliases by query index.
    pub alias: HashMap<usize, String>,
}

impl Batch {
    /// The `FROM` reference of a query: the qualified table, aliased
    /// when one was allocated.
    pub fn as_ref(&self, qi: usize) -> String {
        let r = &self.all[qi].job.ref_;
        match self.alias.get(&qi) {
            Some(a) => format!("{r} {a}"),
            None => r.clone(),
        }
    }

    /// A column reference, alias-qualified when the query has one.
    pub fn col_ref(&self, qi: usize, key: &str) -> String {
        match self.alias.get(&qi) {
            Some(a) => format!("{a}.{key}"),
            None => key.to_string(),
        }
    }
}

/// Plans the next batch of queries for a document.
pub fn analyse(project: &Project, doc: &Doc) -> PgResult<Batch> {
    let mut b = Batch::default();
    let mut last = 0;
    for job in &doc.jobs {
        if project.model(&job.ref_).is_none() {
            return Err(PgError::unexpected(format!("no model for query {}", job.ref_)));
        }
        let mut a = Aliaser::default();
        let qi = new_query(&mut b, job.clone(), None)?;
        b.list.push(qi);
        analyse_query(&mut b, qi, &mut a)?;
        for i in last..b.all.len() {
            if b.all[i].kind.contains(QueryKind::ALIAS) {
                let as_ = a.add_alias(&b.all[i].job.ref_)?;
                b.alias.insert(i, as_);
            }
            last = i + 1;
        }
    }
    Ok(b)
}

fn new_query(b: &mut Batch, job: Job, parent: Option<usize>) -> PgResult<usize> {
    if !job.ref_.contains('.') {
        return Err(PgError::unexpected(format!("unqualified query {}", job.ref_)));
    }
    let mut kind = match job.kind {
        JobKind::Count => QueryKind::COUNT | QueryKind::SCALAR,
        JobKind::One => QueryKind::ONE,
        JobKind::Many => QueryKind::MANY,
    };
    if job.sel.fields.iter().any(|f| f.name == "_") {
        kind |= QueryKind::SCALAR;
    }
    b.all.push(Query { kind, job, parent, join: vec![], cols: vec![] });
    Ok(b.all.len() - 1)
}

fn analyse_query(b: &mut Batch, qi: usize, a: &mut Aliaser) -> PgResult<()> {
    let fields = b.all[qi].job.sel.fields.clone();
    for f in fields {
        a.block(&f.key);
        let col = Column { query: qi, key: f.key.clone(), expr: f.expr.clone(), sub: None };
        b.all[qi].cols.push(col);
        let Some(sub_job) = f.sub else { continue };
        let si = new_query(b, *sub_job, Some(qi))?;
        b.all[qi].kind |= QueryKind::ALIAS;
        b.all[si].kind |= QueryKind::ALIAS;
        analyse_query(b, si, a)?;
        if b.all[si].kind.contains(QueryKind::ONE) {
            // a one-sub becomes a comma-join of the parent
            b.all[si].kind |= QueryKind::JOINED;
            if b.all[si].kind.contains(QueryKind::SCALAR) {
                b.all[si].cols[0].key = f.key.clone();
            }
            b.all[qi].kind |= QueryKind::JOIN;
            let sub_cols = b.all[si].cols.clone();
            let cols = &mut b.all[qi].cols;
            cols.pop();
            cols.extend(sub_cols);
            b.all[qi].join.push(si);
            continue;
        }
        b.all[qi].kind |= QueryKind::INLINE;
        b.all[si].kind |= QueryKind::INLINED;
        if !b.all[si].kind.contains(QueryKind::MANY) {
            b.all[si].kind |= QueryKind::JSON;
        }
        if let Some(col) = b.all[qi].cols.last_mut() {
            col.sub = Some(si);
        }
    }
    Ok(())
}

/// Allocates short table aliases: the first letter of the model key,
/// then the full key, each with decimal suffixes 1..9 as fallback. The
/// blocked set also holds every selection key so aliases never shadow
/// unqualified column references.
#[derive(Debug, Default)]
pub struct Aliaser {
    blocked: HashSet<String>,
}

impl Aliaser {
    pub fn block(&mut self, key: &str) {
        self.blocked.insert(key.to_string());
    }

    fn try_alias(&mut self, key: &str) -> bool {
        if self.blocked.contains(key) {
            return false;
        }
        self.blocked.insert(key.to_string());
        true
    }

    pub fn add_alias(&mut self, ref_: &str) -> PgResult<String> {
        let name = ref_.rsplit('.').next().unwrap_or(ref_).to_lowercase();
        for k in [&name[..1], name.as_str()] {
            if self.try_alias(k) {
                return Ok(k.to_string());
            }
            for d in 1..10 {
                let k1 = format!("{k}{d}");
                if self.try_alias(&k1) {
                    return Ok(k1);
                }
            }
        }
        Err(PgError::unexpected(format!("no alias for {ref_}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliaser() {
        let mut a = Aliaser::default();
        assert_eq!(a.add_alias("prod.cat").unwrap(), "c");
        assert_eq!(a.add_alias("prod.cat").unwrap(), "c1");
        a.block("c2");
        assert_eq!(a.add_alias("prod.cat").unwrap(), "c3");
    }

    #[test]
    fn test_aliaser_blocked_by_selection() {
        let mut a = Aliaser::default();
        a.block("c");
        assert_eq!(a.add_alias("prod.cat").unwrap(), "c1");
    }
}
