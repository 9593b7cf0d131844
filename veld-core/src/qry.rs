//! The declarative query tree.
//!
//! A [`Doc`] is a batch of [`Job`]s; each job selects over one model and
//! may own child jobs in its selection fields. The tree is what a backend
//! plans and executes; building it from the expression language happens
//! upstream.

use serde::{Deserialize, Serialize};

use crate::expr::Expr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Count matching rows.
    Count,
    /// At most one row.
    One,
    /// All matching rows.
    Many,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Doc {
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub kind: JobKind,
    /// Qualified model reference, `schema.key`.
    #[serde(rename = "ref")]
    pub ref_: String,
    /// Filter expressions, all of which must hold.
    #[serde(default)]
    pub whr: Vec<Expr>,
    #[serde(default)]
    pub sel: Sel,
    #[serde(default)]
    pub ord: Vec<Ord>,
    #[serde(default)]
    pub lim: u32,
    #[serde(default)]
    pub off: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sel {
    pub fields: Vec<Field>,
}

/// One selected field. A field named `_` marks a scalar selection; a
/// field with a sub job selects a nested query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    /// The result key, usually the lowercased name.
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<Expr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<Box<Job>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ord {
    pub key: String,
    #[serde(default)]
    pub desc: bool,
}

impl Job {
    pub fn new(kind: JobKind, ref_: &str) -> Job {
        Job {
            kind,
            ref_: ref_.to_string(),
            whr: vec![],
            sel: Sel::default(),
            ord: vec![],
            lim: 0,
            off: 0,
        }
    }

    pub fn filter(mut self, whr: Expr) -> Job {
        self.whr.push(whr);
        self
    }
    pub fn field(mut self, f: Field) -> Job {
        self.sel.fields.push(f);
        self
    }
    pub fn asc(mut self, key: &str) -> Job {
        self.ord.push(Ord { key: key.to_string(), desc: false });
        self
    }
    pub fn desc(mut self, key: &str) -> Job {
        self.ord.push(Ord { key: key.to_string(), desc: true });
        self
    }
    pub fn limit(mut self, lim: u32) -> Job {
        self.lim = lim;
        self
    }
    pub fn offset(mut self, off: u32) -> Job {
        self.off = off;
        self
    }
}

impl Field {
    /// A plain column selection.
    pub fn col(name: &str) -> Field {
        Field {
            name: name.to_string(),
            key: name.to_lowercase(),
            expr: None,
            sub: None,
        }
    }

    /// A computed field.
    pub fn expr(key: &str, expr: Expr) -> Field {
        Field {
            name: key.to_string(),
            key: key.to_string(),
            expr: Some(expr),
            sub: None,
        }
    }

    /// A scalar selection `_:key` that reduces the result to one column.
    pub fn scalar(key: &str, expr: Expr) -> Field {
        Field {
            name: "_".to_string(),
            key: key.to_string(),
            expr: Some(expr),
            sub: None,
        }
    }

    /// A nested sub-query selection. The sub query is scalar when its own
    /// selection carries a `_` field.
    pub fn sub(key: &str, job: Job) -> Field {
        Field {
            name: key.to_string(),
            key: key.to_string(),
            expr: None,
            sub: Some(Box::new(job)),
        }
    }
}
