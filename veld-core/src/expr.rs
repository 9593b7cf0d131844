//! The expression tree consumed by SQL writers.
//!
//! Expressions arrive fully resolved: every node carries its result type
//! so a backend can pick representations without re-running resolution.

use serde::{Deserialize, Serialize};

use crate::typ::Type;
use crate::value::Value;

/// A resolved expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A symbol reference. Leading dots select the enclosing scopes:
    /// `.name` the current query, `..name` its parent.
    Sym(Sym),
    /// A literal value.
    Lit(Lit),
    /// A type literal, as used by `make`.
    Typ(Type),
    /// An operator call.
    Call(Box<Call>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sym {
    pub name: String,
    pub typ: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lit {
    pub val: Value,
    pub typ: Type,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub op: Op,
    pub args: Vec<Expr>,
    pub typ: Type,
}

impl Expr {
    pub fn sym(name: &str, typ: Type) -> Expr {
        Expr::Sym(Sym { name: name.to_string(), typ })
    }
    pub fn lit(val: Value) -> Expr {
        let typ = val.typ();
        Expr::Lit(Lit { val, typ })
    }
    pub fn call(op: Op, args: Vec<Expr>, typ: Type) -> Expr {
        Expr::Call(Box::new(Call { op, args, typ }))
    }

    /// The resolved result type of this expression.
    pub fn typ(&self) -> Type {
        match self {
            Expr::Sym(s) => s.typ.clone(),
            Expr::Lit(l) => l.typ.clone(),
            Expr::Typ(_) => Type::void(),
            Expr::Call(c) => c.typ.clone(),
        }
    }
}

/// Operators of the expression language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Or,
    And,
    Ok,
    Not,
    Err,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Abs,
    Neg,
    Min,
    Max,
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
    In,
    Ni,
    Equal,
    If,
    Swt,
    Df,
    Cat,
    Sep,
    Veld,
    Json,
    Make,
    Len,
    Index,
    Prefix,
    Suffix,
    Contains,
    Upper,
    Lower,
    Trim,
    Like,
    Ilike,
}

impl Op {
    /// The expression-language key of this operator.
    pub fn key(self) -> &'static str {
        match self {
            Op::Or => "or",
            Op::And => "and",
            Op::Ok => "ok",
            Op::Not => "not",
            Op::Err => "err",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Div => "div",
            Op::Rem => "rem",
            Op::Abs => "abs",
            Op::Neg => "neg",
            Op::Min => "min",
            Op::Max => "max",
            Op::Eq => "eq",
            Op::Ne => "ne",
            Op::Lt => "lt",
            Op::Ge => "ge",
            Op::Gt => "gt",
            Op::Le => "le",
            Op::In => "in",
            Op::Ni => "ni",
            Op::Equal => "equal",
            Op::If => "if",
            Op::Swt => "swt",
            Op::Df => "df",
            Op::Cat => "cat",
            Op::Sep => "sep",
            Op::Veld => "veld",
            Op::Json => "json",
            Op::Make => "make",
            Op::Len => "len",
            Op::Index => "index",
            Op::Prefix => "prefix",
            Op::Suffix => "suffix",
            Op::Contains => "contains",
            Op::Upper => "upper",
            Op::Lower => "lower",
            Op::Trim => "trim",
            Op::Like => "like",
            Op::Ilike => "ilike",
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}
