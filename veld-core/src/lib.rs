//! Core interfaces of the veld data-access framework.
//!
//! This crate holds the pieces the storage backends consume: the dynamic
//! value model ([`Value`]), the type descriptors ([`Kind`], [`Type`]), the
//! expression tree ([`Expr`]), schema metadata ([`Project`], [`Model`]),
//! the declarative query tree ([`Doc`], [`Job`]) and the event model
//! ([`Event`], [`Trans`]).

pub mod error;
pub mod evt;
pub mod expr;
pub mod kind;
pub mod qry;
pub mod schema;
pub mod typ;
pub mod value;

pub use error::{CoreError, CoreResult};
pub use evt::{next_rev, Action, Audit, Cmd, Event, Trans};
pub use expr::{Call, Expr, Lit, Op, Sym};
pub use kind::Kind;
pub use qry::{Doc, Field, Job, JobKind, Ord, Sel};
pub use schema::{Const, Elem, ElemBits, Index, Model, Project, Schema};
pub use typ::Type;
pub use value::{format_span, format_time, zero_time, Dict, KeyVal, List, Value};

pub mod prelude {
    pub use crate::error::*;
    pub use crate::evt::*;
    pub use crate::expr::*;
    pub use crate::kind::Kind;
    pub use crate::qry::*;
    pub use crate::schema::*;
    pub use crate::typ::Type;
    pub use crate::value::*;
}
