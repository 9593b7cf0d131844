//! SQL rendering: literals, expressions and the writer they share.

pub mod expr;
pub mod lit;

pub use expr::write_expr;
pub use lit::{quote, write_val};

use veld_core::{Sym, Type, Value};

use crate::error::{PgError, PgResult};

/// Operator precedence, lowest to highest. Children with a precedence
/// strictly lower than the surrounding context are parenthesized.
pub const PREC_OR: u8 = 1;
pub const PREC_AND: u8 = 2;
pub const PREC_NOT: u8 = 3;
/// `IS NULL`, `IS NOT NULL`
pub const PREC_IS: u8 = 4;
/// `<`, `>`, `=`, `<=`, `>=`, `!=`
pub const PREC_CMP: u8 = 5;
/// `IN`, `BETWEEN`, `LIKE`, `ILIKE`
pub const PREC_IN: u8 = 6;
/// the default bucket for calls
pub const PREC_DEF: u8 = 7;
pub const PREC_ADD: u8 = 8;
pub const PREC_MUL: u8 = 9;

/// The header emitted at the top of generated scripts.
pub const HEADER: &str = "-- generated code\n\n";

/// What a symbol resolved to.
pub enum Resolved {
    /// A plain identifier, rendered in place.
    Name(String),
    /// An inlined literal.
    Value(Value),
    /// A free symbol that becomes an external `$N` parameter; the
    /// resolved literal, if any, is captured for execution time.
    External { name: String, val: Option<Value> },
}

/// The symbol resolution seam. The `env` is an opaque scope handle the
/// query generator uses to select the owning query.
pub trait Translate {
    fn translate(&mut self, env: usize, sym: &Sym) -> PgResult<Resolved>;
}

/// The default resolver: plain keys render as themselves, anything else
/// registers as an external parameter.
pub struct ExpEnv;

impl Translate for ExpEnv {
    fn translate(&mut self, _env: usize, sym: &Sym) -> PgResult<Resolved> {
        let mut n = sym.name.as_str();
        if let Some(stripped) = n.strip_prefix('.') {
            n = stripped;
        }
        if is_key(n) {
            return Ok(Resolved::Name(n.to_string()));
        }
        Ok(Resolved::External { name: sym.name.clone(), val: None })
    }
}

/// Whether a name is a plain lowercase key.
pub fn is_key(n: &str) -> bool {
    !n.is_empty()
        && n.starts_with(|c: char| c.is_ascii_lowercase())
        && n.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// An external parameter captured while rendering.
#[derive(Debug, Clone)]
pub struct ExtParam {
    pub name: String,
    pub typ: Type,
    pub val: Option<Value>,
}

/// Restores the precedence context opened by [`SqlWriter::open_prec`].
#[must_use]
pub struct PrecGuard {
    prev: u8,
    paren: bool,
}

/// A SQL text writer with a precedence stack and external parameter
/// capture.
pub struct SqlWriter<'a> {
    buf: String,
    prec: u8,
    depth: usize,
    pub params: Vec<ExtParam>,
    pub trans: &'a mut dyn Translate,
}

impl<'a> SqlWriter<'a> {
    pub fn new(trans: &'a mut dyn Translate) -> SqlWriter<'a> {
        SqlWriter { buf: String::new(), prec: 0, depth: 0, params: vec![], trans }
    }

    pub fn finish(self) -> String {
        self.buf
    }

    pub fn push(&mut self, c: char) {
        self.buf.push(c);
    }

    pub fn push_str(&mut self, s: &str) {
        self.buf.push_str(s);
    }

    /// Opens a precedence context, parenthesizing if it binds weaker
    /// than the enclosing one.
    pub fn open_prec(&mut self, p: u8) -> PrecGuard {
        let paren = p < self.prec;
        if paren {
            self.buf.push('(');
        }
        let prev = self.prec;
        self.prec = p;
        PrecGuard { prev, paren }
    }

    pub fn close_prec(&mut self, g: PrecGuard) {
        self.prec = g.prev;
        if g.paren {
            self.buf.push(')');
        }
    }

    /// Renders a sub-expression detached from the current buffer and
    /// precedence context. Captured parameters are kept.
    pub fn capture<F>(&mut self, f: F) -> PgResult<String>
    where
        F: FnOnce(&mut SqlWriter) -> PgResult<()>,
    {
        let buf = std::mem::take(&mut self.buf);
        let prec = self.prec;
        self.prec = 0;
        let res = f(self);
        let out = std::mem::replace(&mut self.buf, buf);
        self.prec = prec;
        res?;
        Ok(out)
    }

    /// Writes an identifier, double-quoting reserved ones.
    pub fn write_ident(&mut self, name: &str) {
        let (name, ok) = unreserved(name);
        if ok {
            self.buf.push_str(&name);
        } else {
            self.buf.push('"');
            self.buf.push_str(&name);
            self.buf.push('"');
        }
    }

    /// Writes a symbol through the translator. Symbols that resolved to
    /// an already-captured parameter render as its `$N`.
    pub fn write_sym(&mut self, env: usize, sym: &Sym) -> PgResult<()> {
        if let Some(i) = self.params.iter().position(|p| p.name == sym.name) {
            self.buf.push_str(&format!("${}", i + 1));
            return Ok(());
        }
        match self.trans.translate(env, sym)? {
            Resolved::Name(n) => {
                self.write_ident(&n);
                Ok(())
            }
            Resolved::Value(v) => write_val(self, &v.typ(), &v),
            Resolved::External { name, val } => {
                self.params.push(ExtParam { name, typ: sym.typ.clone(), val });
                self.buf.push_str(&format!("${}", self.params.len()));
                Ok(())
            }
        }
    }

    pub fn indent(&mut self) {
        self.depth += 1;
        self.break_line();
    }

    pub fn dedent(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.break_line();
    }

    pub fn break_line(&mut self) {
        self.buf.push('\n');
        for _ in 0..self.depth {
            self.buf.push('\t');
        }
    }
}

/// Returns the lowercase key and whether it is an unreserved identifier.
/// Reserved keys must be escaped with double quotes.
pub fn unreserved(name: &str) -> (String, bool) {
    let name = name.to_lowercase();
    let ok = KEYWORDS.binary_search(&name.as_str()).is_err();
    (name, ok)
}

/// The reserved identifier blacklist, sorted.
const KEYWORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric", "both",
    "case", "cast", "check", "collate", "column", "constraint", "create", "current_catalog",
    "current_date", "current_role", "current_time", "current_timestamp", "current_user",
    "default", "deferrable", "desc", "distinct", "do", "else", "end", "except", "false",
    "fetch", "for", "foreign", "from", "grant", "group", "having", "in", "initially",
    "intersect", "into", "lateral", "leading", "limit", "localtime", "localtimestamp", "not",
    "null", "offset", "on", "only", "or", "order", "placing", "primary", "references",
    "returning", "select", "session_user", "some", "symmetric", "table", "then", "to",
    "trailing", "true", "union", "unique", "user", "using", "variadic", "when", "where",
    "window", "with",
];

/// The zero literal of a type, plus an alternative zero where one kind
/// has two textual forms. Used for boolean coercion of non-boolean
/// operands.
pub fn zero_strings(t: &Type) -> PgResult<(&'static str, &'static str)> {
    use veld_core::Kind;
    let k = t.kind.data();
    if k == Kind::BOOL {
        Ok(("", ""))
    } else if !k.is_empty() && Kind::NUM.contains(k) {
        Ok(("0", ""))
    } else if !k.is_empty() && (Kind::CHAR | Kind::RAW).contains(k) {
        Ok(("''", ""))
    } else if k == Kind::SPAN {
        Ok(("'0'", ""))
    } else if k == Kind::TIME {
        Ok(("'0001-01-01Z'", ""))
    } else if k.intersects(Kind::KEYR) {
        Ok(("'null'", "'{}'"))
    } else if k.intersects(Kind::IDXR) {
        Ok(("'null'", "'[]'"))
    } else {
        Err(PgError::unexpected(format!("unexpected type {t:?}")))
    }
}
