//! Rendering values as SQL literals.

use veld_core::{format_span, format_time, Kind, List, Type, Value};

use super::SqlWriter;
use crate::error::{PgError, PgResult};
use crate::oid::type_name;

/// Quotes a string as a postgres string literal, doubling single quotes.
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Renders a literal of type `t`. Numbers and bools render literally,
/// raw, uuid, time and span values as typed casts, one-dimensional
/// primitive lists as postgres arrays, everything else as jsonb.
pub fn write_val(w: &mut SqlWriter, t: &Type, v: &Value) -> PgResult<()> {
    if v.is_null() {
        w.push_str("NULL");
        return Ok(());
    }
    let t = if t.kind.data().is_empty() { v.typ() } else { t.clone() };
    let k = t.kind.data();
    if k == Kind::DATA {
        return write_jsonb(w, v);
    }
    if k == Kind::BOOL {
        w.push_str(if v.is_zero() { "FALSE" } else { "TRUE" });
        return Ok(());
    }
    if !k.is_empty() && Kind::NUM.contains(k) {
        match v {
            Value::Int(n) => w.push_str(&n.to_string()),
            Value::Real(n) => w.push_str(&n.to_string()),
            _ => return Err(PgError::unexpected(format!("unexpected number {v:?}"))),
        }
        return Ok(());
    }
    if k == Kind::RAW {
        let text = match v {
            Value::Raw(b) => match std::str::from_utf8(b) {
                Ok(s) => s.to_string(),
                Err(_) => format!("\\x{}", hex::encode(b)),
            },
            _ => v.to_str()?,
        };
        w.push_str(&quote(&text));
        w.push_str("::bytea");
        return Ok(());
    }
    if k == Kind::UUID {
        w.push_str(&quote(&v.to_uuid()?.to_string()));
        w.push_str("::uuid");
        return Ok(());
    }
    if k == Kind::TIME {
        w.push_str(&quote(&format_time(v.to_time()?)));
        w.push_str("::timestamptz");
        return Ok(());
    }
    if k == Kind::SPAN {
        w.push_str(&quote(&format_span(v.to_span()?)));
        w.push_str("::interval");
        return Ok(());
    }
    if !k.is_empty() && Kind::CHAR.contains(k) {
        w.push_str(&quote(&v.to_str()?));
        return Ok(());
    }
    if k.intersects(Kind::IDXR) && !k.intersects(Kind::KEYR) {
        // postgres arrays for one dimensional primitive element types
        if let (Some(el), Value::List(list)) = (&t.el, v) {
            if el.kind.is_prim() {
                return write_array(w, list);
            }
        }
        return write_jsonb(w, v);
    }
    if k.intersects(Kind::KEYR) {
        return write_jsonb(w, v);
    }
    Err(PgError::unexpected(format!("unexpected lit {t:?} {v:?}")))
}

pub(super) fn write_jsonb(w: &mut SqlWriter, v: &Value) -> PgResult<()> {
    let json = v.to_json()?;
    w.push_str(&quote(&json));
    w.push_str("::jsonb");
    Ok(())
}

pub(super) fn write_array(w: &mut SqlWriter, list: &List) -> PgResult<()> {
    let mut inner = String::from("{");
    for (i, el) in list.vals.iter().enumerate() {
        if i > 0 {
            inner.push(',');
        }
        inner.push_str(&serde_json::to_string(el).map_err(veld_core::CoreError::from)?);
    }
    inner.push('}');
    w.push_str(&quote(&inner));
    w.push_str(&format!("::{}[]", type_name(&list.el)?));
    Ok(())
}
