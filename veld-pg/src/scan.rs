//! Reading result rows back into values.

use veld_core::{Dict, List, Type, Value};

use crate::client::{FieldDescription, Rows};
use crate::codec::decode::{field_decoder, Decoder};
use crate::error::{PgError, PgResult};

struct ScanCol {
    key: String,
    decode: Decoder,
}

/// A scanner built from a result's field descriptions: per column, the
/// name and the decoder for its OID and format.
pub struct Scanner {
    scal: bool,
    cols: Vec<ScanCol>,
}

impl Scanner {
    /// Builds a scanner. In scalar mode the result must have exactly one
    /// column.
    pub fn new(scal: bool, fields: &[FieldDescription]) -> PgResult<Scanner> {
        if scal && fields.len() != 1 {
            return Err(PgError::unexpected(format!(
                "unexpected number of scalar fields, got {}",
                fields.len()
            )));
        }
        let mut cols = Vec::with_capacity(fields.len());
        for fd in fields {
            cols.push(ScanCol {
                key: fd.name.clone(),
                decode: field_decoder(fd.type_oid, fd.format)?,
            });
        }
        Ok(Scanner { scal, cols })
    }

    /// Decodes the current row into a scalar value or a keyed record.
    pub fn scan<R: Rows>(&self, rows: &R) -> PgResult<Value> {
        let vals = rows.raw_values();
        if vals.len() != self.cols.len() {
            return Err(PgError::unexpected(format!(
                "unexpected number of row values, got {} want {}",
                vals.len(),
                self.cols.len()
            )));
        }
        if self.scal {
            return self.decode_col(0, vals[0].as_deref());
        }
        let mut rec = Dict::default();
        for (i, raw) in vals.iter().enumerate() {
            let val = self.decode_col(i, raw.as_deref())?;
            rec.set_key(&self.cols[i].key, val);
        }
        Ok(Value::Dict(rec))
    }

    fn decode_col(&self, i: usize, raw: Option<&[u8]>) -> PgResult<Value> {
        match raw {
            Some(body) => self.cols[i].decode.decode(body),
            None => Ok(Value::Null),
        }
    }
}

/// Scans a result that must hold exactly one row. In scalar mode a
/// missing row is an error; extra rows always are.
pub async fn scan_one<R: Rows>(scal: bool, rows: &mut R) -> PgResult<Value> {
    if rows.next().await? {
        let s = Scanner::new(scal, rows.field_descriptions())?;
        let res = s.scan(rows)?;
        if rows.next().await? {
            return Err(PgError::ExtraRows);
        }
        Ok(res)
    } else if scal {
        Err(PgError::NoRows)
    } else {
        Ok(Value::Null)
    }
}

/// Scans all rows into a list whose element type is `el` with the
/// optional marker removed.
pub async fn scan_many<R: Rows>(el: &Type, scal: bool, rows: &mut R) -> PgResult<Value> {
    let el = el.clone().deopt();
    let mut res = List::new(el, vec![]);
    let mut s: Option<Scanner> = None;
    while rows.next().await? {
        if s.is_none() {
            s = Some(Scanner::new(scal, rows.field_descriptions())?);
        }
        if let Some(scanner) = &s {
            res.vals.push(scanner.scan(rows)?);
        }
    }
    Ok(Value::List(res))
}
