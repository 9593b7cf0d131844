//! Per-OID field encoders.
//!
//! The encoder is chosen by OID plus the value's kind. For unknown OIDs
//! above the well-known range, char-kind values encode as text and
//! int-kind values as int8, on the assumption of an enum or extension
//! domain.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Datelike, Local, NaiveDate, TimeDelta, Utc};
use uuid::Uuid;
use veld_core::{Kind, List, Value};

use super::array::{quote_elem, ArrayDim, ArrayHeader};
use super::decode::S_UNIX_TO_Y2K;
use super::Format;
use crate::error::{PgError, PgResult};
use crate::oid::{elem_oid, oid};

/// A value wrapped for a specific wire representation.
#[derive(Debug, Clone)]
pub enum Encoder {
    Null,
    Bool(bool),
    Int2(i64),
    Int4(i64),
    Int8(i64),
    Real4(f64),
    Real8(f64),
    Str(String),
    Raw(Vec<u8>),
    Uuid(Uuid),
    /// timestamptz
    Time(DateTime<Utc>),
    Date(DateTime<Utc>),
    /// timestamp without zone
    Timestamp(DateTime<Utc>),
    /// interval
    Span(TimeDelta),
    /// time of day
    SpanTime(TimeDelta),
    Json(Value),
    Jsonb(Value),
    Array { el_oid: u32, list: List },
}

/// Encodes a value for the given OID and format. A null value yields a
/// zero-length body with the null marker.
pub fn encode(o: u32, val: &Value, format: Format) -> PgResult<Option<Bytes>> {
    field_encoder(o, val)?.encode(format)
}

/// Chooses the encoder for an argument by OID and value kind.
pub fn field_encoder(o: u32, val: &Value) -> PgResult<Encoder> {
    if val.is_null() {
        return Ok(Encoder::Null);
    }
    if o > oid::MAX_KNOWN {
        // may be an enum or extension domain, use the value kind as hint
        let k = val.typ().kind;
        if k.intersects(Kind::CHAR) {
            return Ok(Encoder::Str(val.to_str()?));
        }
        if k.intersects(Kind::INT) {
            return Ok(Encoder::Int8(val.to_int()?));
        }
    }
    let enc = match o {
        oid::BOOL => Encoder::Bool(!val.is_zero()),
        oid::BYTEA => Encoder::Raw(val.to_raw()?),
        oid::INT2 => Encoder::Int2(val.to_int()?),
        oid::INT4 => Encoder::Int4(val.to_int()?),
        oid::INT8 => Encoder::Int8(val.to_int()?),
        oid::FLOAT4 => Encoder::Real4(val.to_real()?),
        oid::FLOAT8 => Encoder::Real8(val.to_real()?),
        oid::TEXT | oid::VARCHAR => Encoder::Str(val.to_str()?),
        oid::UUID => Encoder::Uuid(val.to_uuid()?),
        oid::TIMESTAMPTZ => Encoder::Time(val.to_time()?),
        oid::DATE => Encoder::Date(val.to_time()?),
        oid::TIMESTAMP => Encoder::Timestamp(val.to_time()?),
        oid::TIME => Encoder::SpanTime(val.to_span()?),
        oid::INTERVAL => Encoder::Span(val.to_span()?),
        oid::JSON => Encoder::Json(val.clone()),
        oid::JSONB => Encoder::Jsonb(val.clone()),
        _ => match (elem_oid(o), val) {
            (Some(el_oid), Value::List(list)) => {
                Encoder::Array { el_oid, list: list.clone() }
            }
            (Some(_), _) => {
                return Err(PgError::unexpected(format!("no array encoder for {val:?}")))
            }
            (None, _) => return Err(PgError::UnsupportedOid(o)),
        },
    };
    Ok(enc)
}

impl Encoder {
    pub fn encode(&self, format: Format) -> PgResult<Option<Bytes>> {
        if matches!(self, Encoder::Null) {
            return Ok(None);
        }
        let mut buf = BytesMut::new();
        match format {
            Format::Text => self.encode_text(&mut buf)?,
            Format::Binary => self.encode_binary(&mut buf)?,
        }
        Ok(Some(buf.freeze()))
    }

    pub fn encode_text(&self, buf: &mut BytesMut) -> PgResult<()> {
        match self {
            Encoder::Null => {}
            Encoder::Bool(b) => buf.put_u8(if *b { b't' } else { b'f' }),
            Encoder::Int2(n) | Encoder::Int4(n) | Encoder::Int8(n) => {
                buf.put_slice(n.to_string().as_bytes())
            }
            Encoder::Real4(n) | Encoder::Real8(n) => buf.put_slice(n.to_string().as_bytes()),
            Encoder::Str(s) => buf.put_slice(s.as_bytes()),
            Encoder::Raw(b) => {
                buf.put_slice(b"\\x");
                buf.put_slice(hex::encode(b).as_bytes());
            }
            Encoder::Uuid(u) => buf.put_slice(u.to_string().as_bytes()),
            Encoder::Time(t) => {
                let s = t.format("%Y-%m-%d %H:%M:%S%.f").to_string();
                buf.put_slice(s.as_bytes());
                buf.put_u8(b'Z');
            }
            Encoder::Date(t) => {
                let s = t.with_timezone(&Local).format("%Y-%m-%d").to_string();
                buf.put_slice(s.as_bytes());
            }
            Encoder::Timestamp(t) => {
                let s = t.format("%Y-%m-%d %H:%M:%S%.f").to_string();
                buf.put_slice(s.as_bytes());
            }
            Encoder::Span(d) | Encoder::SpanTime(d) => {
                let micros = span_micros(*d);
                let h = micros / 3_600_000_000;
                let m = micros / 60_000_000 % 60;
                let s = micros / 1_000_000 % 60;
                let us = micros % 1_000_000;
                buf.put_slice(format!("{h:02}:{m:02}:{s:02}.{us:06}").as_bytes());
            }
            Encoder::Json(v) | Encoder::Jsonb(v) => buf.put_slice(v.to_json()?.as_bytes()),
            Encoder::Array { el_oid, list } => {
                buf.put_u8(b'{');
                for (i, v) in list.vals.iter().enumerate() {
                    if i > 0 {
                        buf.put_u8(b',');
                    }
                    if v.is_null() {
                        buf.put_slice(b"NULL");
                        continue;
                    }
                    let mut el = BytesMut::new();
                    field_encoder(*el_oid, v)?.encode_text(&mut el)?;
                    match *el_oid {
                        oid::TEXT | oid::VARCHAR | oid::JSON | oid::JSONB => {
                            buf.put_slice(&quote_elem(&el))
                        }
                        _ => buf.put_slice(&el),
                    }
                }
                buf.put_u8(b'}');
            }
        }
        Ok(())
    }

    pub fn encode_binary(&self, buf: &mut BytesMut) -> PgResult<()> {
        match self {
            Encoder::Null => {}
            Encoder::Bool(b) => buf.put_u8(*b as u8),
            Encoder::Int2(n) => buf.put_i16(*n as i16),
            Encoder::Int4(n) => buf.put_i32(*n as i32),
            Encoder::Int8(n) => buf.put_i64(*n),
            Encoder::Real4(n) => buf.put_f32(*n as f32),
            Encoder::Real8(n) => buf.put_f64(*n),
            Encoder::Str(s) => buf.put_slice(s.as_bytes()),
            Encoder::Raw(b) => buf.put_slice(b),
            Encoder::Uuid(u) => buf.put_slice(u.as_bytes()),
            Encoder::Time(t) | Encoder::Timestamp(t) => {
                let micros = t.timestamp() * 1_000_000 + t.timestamp_subsec_micros() as i64;
                buf.put_i64(micros - S_UNIX_TO_Y2K * 1_000_000);
            }
            Encoder::Date(t) => {
                let local = t.with_timezone(&Local);
                let d = NaiveDate::from_ymd_opt(local.year(), local.month(), local.day())
                    .unwrap_or_default();
                let days = (d - NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default())
                    .num_days();
                buf.put_i32(days as i32);
            }
            Encoder::Span(d) => {
                let micros = span_micros(*d);
                const DAY: i64 = 24 * 3_600_000_000;
                buf.put_i64(micros % DAY);
                buf.put_i32((micros / DAY) as i32);
                buf.put_i32(0);
            }
            Encoder::SpanTime(d) => buf.put_i64(span_micros(*d)),
            Encoder::Json(v) => buf.put_slice(v.to_json()?.as_bytes()),
            Encoder::Jsonb(v) => {
                buf.put_u8(1);
                buf.put_slice(v.to_json()?.as_bytes());
            }
            Encoder::Array { el_oid, list } => {
                let dims = if list.vals.is_empty() {
                    vec![]
                } else {
                    vec![ArrayDim { len: list.vals.len() as i32, lower: 1 }]
                };
                let hdr = ArrayHeader {
                    elem_oid: *el_oid,
                    contains_null: list.vals.iter().any(Value::is_null),
                    dims,
                };
                hdr.encode(buf);
                for v in &list.vals {
                    if v.is_null() {
                        buf.put_i32(-1);
                        continue;
                    }
                    let mut el = BytesMut::new();
                    field_encoder(*el_oid, v)?.encode_binary(&mut el)?;
                    buf.put_i32(el.len() as i32);
                    buf.put_slice(&el);
                }
            }
        }
        Ok(())
    }
}

fn span_micros(d: TimeDelta) -> i64 {
    d.num_microseconds().unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use veld_core::Type;

    #[test]
    fn test_bool_wire() {
        assert_eq!(
            encode(oid::BOOL, &Value::Bool(true), Format::Text).unwrap().unwrap().as_ref(),
            b"t"
        );
        assert_eq!(
            encode(oid::BOOL, &Value::Bool(false), Format::Binary).unwrap().unwrap().as_ref(),
            &[0]
        );
    }

    #[test]
    fn test_text_array_quoting() {
        let xs = Value::List(List::new(
            Type::str(),
            vec![
                Value::Str("a".to_string()),
                Value::Str("b,c".to_string()),
                Value::Null,
                Value::Str("q\"r".to_string()),
            ],
        ));
        let body = encode(oid::TEXT_ARRAY, &xs, Format::Text).unwrap().unwrap();
        assert_eq!(body.as_ref(), br#"{a,"b,c",NULL,"q\"r"}"#);
    }

    #[test]
    fn test_jsonb_binary_version() {
        let body = encode(oid::JSONB, &Value::Int(5), Format::Binary).unwrap().unwrap();
        assert_eq!(body.as_ref(), b"\x015");
    }

    #[test]
    fn test_interval_binary_layout() {
        let d = TimeDelta::hours(25) + TimeDelta::microseconds(7);
        let body = encode(oid::INTERVAL, &Value::Span(d), Format::Binary).unwrap().unwrap();
        assert_eq!(body.len(), 16);
        let micros = i64::from_be_bytes(body[0..8].try_into().unwrap());
        let days = i32::from_be_bytes(body[8..12].try_into().unwrap());
        let months = i32::from_be_bytes(body[12..16].try_into().unwrap());
        assert_eq!(micros, 3_600_000_000 + 7);
        assert_eq!(days, 1);
        assert_eq!(months, 0);
    }
}
