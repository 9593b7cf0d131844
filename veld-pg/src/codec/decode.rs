//! Per-OID field decoders.
//!
//! Simplified rewrites of the usual pgtype decoders for the OIDs veld
//! uses: null checks happen outside, date and timestamp values land in
//! the process-local zone, and the text array path parses without
//! per-element buffer copies.

use chrono::{
    DateTime, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc,
};
use uuid::Uuid;
use veld_core::{zero_time, Kind, List, Type, Value};

use super::array::{parse_text_array, ArrayDim, ArrayHeader};
use super::Format;
use crate::error::{PgError, PgResult};
use crate::oid::{elem_oid, oid};

/// Seconds from the unix epoch to the PostgreSQL epoch, 2000-01-01.
pub const S_UNIX_TO_Y2K: i64 = 946_684_800;

/// A field decoder for one OID and format.
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    oid: u32,
    format: Format,
}

/// Returns the decoder for the given field OID and format, or an
/// unsupported-oid error.
pub fn field_decoder(o: u32, format: Format) -> PgResult<Decoder> {
    if !supported(o) {
        return Err(PgError::UnsupportedOid(o));
    }
    Ok(Decoder { oid: o, format })
}

fn supported(o: u32) -> bool {
    matches!(
        o,
        oid::BOOL
            | oid::BYTEA
            | oid::INT2
            | oid::INT4
            | oid::INT8
            | oid::FLOAT4
            | oid::FLOAT8
            | oid::TEXT
            | oid::VARCHAR
            | oid::UUID
            | oid::DATE
            | oid::TIME
            | oid::TIMESTAMP
            | oid::TIMESTAMPTZ
            | oid::INTERVAL
            | oid::JSON
            | oid::JSONB
    ) || elem_oid(o).is_some()
}

impl Decoder {
    /// Decodes a non-null field body.
    pub fn decode(&self, raw: &[u8]) -> PgResult<Value> {
        if let Some(el) = elem_oid(self.oid) {
            return decode_array(el, self.format, raw);
        }
        decode_scalar(self.oid, self.format, raw)
    }
}

fn decode_scalar(o: u32, format: Format, raw: &[u8]) -> PgResult<Value> {
    match (o, format) {
        (oid::BOOL, Format::Text) => bool_text(raw),
        (oid::BOOL, Format::Binary) => bool_bin(raw),
        (oid::BYTEA, Format::Text) => raw_text(raw),
        (oid::BYTEA, Format::Binary) => Ok(Value::Raw(raw.to_vec())),
        (oid::INT2, Format::Binary) => int_bin::<2>(raw, "int2"),
        (oid::INT4, Format::Binary) => int_bin::<4>(raw, "int4"),
        (oid::INT8, Format::Binary) => int_bin::<8>(raw, "int8"),
        (oid::INT2 | oid::INT4 | oid::INT8, Format::Text) => int_text(raw),
        (oid::FLOAT4, Format::Binary) => real4_bin(raw),
        (oid::FLOAT8, Format::Binary) => real8_bin(raw),
        (oid::FLOAT4 | oid::FLOAT8, Format::Text) => real_text(raw),
        (oid::TEXT | oid::VARCHAR, _) => str_dec(raw),
        (oid::UUID, Format::Text) => uuid_text(raw),
        (oid::UUID, Format::Binary) => uuid_bin(raw),
        (oid::DATE, Format::Text) => date_text(raw),
        (oid::DATE, Format::Binary) => date_bin(raw),
        (oid::TIMESTAMP, Format::Text) => ts_text(raw),
        (oid::TIMESTAMPTZ, Format::Text) => tstz_text(raw),
        (oid::TIMESTAMP | oid::TIMESTAMPTZ, Format::Binary) => ts_bin(raw),
        (oid::TIME, Format::Text) => time_text(raw),
        (oid::TIME, Format::Binary) => time_bin(raw),
        (oid::INTERVAL, Format::Text) => interval_text(raw),
        (oid::INTERVAL, Format::Binary) => interval_bin(raw),
        (oid::JSON, _) => json_dec(raw),
        (oid::JSONB, Format::Text) => json_dec(raw),
        (oid::JSONB, Format::Binary) => jsonb_dec(raw),
        _ => Err(PgError::UnsupportedOid(o)),
    }
}

/// The abstract element type decoded for an element OID.
fn elem_type(el: u32) -> Type {
    match el {
        oid::BOOL => Type::bool(),
        oid::BYTEA => Type::raw(),
        oid::INT2 | oid::INT4 | oid::INT8 => Type::int(),
        oid::FLOAT4 | oid::FLOAT8 => Type::real(),
        oid::UUID => Type::uuid(),
        oid::DATE | oid::TIMESTAMP | oid::TIMESTAMPTZ => Type::time(),
        oid::TIME | oid::INTERVAL => Type::span(),
        oid::JSON | oid::JSONB => Type::data(),
        _ => Type::str(),
    }
}

fn decode_array(el: u32, format: Format, raw: &[u8]) -> PgResult<Value> {
    let mut elt = elem_type(el);
    let mut nulls = false;
    let (vals, dims) = match format {
        Format::Text => {
            let a = parse_text_array(raw)?;
            let mut vals = Vec::with_capacity(a.els.len());
            for e in &a.els {
                if e.is_null() {
                    nulls = true;
                    vals.push(Value::Null);
                } else {
                    vals.push(decode_scalar(el, Format::Text, &e.raw)?);
                }
            }
            (vals, a.dims)
        }
        Format::Binary => {
            let (hdr, mut off) = ArrayHeader::decode(raw)?;
            let n = hdr.dims.iter().fold(1usize, |n, d| n * d.len.max(0) as usize);
            let n = if hdr.dims.is_empty() { 0 } else { n };
            // each element carries at least its length prefix
            if n > (raw.len() - off) / 4 {
                return Err(PgError::WireSize { typ: "array", len: raw.len() });
            }
            let mut vals = Vec::with_capacity(n);
            for _ in 0..n {
                if raw.len() < off + 4 {
                    return Err(PgError::WireSize { typ: "array element", len: raw.len() });
                }
                let size = i32::from_be_bytes(raw[off..off + 4].try_into().unwrap());
                off += 4;
                if size < 0 {
                    nulls = true;
                    vals.push(Value::Null);
                } else {
                    let end = off + size as usize;
                    if raw.len() < end {
                        return Err(PgError::WireSize { typ: "array element", len: raw.len() });
                    }
                    vals.push(decode_scalar(el, Format::Binary, &raw[off..end])?);
                    off = end;
                }
            }
            (vals, hdr.dims)
        }
    };
    if nulls && !elt.kind.contains(Kind::NONE) {
        elt = elt.opt();
    }
    Ok(make_list(elt, vals, &dims))
}

/// Rebuilds a possibly multi-dimensional list from row-major elements.
fn make_list(mut elt: Type, mut vals: Vec<Value>, dims: &[ArrayDim]) -> Value {
    for d in (1..dims.len()).rev() {
        let size = dims[d].len.max(1) as usize;
        let mut cur = Vec::with_capacity(vals.len() / size);
        for chunk in vals.chunks(size) {
            cur.push(Value::List(List::new(elt.clone(), chunk.to_vec())));
        }
        vals = cur;
        elt = Type::list_of(elt);
    }
    Value::List(List::new(elt, vals))
}

fn bool_text(raw: &[u8]) -> PgResult<Value> {
    if raw.len() != 1 {
        return Err(PgError::WireSize { typ: "bool", len: raw.len() });
    }
    Ok(Value::Bool(raw[0] == b't'))
}

fn bool_bin(raw: &[u8]) -> PgResult<Value> {
    if raw.len() != 1 {
        return Err(PgError::WireSize { typ: "bool", len: raw.len() });
    }
    Ok(Value::Bool(raw[0] == 1))
}

fn raw_text(raw: &[u8]) -> PgResult<Value> {
    let hexpart = raw
        .strip_prefix(b"\\x")
        .ok_or_else(|| PgError::format("bytea", "missing \\x prefix"))?;
    let bytes = hex::decode(hexpart).map_err(|e| PgError::format("bytea", e.to_string()))?;
    Ok(Value::Raw(bytes))
}

fn utf8(raw: &[u8], typ: &'static str) -> PgResult<String> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| PgError::format(typ, e.to_string()))
}

fn int_text(raw: &[u8]) -> PgResult<Value> {
    utf8(raw, "int")?
        .parse::<i64>()
        .map(Value::Int)
        .map_err(|e| PgError::format("int", e.to_string()))
}

fn int_bin<const N: usize>(raw: &[u8], typ: &'static str) -> PgResult<Value> {
    if raw.len() != N {
        return Err(PgError::WireSize { typ, len: raw.len() });
    }
    let n = match N {
        2 => i16::from_be_bytes(raw.try_into().unwrap()) as i64,
        4 => i32::from_be_bytes(raw.try_into().unwrap()) as i64,
        _ => i64::from_be_bytes(raw.try_into().unwrap()),
    };
    Ok(Value::Int(n))
}

fn real_text(raw: &[u8]) -> PgResult<Value> {
    utf8(raw, "float")?
        .parse::<f64>()
        .map(Value::Real)
        .map_err(|e| PgError::format("float", e.to_string()))
}

fn real4_bin(raw: &[u8]) -> PgResult<Value> {
    if raw.len() != 4 {
        return Err(PgError::WireSize { typ: "float4", len: raw.len() });
    }
    Ok(Value::Real(f32::from_be_bytes(raw.try_into().unwrap()) as f64))
}

fn real8_bin(raw: &[u8]) -> PgResult<Value> {
    if raw.len() != 8 {
        return Err(PgError::WireSize { typ: "float8", len: raw.len() });
    }
    Ok(Value::Real(f64::from_be_bytes(raw.try_into().unwrap())))
}

fn str_dec(raw: &[u8]) -> PgResult<Value> {
    Ok(Value::Str(utf8(raw, "text")?))
}

fn uuid_text(raw: &[u8]) -> PgResult<Value> {
    let s = utf8(raw, "uuid")?;
    Uuid::parse_str(&s)
        .map(Value::Uuid)
        .map_err(|e| PgError::format("uuid", e.to_string()))
}

fn uuid_bin(raw: &[u8]) -> PgResult<Value> {
    if raw.len() != 16 {
        return Err(PgError::WireSize { typ: "uuid", len: raw.len() });
    }
    Ok(Value::Uuid(Uuid::from_slice(raw).map_err(|e| PgError::format("uuid", e.to_string()))?))
}

/// 2000-01-01, the PostgreSQL epoch.
fn pg_epoch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default()
}

/// Midnight of the given date in the process-local zone, as an instant.
fn local_midnight(d: NaiveDate) -> DateTime<Utc> {
    let ndt = d.and_time(NaiveTime::MIN);
    match Local.from_local_datetime(&ndt) {
        LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => t.with_timezone(&Utc),
        LocalResult::None => Utc.from_utc_datetime(&ndt),
    }
}

fn date_text(raw: &[u8]) -> PgResult<Value> {
    let s = utf8(raw, "date")?;
    if s == "infinity" || s == "-infinity" {
        return Ok(Value::Time(zero_time()));
    }
    let d = NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map_err(|e| PgError::format("date", e.to_string()))?;
    Ok(Value::Time(local_midnight(d)))
}

fn date_bin(raw: &[u8]) -> PgResult<Value> {
    if raw.len() != 4 {
        return Err(PgError::WireSize { typ: "date", len: raw.len() });
    }
    let days = i32::from_be_bytes(raw.try_into().unwrap());
    if days == i32::MIN || days == i32::MAX {
        return Ok(Value::Time(zero_time()));
    }
    let d = pg_epoch_date() + TimeDelta::days(days as i64);
    Ok(Value::Time(local_midnight(d)))
}

fn ts_from_micros(micros: i64) -> Value {
    if micros == i64::MIN || micros == i64::MAX {
        return Value::Time(zero_time());
    }
    Value::Time(DateTime::UNIX_EPOCH + TimeDelta::microseconds(micros + S_UNIX_TO_Y2K * 1_000_000))
}

fn ts_text(raw: &[u8]) -> PgResult<Value> {
    let s = utf8(raw, "timestamp")?;
    if s == "infinity" || s == "-infinity" {
        return Ok(Value::Time(zero_time()));
    }
    let ndt = NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|e| PgError::format("timestamp", e.to_string()))?;
    Ok(Value::Time(Utc.from_utc_datetime(&ndt)))
}

fn tstz_text(raw: &[u8]) -> PgResult<Value> {
    let s = utf8(raw, "timestamptz")?;
    if s == "infinity" || s == "-infinity" {
        return Ok(Value::Time(zero_time()));
    }
    if let Some(stripped) = s.strip_suffix('Z') {
        let ndt = NaiveDateTime::parse_from_str(stripped, "%Y-%m-%d %H:%M:%S%.f")
            .map_err(|e| PgError::format("timestamptz", e.to_string()))?;
        return Ok(Value::Time(Utc.from_utc_datetime(&ndt)));
    }
    // the offset may come as +05, +05:30 or +05:30:15
    let off_at = s
        .rfind(['+', '-'])
        .filter(|&i| i > 10)
        .ok_or_else(|| PgError::format("timestamptz", "missing zone offset"))?;
    let (body, off) = s.split_at(off_at);
    let off = match off.len() {
        3 => format!("{off}:00"),
        6 => off.to_string(),
        9 => off[..6].to_string(),
        n => return Err(PgError::format("timestamptz", format!("bad offset length {n}"))),
    };
    DateTime::parse_from_str(&format!("{body}{off}"), "%Y-%m-%d %H:%M:%S%.f%:z")
        .map(|t| Value::Time(t.with_timezone(&Utc)))
        .map_err(|e| PgError::format("timestamptz", e.to_string()))
}

fn ts_bin(raw: &[u8]) -> PgResult<Value> {
    if raw.len() != 8 {
        return Err(PgError::WireSize { typ: "timestamp", len: raw.len() });
    }
    Ok(ts_from_micros(i64::from_be_bytes(raw.try_into().unwrap())))
}

/// Parses `HH:MM:SS` with an optional `.ffffff` fraction into a span.
fn parse_clock(s: &str, typ: &'static str) -> PgResult<TimeDelta> {
    let (clock, frac) = match s.split_once('.') {
        Some((c, f)) => (c, Some(f)),
        None => (s, None),
    };
    let parts: Vec<&str> = clock.splitn(3, ':').collect();
    if parts.len() != 3 {
        return Err(PgError::format(typ, format!("invalid time {s}")));
    }
    let mut res = TimeDelta::zero();
    for (part, unit) in parts.iter().zip([3_600_000_000i64, 60_000_000, 1_000_000]) {
        let n: i64 = part
            .parse()
            .map_err(|_| PgError::format(typ, format!("invalid time value {s}")))?;
        res += TimeDelta::microseconds(n * unit);
    }
    if let Some(frac) = frac {
        if frac.len() > 6 {
            return Err(PgError::format(typ, format!("invalid fraction {frac}")));
        }
        let mut n: i64 = frac
            .parse()
            .map_err(|_| PgError::format(typ, format!("invalid fraction {frac}")))?;
        for _ in frac.len()..6 {
            n *= 10;
        }
        res += TimeDelta::microseconds(n);
    }
    Ok(res)
}

fn time_text(raw: &[u8]) -> PgResult<Value> {
    let s = utf8(raw, "time")?;
    if s.len() < 8 {
        return Err(PgError::format("time", format!("too short: {s}")));
    }
    Ok(Value::Span(parse_clock(&s, "time")?))
}

fn time_bin(raw: &[u8]) -> PgResult<Value> {
    if raw.len() != 8 {
        return Err(PgError::WireSize { typ: "time", len: raw.len() });
    }
    let micros = i64::from_be_bytes(raw.try_into().unwrap());
    Ok(Value::Span(TimeDelta::microseconds(micros)))
}

fn interval_text(raw: &[u8]) -> PgResult<Value> {
    let s = utf8(raw, "interval")?;
    let parts: Vec<&str> = s.split(' ').collect();
    let mut res = TimeDelta::zero();
    let mut i = 0;
    while i + 1 < parts.len() {
        let n: i64 = parts[i]
            .parse()
            .map_err(|_| PgError::format("interval", format!("invalid date value {}", parts[i])))?;
        // year and month normalization matches what postgres uses for
        // extract(epoch from interval)
        let hours = match parts[i + 1] {
            "year" | "years" => 8766, // 365.25 * 24
            "mon" | "mons" => 720,
            "day" | "days" => 24,
            u => return Err(PgError::format("interval", format!("unexpected date unit {u}"))),
        };
        res += TimeDelta::hours(n * hours);
        i += 2;
    }
    if parts.len() % 2 == 0 {
        // only date units, no trailing clock part
        return Ok(Value::Span(res));
    }
    let mut t = parts[parts.len() - 1];
    let neg = t.starts_with('-');
    if neg {
        t = &t[1..];
    }
    let clock = parse_clock(t, "interval")?;
    Ok(Value::Span(if neg { res - clock } else { res + clock }))
}

fn interval_bin(raw: &[u8]) -> PgResult<Value> {
    if raw.len() != 16 {
        return Err(PgError::WireSize { typ: "interval", len: raw.len() });
    }
    let micros = i64::from_be_bytes(raw[0..8].try_into().unwrap());
    let days = i32::from_be_bytes(raw[8..12].try_into().unwrap());
    // months normalized to 30 days lose calendar fidelity, like postgres
    // epoch extraction
    let months = i32::from_be_bytes(raw[12..16].try_into().unwrap());
    let res = TimeDelta::microseconds(micros)
        + TimeDelta::hours(days as i64 * 24)
        + TimeDelta::hours(months as i64 * 30 * 24);
    Ok(Value::Span(res))
}

fn json_dec(raw: &[u8]) -> PgResult<Value> {
    Value::from_json(raw).map_err(|e| PgError::format("json", e.to_string()))
}

fn jsonb_dec(raw: &[u8]) -> PgResult<Value> {
    if raw.is_empty() || raw[0] != 1 {
        return Err(PgError::format("jsonb", "invalid version byte"));
    }
    json_dec(&raw[1..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_checks() {
        assert!(matches!(bool_text(b"tt"), Err(PgError::WireSize { .. })));
        assert!(matches!(int_bin::<8>(b"123", "int8"), Err(PgError::WireSize { .. })));
        assert!(matches!(uuid_bin(b"short"), Err(PgError::WireSize { .. })));
        assert!(matches!(interval_bin(b"nope"), Err(PgError::WireSize { .. })));
    }

    #[test]
    fn test_interval_text_verbose() {
        let v = interval_text(b"1 year 2 mons 3 days 04:05:06.5").unwrap();
        let want = TimeDelta::hours(8766) + TimeDelta::hours(1440) + TimeDelta::hours(72)
            + TimeDelta::hours(4) + TimeDelta::minutes(5) + TimeDelta::seconds(6)
            + TimeDelta::milliseconds(500);
        assert_eq!(v, Value::Span(want));

        let v = interval_text(b"1 day -01:00:00").unwrap();
        assert_eq!(v, Value::Span(TimeDelta::hours(23)));

        let v = interval_text(b"2 mons").unwrap();
        assert_eq!(v, Value::Span(TimeDelta::hours(1440)));
    }

    #[test]
    fn test_tstz_offsets() {
        let v = tstz_text(b"2022-01-01 10:00:00+02").unwrap();
        assert_eq!(v, Value::Time(Utc.with_ymd_and_hms(2022, 1, 1, 8, 0, 0).unwrap()));
        let v = tstz_text(b"2022-01-01 10:30:00.25+05:30").unwrap();
        assert_eq!(
            v,
            Value::Time(
                Utc.with_ymd_and_hms(2022, 1, 1, 5, 0, 0).unwrap()
                    + TimeDelta::milliseconds(250)
            )
        );
        let v = tstz_text(b"2022-01-01 00:00:00Z").unwrap();
        assert_eq!(v, Value::Time(Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_multi_dim_binary() {
        // {{1,2,3},{4,5,6}} as int8[]
        let mut buf = bytes::BytesMut::new();
        ArrayHeader {
            elem_oid: oid::INT8,
            contains_null: false,
            dims: vec![ArrayDim { len: 2, lower: 1 }, ArrayDim { len: 3, lower: 1 }],
        }
        .encode(&mut buf);
        for n in 1i64..=6 {
            buf.extend_from_slice(&8i32.to_be_bytes());
            buf.extend_from_slice(&n.to_be_bytes());
        }
        let v = decode_array(oid::INT8, Format::Binary, &buf).unwrap();
        match v {
            Value::List(l) => {
                assert_eq!(l.el, Type::list_of(Type::int()));
                assert_eq!(l.vals.len(), 2);
                match &l.vals[1] {
                    Value::List(inner) => assert_eq!(
                        inner.vals,
                        vec![Value::Int(4), Value::Int(5), Value::Int(6)]
                    ),
                    other => panic!("expected inner list, got {other:?}"),
                }
            }
            other => panic!("expected list, got {other:?}"),
        }
    }
}
