//! The dynamic value model.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::kind::Kind;
use crate::typ::Type;

/// A dynamic value.
///
/// Every value has an associated [`Type`]; a value is null either by being
/// the [`Value::Null`] variant or by carrying an empty container where the
/// context expects none.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
    Raw(Vec<u8>),
    Uuid(Uuid),
    Time(DateTime<Utc>),
    Span(TimeDelta),
    List(List),
    Dict(Dict),
}

/// An ordered container with a declared element type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct List {
    pub el: Type,
    pub vals: Vec<Value>,
}

/// One entry of a keyed record.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyVal {
    pub key: String,
    pub val: Value,
}

/// An ordered keyed record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dict {
    pub keyed: Vec<KeyVal>,
}

/// The zero instant, used as the null sentinel for times.
pub fn zero_time() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH - TimeDelta::seconds(62_135_596_800)
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this value is the zero value of its kind.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::Int(n) => *n == 0,
            Value::Real(n) => *n == 0.0,
            Value::Str(s) => s.is_empty(),
            Value::Raw(b) => b.is_empty(),
            Value::Uuid(u) => u.is_nil(),
            Value::Time(t) => *t == zero_time(),
            Value::Span(d) => d.is_zero(),
            Value::List(l) => l.vals.is_empty(),
            Value::Dict(d) => d.keyed.is_empty(),
        }
    }

    /// The type of this value. Containers report their declared or
    /// dynamic element types.
    pub fn typ(&self) -> Type {
        match self {
            Value::Null => Type::new(Kind::NONE),
            Value::Bool(_) => Type::bool(),
            Value::Int(_) => Type::int(),
            Value::Real(_) => Type::real(),
            Value::Str(_) => Type::str(),
            Value::Raw(_) => Type::raw(),
            Value::Uuid(_) => Type::uuid(),
            Value::Time(_) => Type::time(),
            Value::Span(_) => Type::span(),
            Value::List(l) => Type::list_of(l.el.clone()),
            Value::Dict(_) => Type::dict(),
        }
    }

    /// Number of elements, characters or bytes, if this value has one.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.len()),
            Value::Raw(b) => Some(b.len()),
            Value::List(l) => Some(l.vals.len()),
            Value::Dict(d) => Some(d.keyed.len()),
            _ => None,
        }
    }

    pub fn key(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Dict(d) => d.key(key),
            _ => None,
        }
    }

    pub fn set_key(&mut self, key: &str, val: Value) -> CoreResult<()> {
        match self {
            Value::Dict(d) => {
                d.set_key(key, val);
                Ok(())
            }
            _ => Err(CoreError::NotA("keyed record")),
        }
    }

    pub fn append(&mut self, val: Value) -> CoreResult<()> {
        match self {
            Value::List(l) => {
                l.vals.push(val);
                Ok(())
            }
            _ => Err(CoreError::NotA("appender")),
        }
    }

    fn convert_err(&self, to: &'static str) -> CoreError {
        CoreError::Convert { from: format!("{self:?}"), to }
    }

    pub fn to_int(&self) -> CoreResult<i64> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::Real(n) if n.fract() == 0.0 => Ok(*n as i64),
            Value::Bool(b) => Ok(*b as i64),
            _ => Err(self.convert_err("int")),
        }
    }

    pub fn to_real(&self) -> CoreResult<f64> {
        match self {
            Value::Real(n) => Ok(*n),
            Value::Int(n) => Ok(*n as f64),
            _ => Err(self.convert_err("real")),
        }
    }

    pub fn to_str(&self) -> CoreResult<String> {
        match self {
            Value::Str(s) => Ok(s.clone()),
            Value::Raw(b) => String::from_utf8(b.clone())
                .map_err(|_| self.convert_err("str")),
            Value::Uuid(u) => Ok(u.to_string()),
            _ => Err(self.convert_err("str")),
        }
    }

    pub fn to_raw(&self) -> CoreResult<Vec<u8>> {
        match self {
            Value::Raw(b) => Ok(b.clone()),
            Value::Str(s) => Ok(s.clone().into_bytes()),
            _ => Err(self.convert_err("raw")),
        }
    }

    pub fn to_uuid(&self) -> CoreResult<Uuid> {
        match self {
            Value::Uuid(u) => Ok(*u),
            Value::Str(s) => Ok(Uuid::parse_str(s)?),
            _ => Err(self.convert_err("uuid")),
        }
    }

    pub fn to_time(&self) -> CoreResult<DateTime<Utc>> {
        match self {
            Value::Time(t) => Ok(*t),
            Value::Null => Ok(zero_time()),
            _ => Err(self.convert_err("time")),
        }
    }

    pub fn to_span(&self) -> CoreResult<TimeDelta> {
        match self {
            Value::Span(d) => Ok(*d),
            Value::Int(n) => Ok(TimeDelta::microseconds(*n)),
            _ => Err(self.convert_err("span")),
        }
    }

    /// Renders this value as compact JSON.
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Reads a value from JSON bytes.
    pub fn from_json(raw: &[u8]) -> CoreResult<Value> {
        let j: serde_json::Value = serde_json::from_slice(raw)?;
        Ok(Value::from(j))
    }
}

impl Dict {
    pub fn new(keyed: Vec<KeyVal>) -> Dict {
        Dict { keyed }
    }
    pub fn key(&self, key: &str) -> Option<&Value> {
        self.keyed.iter().find(|kv| kv.key == key).map(|kv| &kv.val)
    }
    pub fn set_key(&mut self, key: &str, val: Value) {
        match self.keyed.iter_mut().find(|kv| kv.key == key) {
            Some(kv) => kv.val = val,
            None => self.keyed.push(KeyVal { key: key.to_string(), val }),
        }
    }
}

impl KeyVal {
    pub fn new(key: &str, val: Value) -> KeyVal {
        KeyVal { key: key.to_string(), val }
    }
}

impl List {
    pub fn new(el: Type, vals: Vec<Value>) -> List {
        List { el, vals }
    }
}

/// Formats a span the short way: `1h5m`, `2d4h`, `1.5s`, `0`.
pub fn format_span(d: TimeDelta) -> String {
    if d.is_zero() {
        return "0".to_string();
    }
    let (neg, d) = if d < TimeDelta::zero() { (true, -d) } else { (false, d) };
    let mut res = String::new();
    if neg {
        res.push('-');
    }
    let days = d.num_days();
    let hours = d.num_hours() % 24;
    let mins = d.num_minutes() % 60;
    let secs = d.num_seconds() % 60;
    let micros = d.subsec_nanos() as i64 / 1_000;
    if days != 0 {
        res.push_str(&format!("{days}d"));
    }
    if hours != 0 {
        res.push_str(&format!("{hours}h"));
    }
    if mins != 0 {
        res.push_str(&format!("{mins}m"));
    }
    if micros != 0 {
        res.push_str(&format!("{}s", secs as f64 + micros as f64 / 1e6));
    } else if secs != 0 {
        res.push_str(&format!("{secs}s"));
    }
    res
}

/// Formats an instant minimally: date-only at midnight utc, full form
/// otherwise.
pub fn format_time(t: DateTime<Utc>) -> String {
    if t.time() == chrono::NaiveTime::MIN {
        t.format("%Y-%m-%d").to_string()
    } else {
        t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Real(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "'{s}'"),
            Value::Raw(b) => write!(f, "'\\x{}'", hex::encode(b)),
            Value::Uuid(u) => write!(f, "'{u}'"),
            Value::Time(t) => write!(f, "'{}'", format_time(*t)),
            Value::Span(d) => write!(f, "'{}'", format_span(*d)),
            Value::List(l) => {
                write!(f, "[")?;
                for (i, v) in l.vals.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Dict(d) => {
                write!(f, "{{")?;
                for (i, kv) in d.keyed.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}:{}", kv.key, kv.val)?;
                }
                write!(f, "}}")
            }
        }
    }
}

// Values serialize to their json-native representation: raw bytes as a
// \x-prefixed hex string, uuids and instants as strings, spans in the
// short span format. Deserialization necessarily yields the generic json
// kinds.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => s.serialize_unit(),
            Value::Bool(b) => s.serialize_bool(*b),
            Value::Int(n) => s.serialize_i64(*n),
            Value::Real(n) => s.serialize_f64(*n),
            Value::Str(v) => s.serialize_str(v),
            Value::Raw(b) => s.serialize_str(&format!("\\x{}", hex::encode(b))),
            Value::Uuid(u) => s.serialize_str(&u.to_string()),
            Value::Time(t) => s.serialize_str(&format_time(*t)),
            Value::Span(d) => s.serialize_str(&format_span(*d)),
            Value::List(l) => l.serialize(s),
            Value::Dict(d) => d.serialize(s),
        }
    }
}

impl Serialize for List {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(self.vals.len()))?;
        for v in &self.vals {
            seq.serialize_element(v)?;
        }
        seq.end()
    }
}

impl Serialize for Dict {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        let mut map = s.serialize_map(Some(self.keyed.len()))?;
        for kv in &self.keyed {
            map.serialize_entry(&kv.key, &kv.val)?;
        }
        map.end()
    }
}

impl From<serde_json::Value> for Value {
    fn from(j: serde_json::Value) -> Value {
        match j {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Real(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(els) => Value::List(List::new(
                Type::data(),
                els.into_iter().map(Value::from).collect(),
            )),
            serde_json::Value::Object(obj) => Value::Dict(Dict::new(
                obj.into_iter()
                    .map(|(key, val)| KeyVal { key, val: Value::from(val) })
                    .collect(),
            )),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Value, D::Error> {
        let j = serde_json::Value::deserialize(d)?;
        Ok(Value::from(j))
    }
}

impl<'de> Deserialize<'de> for Dict {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Dict, D::Error> {
        match Value::deserialize(d)? {
            Value::Dict(d) => Ok(d),
            _ => Err(serde::de::Error::custom("expected a json object")),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}
impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Int(n)
    }
}
impl From<f64> for Value {
    fn from(n: f64) -> Value {
        Value::Real(n)
    }
}
impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Str(s.to_string())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::Str(s)
    }
}
impl From<Uuid> for Value {
    fn from(u: Uuid) -> Value {
        Value::Uuid(u)
    }
}
impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Value {
        Value::Time(t)
    }
}
