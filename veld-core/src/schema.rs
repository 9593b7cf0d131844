//! Schema metadata: projects, schemas, models and their elements.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::kind::Kind;
use crate::typ::Type;
use crate::value::Dict;

/// A project groups the schemas of one deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub schemas: Vec<Schema>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
    #[serde(default)]
    pub models: Vec<Model>,
}

/// A named model: an enum, bits or object type backed by a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    /// The owning schema name.
    pub schema: String,
    pub kind: Kind,
    #[serde(default)]
    pub elems: Vec<Elem>,
    /// Constants of enum and bits models.
    #[serde(default)]
    pub consts: Vec<Const>,
    /// Explicit multi-column indices.
    #[serde(default)]
    pub indices: Vec<Index>,
    /// Free-form model extras such as the backup or topic flags.
    #[serde(default)]
    pub extra: Option<Dict>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Const {
    pub name: String,
    #[serde(default)]
    pub val: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    #[serde(default)]
    pub name: String,
    pub keys: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

bitflags! {
    /// Element flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct ElemBits: u32 {
        const PK   = 1 << 0;
        const AUTO = 1 << 1;
        const OPT  = 1 << 2;
        const IDX  = 1 << 3;
        const UNIQ = 1 << 4;
    }
}

/// One element of a model: a column of the backing table. An element with
/// an empty name embeds another model's elements inline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Elem {
    #[serde(default)]
    pub name: String,
    pub typ: Type,
    #[serde(default)]
    pub bits: ElemBits,
    /// Qualified name of a referenced model, empty otherwise.
    #[serde(default, rename = "ref", skip_serializing_if = "String::is_empty")]
    pub ref_: String,
    /// Element extras such as the `def` default expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Dict>,
}

impl Elem {
    pub fn new(name: &str, typ: Type) -> Elem {
        Elem { name: name.to_string(), typ, bits: ElemBits::empty(), ref_: String::new(), extra: None }
    }
    pub fn with_bits(mut self, bits: ElemBits) -> Elem {
        self.bits = bits;
        self
    }

    /// The lowercased column key of this element.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }
}

impl Model {
    /// The lowercased table key of this model.
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    /// The qualified `schema.key` name.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.key())
    }

    /// The object type of this model.
    pub fn typ(&self) -> Type {
        Type::obj(&self.qualified())
    }

    pub fn elem(&self, key: &str) -> Option<&Elem> {
        self.elems.iter().find(|e| e.key() == key)
    }

    /// Whether an extra flag is present and non-zero.
    pub fn has_flag(&self, key: &str) -> bool {
        self.extra
            .as_ref()
            .and_then(|d| d.key(key))
            .map(|v| !v.is_zero())
            .unwrap_or(false)
    }
}

impl Schema {
    pub fn model(&self, key: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.key() == key)
    }
}

impl Project {
    /// Looks up a model by its qualified `schema.key` name.
    pub fn model(&self, qualified: &str) -> Option<&Model> {
        let (schema, key) = qualified.split_once('.')?;
        self.schemas
            .iter()
            .find(|s| s.name == schema)
            .and_then(|s| s.model(key))
    }

    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.name == name)
    }
}
