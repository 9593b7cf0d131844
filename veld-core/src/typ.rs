//! Type descriptors.

use serde::{Deserialize, Serialize};

use crate::kind::Kind;

/// A type descriptor: a kind, an optional reference name for enums and
/// objects, and an optional element type for containers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Type {
    pub kind: Kind,
    /// Qualified reference for enum and obj types, empty otherwise.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Element type of list types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub el: Option<Box<Type>>,
}

impl Type {
    pub fn new(kind: Kind) -> Type {
        Type { kind, name: String::new(), el: None }
    }
    pub fn void() -> Type {
        Type::new(Kind::empty())
    }
    pub fn bool() -> Type {
        Type::new(Kind::BOOL)
    }
    pub fn int() -> Type {
        Type::new(Kind::INT)
    }
    pub fn real() -> Type {
        Type::new(Kind::REAL)
    }
    pub fn str() -> Type {
        Type::new(Kind::STR)
    }
    pub fn raw() -> Type {
        Type::new(Kind::RAW)
    }
    pub fn uuid() -> Type {
        Type::new(Kind::UUID)
    }
    pub fn time() -> Type {
        Type::new(Kind::TIME)
    }
    pub fn span() -> Type {
        Type::new(Kind::SPAN)
    }
    pub fn data() -> Type {
        Type::new(Kind::DATA)
    }
    /// A generic list with dynamic element type.
    pub fn idxr() -> Type {
        Type::new(Kind::LIST)
    }
    pub fn dict() -> Type {
        Type::new(Kind::DICT)
    }
    pub fn enum_of(name: &str) -> Type {
        Type { kind: Kind::ENUM, name: name.to_string(), el: None }
    }
    pub fn obj(name: &str) -> Type {
        Type { kind: Kind::OBJ, name: name.to_string(), el: None }
    }
    pub fn list_of(el: Type) -> Type {
        Type { kind: Kind::LIST, name: String::new(), el: Some(Box::new(el)) }
    }

    /// Returns this type with the optional marker set.
    pub fn opt(mut self) -> Type {
        self.kind |= Kind::NONE;
        self
    }

    /// Returns this type with the optional marker cleared.
    pub fn deopt(mut self) -> Type {
        self.kind &= !Kind::NONE;
        self
    }

    pub fn is_opt(&self) -> bool {
        self.kind.contains(Kind::NONE)
    }

    /// The element type of a container, or the dynamic data type when the
    /// container does not declare one.
    pub fn cont_el(&self) -> Type {
        match &self.el {
            Some(el) => (**el).clone(),
            None => Type::data(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opt_roundtrip() {
        let t = Type::int().opt();
        assert!(t.is_opt());
        assert_eq!(t.deopt(), Type::int());
    }

    #[test]
    fn test_cont_el() {
        assert_eq!(Type::list_of(Type::str()).cont_el(), Type::str());
        assert_eq!(Type::idxr().cont_el(), Type::data());
    }
}
