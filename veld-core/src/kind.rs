//! The kind mask that discriminates types and values.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Primary discriminator of a [`Type`](crate::Type).
    ///
    /// Kinds are bits so that composite masks like [`Kind::NUM`] or
    /// [`Kind::KEYR`] can be tested with a single `intersects` call.
    /// Container kinds carry their abstract bit: every list is an idxr,
    /// every dict or obj is a keyr.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Kind: u32 {
        /// The null/optional marker. A type with this bit accepts null.
        const NONE = 1 << 0;
        const BOOL = 1 << 1;
        const INT  = 1 << 2;
        const REAL = 1 << 3;
        const BITS = 1 << 4;
        const STR  = 1 << 5;
        const ENUM = 1 << 6;
        const RAW  = 1 << 7;
        const UUID = 1 << 8;
        const TIME = 1 << 9;
        const SPAN = 1 << 10;
        /// Any ordered container.
        const IDXR = 1 << 11;
        /// Any keyed container.
        const KEYR = 1 << 12;
        const LIST = 1 << 13 | Self::IDXR.bits();
        const DICT = 1 << 14 | Self::KEYR.bits();
        const OBJ  = 1 << 15 | Self::KEYR.bits();
        const FUNC = 1 << 16;

        const NUM  = Self::INT.bits() | Self::REAL.bits() | Self::BITS.bits();
        const CHAR = Self::STR.bits() | Self::ENUM.bits();
        const PRIM = Self::BOOL.bits() | Self::NUM.bits() | Self::CHAR.bits()
            | Self::RAW.bits() | Self::UUID.bits() | Self::TIME.bits() | Self::SPAN.bits();
        const CONT = Self::IDXR.bits() | Self::KEYR.bits()
            | Self::LIST.bits() | Self::DICT.bits() | Self::OBJ.bits();
        /// Any concrete data kind; a type whose kind equals this mask is
        /// a dynamic json value.
        const DATA = Self::PRIM.bits() | Self::CONT.bits();
        const ANY  = Self::DATA.bits() | Self::NONE.bits();
    }
}

impl Kind {
    /// Whether this kind is exactly one primitive kind, ignoring the
    /// optional marker.
    pub fn is_prim(self) -> bool {
        let k = self & Kind::DATA;
        !k.is_empty() && Kind::PRIM.contains(k)
    }

    /// The data bits without the optional marker.
    pub fn data(self) -> Kind {
        self & Kind::DATA
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composites() {
        assert!(Kind::NUM.contains(Kind::INT));
        assert!(Kind::LIST.intersects(Kind::IDXR));
        assert!(Kind::DICT.intersects(Kind::KEYR));
        assert!(Kind::OBJ.intersects(Kind::KEYR));
        assert!(!Kind::LIST.intersects(Kind::KEYR));
    }

    #[test]
    fn test_is_prim() {
        assert!(Kind::INT.is_prim());
        assert!((Kind::STR | Kind::NONE).is_prim());
        assert!(!Kind::LIST.is_prim());
        assert!(!Kind::DATA.is_prim());
    }
}
