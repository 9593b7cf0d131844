//! Field codecs between PostgreSQL wire formats and the value model.
//!
//! Every supported OID has a text and a binary codec. Null handling
//! happens outside the codecs: a null field body never reaches a
//! decoder, and a null value encodes to the null body.

pub mod array;
pub mod decode;
pub mod encode;

pub use array::{ArrayDim, ArrayHeader};
pub use decode::{field_decoder, Decoder};
pub use encode::{encode, field_encoder, Encoder};

/// A field format code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Text,
    Binary,
}

impl Format {
    pub fn from_code(code: i16) -> Format {
        if code == 1 {
            Format::Binary
        } else {
            Format::Text
        }
    }

    pub fn code(self) -> i16 {
        match self {
            Format::Text => 0,
            Format::Binary => 1,
        }
    }
}
