//! PostgreSQL type OID constants and the abstract type mapping.
//!
//! Reference: https://github.com/postgres/postgres/blob/master/src/include/catalog/pg_type.dat

use veld_core::{Kind, Type};

use crate::error::{PgError, PgResult};

/// PostgreSQL type OIDs for the supported set.
pub mod oid {
    pub const BOOL: u32 = 16;
    pub const BYTEA: u32 = 17;
    pub const INT8: u32 = 20;
    pub const INT2: u32 = 21;
    pub const INT4: u32 = 23;
    pub const TEXT: u32 = 25;
    pub const JSON: u32 = 114;
    pub const FLOAT4: u32 = 700;
    pub const FLOAT8: u32 = 701;
    pub const VARCHAR: u32 = 1043;
    pub const DATE: u32 = 1082;
    pub const TIME: u32 = 1083;
    pub const TIMESTAMP: u32 = 1114;
    pub const TIMESTAMPTZ: u32 = 1184;
    pub const INTERVAL: u32 = 1186;
    pub const UUID: u32 = 2950;
    pub const JSONB: u32 = 3802;

    pub const BOOL_ARRAY: u32 = 1000;
    pub const BYTEA_ARRAY: u32 = 1001;
    pub const INT2_ARRAY: u32 = 1005;
    pub const INT4_ARRAY: u32 = 1007;
    pub const INT8_ARRAY: u32 = 1016;
    pub const TEXT_ARRAY: u32 = 1009;
    pub const VARCHAR_ARRAY: u32 = 1015;
    pub const FLOAT4_ARRAY: u32 = 1021;
    pub const FLOAT8_ARRAY: u32 = 1022;
    pub const DATE_ARRAY: u32 = 1182;
    pub const TIME_ARRAY: u32 = 1183;
    pub const TIMESTAMP_ARRAY: u32 = 1115;
    pub const TIMESTAMPTZ_ARRAY: u32 = 1185;
    pub const INTERVAL_ARRAY: u32 = 1187;
    pub const UUID_ARRAY: u32 = 2951;
    pub const JSON_ARRAY: u32 = 199;
    pub const JSONB_ARRAY: u32 = 3807;

    /// The highest well-known oid; anything above is assumed to be an
    /// enum or extension domain.
    pub const MAX_KNOWN: u32 = 3926; // int8range
}

/// The element OID of an array OID, if it is one of the supported arrays.
pub fn elem_oid(array_oid: u32) -> Option<u32> {
    Some(match array_oid {
        oid::BOOL_ARRAY => oid::BOOL,
        oid::BYTEA_ARRAY => oid::BYTEA,
        oid::INT2_ARRAY => oid::INT2,
        oid::INT4_ARRAY => oid::INT4,
        oid::INT8_ARRAY => oid::INT8,
        oid::TEXT_ARRAY | oid::VARCHAR_ARRAY => oid::TEXT,
        oid::FLOAT4_ARRAY => oid::FLOAT4,
        oid::FLOAT8_ARRAY => oid::FLOAT8,
        oid::DATE_ARRAY => oid::DATE,
        oid::TIME_ARRAY => oid::TIME,
        oid::TIMESTAMP_ARRAY => oid::TIMESTAMP,
        oid::TIMESTAMPTZ_ARRAY => oid::TIMESTAMPTZ,
        oid::INTERVAL_ARRAY => oid::INTERVAL,
        oid::UUID_ARRAY => oid::UUID,
        oid::JSON_ARRAY => oid::JSON,
        oid::JSONB_ARRAY => oid::JSONB,
        _ => return None,
    })
}

/// Map an OID to a human-readable type name.
pub fn oid_name(o: u32) -> &'static str {
    match o {
        oid::BOOL => "bool",
        oid::BYTEA => "bytea",
        oid::INT2 => "int2",
        oid::INT4 => "int4",
        oid::INT8 => "int8",
        oid::TEXT => "text",
        oid::VARCHAR => "varchar",
        oid::JSON => "json",
        oid::JSONB => "jsonb",
        oid::FLOAT4 => "float4",
        oid::FLOAT8 => "float8",
        oid::DATE => "date",
        oid::TIME => "time",
        oid::TIMESTAMP => "timestamp",
        oid::TIMESTAMPTZ => "timestamptz",
        oid::INTERVAL => "interval",
        oid::UUID => "uuid",
        _ => "unknown",
    }
}

/// Maps an abstract type to its PostgreSQL type name.
///
/// One-dimensional lists of primitive element types map to arrays; any
/// keyed or dynamic type maps to jsonb.
pub fn type_name(t: &Type) -> PgResult<String> {
    let k = t.kind.data();
    let res = if k == Kind::BOOL {
        "bool"
    } else if k == Kind::ENUM {
        return Ok(t.name.to_lowercase());
    } else if k == Kind::INT || k == Kind::BITS || k == Kind::INT | Kind::BITS {
        "int8"
    } else if k == Kind::REAL || k == Kind::NUM {
        "float8"
    } else if k == Kind::STR || k == Kind::CHAR {
        "text"
    } else if k == Kind::RAW {
        "bytea"
    } else if k == Kind::UUID {
        "uuid"
    } else if k == Kind::TIME {
        "timestamptz"
    } else if k == Kind::SPAN {
        "interval"
    } else if k == Kind::DATA || k.intersects(Kind::KEYR) {
        "jsonb"
    } else if k.intersects(Kind::IDXR) {
        let el = t.cont_el();
        if el.kind.is_prim() {
            return Ok(format!("{}[]", type_name(&el)?));
        }
        "jsonb"
    } else {
        return Err(PgError::unexpected(format!("unexpected type {t:?}")));
    };
    Ok(res.to_string())
}
