//! The closed enum of value kinds and their fixed widths.
//!
//! Mirrors `include/dicey/core/type.h`: tag bytes are ASCII punctuation
//! chosen so that a hex dump of a packet is somewhat legible. `Uuid` is left
//! impl-defined by spec §3 ("UUID (impl-defined)") -- this crate assigns it
//! the tag `#`, the one printable ASCII punctuation character the original
//! format does not already use.

use num_enum::TryFromPrimitive;

/// The wildcard tag used only in signature strings (never on the wire as an
/// actual value), matching `DICEY_VARIANT_ID`.
pub const VARIANT_TAG: u8 = b'v';

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum Type {
    Unit = b'$',

    Bool = b'b',
    Byte = b'c',

    Float = b'f',

    Int16 = b'n',
    Int32 = b'i',
    Int64 = b'x',

    Uint16 = b'q',
    Uint32 = b'u',
    Uint64 = b't',

    Array = b'[',
    Tuple = b'(',
    Pair = b'{',

    Bytes = b'y',
    Str = b's',

    Uuid = b'#',

    Path = b'@',
    Selector = b'%',

    Error = b'e',
}

impl Type {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Type> {
        Type::try_from_primitive(tag).ok()
    }

    /// True iff this type recursively contains other values (array, tuple,
    /// pair). Matches `dicey_type_is_container`.
    pub fn is_container(self) -> bool {
        matches!(self, Type::Array | Type::Tuple | Type::Pair)
    }

    /// The fixed on-wire width of this type's body, or `None` if the type is
    /// dynamically sized (strings, bytes, containers, selector, error).
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            Type::Unit => Some(0),
            Type::Bool | Type::Byte => Some(1),
            Type::Int16 | Type::Uint16 => Some(2),
            Type::Int32 | Type::Uint32 => Some(4),
            Type::Int64 | Type::Uint64 | Type::Float => Some(8),
            Type::Uuid => Some(16),
            Type::Array
            | Type::Tuple
            | Type::Pair
            | Type::Bytes
            | Type::Str
            | Type::Path
            | Type::Selector
            | Type::Error => None,
        }
    }

    /// Human-readable name, matching `dicey_type_name`.
    pub fn name(self) -> &'static str {
        match self {
            Type::Unit => "unit",
            Type::Bool => "bool",
            Type::Byte => "byte",
            Type::Float => "float",
            Type::Int16 => "int16",
            Type::Int32 => "int32",
            Type::Int64 => "int64",
            Type::Uint16 => "uint16",
            Type::Uint32 => "uint32",
            Type::Uint64 => "uint64",
            Type::Array => "array",
            Type::Tuple => "tuple",
            Type::Pair => "pair",
            Type::Bytes => "bytes",
            Type::Str => "str",
            Type::Uuid => "uuid",
            Type::Path => "path",
            Type::Selector => "selector",
            Type::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_tag() {
        let all = [
            Type::Unit,
            Type::Bool,
            Type::Byte,
            Type::Float,
            Type::Int16,
            Type::Int32,
            Type::Int64,
            Type::Uint16,
            Type::Uint32,
            Type::Uint64,
            Type::Array,
            Type::Tuple,
            Type::Pair,
            Type::Bytes,
            Type::Str,
            Type::Uuid,
            Type::Path,
            Type::Selector,
            Type::Error,
        ];
        for t in all {
            assert_eq!(Type::from_tag(t.tag()), Some(t));
        }
    }

    #[test]
    fn containers_are_exactly_array_tuple_pair() {
        assert!(Type::Array.is_container());
        assert!(Type::Tuple.is_container());
        assert!(Type::Pair.is_container());
        assert!(!Type::Str.is_container());
        assert!(!Type::Unit.is_container());
    }

    #[test]
    fn unknown_tag_does_not_parse() {
        assert_eq!(Type::from_tag(b'?'), None);
        assert_eq!(Type::from_tag(VARIANT_TAG), None);
    }
}
