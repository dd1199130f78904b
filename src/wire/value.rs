//! The value façade: typed accessors over a probed [`Value`], plus the
//! forward-only list/pair views used for arrays, tuples and pairs.
//!
//! Mirrors `include/dicey/core/value.h` / `src/wirefmt/dtf/value.c`.
//! Probing a packet's payload never walks into nested containers -- each
//! [`Value::probe`] call reads only the tag (and, for containers, the
//! `nbytes`/`nitems`/inner-type header) of the value it is given, leaving
//! the rest as an unparsed byte range. Callers descend explicitly through
//! [`List`] iteration or [`PairValue::first`]/[`second`], so a packet with a
//! value nobody reads never pays for decoding it.

use crate::error::{DiceyError, Result};
use crate::wire::ty::Type;
use crate::wire::typedescr::TypeDesc;
use crate::wire::view::ByteReader;

/// Borrowed `(trait, element)` address, matching `dicey_selector`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selector<'a> {
    pub trait_name: &'a str,
    pub elem: &'a str,
}

/// An error value carried inline in a packet (distinct from [`DiceyError`],
/// which is this crate's own Rust-side error type). An empty wire message
/// is surfaced as `None`, matching the reference library's convention that
/// a `DICEY_EK_ERROR` value with no text means "no message available".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrMsg<'a> {
    pub code: i16,
    pub message: Option<&'a str>,
}

/// A lazily-decoded array or tuple. Arrays share one inner type tag across
/// all elements and store each element's body with no per-element tag;
/// tuples store each element as a fully self-tagged [`Value`].
#[derive(Debug, Clone)]
pub struct List<'a> {
    mode: ListMode,
    reader: ByteReader<'a>,
    nitems: u16,
    consumed: u16,
}

#[derive(Debug, Clone, Copy)]
enum ListMode {
    Array(Type),
    Tuple,
}

impl<'a> List<'a> {
    pub fn len(&self) -> usize {
        self.nitems as usize
    }

    pub fn is_empty(&self) -> bool {
        self.nitems == 0
    }

    /// The shared element type, for arrays; `None` for (heterogeneous)
    /// tuples.
    pub fn elem_type(&self) -> Option<Type> {
        match self.mode {
            ListMode::Array(t) => Some(t),
            ListMode::Tuple => None,
        }
    }
}

impl<'a> Iterator for List<'a> {
    type Item = Result<Value<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.consumed >= self.nitems {
            return None;
        }
        let item = match self.mode {
            ListMode::Array(t) => read_body(t, &mut self.reader),
            ListMode::Tuple => read_tagged(&mut self.reader),
        };
        self.consumed += 1;
        Some(item)
    }
}

/// A pair's two values, decoded on demand.
#[derive(Debug, Clone, Copy)]
pub struct PairValue<'a> {
    body: &'a [u8],
}

impl<'a> PairValue<'a> {
    pub fn first(&self) -> Result<Value<'a>> {
        let mut r = ByteReader::new(self.body);
        read_tagged(&mut r)
    }

    pub fn second(&self) -> Result<Value<'a>> {
        let mut r = ByteReader::new(self.body);
        skip_tagged(&mut r)?;
        read_tagged(&mut r)
    }
}

/// A probed packet value. Scalars are decoded eagerly (decoding them costs
/// nothing extra); containers hold their element bytes unexpanded until the
/// caller iterates or projects into them.
#[derive(Debug, Clone)]
pub enum Value<'a> {
    Unit,
    Bool(bool),
    Byte(u8),
    Float(f64),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Bytes(&'a [u8]),
    Str(&'a str),
    Uuid(uuid::Uuid),
    Path(&'a str),
    Selector(Selector<'a>),
    Error(ErrMsg<'a>),
    Array(List<'a>),
    Tuple(List<'a>),
    Pair(PairValue<'a>),
}

impl<'a> Value<'a> {
    /// Probes a full, self-tagged value out of `bytes` (tag byte plus
    /// body). Used to decode a message's top-level value.
    pub fn probe(bytes: &'a [u8]) -> Result<Value<'a>> {
        let mut r = ByteReader::new(bytes);
        read_tagged(&mut r)
    }

    pub fn type_tag(&self) -> Type {
        match self {
            Value::Unit => Type::Unit,
            Value::Bool(_) => Type::Bool,
            Value::Byte(_) => Type::Byte,
            Value::Float(_) => Type::Float,
            Value::Int16(_) => Type::Int16,
            Value::Int32(_) => Type::Int32,
            Value::Int64(_) => Type::Int64,
            Value::Uint16(_) => Type::Uint16,
            Value::Uint32(_) => Type::Uint32,
            Value::Uint64(_) => Type::Uint64,
            Value::Bytes(_) => Type::Bytes,
            Value::Str(_) => Type::Str,
            Value::Uuid(_) => Type::Uuid,
            Value::Path(_) => Type::Path,
            Value::Selector(_) => Type::Selector,
            Value::Error(_) => Type::Error,
            Value::Array(_) => Type::Array,
            Value::Tuple(_) => Type::Tuple,
            Value::Pair(_) => Type::Pair,
        }
    }

    pub fn get_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(v) => Ok(*v),
            _ => Err(DiceyError::ValueTypeMismatch),
        }
    }

    pub fn get_byte(&self) -> Result<u8> {
        match self {
            Value::Byte(v) => Ok(*v),
            _ => Err(DiceyError::ValueTypeMismatch),
        }
    }

    pub fn get_float(&self) -> Result<f64> {
        match self {
            Value::Float(v) => Ok(*v),
            _ => Err(DiceyError::ValueTypeMismatch),
        }
    }

    pub fn get_i16(&self) -> Result<i16> {
        match self {
            Value::Int16(v) => Ok(*v),
            _ => Err(DiceyError::ValueTypeMismatch),
        }
    }

    pub fn get_i32(&self) -> Result<i32> {
        match self {
            Value::Int32(v) => Ok(*v),
            _ => Err(DiceyError::ValueTypeMismatch),
        }
    }

    pub fn get_i64(&self) -> Result<i64> {
        match self {
            Value::Int64(v) => Ok(*v),
            _ => Err(DiceyError::ValueTypeMismatch),
        }
    }

    pub fn get_u16(&self) -> Result<u16> {
        match self {
            Value::Uint16(v) => Ok(*v),
            _ => Err(DiceyError::ValueTypeMismatch),
        }
    }

    pub fn get_u32(&self) -> Result<u32> {
        match self {
            Value::Uint32(v) => Ok(*v),
            _ => Err(DiceyError::ValueTypeMismatch),
        }
    }

    pub fn get_u64(&self) -> Result<u64> {
        match self {
            Value::Uint64(v) => Ok(*v),
            _ => Err(DiceyError::ValueTypeMismatch),
        }
    }

    pub fn get_str(&self) -> Result<&'a str> {
        match self {
            Value::Str(s) => Ok(s),
            _ => Err(DiceyError::ValueTypeMismatch),
        }
    }

    pub fn get_path(&self) -> Result<&'a str> {
        match self {
            Value::Path(s) => Ok(s),
            _ => Err(DiceyError::ValueTypeMismatch),
        }
    }

    pub fn get_bytes(&self) -> Result<&'a [u8]> {
        match self {
            Value::Bytes(b) => Ok(b),
            _ => Err(DiceyError::ValueTypeMismatch),
        }
    }

    pub fn get_uuid(&self) -> Result<uuid::Uuid> {
        match self {
            Value::Uuid(u) => Ok(*u),
            _ => Err(DiceyError::ValueTypeMismatch),
        }
    }

    pub fn get_selector(&self) -> Result<Selector<'a>> {
        match self {
            Value::Selector(s) => Ok(*s),
            _ => Err(DiceyError::ValueTypeMismatch),
        }
    }

    pub fn get_error(&self) -> Result<ErrMsg<'a>> {
        match self {
            Value::Error(e) => Ok(*e),
            _ => Err(DiceyError::ValueTypeMismatch),
        }
    }

    pub fn get_array(&self) -> Result<List<'a>> {
        match self {
            Value::Array(l) => Ok(l.clone()),
            _ => Err(DiceyError::ValueTypeMismatch),
        }
    }

    pub fn get_tuple(&self) -> Result<List<'a>> {
        match self {
            Value::Tuple(l) => Ok(l.clone()),
            _ => Err(DiceyError::ValueTypeMismatch),
        }
    }

    pub fn get_pair(&self) -> Result<PairValue<'a>> {
        match self {
            Value::Pair(p) => Ok(*p),
            _ => Err(DiceyError::ValueTypeMismatch),
        }
    }

    /// Structural match against a parsed type descriptor, used to validate
    /// that a property write or an operation's argument matches its
    /// registered signature. `v` (the variant wildcard) matches anything.
    pub fn is_compatible_with(&self, desc: &TypeDesc) -> bool {
        match desc {
            TypeDesc::Variant => true,
            TypeDesc::Scalar(t) => self.type_tag() == *t,
            TypeDesc::Array(inner) => match self {
                Value::Array(list) => list.clone().all(|item| match item {
                    Ok(v) => v.is_compatible_with(inner),
                    Err(_) => false,
                }),
                _ => false,
            },
            TypeDesc::Pair(a, b) => match self {
                Value::Pair(p) => {
                    let (Ok(first), Ok(second)) = (p.first(), p.second()) else {
                        return false;
                    };
                    first.is_compatible_with(a) && second.is_compatible_with(b)
                }
                _ => false,
            },
            TypeDesc::Tuple(elems) => match self {
                Value::Tuple(list) => {
                    if list.len() != elems.len() {
                        return false;
                    }
                    list.clone().zip(elems.iter()).all(|(item, want)| match item {
                        Ok(v) => v.is_compatible_with(want),
                        Err(_) => false,
                    })
                }
                _ => false,
            },
        }
    }
}

fn read_tagged<'a>(r: &mut ByteReader<'a>) -> Result<Value<'a>> {
    let tag = Type::from_tag(r.read_u8()?).ok_or(DiceyError::BadMsg)?;
    read_body(tag, r)
}

fn read_body<'a>(tag: Type, r: &mut ByteReader<'a>) -> Result<Value<'a>> {
    Ok(match tag {
        Type::Unit => Value::Unit,
        Type::Bool => Value::Bool(r.read_u8()? != 0),
        Type::Byte => Value::Byte(r.read_u8()?),
        Type::Float => Value::Float(r.read_f64_le()?),
        Type::Int16 => Value::Int16(r.read_i16_le()?),
        Type::Int32 => Value::Int32(r.read_i32_le()?),
        Type::Int64 => Value::Int64(r.read_i64_le()?),
        Type::Uint16 => Value::Uint16(r.read_u16_le()?),
        Type::Uint32 => Value::Uint32(r.read_u32_le()?),
        Type::Uint64 => Value::Uint64(r.read_u64_le()?),
        Type::Uuid => Value::Uuid(uuid::Uuid::from_bytes(r.read_array::<16>()?)),
        Type::Bytes => {
            let len = r.read_u32_le()?;
            Value::Bytes(r.advance(len as usize)?)
        }
        Type::Str => Value::Str(r.read_zstring()?),
        Type::Path => Value::Path(r.read_zstring()?),
        Type::Selector => {
            let trait_name = r.read_zstring()?;
            let elem = r.read_zstring()?;
            Value::Selector(Selector { trait_name, elem })
        }
        Type::Error => {
            let code = r.read_i16_le()?;
            let msg = r.read_zstring()?;
            Value::Error(ErrMsg { code, message: if msg.is_empty() { None } else { Some(msg) } })
        }
        Type::Array => {
            let nbytes = r.read_u32_le()?;
            let nitems = r.read_u16_le()?;
            let elem_tag = Type::from_tag(r.read_u8()?).ok_or(DiceyError::BadMsg)?;
            // nbytes covers nitems + inner-tag + elements, per wire layout.
            let elements_len = (nbytes as usize)
                .checked_sub(2 + 1)
                .ok_or(DiceyError::BadMsg)?;
            let body = r.advance(elements_len)?;
            Value::Array(List {
                mode: ListMode::Array(elem_tag),
                reader: ByteReader::new(body),
                nitems,
                consumed: 0,
            })
        }
        Type::Tuple => {
            let nbytes = r.read_u32_le()?;
            let nitems = r.read_u16_le()?;
            let elements_len = (nbytes as usize).checked_sub(2).ok_or(DiceyError::BadMsg)?;
            let body = r.advance(elements_len)?;
            Value::Tuple(List { mode: ListMode::Tuple, reader: ByteReader::new(body), nitems, consumed: 0 })
        }
        Type::Pair => {
            let nbytes = r.read_u32_le()?;
            let body = r.advance(nbytes as usize)?;
            Value::Pair(PairValue { body })
        }
    })
}

/// Skips exactly one self-tagged value without materializing it, used to
/// find the start of a pair's second element.
fn skip_tagged(r: &mut ByteReader<'_>) -> Result<()> {
    let tag = Type::from_tag(r.read_u8()?).ok_or(DiceyError::BadMsg)?;
    if let Some(width) = tag.fixed_width() {
        r.advance(width)?;
        return Ok(());
    }
    match tag {
        Type::Str | Type::Path => {
            r.read_zstring()?;
        }
        Type::Bytes => {
            let len = r.read_u32_le()?;
            r.advance(len as usize)?;
        }
        Type::Selector => {
            r.read_zstring()?;
            r.read_zstring()?;
        }
        Type::Error => {
            r.read_i16_le()?;
            r.read_zstring()?;
        }
        Type::Array => {
            let nbytes = r.read_u32_le()?;
            r.advance(nbytes as usize)?;
        }
        Type::Tuple => {
            let nbytes = r.read_u32_le()?;
            r.advance(nbytes as usize)?;
        }
        Type::Pair => {
            let nbytes = r.read_u32_le()?;
            r.advance(nbytes as usize)?;
        }
        _ => unreachable!("fixed_width covers every other tag"),
    }
    Ok(())
}
