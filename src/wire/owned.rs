//! An owned mirror of [`crate::wire::builder::Arg`], used wherever a value
//! needs to outlive the borrowed data (or packet) it was computed from --
//! most notably, request handler return values and values cached for
//! signal delivery.

use crate::wire::builder::Arg;
use crate::wire::ty::Type;
use crate::wire::value::{ErrMsg, Selector, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum OwnedValue {
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
    Bytes(Vec<u8>),
    Str(String),
    Uuid(uuid::Uuid),
    Path(String),
    Selector(String, String),
    Error(i16, String),
    Array(Type, Vec<OwnedValue>),
    Tuple(Vec<OwnedValue>),
    Pair(Box<OwnedValue>, Box<OwnedValue>),
}

impl OwnedValue {
    /// Borrows this value as an [`Arg`] ready for
    /// [`crate::wire::builder::MessageBuilder::set_value`].
    pub fn as_arg(&self) -> Arg<'_> {
        match self {
            OwnedValue::Unit => Arg::Unit,
            OwnedValue::Bool(v) => Arg::Bool(*v),
            OwnedValue::Byte(v) => Arg::Byte(*v),
            OwnedValue::Float(v) => Arg::Float(*v),
            OwnedValue::Int16(v) => Arg::Int16(*v),
            OwnedValue::Int32(v) => Arg::Int32(*v),
            OwnedValue::Int64(v) => Arg::Int64(*v),
            OwnedValue::Uint16(v) => Arg::Uint16(*v),
            OwnedValue::Uint32(v) => Arg::Uint32(*v),
            OwnedValue::Uint64(v) => Arg::Uint64(*v),
            OwnedValue::Bytes(b) => Arg::Bytes(b),
            OwnedValue::Str(s) => Arg::Str(s),
            OwnedValue::Uuid(u) => Arg::Uuid(*u),
            OwnedValue::Path(p) => Arg::Path(p),
            OwnedValue::Selector(t, e) => Arg::Selector(Selector { trait_name: t, elem: e }),
            OwnedValue::Error(code, msg) => Arg::Error(*code, msg),
            OwnedValue::Array(t, items) => Arg::Array(*t, items.iter().map(OwnedValue::as_arg).collect()),
            OwnedValue::Tuple(items) => Arg::Tuple(items.iter().map(OwnedValue::as_arg).collect()),
            OwnedValue::Pair(a, b) => Arg::Pair(Box::new(a.as_arg()), Box::new(b.as_arg())),
        }
    }

    pub fn from_value(v: &Value<'_>) -> OwnedValue {
        match v {
            Value::Unit => OwnedValue::Unit,
            Value::Bool(b) => OwnedValue::Bool(*b),
            Value::Byte(b) => OwnedValue::Byte(*b),
            Value::Float(f) => OwnedValue::Float(*f),
            Value::Int16(n) => OwnedValue::Int16(*n),
            Value::Int32(n) => OwnedValue::Int32(*n),
            Value::Int64(n) => OwnedValue::Int64(*n),
            Value::Uint16(n) => OwnedValue::Uint16(*n),
            Value::Uint32(n) => OwnedValue::Uint32(*n),
            Value::Uint64(n) => OwnedValue::Uint64(*n),
            Value::Bytes(b) => OwnedValue::Bytes(b.to_vec()),
            Value::Str(s) => OwnedValue::Str(s.to_string()),
            Value::Uuid(u) => OwnedValue::Uuid(*u),
            Value::Path(p) => OwnedValue::Path(p.to_string()),
            Value::Selector(s) => OwnedValue::Selector(s.trait_name.to_string(), s.elem.to_string()),
            Value::Error(ErrMsg { code, message }) => OwnedValue::Error(*code, message.unwrap_or("").to_string()),
            Value::Array(list) => {
                let elem_type = list.elem_type().unwrap_or(Type::Unit);
                let items = list.clone().filter_map(|v| v.ok()).map(|v| OwnedValue::from_value(&v)).collect();
                OwnedValue::Array(elem_type, items)
            }
            Value::Tuple(list) => {
                OwnedValue::Tuple(list.clone().filter_map(|v| v.ok()).map(|v| OwnedValue::from_value(&v)).collect())
            }
            Value::Pair(p) => {
                let first = p.first().map(|v| OwnedValue::from_value(&v)).unwrap_or(OwnedValue::Unit);
                let second = p.second().map(|v| OwnedValue::from_value(&v)).unwrap_or(OwnedValue::Unit);
                OwnedValue::Pair(Box::new(first), Box::new(second))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::builder::MessageBuilder;
    use crate::wire::packet::Op;

    #[test]
    fn round_trips_through_arg_and_back() {
        let owned = OwnedValue::Array(Type::Str, vec![OwnedValue::Str("a".into()), OwnedValue::Str("b".into())]);

        let mut mb = MessageBuilder::new();
        mb.begin(Op::Set).unwrap();
        mb.set_path("/x").unwrap();
        mb.set_selector(Selector { trait_name: "x.X", elem: "v" }).unwrap();
        mb.set_value(owned.as_arg()).unwrap();
        let packet = mb.build().unwrap();

        let msg = packet.as_message().unwrap();
        let back = OwnedValue::from_value(&msg.value.unwrap());
        assert_eq!(back, owned);
    }
}
