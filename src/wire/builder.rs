//! Message and value builders: the write-side counterpart to
//! [`crate::wire::value`].
//!
//! Mirrors `include/dicey/builders.h` / `src/wirefmt/dtf/message-builder.c`.
//! Every tree is serialized in two passes over the same code path -- first
//! with a [`Writer::new_sizer`] to compute the exact allocation, then with a
//! [`Writer::new_buffer`] of that capacity -- so a single allocation covers
//! the whole packet and emission is linear in the value's encoded size.

use log::trace;

use crate::error::{DiceyError, Result};
use crate::wire::packet::{Op, Packet};
use crate::wire::ty::Type;
use crate::wire::value::Selector;
use crate::wire::view::Writer;

/// An owned value tree under construction. The borrowed variants (`Str`,
/// `Bytes`, `Path`) hold references into caller-owned data, so a builder
/// never copies a string or byte buffer until it is actually serialized.
#[derive(Debug, Clone)]
pub enum Arg<'a> {
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
    Error(i16, &'a str),
    Array(Type, Vec<Arg<'a>>),
    Tuple(Vec<Arg<'a>>),
    Pair(Box<Arg<'a>>, Box<Arg<'a>>),
}

impl<'a> Arg<'a> {
    fn type_tag(&self) -> Type {
        match self {
            Arg::Unit => Type::Unit,
            Arg::Bool(_) => Type::Bool,
            Arg::Byte(_) => Type::Byte,
            Arg::Float(_) => Type::Float,
            Arg::Int16(_) => Type::Int16,
            Arg::Int32(_) => Type::Int32,
            Arg::Int64(_) => Type::Int64,
            Arg::Uint16(_) => Type::Uint16,
            Arg::Uint32(_) => Type::Uint32,
            Arg::Uint64(_) => Type::Uint64,
            Arg::Bytes(_) => Type::Bytes,
            Arg::Str(_) => Type::Str,
            Arg::Uuid(_) => Type::Uuid,
            Arg::Path(_) => Type::Path,
            Arg::Selector(_) => Type::Selector,
            Arg::Error(..) => Type::Error,
            Arg::Array(..) => Type::Array,
            Arg::Tuple(_) => Type::Tuple,
            Arg::Pair(..) => Type::Pair,
        }
    }

    /// Writes this value's own tag byte followed by its body. Containers
    /// recurse into their children's full tagged encoding, matching the
    /// wire layout exactly (array elements are the one exception: they
    /// share one inner tag and are written untagged by
    /// [`Arg::write_array_body`]).
    fn write_tagged(&self, w: &mut Writer) -> Result<()> {
        w.write_u8(self.type_tag().tag())?;
        self.write_body(w)
    }

    fn write_body(&self, w: &mut Writer) -> Result<()> {
        match self {
            Arg::Unit => Ok(()),
            Arg::Bool(v) => w.write_u8(*v as u8),
            Arg::Byte(v) => w.write_u8(*v),
            Arg::Float(v) => w.write_f64_le(*v),
            Arg::Int16(v) => w.write_i16_le(*v),
            Arg::Int32(v) => w.write_i32_le(*v),
            Arg::Int64(v) => w.write_i64_le(*v),
            Arg::Uint16(v) => w.write_u16_le(*v),
            Arg::Uint32(v) => w.write_u32_le(*v),
            Arg::Uint64(v) => w.write_u64_le(*v),
            Arg::Uuid(u) => w.write(u.as_bytes()),
            Arg::Bytes(b) => {
                let len: u32 = b.len().try_into().map_err(|_| DiceyError::Overflow)?;
                w.write_u32_le(len)?;
                w.write(b)
            }
            Arg::Str(s) => w.write_zstring(s),
            Arg::Path(s) => {
                if s.len() > u16::MAX as usize {
                    return Err(DiceyError::PathTooLong);
                }
                w.write_zstring(s)
            }
            Arg::Selector(sel) => {
                w.write_zstring(sel.trait_name)?;
                w.write_zstring(sel.elem)
            }
            Arg::Error(code, msg) => {
                w.write_i16_le(*code)?;
                w.write_zstring(msg)
            }
            Arg::Array(elem_type, items) => {
                if items.len() > u16::MAX as usize {
                    return Err(DiceyError::ArrayTooLong);
                }
                let snap = w.snapshot();
                w.write_u32_le(0)?; // nbytes placeholder
                let body_start = w.len();
                w.write_u16_le(items.len() as u16)?;
                w.write_u8(elem_type.tag())?;
                for item in items {
                    if item.type_tag() != *elem_type {
                        return Err(DiceyError::BuilderTypeMismatch);
                    }
                    item.write_body(w)?;
                }
                let nbytes: u32 = (w.len() - body_start).try_into().map_err(|_| DiceyError::Overflow)?;
                w.patch_u32_at(snap, nbytes);
                Ok(())
            }
            Arg::Tuple(items) => {
                if items.len() > u16::MAX as usize {
                    return Err(DiceyError::TupleTooLong);
                }
                let snap = w.snapshot();
                w.write_u32_le(0)?;
                let body_start = w.len();
                w.write_u16_le(items.len() as u16)?;
                for item in items {
                    item.write_tagged(w)?;
                }
                let nbytes: u32 = (w.len() - body_start).try_into().map_err(|_| DiceyError::Overflow)?;
                w.patch_u32_at(snap, nbytes);
                Ok(())
            }
            Arg::Pair(first, second) => {
                let snap = w.snapshot();
                w.write_u32_le(0)?;
                let body_start = w.len();
                first.write_tagged(w)?;
                second.write_tagged(w)?;
                let nbytes: u32 = (w.len() - body_start).try_into().map_err(|_| DiceyError::Overflow)?;
                w.patch_u32_at(snap, nbytes);
                Ok(())
            }
        }
    }
}

/// Staged assembly of one [`Arg`] tree, mirroring `dicey_value_builder`.
///
/// Scalars are set directly with [`ValueBuilder::set`]. Containers go
/// through `{array,tuple,pair}_start`, repeated [`ValueBuilder::next`] calls
/// to obtain a child builder, and a matching `{array,tuple,pair}_end`.
pub struct ValueBuilder<'a> {
    expected: Option<Type>,
    state: VBState<'a>,
}

enum VBState<'a> {
    Empty,
    Array { elem_type: Type, items: Vec<ValueBuilder<'a>> },
    Tuple { items: Vec<ValueBuilder<'a>> },
    Pair { items: Vec<ValueBuilder<'a>> },
    Done(Arg<'a>),
}

impl<'a> ValueBuilder<'a> {
    fn new() -> Self {
        ValueBuilder { expected: None, state: VBState::Empty }
    }

    fn seeded(elem_type: Type) -> Self {
        ValueBuilder { expected: Some(elem_type), state: VBState::Empty }
    }

    fn check_shape(&self, actual: Type) -> Result<()> {
        match self.expected {
            Some(t) if t != actual => Err(DiceyError::BuilderTypeMismatch),
            _ => Ok(()),
        }
    }

    /// Sets this builder to a plain, non-container value.
    pub fn set(&mut self, arg: Arg<'a>) -> Result<()> {
        if !matches!(self.state, VBState::Empty) {
            return Err(DiceyError::Inval);
        }
        self.check_shape(arg.type_tag())?;
        self.state = VBState::Done(arg);
        Ok(())
    }

    pub fn array_start(&mut self, elem_type: Type) -> Result<()> {
        if !matches!(self.state, VBState::Empty) {
            return Err(DiceyError::Inval);
        }
        self.check_shape(Type::Array)?;
        self.state = VBState::Array { elem_type, items: Vec::new() };
        Ok(())
    }

    pub fn tuple_start(&mut self) -> Result<()> {
        if !matches!(self.state, VBState::Empty) {
            return Err(DiceyError::Inval);
        }
        self.check_shape(Type::Tuple)?;
        self.state = VBState::Tuple { items: Vec::new() };
        Ok(())
    }

    pub fn pair_start(&mut self) -> Result<()> {
        if !matches!(self.state, VBState::Empty) {
            return Err(DiceyError::Inval);
        }
        self.check_shape(Type::Pair)?;
        self.state = VBState::Pair { items: Vec::new() };
        Ok(())
    }

    /// Returns a builder for the next child of an in-progress array, tuple
    /// or pair. Array children are pre-seeded with the array's element
    /// type: setting a mismatched type on one fails with
    /// [`DiceyError::BuilderTypeMismatch`]. A third `next` on a pair fails
    /// with [`DiceyError::Overflow`].
    pub fn next(&mut self) -> Result<&mut ValueBuilder<'a>> {
        match &mut self.state {
            VBState::Array { elem_type, items } => {
                items.push(ValueBuilder::seeded(*elem_type));
                Ok(items.last_mut().unwrap())
            }
            VBState::Tuple { items } => {
                items.push(ValueBuilder::new());
                Ok(items.last_mut().unwrap())
            }
            VBState::Pair { items } => {
                if items.len() >= 2 {
                    return Err(DiceyError::Overflow);
                }
                items.push(ValueBuilder::new());
                Ok(items.last_mut().unwrap())
            }
            _ => Err(DiceyError::Inval),
        }
    }

    pub fn array_end(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, VBState::Empty) {
            VBState::Array { elem_type, items } => {
                let args = items.into_iter().map(ValueBuilder::finish).collect::<Result<Vec<_>>>()?;
                self.state = VBState::Done(Arg::Array(elem_type, args));
                Ok(())
            }
            other => {
                self.state = other;
                Err(DiceyError::Inval)
            }
        }
    }

    pub fn tuple_end(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, VBState::Empty) {
            VBState::Tuple { items } => {
                let args = items.into_iter().map(ValueBuilder::finish).collect::<Result<Vec<_>>>()?;
                self.state = VBState::Done(Arg::Tuple(args));
                Ok(())
            }
            other => {
                self.state = other;
                Err(DiceyError::Inval)
            }
        }
    }

    pub fn pair_end(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, VBState::Empty) {
            VBState::Pair { items } if items.len() == 2 => {
                let mut it = items.into_iter();
                let first = it.next().unwrap().finish()?;
                let second = it.next().unwrap().finish()?;
                self.state = VBState::Done(Arg::Pair(Box::new(first), Box::new(second)));
                Ok(())
            }
            other @ VBState::Pair { .. } => {
                self.state = other;
                Err(DiceyError::Again)
            }
            other => {
                self.state = other;
                Err(DiceyError::Inval)
            }
        }
    }

    /// Consumes this builder, producing its finished value. Fails with
    /// [`DiceyError::Again`] if the builder was never completed (no `set`
    /// and no matching `*_end`).
    fn finish(self) -> Result<Arg<'a>> {
        match self.state {
            VBState::Done(arg) => Ok(arg),
            _ => Err(DiceyError::Again),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderState {
    Idle,
    Assembling,
    BuildingValue,
    Ready,
}

/// Staged assembly of one `MESSAGE` packet, mirroring
/// `dicey_message_builder`.
///
/// `begin` -> `set_path`/`set_selector` (any order) -> optionally
/// `value_start`/.../`value_end` -> `build`. `discard` resets to `Idle` from
/// any state.
pub struct MessageBuilder<'a> {
    state: BuilderState,
    seq: u32,
    op: Option<Op>,
    path: Option<&'a str>,
    selector: Option<Selector<'a>>,
    value: Option<Arg<'a>>,
    in_progress_value: Option<ValueBuilder<'a>>,
}

impl<'a> MessageBuilder<'a> {
    pub fn new() -> Self {
        MessageBuilder {
            state: BuilderState::Idle,
            seq: 0,
            op: None,
            path: None,
            selector: None,
            value: None,
            in_progress_value: None,
        }
    }

    pub fn set_seq(&mut self, seq: u32) {
        self.seq = seq;
    }

    pub fn begin(&mut self, op: Op) -> Result<()> {
        if self.state != BuilderState::Idle {
            return Err(DiceyError::Already);
        }
        self.op = Some(op);
        self.path = None;
        self.selector = None;
        self.value = None;
        self.state = BuilderState::Assembling;
        Ok(())
    }

    pub fn set_path(&mut self, path: &'a str) -> Result<()> {
        if self.state != BuilderState::Assembling {
            return Err(DiceyError::Inval);
        }
        if path.len() > u16::MAX as usize {
            return Err(DiceyError::PathTooLong);
        }
        self.path = Some(path);
        Ok(())
    }

    pub fn set_selector(&mut self, selector: Selector<'a>) -> Result<()> {
        if self.state != BuilderState::Assembling {
            return Err(DiceyError::Inval);
        }
        self.selector = Some(selector);
        Ok(())
    }

    /// Begins building the message's value as a container; pairs with
    /// `value_end` below.
    pub fn value_start(&mut self) -> Result<&mut ValueBuilder<'a>> {
        if self.state != BuilderState::Assembling {
            return Err(DiceyError::Inval);
        }
        self.in_progress_value = Some(ValueBuilder::new());
        self.state = BuilderState::BuildingValue;
        Ok(self.in_progress_value.as_mut().unwrap())
    }

    pub fn value_end(&mut self) -> Result<()> {
        if self.state != BuilderState::BuildingValue {
            return Err(DiceyError::Inval);
        }
        let vb = self.in_progress_value.take().ok_or(DiceyError::Inval)?;
        self.value = Some(vb.finish()?);
        self.state = BuilderState::Ready;
        Ok(())
    }

    /// Shortcut for `value_start` + `set` + `value_end`, for scalar values.
    pub fn set_value(&mut self, arg: Arg<'a>) -> Result<()> {
        if self.state != BuilderState::Assembling {
            return Err(DiceyError::Inval);
        }
        self.value = Some(arg);
        self.state = BuilderState::Ready;
        Ok(())
    }

    /// Resets the builder to `Idle` from any state, discarding whatever was
    /// in progress.
    pub fn discard(&mut self) {
        self.op = None;
        self.path = None;
        self.selector = None;
        self.value = None;
        self.in_progress_value = None;
        self.state = BuilderState::Idle;
    }

    /// Serializes the assembled message into a [`Packet`]. A `GET` with no
    /// value produces a valueless message; any other op without a value
    /// fails with [`DiceyError::Inval`].
    pub fn build(&mut self) -> Result<Packet> {
        if self.state != BuilderState::Assembling && self.state != BuilderState::Ready {
            return Err(DiceyError::Inval);
        }
        let op = self.op.ok_or(DiceyError::Inval)?;
        let path = self.path.ok_or(DiceyError::Inval)?;
        let selector = self.selector.ok_or(DiceyError::Inval)?;

        if op.requires_payload() && self.value.is_none() {
            return Err(DiceyError::Inval);
        }
        if !op.requires_payload() && self.value.is_some() {
            return Err(DiceyError::Inval);
        }

        let body = encode_body(op, path, selector, self.value.as_ref())?;
        let packet = Packet::message_from_body(self.seq, &body)?;
        trace!("built {op:?} {path} ({} byte body)", body.len());
        self.discard();
        Ok(packet)
    }
}

impl<'a> Default for MessageBuilder<'a> {
    fn default() -> Self {
        MessageBuilder::new()
    }
}

fn op_tag(op: Op) -> u8 {
    match op {
        Op::Get => b'<',
        Op::Set => b'>',
        Op::Exec => b'?',
        Op::Signal => b'!',
        Op::Response => b':',
    }
}

/// Runs the sizer-then-buffer pass described in the module doc comment.
fn encode_body(op: Op, path: &str, selector: Selector<'_>, value: Option<&Arg<'_>>) -> Result<Vec<u8>> {
    let write_all = |w: &mut Writer| -> Result<()> {
        w.write_u8(op_tag(op))?;
        w.write_zstring(path)?;
        w.write_zstring(selector.trait_name)?;
        w.write_zstring(selector.elem)?;
        if let Some(v) = value {
            v.write_tagged(w)?;
        }
        Ok(())
    };

    let mut sizer = Writer::new_sizer();
    write_all(&mut sizer)?;

    let mut buf = Writer::with_capacity(sizer.len());
    write_all(&mut buf)?;
    Ok(buf.into_buffer())
}
