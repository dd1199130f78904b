//! Type descriptor grammar: the signature strings used to describe a
//! property's value type or an operation's `input -> output` contract.
//!
//! Mirrors `include/dicey/core/typedescr.h` / `src/wirefmt/typedescr.c`.
//! The parser is total: every input string is either accepted and
//! classified as [`Signature::Value`] or [`Signature::Functional`], or
//! rejected with [`DiceyError::Inval`] -- it never panics and never
//! recurses unboundedly on malformed input (recursion depth is bounded by
//! the input length).

use crate::error::{DiceyError, Result};
use crate::wire::ty::{Type, VARIANT_TAG};

/// A parsed type descriptor: either a scalar tag (including the `v`
/// wildcard), or one of the three container shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDesc {
    /// Any concrete, non-container scalar type.
    Scalar(Type),
    /// The `v` wildcard: matches any single value.
    Variant,
    Array(Box<TypeDesc>),
    Pair(Box<TypeDesc>, Box<TypeDesc>),
    Tuple(Vec<TypeDesc>),
}

/// A full signature: either a plain value descriptor (for properties and
/// signals) or a functional `input -> output` descriptor (for operations).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signature {
    Value(TypeDesc),
    Functional { input: TypeDesc, output: TypeDesc },
}

impl Signature {
    pub fn parse(s: &str) -> Result<Signature> {
        let mut p = Parser { bytes: s.as_bytes(), pos: 0 };
        let first = p.parse_type()?;
        p.skip_ws();
        if p.eat_str("->") {
            p.skip_ws();
            let second = p.parse_type()?;
            p.skip_ws();
            if !p.is_at_end() {
                return Err(DiceyError::Inval);
            }
            Ok(Signature::Functional { input: first, output: second })
        } else {
            if !p.is_at_end() {
                return Err(DiceyError::Inval);
            }
            Ok(Signature::Value(first))
        }
    }

    pub fn is_valid(s: &str) -> bool {
        Signature::parse(s).is_ok()
    }

    pub fn as_value(&self) -> Option<&TypeDesc> {
        match self {
            Signature::Value(t) => Some(t),
            Signature::Functional { .. } => None,
        }
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

/// A conservative bound on nesting depth, enough for any signature produced
/// by a reasonable builder, and small enough that a pathological input of
/// thousands of nested `[` cannot blow the call stack.
const MAX_DEPTH: usize = 64;

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        if self.bytes[self.pos..].starts_with(s.as_bytes()) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn parse_type(&mut self) -> Result<TypeDesc> {
        self.parse_type_depth(0)
    }

    fn parse_type_depth(&mut self, depth: usize) -> Result<TypeDesc> {
        if depth > MAX_DEPTH {
            return Err(DiceyError::Inval);
        }
        let tag = self.peek().ok_or(DiceyError::Inval)?;
        match tag {
            b'[' => {
                self.bump();
                let inner = self.parse_type_depth(depth + 1)?;
                if self.bump() != Some(b']') {
                    return Err(DiceyError::Inval);
                }
                Ok(TypeDesc::Array(Box::new(inner)))
            }
            b'{' => {
                self.bump();
                let a = self.parse_type_depth(depth + 1)?;
                let b = self.parse_type_depth(depth + 1)?;
                if self.bump() != Some(b'}') {
                    return Err(DiceyError::Inval);
                }
                Ok(TypeDesc::Pair(Box::new(a), Box::new(b)))
            }
            b'(' => {
                self.bump();
                let mut elems = Vec::new();
                while self.peek() != Some(b')') {
                    if self.is_at_end() {
                        return Err(DiceyError::Inval);
                    }
                    elems.push(self.parse_type_depth(depth + 1)?);
                }
                self.bump(); // consume ')'
                Ok(TypeDesc::Tuple(elems))
            }
            VARIANT_TAG => {
                self.bump();
                Ok(TypeDesc::Variant)
            }
            _ => {
                let ty = Type::from_tag(tag).ok_or(DiceyError::Inval)?;
                if ty.is_container() {
                    // container tags must be followed by their bracket syntax above
                    return Err(DiceyError::Inval);
                }
                self.bump();
                Ok(TypeDesc::Scalar(ty))
            }
        }
    }
}
