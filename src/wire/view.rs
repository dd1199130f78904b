//! Zero-copy read cursor over a borrowed byte slice, plus the dual-mode
//! writer used by the builders to size and then emit wire bytes.
//!
//! Mirrors `views.h` / `dtf/writer.h` in the reference C library: a read
//! view never owns its bytes, and all length arithmetic is checked so that a
//! malformed or adversarial packet can only ever produce `DiceyError`, never
//! a panic or an out-of-bounds read.

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use crate::error::{DiceyError, Result};

/// A read-only cursor over a borrowed byte slice.
///
/// All advances are checked: reading past the end of `data` yields
/// [`DiceyError::Again`] (the caller does not yet have enough bytes), never
/// a panic.
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a> {
    data: &'a [u8],
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        ByteReader { data }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    /// Returns the remaining bytes without consuming them.
    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    /// Advances the cursor by `n` bytes, returning the skipped-over slice.
    pub fn advance(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.data.len() {
            return Err(DiceyError::Again);
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    /// Reads exactly `N` bytes into a fixed-size array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.advance(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Takes a sub-view of exactly `n` bytes without interpreting it.
    pub fn take_subview(&mut self, n: usize) -> Result<ByteReader<'a>> {
        Ok(ByteReader::new(self.advance(n)?))
    }

    /// Reads a NUL-terminated string, returning the borrowed `&str` (without
    /// the terminator) and having consumed the string plus its terminator.
    pub fn read_zstring(&mut self) -> Result<&'a str> {
        let end = self
            .data
            .iter()
            .position(|&b| b == 0)
            .ok_or(DiceyError::Again)?;
        let (s, rest) = self.data.split_at(end);
        // skip the NUL terminator
        self.data = rest.get(1..).ok_or(DiceyError::Again)?;
        std::str::from_utf8(s).map_err(|_| DiceyError::BadMsg)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut cursor = self.advance(1)?;
        Ok(cursor.read_u8()?)
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        let mut cursor = self.advance(2)?;
        Ok(cursor.read_u16::<LE>()?)
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        let mut cursor = self.advance(4)?;
        Ok(cursor.read_u32::<LE>()?)
    }

    pub fn read_u64_le(&mut self) -> Result<u64> {
        let mut cursor = self.advance(8)?;
        Ok(cursor.read_u64::<LE>()?)
    }

    pub fn read_i16_le(&mut self) -> Result<i16> {
        let mut cursor = self.advance(2)?;
        Ok(cursor.read_i16::<LE>()?)
    }

    pub fn read_i32_le(&mut self) -> Result<i32> {
        let mut cursor = self.advance(4)?;
        Ok(cursor.read_i32::<LE>()?)
    }

    pub fn read_i64_le(&mut self) -> Result<i64> {
        let mut cursor = self.advance(8)?;
        Ok(cursor.read_i64::<LE>()?)
    }

    pub fn read_f64_le(&mut self) -> Result<f64> {
        let mut cursor = self.advance(8)?;
        Ok(cursor.read_f64::<LE>()?)
    }
}

/// Checked addition used for every length computation in the wire codec.
/// Returns [`DiceyError::Overflow`] on wraparound, matching spec §4.1.
pub fn checked_add(a: usize, b: usize) -> Result<usize> {
    a.checked_add(b).ok_or(DiceyError::Overflow)
}

/// An opaque marker into a [`Writer`]'s buffer mode output, produced by
/// [`Writer::snapshot`] and consumed by [`Writer::patch_u32_at`]. Lets a
/// caller write a placeholder length prefix, write the body, and then
/// backpatch the prefix once the body's length is known -- without a second
/// pass over the tree.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot(usize);

/// A writer that either actually copies bytes into a growable buffer
/// (`Buffer` mode) or merely counts how many bytes *would* be written
/// (`Sizer` mode). The builder runs every tree through a sizer pass first to
/// compute the exact allocation size, then replays it in buffer mode -- see
/// spec §4.3.
pub enum Writer {
    Buffer(Vec<u8>),
    Sizer(usize),
}

impl Writer {
    pub fn new_sizer() -> Self {
        Writer::Sizer(0)
    }

    pub fn new_buffer() -> Self {
        Writer::Buffer(Vec::new())
    }

    pub fn with_capacity(cap: usize) -> Self {
        Writer::Buffer(Vec::with_capacity(cap))
    }

    /// Number of bytes written (or that would have been written) so far.
    pub fn len(&self) -> usize {
        match self {
            Writer::Buffer(buf) => buf.len(),
            Writer::Sizer(n) => *n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes `data`, copying it in buffer mode or simply tallying its
    /// length in sizer mode.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Writer::Buffer(buf) => {
                buf.extend_from_slice(data);
                Ok(())
            }
            Writer::Sizer(n) => {
                *n = checked_add(*n, data.len())?;
                Ok(())
            }
        }
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        match self {
            Writer::Buffer(buf) => Ok(buf.write_u8(v)?),
            Writer::Sizer(n) => {
                *n = checked_add(*n, 1)?;
                Ok(())
            }
        }
    }

    pub fn write_u16_le(&mut self, v: u16) -> Result<()> {
        match self {
            Writer::Buffer(buf) => Ok(buf.write_u16::<LE>(v)?),
            Writer::Sizer(n) => {
                *n = checked_add(*n, 2)?;
                Ok(())
            }
        }
    }

    pub fn write_u32_le(&mut self, v: u32) -> Result<()> {
        match self {
            Writer::Buffer(buf) => Ok(buf.write_u32::<LE>(v)?),
            Writer::Sizer(n) => {
                *n = checked_add(*n, 4)?;
                Ok(())
            }
        }
    }

    pub fn write_u64_le(&mut self, v: u64) -> Result<()> {
        match self {
            Writer::Buffer(buf) => Ok(buf.write_u64::<LE>(v)?),
            Writer::Sizer(n) => {
                *n = checked_add(*n, 8)?;
                Ok(())
            }
        }
    }

    pub fn write_i16_le(&mut self, v: i16) -> Result<()> {
        match self {
            Writer::Buffer(buf) => Ok(buf.write_i16::<LE>(v)?),
            Writer::Sizer(n) => {
                *n = checked_add(*n, 2)?;
                Ok(())
            }
        }
    }

    pub fn write_i32_le(&mut self, v: i32) -> Result<()> {
        match self {
            Writer::Buffer(buf) => Ok(buf.write_i32::<LE>(v)?),
            Writer::Sizer(n) => {
                *n = checked_add(*n, 4)?;
                Ok(())
            }
        }
    }

    pub fn write_i64_le(&mut self, v: i64) -> Result<()> {
        match self {
            Writer::Buffer(buf) => Ok(buf.write_i64::<LE>(v)?),
            Writer::Sizer(n) => {
                *n = checked_add(*n, 8)?;
                Ok(())
            }
        }
    }

    pub fn write_f64_le(&mut self, v: f64) -> Result<()> {
        match self {
            Writer::Buffer(buf) => Ok(buf.write_f64::<LE>(v)?),
            Writer::Sizer(n) => {
                *n = checked_add(*n, 8)?;
                Ok(())
            }
        }
    }

    pub fn write_zstring(&mut self, s: &str) -> Result<()> {
        self.write(s.as_bytes())?;
        self.write_u8(0)
    }

    /// Captures the current write position. In buffer mode this is a real
    /// byte offset that can later be patched; in sizer mode it is only ever
    /// used to keep the two passes symmetrical.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.len())
    }

    /// Backpatches a 4-byte little-endian length prefix previously reserved
    /// at `snapshot` with `value`. A no-op in sizer mode, since there is no
    /// buffer to patch.
    pub fn patch_u32_at(&mut self, snapshot: Snapshot, value: u32) {
        if let Writer::Buffer(buf) = self {
            let at = snapshot.0;
            buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    pub fn into_buffer(self) -> Vec<u8> {
        match self {
            Writer::Buffer(buf) => buf,
            Writer::Sizer(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_zstring_consumes_terminator() {
        let mut r = ByteReader::new(b"hello\0world");
        assert_eq!(r.read_zstring().unwrap(), "hello");
        assert_eq!(r.as_slice(), b"world");
    }

    #[test]
    fn read_zstring_without_terminator_is_again() {
        let mut r = ByteReader::new(b"hello");
        assert!(matches!(r.read_zstring(), Err(DiceyError::Again)));
    }

    #[test]
    fn advance_past_end_is_again() {
        let mut r = ByteReader::new(b"ab");
        assert!(matches!(r.advance(3), Err(DiceyError::Again)));
    }

    #[test]
    fn checked_add_overflows() {
        assert!(matches!(checked_add(usize::MAX, 1), Err(DiceyError::Overflow)));
    }

    #[test]
    fn sizer_and_buffer_agree_on_length() {
        let mut sizer = Writer::new_sizer();
        sizer.write_u32_le(42).unwrap();
        sizer.write_zstring("hi").unwrap();

        let mut buf = Writer::new_buffer();
        buf.write_u32_le(42).unwrap();
        buf.write_zstring("hi").unwrap();

        assert_eq!(sizer.len(), buf.len());
        assert_eq!(buf.len(), 4 + 3);
    }

    #[test]
    fn snapshot_backpatches_length_prefix() {
        let mut w = Writer::new_buffer();
        let snap = w.snapshot();
        w.write_u32_le(0).unwrap(); // placeholder
        w.write(b"abcdef").unwrap();
        w.patch_u32_at(snap, 6);

        let buf = w.into_buffer();
        assert_eq!(&buf[0..4], &6u32.to_le_bytes());
        assert_eq!(&buf[4..], b"abcdef");
    }
}
