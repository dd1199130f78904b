//! Packet framing: `HELLO`, `BYE` and `MESSAGE`, plus the protocol version
//! handshake.
//!
//! Mirrors `include/dicey/core/packet.h`, `include/dicey/core/message.h` and
//! `src/wirefmt/message.c`. A [`Packet`] owns its raw wire bytes; the
//! `as_*` accessors lazily reinterpret them without a second allocation.
//! `Message::value` stays an unparsed byte range until the caller actually
//! probes it -- see [`crate::wire::value`].

use crate::error::{DiceyError, Result};
use crate::wire::view::{ByteReader, Writer};
use crate::wire::value::{Selector, Value};

/// The two-number protocol version carried in every `HELLO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u16,
    pub revision: u16,
}

impl Version {
    /// `DICEY_PROTO_MAJOR` / `DICEY_PROTO_REVISION` in the reference library.
    pub const CURRENT: Version = Version { major: 1, revision: 0 };

    /// Lexicographic comparison with major taking precedence, matching
    /// `dicey_version_cmp`.
    pub fn is_compatible_with(self, other: Version) -> bool {
        self.major == other.major
    }
}

/// Reasons a `BYE` packet can carry, matching `enum dicey_bye_reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByeReason {
    Shutdown = 1,
    Error = 2,
    Kicked = 3,
}

impl ByeReason {
    fn from_u32(v: u32) -> Result<ByeReason> {
        match v {
            1 => Ok(ByeReason::Shutdown),
            2 => Ok(ByeReason::Error),
            3 => Ok(ByeReason::Kicked),
            _ => Err(DiceyError::BadMsg),
        }
    }
}

/// `GET`, `SET`, `EXEC`, `SIGNAL` and `RESPONSE`, matching `enum dicey_op`.
/// Tag values reuse the original's char codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Get = b'<' as isize,
    Set = b'>' as isize,
    Exec = b'?' as isize,
    Signal = b'!' as isize,
    Response = b':' as isize,
}

impl Op {
    fn from_tag(tag: u8) -> Result<Op> {
        match tag {
            b'<' => Ok(Op::Get),
            b'>' => Ok(Op::Set),
            b'?' => Ok(Op::Exec),
            b'!' => Ok(Op::Signal),
            b':' => Ok(Op::Response),
            _ => Err(DiceyError::BadMsg),
        }
    }

    fn tag(self) -> u8 {
        self as isize as u8
    }

    /// `GET` never carries a value payload; every other op does. Matches
    /// `dicey_op_requires_payload`.
    pub fn requires_payload(self) -> bool {
        !matches!(self, Op::Get)
    }
}

const KIND_HELLO: u32 = 1;
const KIND_BYE: u32 = 2;
const KIND_MESSAGE: u32 = 3;

const PAYLOAD_HEAD_LEN: usize = 8; // u32 kind + u32 seq
const HELLO_BODY_LEN: usize = 4; // u16 major + u16 revision
const BYE_BODY_LEN: usize = 4; // u32 reason
const MESSAGE_HEAD_EXTRA: usize = 4; // u32 data_len, on top of PAYLOAD_HEAD_LEN

/// An owned, framed packet. Holds the raw wire bytes (header included) so
/// that `dump`/round-tripping never needs to re-encode.
#[derive(Debug, Clone)]
pub struct Packet {
    bytes: Vec<u8>,
}

impl Packet {
    /// Attempts to read one complete packet off the front of `src`,
    /// returning the packet and the number of bytes consumed. Returns
    /// [`DiceyError::Again`] if `src` does not yet contain a whole packet --
    /// the caller should read more bytes and retry with the same data plus
    /// whatever newly arrived.
    pub fn load(src: &[u8]) -> Result<(Packet, usize)> {
        let mut r = ByteReader::new(src);
        let kind = r.read_u32_le()?;
        let _seq = r.read_u32_le()?;

        let total_len = match kind {
            KIND_HELLO => {
                r.advance(HELLO_BODY_LEN)?;
                PAYLOAD_HEAD_LEN + HELLO_BODY_LEN
            }
            KIND_BYE => {
                r.advance(BYE_BODY_LEN)?;
                PAYLOAD_HEAD_LEN + BYE_BODY_LEN
            }
            KIND_MESSAGE => {
                let data_len = r.read_u32_le()?;
                r.advance(data_len as usize)?;
                PAYLOAD_HEAD_LEN + MESSAGE_HEAD_EXTRA + data_len as usize
            }
            _ => return Err(DiceyError::BadMsg),
        };

        Ok((Packet { bytes: src[..total_len].to_vec() }, total_len))
    }

    /// The full wire representation of this packet, ready to be written to
    /// a transport.
    pub fn dump(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> PacketKind {
        match u32::from_le_bytes(self.bytes[0..4].try_into().unwrap()) {
            KIND_HELLO => PacketKind::Hello,
            KIND_BYE => PacketKind::Bye,
            KIND_MESSAGE => PacketKind::Message,
            _ => unreachable!("validated at load time"),
        }
    }

    pub fn seq(&self) -> u32 {
        u32::from_le_bytes(self.bytes[4..8].try_into().unwrap())
    }

    pub fn set_seq(&mut self, seq: u32) {
        self.bytes[4..8].copy_from_slice(&seq.to_le_bytes());
    }

    pub fn is_valid(&self) -> bool {
        self.bytes.len() >= PAYLOAD_HEAD_LEN
    }

    pub fn hello(seq: u32, version: Version) -> Packet {
        let mut w = Writer::with_capacity(PAYLOAD_HEAD_LEN + HELLO_BODY_LEN);
        w.write_u32_le(KIND_HELLO).unwrap();
        w.write_u32_le(seq).unwrap();
        w.write_u16_le(version.major).unwrap();
        w.write_u16_le(version.revision).unwrap();
        Packet { bytes: w.into_buffer() }
    }

    pub fn bye(seq: u32, reason: ByeReason) -> Packet {
        let mut w = Writer::with_capacity(PAYLOAD_HEAD_LEN + BYE_BODY_LEN);
        w.write_u32_le(KIND_BYE).unwrap();
        w.write_u32_le(seq).unwrap();
        w.write_u32_le(reason as u32).unwrap();
        Packet { bytes: w.into_buffer() }
    }

    /// Builds a raw `MESSAGE` packet from an already-encoded body (op byte +
    /// path/selector zstrings + optional value bytes). Used by
    /// [`crate::wire::builder::MessageBuilder`].
    pub(crate) fn message_from_body(seq: u32, body: &[u8]) -> Result<Packet> {
        let data_len: u32 = body.len().try_into().map_err(|_| DiceyError::Overflow)?;
        let mut w = Writer::with_capacity(PAYLOAD_HEAD_LEN + MESSAGE_HEAD_EXTRA + body.len());
        w.write_u32_le(KIND_MESSAGE)?;
        w.write_u32_le(seq)?;
        w.write_u32_le(data_len)?;
        w.write(body)?;
        Ok(Packet { bytes: w.into_buffer() })
    }

    pub fn as_hello(&self) -> Result<Hello> {
        if self.kind() != PacketKind::Hello {
            return Err(DiceyError::Inval);
        }
        let mut r = ByteReader::new(&self.bytes[PAYLOAD_HEAD_LEN..]);
        let major = r.read_u16_le()?;
        let revision = r.read_u16_le()?;
        Ok(Hello { version: Version { major, revision } })
    }

    pub fn as_bye(&self) -> Result<Bye> {
        if self.kind() != PacketKind::Bye {
            return Err(DiceyError::Inval);
        }
        let mut r = ByteReader::new(&self.bytes[PAYLOAD_HEAD_LEN..]);
        let reason = ByeReason::from_u32(r.read_u32_le()?)?;
        Ok(Bye { reason })
    }

    /// Parses the fixed header fields (op, path, selector) out of a
    /// `MESSAGE` packet, leaving `value` as an unparsed byte range.
    pub fn as_message(&self) -> Result<Message<'_>> {
        if self.kind() != PacketKind::Message {
            return Err(DiceyError::Inval);
        }
        let body_start = PAYLOAD_HEAD_LEN + MESSAGE_HEAD_EXTRA;
        let mut r = ByteReader::new(&self.bytes[body_start..]);

        let op = Op::from_tag(r.read_u8()?)?;
        let path = r.read_zstring()?;
        let trait_name = r.read_zstring()?;
        let elem = r.read_zstring()?;

        let value_bytes = r.as_slice();
        if op.requires_payload() && value_bytes.is_empty() {
            return Err(DiceyError::BadMsg);
        }
        if !op.requires_payload() && !value_bytes.is_empty() {
            return Err(DiceyError::BadMsg);
        }

        Ok(Message {
            op,
            path,
            selector: Selector { trait_name, elem },
            value: if value_bytes.is_empty() { None } else { Some(Value::probe(value_bytes)?) },
        })
    }
}

/// `HELLO` packet kind, for convenience matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Hello,
    Bye,
    Message,
}

#[derive(Debug, Clone, Copy)]
pub struct Hello {
    pub version: Version,
}

#[derive(Debug, Clone, Copy)]
pub struct Bye {
    pub reason: ByeReason,
}

/// Borrowed, lazily-probed view of a `MESSAGE` packet's contents.
#[derive(Debug)]
pub struct Message<'a> {
    pub op: Op,
    pub path: &'a str,
    pub selector: Selector<'a>,
    pub value: Option<Value<'a>>,
}

impl<'a> Message<'a> {
    pub fn matches_element(&self, path: &str, trait_name: &str, elem: &str) -> bool {
        self.path == path && self.selector.trait_name == trait_name && self.selector.elem == elem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::builder::{Arg, MessageBuilder};

    #[test]
    fn hello_round_trips() {
        let p = Packet::hello(7, Version::CURRENT);
        assert_eq!(p.seq(), 7);
        assert_eq!(p.kind(), PacketKind::Hello);

        let (loaded, consumed) = Packet::load(p.dump()).unwrap();
        assert_eq!(consumed, p.dump().len());
        assert_eq!(loaded.as_hello().unwrap().version, Version::CURRENT);
    }

    #[test]
    fn bye_round_trips() {
        let p = Packet::bye(3, ByeReason::Shutdown);
        let (loaded, _) = Packet::load(p.dump()).unwrap();
        assert_eq!(loaded.as_bye().unwrap().reason, ByeReason::Shutdown);
    }

    #[test]
    fn short_buffer_is_again() {
        let p = Packet::hello(1, Version::CURRENT);
        let bytes = p.dump();
        assert!(matches!(Packet::load(&bytes[..bytes.len() - 1]), Err(DiceyError::Again)));
    }

    #[test]
    fn get_message_has_no_value() {
        let mut mb = MessageBuilder::new();
        mb.begin(Op::Get).unwrap();
        mb.set_path("/sval").unwrap();
        mb.set_selector(Selector { trait_name: "sval.Sval", elem: "Value" }).unwrap();
        let packet = mb.build().unwrap();

        let msg = packet.as_message().unwrap();
        assert_eq!(msg.op, Op::Get);
        assert!(msg.value.is_none());
    }

    #[test]
    fn set_message_without_value_is_rejected() {
        let mut mb = MessageBuilder::new();
        mb.begin(Op::Set).unwrap();
        mb.set_path("/sval").unwrap();
        mb.set_selector(Selector { trait_name: "sval.Sval", elem: "Value" }).unwrap();
        assert!(matches!(mb.build(), Err(DiceyError::Inval)));
    }

    #[test]
    fn message_round_trips_with_value() {
        let mut mb = MessageBuilder::new();
        mb.begin(Op::Set).unwrap();
        mb.set_path("/sval").unwrap();
        mb.set_selector(Selector { trait_name: "sval.Sval", elem: "Value" }).unwrap();
        mb.set_value(Arg::Str("hi")).unwrap();
        let packet = mb.build().unwrap();

        let (loaded, _) = Packet::load(packet.dump()).unwrap();
        let msg = loaded.as_message().unwrap();
        assert!(msg.matches_element("/sval", "sval.Sval", "Value"));
        assert_eq!(msg.value.unwrap().get_str().unwrap(), "hi");
    }
}
