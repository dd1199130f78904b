//! The transport abstraction: anything a client or server can speak Dicey
//! framing over.
//!
//! Per spec §1 this crate picks neither an event loop library nor a
//! concrete transport beyond the framing contract, so `Transport` is
//! nothing more than "a duplex byte stream", blanket-implemented for any
//! `Read + Write`. Tests and the in-process examples in this crate use
//! `std::os::unix::net::UnixStream::pair()`.

use std::io::{Read, Write};

use log::trace;

use crate::error::{DiceyError, Result};
use crate::wire::packet::Packet;

pub trait Transport: Read + Write + Send {}
impl<T: Read + Write + Send> Transport for T {}

/// Buffers bytes off a [`Transport`] until a full [`Packet`] can be framed.
pub struct PacketReader {
    buf: Vec<u8>,
}

impl PacketReader {
    pub fn new() -> Self {
        PacketReader { buf: Vec::new() }
    }

    /// Blocks on `transport` until one full packet has arrived, then
    /// returns it, retaining any bytes read past its end for the next
    /// call.
    pub fn read_one(&mut self, transport: &mut impl Transport) -> Result<Packet> {
        loop {
            match Packet::load(&self.buf) {
                Ok((packet, consumed)) => {
                    trace!("framed a {:?} packet ({consumed} bytes)", packet.kind());
                    self.buf.drain(..consumed);
                    return Ok(packet);
                }
                Err(DiceyError::Again) => {
                    let mut chunk = [0u8; 4096];
                    let n = transport.read(&mut chunk)?;
                    if n == 0 {
                        return Err(DiceyError::ConnRefused);
                    }
                    trace!("read {n} bytes off transport ({} buffered)", self.buf.len() + n);
                    self.buf.extend_from_slice(&chunk[..n]);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for PacketReader {
    fn default() -> Self {
        PacketReader::new()
    }
}

pub fn write_packet(transport: &mut impl Transport, packet: &Packet) -> Result<()> {
    transport.write_all(packet.dump())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::packet::{ByeReason, Version};
    use std::os::unix::net::UnixStream;

    #[test]
    fn reads_one_packet_at_a_time_across_partial_writes() {
        let (mut a, mut b) = UnixStream::pair().unwrap();
        let hello = Packet::hello(1, Version::CURRENT);
        let bye = Packet::bye(2, ByeReason::Shutdown);

        let bytes = [hello.dump(), bye.dump()].concat();
        a.write_all(&bytes[..5]).unwrap();
        a.write_all(&bytes[5..]).unwrap();
        drop(a);

        let mut reader = PacketReader::new();
        let first = reader.read_one(&mut b).unwrap();
        assert_eq!(first.as_hello().unwrap().version, Version::CURRENT);
        let second = reader.read_one(&mut b).unwrap();
        assert_eq!(second.as_bye().unwrap().reason, ByeReason::Shutdown);
    }
}
