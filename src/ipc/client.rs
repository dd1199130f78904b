//! The client side of a Dicey connection: handshake and request/response
//! correlation.
//!
//! Matches `include/dicey/ipc/client.h` at the behavioural level. A
//! [`Client`] owns one transport; [`Client::request`] assigns the next
//! `seq`, sends the packet, and blocks (with a timeout) on the matching
//! `RESPONSE`. A background reader thread demultiplexes incoming packets:
//! responses go to whichever call is waiting on that `seq`, and `SIGNAL`
//! packets are handed to the caller's `on_signal` callback.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{trace, warn};

use crate::error::{DiceyError, Result};
use crate::ipc::request::{wait_for_response, PendingRequests};
use crate::ipc::transport::{write_packet, PacketReader, Transport};
use crate::wire::builder::{Arg, MessageBuilder};
use crate::wire::packet::{ByeReason, Op, Packet, PacketKind, Version};
use crate::wire::value::Selector;

/// Called from the client's background reader thread whenever a `SIGNAL`
/// packet arrives. Must not block.
pub type SignalCallback = dyn Fn(&Packet) + Send + Sync;

/// The default timeout applied to [`Client::request`] when none is given.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a [`Client`]. Constructed with defaults via
/// [`ClientOptions::new`] and customised through the `with_*` setters,
/// mirroring [`crate::ipc::server::ServerOptions`].
#[derive(Debug, Clone, Copy)]
pub struct ClientOptions {
    default_request_timeout: Duration,
    max_inflight_requests: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions { default_request_timeout: DEFAULT_TIMEOUT, max_inflight_requests: 64 }
    }
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_request_timeout(mut self, timeout: Duration) -> Self {
        self.default_request_timeout = timeout;
        self
    }

    pub fn with_max_inflight_requests(mut self, max: usize) -> Self {
        self.max_inflight_requests = max;
        self
    }

    pub fn default_request_timeout(&self) -> Duration {
        self.default_request_timeout
    }

    pub fn max_inflight_requests(&self) -> usize {
        self.max_inflight_requests
    }
}

struct Shared {
    pending: Mutex<PendingRequests>,
    next_seq: AtomicU32,
    options: ClientOptions,
}

/// A connected Dicey client. `W` is the writer half used by `request` and
/// `send_bye`; the reader thread owns its own handle to the same
/// transport (callers construct a [`Client`] from two handles to one
/// stream, e.g. via `UnixStream::try_clone`).
pub struct Client<W: Transport> {
    shared: Arc<Shared>,
    writer: Mutex<W>,
    reader_thread: Option<JoinHandle<()>>,
}

impl<W: Transport> Client<W> {
    /// Performs the `HELLO` handshake over `writer`/`reader`, then spawns a
    /// background thread that owns `reader` for the rest of the
    /// connection's life, routing responses to [`Client::request`] callers
    /// and signals to `on_signal`.
    pub fn connect<R: Transport + 'static>(
        writer: W,
        reader: R,
        on_signal: impl Fn(&Packet) + Send + Sync + 'static,
    ) -> Result<Self> {
        Self::connect_with_options(writer, reader, on_signal, ClientOptions::default())
    }

    /// Like [`Client::connect`], but with explicit [`ClientOptions`].
    pub fn connect_with_options<R: Transport + 'static>(
        mut writer: W,
        mut reader: R,
        on_signal: impl Fn(&Packet) + Send + Sync + 'static,
        options: ClientOptions,
    ) -> Result<Self> {
        write_packet(&mut writer, &Packet::hello(0, Version::CURRENT))?;

        let mut framing = PacketReader::new();
        let hello_reply = framing.read_one(&mut reader)?;
        if hello_reply.kind() != PacketKind::Hello {
            return Err(DiceyError::BadMsg);
        }
        let server_version = hello_reply.as_hello()?.version;
        if !server_version.is_compatible_with(Version::CURRENT) {
            return Err(DiceyError::ServerTooOld);
        }
        trace!("handshake complete, server version {server_version:?}");

        let shared =
            Arc::new(Shared { pending: Mutex::new(PendingRequests::new()), next_seq: AtomicU32::new(1), options });
        let reader_shared = Arc::clone(&shared);
        let on_signal: Arc<SignalCallback> = Arc::new(on_signal);

        let reader_thread = std::thread::spawn(move || {
            reader_loop(reader, framing, reader_shared, on_signal);
        });

        Ok(Client { shared, writer: Mutex::new(writer), reader_thread: Some(reader_thread) })
    }

    /// Sends a `GET`/`SET`/`EXEC` request and blocks until the matching
    /// `RESPONSE` arrives or `timeout` elapses.
    pub fn request(&self, op: Op, path: &str, selector: Selector<'_>, value: Option<Arg<'_>>, timeout: Duration) -> Result<Packet> {
        {
            let pending = self.shared.pending.lock().unwrap();
            if pending.len() >= self.shared.options.max_inflight_requests {
                warn!("refusing request: {} requests already in flight", pending.len());
                return Err(DiceyError::Overflow);
            }
        }

        let seq = self.shared.next_seq.fetch_add(1, Ordering::SeqCst);

        let mut mb = MessageBuilder::new();
        mb.set_seq(seq);
        mb.begin(op)?;
        mb.set_path(path)?;
        mb.set_selector(selector)?;
        if let Some(value) = value {
            mb.set_value(value)?;
        }
        let packet = mb.build()?;

        let rx = self.shared.pending.lock().unwrap().register(seq);
        {
            let mut w = self.writer.lock().unwrap();
            if let Err(e) = write_packet(&mut *w, &packet) {
                self.shared.pending.lock().unwrap().cancel(seq);
                return Err(e);
            }
        }

        match wait_for_response(&rx, timeout) {
            Ok(response) => Ok(response),
            Err(e) => {
                self.shared.pending.lock().unwrap().cancel(seq);
                Err(e)
            }
        }
    }

    /// The request timeout this client was configured with (see
    /// [`ClientOptions::with_default_request_timeout`]).
    pub fn default_timeout(&self) -> Duration {
        self.shared.options.default_request_timeout
    }

    pub fn get(&self, path: &str, selector: Selector<'_>, timeout: Duration) -> Result<Packet> {
        self.request(Op::Get, path, selector, None, timeout)
    }

    pub fn set(&self, path: &str, selector: Selector<'_>, value: Arg<'_>, timeout: Duration) -> Result<Packet> {
        self.request(Op::Set, path, selector, Some(value), timeout)
    }

    pub fn exec(&self, path: &str, selector: Selector<'_>, args: Option<Arg<'_>>, timeout: Duration) -> Result<Packet> {
        self.request(Op::Exec, path, selector, args, timeout)
    }

    /// Sends `BYE` and stops waiting for the reader thread to exit (it
    /// will, once the server closes its side).
    pub fn close(&self, reason: ByeReason) -> Result<()> {
        let mut w = self.writer.lock().unwrap();
        write_packet(&mut *w, &Packet::bye(0, reason))
    }
}

impl<W: Transport> Drop for Client<W> {
    fn drop(&mut self) {
        if let Some(handle) = self.reader_thread.take() {
            let _ = handle.join();
        }
    }
}

fn reader_loop<R: Transport>(mut reader: R, mut framing: PacketReader, shared: Arc<Shared>, on_signal: Arc<SignalCallback>) {
    loop {
        let packet = match framing.read_one(&mut reader) {
            Ok(p) => p,
            Err(e) => {
                trace!("client reader loop exiting: {e}");
                return;
            }
        };
        match packet.kind() {
            PacketKind::Bye => return,
            PacketKind::Hello => continue,
            PacketKind::Message => {
                let Ok(msg) = packet.as_message() else {
                    warn!("dropping malformed message packet");
                    continue;
                };
                match msg.op {
                    Op::Response => {
                        let seq = packet.seq();
                        shared.pending.lock().unwrap().complete(seq, packet);
                    }
                    Op::Signal => on_signal(&packet),
                    _ => {}
                }
            }
        }
    }
}
