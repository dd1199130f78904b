//! The server side of a Dicey connection: handshake, per-client state
//! machine, and request dispatch.
//!
//! Matches `include/dicey/ipc/server.h` at the level of behaviour (not
//! API): one thread per connection handles the handshake and then loops
//! reading `MESSAGE` packets, dispatching `GET`/`SET`/`EXEC` either to the
//! built-in `dicey.*` objects or to an application-supplied
//! [`ObjectHandler`], and replying with a matching `RESPONSE`. Per spec §1
//! this crate does not pick an event-loop library or a concrete transport;
//! callers supply both by choosing how they invoke [`Server::serve_one`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use log::{debug, trace, warn};

use crate::error::{DiceyError, Result};
use crate::ipc::subscription::{ClientId, SubscriptionTable};
use crate::ipc::transport::{write_packet, PacketReader, Transport};
use crate::registry::{builtins, ElementKind, Registry};
use crate::wire::builder::{Arg, MessageBuilder};
use crate::wire::owned::OwnedValue;
use crate::wire::packet::{ByeReason, Op, Packet, PacketKind, Version};
use crate::wire::value::{Selector, Value};

/// The lifecycle of one server-side connection, matching spec §4.8's
/// `CONNECTED -> EXPECT_HELLO -> AUTHENTICATED -> SAID_BYE -> CLOSED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Connected,
    ExpectHello,
    Authenticated,
    SaidBye,
    Closed,
}

/// Application hook for every object not covered by the built-in
/// `dicey.*` traits. A server with nothing to export beyond introspection
/// can use [`NullHandler`].
pub trait ObjectHandler: Send + Sync {
    fn get(&self, path: &str, trait_name: &str, elem: &str) -> Result<OwnedValue>;
    fn set(&self, path: &str, trait_name: &str, elem: &str, value: &Value<'_>) -> Result<()>;
    fn exec(&self, path: &str, trait_name: &str, elem: &str, args: Option<&Value<'_>>) -> Result<OwnedValue>;
}

/// A handler for a registry that only ever exposes introspection.
pub struct NullHandler;

impl ObjectHandler for NullHandler {
    fn get(&self, _: &str, _: &str, _: &str) -> Result<OwnedValue> {
        Err(DiceyError::NotSupported)
    }
    fn set(&self, _: &str, _: &str, _: &str, _: &Value<'_>) -> Result<()> {
        Err(DiceyError::NotSupported)
    }
    fn exec(&self, _: &str, _: &str, _: &str, _: Option<&Value<'_>>) -> Result<OwnedValue> {
        Err(DiceyError::NotSupported)
    }
}

/// Configuration for a [`Server`]. Constructed with defaults via
/// [`ServerOptions::new`] and customised through the `with_*` setters, the
/// same style the teacher uses for its own per-layer message structs.
#[derive(Debug, Clone, Copy)]
pub struct ServerOptions {
    /// Bound on the number of signal packets queued for a connection that
    /// is not currently being pumped (see [`Server::register_client`]).
    /// Once full, `raise` drops the delivery for that client rather than
    /// blocking the raiser.
    max_pending_signals: usize,
    /// Default timeout a caller-driven request/response exchange against
    /// this server should use when none is given explicitly. The server
    /// itself never times out a read; this is carried for symmetry with
    /// [`crate::ipc::client::ClientOptions`] and handed to callers that
    /// build a matching `Client` against this server.
    default_request_timeout: std::time::Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions { max_pending_signals: 64, default_request_timeout: std::time::Duration::from_secs(5) }
    }
}

impl ServerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_pending_signals(mut self, max: usize) -> Self {
        self.max_pending_signals = max;
        self
    }

    pub fn with_default_request_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.default_request_timeout = timeout;
        self
    }

    pub fn max_pending_signals(&self) -> usize {
        self.max_pending_signals
    }

    pub fn default_request_timeout(&self) -> std::time::Duration {
        self.default_request_timeout
    }
}

pub struct Server<H: ObjectHandler> {
    registry: Arc<Mutex<Registry>>,
    subscriptions: Arc<Mutex<SubscriptionTable>>,
    outboxes: Arc<Mutex<HashMap<ClientId, mpsc::SyncSender<Arc<Packet>>>>>,
    handler: Arc<H>,
    next_client_id: AtomicU64,
    options: ServerOptions,
}

impl<H: ObjectHandler> Server<H> {
    pub fn new(registry: Registry, handler: H) -> Self {
        Self::with_options(registry, handler, ServerOptions::default())
    }

    pub fn with_options(registry: Registry, handler: H, options: ServerOptions) -> Self {
        Server {
            registry: Arc::new(Mutex::new(registry)),
            subscriptions: Arc::new(Mutex::new(SubscriptionTable::new())),
            outboxes: Arc::new(Mutex::new(HashMap::new())),
            handler: Arc::new(handler),
            next_client_id: AtomicU64::new(1),
            options,
        }
    }

    pub fn registry(&self) -> Arc<Mutex<Registry>> {
        Arc::clone(&self.registry)
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Reserves a [`ClientId`] and a signal outbox for it ahead of calling
    /// [`Server::serve_one_with_id`]. The caller is expected to pump the
    /// returned receiver onto its own handle to the client's transport
    /// (e.g. a cloned socket) on a separate thread -- delivering signals
    /// concurrently with the blocking request/response loop is a transport
    /// concern this crate leaves to the caller, per spec §1.
    pub fn register_client(&self) -> (ClientId, mpsc::Receiver<Arc<Packet>>) {
        let id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::sync_channel(self.options.max_pending_signals.max(1));
        self.outboxes.lock().unwrap().insert(id, tx);
        debug!("registered client {id}");
        (id, rx)
    }

    /// Publishes a signal value to every current subscriber of
    /// `(path, trait, elem)`, enqueuing the shared packet onto each
    /// subscriber's outbox (see [`Server::register_client`]).
    pub fn raise(&self, path: &str, trait_name: &str, elem: &str, value: OwnedValue) -> Result<()> {
        let mut mb = MessageBuilder::new();
        mb.begin(Op::Signal)?;
        mb.set_path(path)?;
        mb.set_selector(Selector { trait_name, elem })?;
        mb.set_value(value.as_arg())?;
        let packet = mb.build()?;

        let recipients = self.subscriptions.lock().unwrap().fan_out(path, trait_name, elem, packet);
        trace!("raising {trait_name}.{elem} on {path} to {} subscriber(s)", recipients.len());
        let outboxes = self.outboxes.lock().unwrap();
        for (client_id, packet) in recipients {
            if let Some(tx) = outboxes.get(&client_id) {
                if tx.try_send(packet).is_err() {
                    warn!("dropping signal for client {client_id}: outbox full or closed");
                }
            }
        }
        Ok(())
    }

    /// Runs the full lifecycle of one connection to completion: handshake,
    /// then request/response dispatch until the client sends `BYE` or the
    /// transport closes. Equivalent to calling [`Server::register_client`]
    /// and discarding the signal receiver.
    pub fn serve_one(&self, transport: impl Transport) -> Result<()> {
        let (client_id, _signals) = self.register_client();
        self.serve_one_with_id(client_id, transport)
    }

    /// Like [`Server::serve_one`], but for a [`ClientId`] obtained from
    /// [`Server::register_client`] -- use this when the caller also wants
    /// to receive signals for this connection.
    pub fn serve_one_with_id(&self, client_id: ClientId, mut transport: impl Transport) -> Result<()> {
        let mut state = ConnState::Connected;
        let mut reader = PacketReader::new();

        state = ConnState::ExpectHello;
        let hello_packet = reader.read_one(&mut transport)?;
        if hello_packet.kind() != PacketKind::Hello {
            return Err(DiceyError::BadMsg);
        }
        let client_hello = hello_packet.as_hello()?;
        if !client_hello.version.is_compatible_with(Version::CURRENT) {
            warn!("client {client_id} sent incompatible version {:?}", client_hello.version);
            let bye = Packet::bye(hello_packet.seq(), ByeReason::Error);
            write_packet(&mut transport, &bye)?;
            return Err(DiceyError::ClientTooOld);
        }
        write_packet(&mut transport, &Packet::hello(hello_packet.seq(), Version::CURRENT))?;
        state = ConnState::Authenticated;
        trace!("client {client_id} authenticated");

        let result = self.message_loop(&mut transport, &mut reader, client_id, &mut state);
        if let Err(ref e) = result {
            warn!("client {client_id} connection ended with error: {e}");
        }

        self.subscriptions.lock().unwrap().drop_client(client_id);
        self.outboxes.lock().unwrap().remove(&client_id);
        state = ConnState::Closed;
        debug!("client {client_id} closed");
        let _ = state;
        result
    }

    fn message_loop(
        &self,
        transport: &mut impl Transport,
        reader: &mut PacketReader,
        client_id: ClientId,
        state: &mut ConnState,
    ) -> Result<()> {
        loop {
            let packet = reader.read_one(transport)?;
            match packet.kind() {
                PacketKind::Bye => {
                    *state = ConnState::SaidBye;
                    return Ok(());
                }
                PacketKind::Hello => return Err(DiceyError::Already),
                PacketKind::Message => {
                    let response = self.dispatch(&packet, client_id)?;
                    if let Some(response) = response {
                        write_packet(transport, &response)?;
                    }
                }
            }
        }
    }

    fn dispatch(&self, packet: &Packet, client_id: ClientId) -> Result<Option<Packet>> {
        let msg = packet.as_message()?;
        let seq = packet.seq();

        let outcome = match msg.op {
            Op::Get => self.dispatch_get(msg.path, msg.selector, client_id).map(Some),
            Op::Set => {
                self.dispatch_set(msg.path, msg.selector, msg.value.as_ref(), client_id)?;
                Ok(None)
            }
            Op::Exec => self.dispatch_exec(msg.path, msg.selector, msg.value.as_ref(), client_id).map(Some),
            Op::Signal | Op::Response => return Err(DiceyError::BadMsg),
        };

        let response_value: OwnedValue = match outcome {
            Ok(Some(value)) => value,
            Ok(None) => OwnedValue::Unit,
            Err(e) => {
                debug!("dispatch of {}.{} on {} failed: {e}", msg.selector.trait_name, msg.selector.elem, msg.path);
                OwnedValue::Error(e.code(), e.to_string())
            }
        };

        let mut mb = MessageBuilder::new();
        mb.set_seq(seq);
        mb.begin(Op::Response)?;
        mb.set_path(msg.path)?;
        mb.set_selector(msg.selector)?;
        mb.set_value(response_value.as_arg())?;
        Ok(Some(mb.build()?))
    }

    fn element_kind(&self, path: &str, trait_name: &str, elem: &str) -> Result<ElementKind> {
        let reg = self.registry.lock().unwrap();
        Ok(reg.get_element(path, trait_name, elem)?.kind)
    }

    fn dispatch_get(&self, path: &str, sel: Selector<'_>, client_id: ClientId) -> Result<OwnedValue> {
        if self.element_kind(path, sel.trait_name, sel.elem)? != ElementKind::Property {
            return Err(DiceyError::NotSupported);
        }
        self.dispatch_builtin_get(path, sel, client_id).unwrap_or_else(|| {
            self.handler.get(path, sel.trait_name, sel.elem)
        })
    }

    fn dispatch_set(&self, path: &str, sel: Selector<'_>, value: Option<&Value<'_>>, _client_id: ClientId) -> Result<()> {
        if self.element_kind(path, sel.trait_name, sel.elem)? != ElementKind::Property {
            return Err(DiceyError::NotSupported);
        }
        let value = value.ok_or(DiceyError::Inval)?;
        {
            let reg = self.registry.lock().unwrap();
            let elem = reg.get_element(path, sel.trait_name, sel.elem)?;
            if elem.readonly {
                return Err(DiceyError::NotSupported);
            }
            let sig = elem.parsed_signature()?;
            if let Some(desc) = sig.as_value() {
                if !value.is_compatible_with(desc) {
                    return Err(DiceyError::ValueTypeMismatch);
                }
            }
        }
        self.handler.set(path, sel.trait_name, sel.elem, value)
    }

    fn dispatch_exec(&self, path: &str, sel: Selector<'_>, value: Option<&Value<'_>>, client_id: ClientId) -> Result<OwnedValue> {
        if self.element_kind(path, sel.trait_name, sel.elem)? != ElementKind::Operation {
            return Err(DiceyError::NotSupported);
        }
        if let Some(owned) = self.dispatch_builtin_exec(path, sel, value, client_id)? {
            return Ok(owned);
        }
        self.handler.exec(path, sel.trait_name, sel.elem, value)
    }

    /// Handles reads of the fixed `dicey.*` introspection properties.
    /// Returns `None` when `path`/`sel` does not name a built-in, so the
    /// caller falls through to the application handler.
    fn dispatch_builtin_get(&self, path: &str, sel: Selector<'_>, _client_id: ClientId) -> Option<Result<OwnedValue>> {
        let reg = self.registry.lock().unwrap();

        if path == builtins::PATH_REGISTRY && sel.trait_name == builtins::TRAIT_REGISTRY {
            return Some(Ok(match sel.elem {
                "Objects" => OwnedValue::Array(
                    crate::wire::ty::Type::Path,
                    reg.object_paths().map(|p| OwnedValue::Path(p.to_string())).collect(),
                ),
                "Traits" => OwnedValue::Array(
                    crate::wire::ty::Type::Str,
                    reg.trait_names().map(|n| OwnedValue::Str(n.to_string())).collect(),
                ),
                _ => return Some(Err(DiceyError::ElementNotFound)),
            }));
        }

        if sel.trait_name == builtins::TRAIT_INTROSPECTION && sel.elem == "Data" {
            return Some(match reg.resolve_path(path).and_then(|canonical| {
                reg.get_object(canonical).ok_or(DiceyError::PathNotFound).map(|o| (canonical, o))
            }) {
                Ok((_canonical, object)) => {
                    let per_trait = object
                        .traits()
                        .filter_map(|trait_name| reg.get_trait(trait_name).map(|t| (trait_name, t)))
                        .map(|(trait_name, t)| {
                            let elements = t
                                .elements()
                                .map(|(name, e)| {
                                    let kind_byte = match e.kind {
                                        ElementKind::Operation => 0u8,
                                        ElementKind::Property => 1u8,
                                        ElementKind::Signal => 2u8,
                                    };
                                    let info = OwnedValue::Tuple(vec![
                                        OwnedValue::Byte(kind_byte),
                                        OwnedValue::Str(e.signature.clone()),
                                        OwnedValue::Bool(e.readonly),
                                    ]);
                                    OwnedValue::Pair(Box::new(OwnedValue::Str(name.to_string())), Box::new(info))
                                })
                                .collect();
                            OwnedValue::Pair(
                                Box::new(OwnedValue::Str(trait_name.to_string())),
                                Box::new(OwnedValue::Array(crate::wire::ty::Type::Pair, elements)),
                            )
                        })
                        .collect();
                    Ok(OwnedValue::Array(crate::wire::ty::Type::Pair, per_trait))
                }
                Err(e) => Err(e),
            });
        }

        if let Some(trait_name) = path.strip_prefix("/dicey/registry/traits/") {
            if sel.trait_name == builtins::TRAIT_TRAIT {
                let Some(t) = reg.get_trait(trait_name) else {
                    return Some(Err(DiceyError::TraitNotFound));
                };
                let kind = match sel.elem {
                    "Properties" => ElementKind::Property,
                    "Signals" => ElementKind::Signal,
                    "Operations" => ElementKind::Operation,
                    _ => return Some(Err(DiceyError::ElementNotFound)),
                };
                let items = builtins::elements_of_kind(t, kind)
                    .map(|(name, sig)| {
                        OwnedValue::Pair(Box::new(OwnedValue::Str(name.to_string())), Box::new(OwnedValue::Str(sig.to_string())))
                    })
                    .collect();
                return Some(Ok(OwnedValue::Array(crate::wire::ty::Type::Pair, items)));
            }
        }

        None
    }

    fn dispatch_builtin_exec(
        &self,
        path: &str,
        sel: Selector<'_>,
        value: Option<&Value<'_>>,
        client_id: ClientId,
    ) -> Result<Option<OwnedValue>> {
        if path != builtins::PATH_REGISTRY || sel.trait_name != builtins::TRAIT_REGISTRY {
            if path != builtins::PATH_SERVER || sel.trait_name != builtins::TRAIT_SIGNAL_MANAGER {
                return Ok(None);
            }
            let pair = value.ok_or(DiceyError::Inval)?.get_pair()?;
            let target_path = pair.first()?.get_path()?;
            let target_sel = pair.second()?.get_selector()?;
            let (canonical, was_alias) = {
                let reg = self.registry.lock().unwrap();
                let canonical = reg.resolve_path(target_path)?.to_string();
                let was_alias = canonical != target_path;
                (canonical, was_alias)
            };
            let mut subs = self.subscriptions.lock().unwrap();
            match sel.elem {
                "Subscribe" => {
                    subs.subscribe(client_id, &canonical, target_sel.trait_name, target_sel.elem);
                    return Ok(Some(if was_alias { OwnedValue::Path(canonical) } else { OwnedValue::Unit }));
                }
                "Unsubscribe" => {
                    subs.unsubscribe(client_id, &canonical, target_sel.trait_name, target_sel.elem);
                    return Ok(Some(OwnedValue::Unit));
                }
                _ => return Err(DiceyError::ElementNotFound),
            }
        }

        match sel.elem {
            "PathExists" => {
                let p = value.ok_or(DiceyError::Inval)?.get_path()?;
                let reg = self.registry.lock().unwrap();
                Ok(Some(OwnedValue::Bool(reg.contains_object(p))))
            }
            "TraitExists" => {
                let name = value.ok_or(DiceyError::Inval)?.get_str()?;
                let reg = self.registry.lock().unwrap();
                Ok(Some(OwnedValue::Bool(reg.contains_trait(name))))
            }
            "ElementExists" => {
                let pair = value.ok_or(DiceyError::Inval)?.get_pair()?;
                let p = pair.first()?.get_path()?;
                let sel = pair.second()?.get_selector()?;
                let reg = self.registry.lock().unwrap();
                Ok(Some(OwnedValue::Bool(reg.get_element(p, sel.trait_name, sel.elem).is_ok())))
            }
            _ => Err(DiceyError::ElementNotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Element, Trait};
    use std::os::unix::net::UnixStream;

    fn handshake_client(stream: &mut UnixStream) {
        let hello = Packet::hello(1, Version::CURRENT);
        write_packet(stream, &hello).unwrap();
        let mut reader = PacketReader::new();
        let reply = reader.read_one(stream).unwrap();
        assert_eq!(reply.as_hello().unwrap().version, Version::CURRENT);
    }

    #[test]
    fn handshake_then_bye_closes_cleanly() {
        crate::test_support::init_logging();
        let (mut client, server_side) = UnixStream::pair().unwrap();
        let server = Arc::new(Server::new(Registry::with_builtins(), NullHandler));
        let server2 = Arc::clone(&server);
        let handle = std::thread::spawn(move || server2.serve_one(server_side));

        handshake_client(&mut client);
        write_packet(&mut client, &Packet::bye(2, ByeReason::Shutdown)).unwrap();

        handle.join().unwrap().unwrap();
    }

    #[test]
    fn get_on_builtin_registry_returns_trait_list() {
        let (mut client, server_side) = UnixStream::pair().unwrap();
        let server = Arc::new(Server::new(Registry::with_builtins(), NullHandler));
        let server2 = Arc::clone(&server);
        let handle = std::thread::spawn(move || server2.serve_one(server_side));

        handshake_client(&mut client);

        let mut mb = MessageBuilder::new();
        mb.set_seq(2);
        mb.begin(Op::Get).unwrap();
        mb.set_path(builtins::PATH_REGISTRY).unwrap();
        mb.set_selector(Selector { trait_name: builtins::TRAIT_REGISTRY, elem: "Traits" }).unwrap();
        write_packet(&mut client, &mb.build().unwrap()).unwrap();

        let mut reader = PacketReader::new();
        let response = reader.read_one(&mut client).unwrap();
        let msg = response.as_message().unwrap();
        assert_eq!(msg.op, Op::Response);
        let traits = msg.value.unwrap().get_array().unwrap();
        assert!(traits.len() >= 3);

        write_packet(&mut client, &Packet::bye(3, ByeReason::Shutdown)).unwrap();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn set_on_readonly_property_is_rejected() {
        let mut reg = Registry::with_builtins();
        let mut t = Trait::new("counter.Counter");
        t.add_element("Value", Element::property("i", true));
        reg.add_trait(t).unwrap();
        reg.add_object("/counter", ["counter.Counter".to_string()]).unwrap();

        let (mut client, server_side) = UnixStream::pair().unwrap();
        let server = Arc::new(Server::new(reg, NullHandler));
        let server2 = Arc::clone(&server);
        let handle = std::thread::spawn(move || server2.serve_one(server_side));

        handshake_client(&mut client);

        let mut mb = MessageBuilder::new();
        mb.set_seq(2);
        mb.begin(Op::Set).unwrap();
        mb.set_path("/counter").unwrap();
        mb.set_selector(Selector { trait_name: "counter.Counter", elem: "Value" }).unwrap();
        mb.set_value(Arg::Int32(5)).unwrap();
        write_packet(&mut client, &mb.build().unwrap()).unwrap();

        let mut reader = PacketReader::new();
        let response = reader.read_one(&mut client).unwrap();
        let msg = response.as_message().unwrap();
        let err = msg.value.unwrap().get_error().unwrap();
        assert_eq!(err.code, DiceyError::NotSupported.code());

        write_packet(&mut client, &Packet::bye(3, ByeReason::Shutdown)).unwrap();
        handle.join().unwrap().unwrap();
    }
}
