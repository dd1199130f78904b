//! End-to-end protocol scenarios, run over `UnixStream::pair()` against the
//! real `ipc::server`/`ipc::client` runtime -- no filesystem socket needed,
//! so these stay hermetic.

use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dicey::error::DiceyError;
use dicey::ipc::client::Client;
use dicey::ipc::server::{ObjectHandler, Server};
use dicey::ipc::transport::{write_packet, PacketReader};
use dicey::registry::{Element, Registry, Trait};
use dicey::wire::builder::{Arg, MessageBuilder};
use dicey::wire::owned::OwnedValue;
use dicey::wire::packet::{ByeReason, Op, Packet, PacketKind, Version};
use dicey::wire::value::{Selector, Value};

fn init_logging() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Backs `/sval`'s `sval.Sval:Value` property with an in-memory string.
struct SvalHandler {
    value: Mutex<String>,
}

impl ObjectHandler for SvalHandler {
    fn get(&self, path: &str, trait_name: &str, elem: &str) -> dicey::Result<OwnedValue> {
        match (path, trait_name, elem) {
            ("/sval", "sval.Sval", "Value") => Ok(OwnedValue::Str(self.value.lock().unwrap().clone())),
            _ => Err(DiceyError::NotSupported),
        }
    }

    fn set(&self, path: &str, trait_name: &str, elem: &str, value: &Value<'_>) -> dicey::Result<()> {
        match (path, trait_name, elem) {
            ("/sval", "sval.Sval", "Value") => {
                *self.value.lock().unwrap() = value.get_str()?.to_string();
                Ok(())
            }
            _ => Err(DiceyError::NotSupported),
        }
    }

    fn exec(&self, _path: &str, _trait_name: &str, _elem: &str, _args: Option<&Value<'_>>) -> dicey::Result<OwnedValue> {
        Err(DiceyError::NotSupported)
    }
}

fn sval_registry() -> Registry {
    let mut reg = Registry::with_builtins();
    let mut t = Trait::new("sval.Sval");
    t.add_element("Value", Element::property("s", false));
    reg.add_trait(t).unwrap();
    reg.add_object("/sval", ["sval.Sval".to_string()]).unwrap();
    reg
}

#[test]
fn scenario_1_hello_then_bye_closes_cleanly() {
    init_logging();
    let (mut client_side, server_side) = UnixStream::pair().unwrap();
    let server = Arc::new(Server::new(Registry::with_builtins(), SvalHandler { value: Mutex::new(String::new()) }));
    let s2 = Arc::clone(&server);
    let handle = std::thread::spawn(move || s2.serve_one(server_side));

    write_packet(&mut client_side, &Packet::hello(0, Version::CURRENT)).unwrap();
    let mut reader = PacketReader::new();
    let reply = reader.read_one(&mut client_side).unwrap();
    assert_eq!(reply.kind(), PacketKind::Hello);
    assert_eq!(reply.as_hello().unwrap().version, Version::CURRENT);

    write_packet(&mut client_side, &Packet::bye(1, ByeReason::Shutdown)).unwrap();
    handle.join().unwrap().unwrap();
}

#[test]
fn scenario_2_sval_round_trips_through_set_then_get() {
    init_logging();
    let (client_stream, server_stream) = UnixStream::pair().unwrap();
    let server = Arc::new(Server::new(sval_registry(), SvalHandler { value: Mutex::new(String::new()) }));
    let s2 = Arc::clone(&server);
    let handle = std::thread::spawn(move || s2.serve_one(server_stream));

    let writer = client_stream.try_clone().unwrap();
    let client = Client::connect(writer, client_stream, |_| {}).unwrap();

    let sel = Selector { trait_name: "sval.Sval", elem: "Value" };
    let set_reply = client.set("/sval", sel, Arg::Str("hi"), Duration::from_secs(1)).unwrap();
    let set_msg = set_reply.as_message().unwrap();
    assert_eq!(set_msg.op, Op::Response);
    assert_eq!(set_msg.value.unwrap().get_str().unwrap(), "");

    let get_reply = client.get("/sval", sel, Duration::from_secs(1)).unwrap();
    let get_msg = get_reply.as_message().unwrap();
    assert_eq!(get_msg.value.unwrap().get_str().unwrap(), "hi");

    client.close(ByeReason::Shutdown).unwrap();
    drop(client);
    handle.join().unwrap().unwrap();
}

#[test]
fn scenario_3_type_mismatch_on_set_returns_value_type_mismatch() {
    init_logging();
    let (client_stream, server_stream) = UnixStream::pair().unwrap();
    let server = Arc::new(Server::new(sval_registry(), SvalHandler { value: Mutex::new(String::new()) }));
    let s2 = Arc::clone(&server);
    let handle = std::thread::spawn(move || s2.serve_one(server_stream));

    let writer = client_stream.try_clone().unwrap();
    let client = Client::connect(writer, client_stream, |_| {}).unwrap();

    let sel = Selector { trait_name: "sval.Sval", elem: "Value" };
    let reply = client.set("/sval", sel, Arg::Int32(7), Duration::from_secs(1)).unwrap();
    let msg = reply.as_message().unwrap();
    let err = msg.value.unwrap().get_error().unwrap();
    assert_eq!(err.code, DiceyError::ValueTypeMismatch.code());

    client.close(ByeReason::Shutdown).unwrap();
    drop(client);
    handle.join().unwrap().unwrap();
}

#[test]
fn scenario_4_signal_subscription_via_alias_delivers_exactly_one_signal() {
    init_logging();
    let mut reg = Registry::with_builtins();
    let mut t = Trait::new("Timer");
    t.add_element("Fired", Element::signal("(xi)"));
    reg.add_trait(t).unwrap();
    reg.add_object("/t", ["Timer".to_string()]).unwrap();
    reg.add_alias("/alias", "/t").unwrap();

    let (client_stream, server_stream) = UnixStream::pair().unwrap();
    let server = Arc::new(Server::new(reg, SvalHandler { value: Mutex::new(String::new()) }));

    let (client_id, signals) = server.register_client();
    // The server's request/response loop owns `server_stream` exclusively
    // once it starts; a signal raised concurrently has to be written onto
    // a separate handle to the same socket. This is exactly the pumping
    // `Server::register_client`'s doc comment describes leaving to the
    // caller.
    let mut pump_writer = server_stream.try_clone().unwrap();
    let s2 = Arc::clone(&server);
    let handle = std::thread::spawn(move || s2.serve_one_with_id(client_id, server_stream));

    let pump = std::thread::spawn(move || {
        if let Ok(packet) = signals.recv() {
            let _ = write_packet(&mut pump_writer, &packet);
        }
    });

    let writer = client_stream.try_clone().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));
    let received2 = Arc::clone(&received);
    let client =
        Client::connect(writer, client_stream, move |packet: &Packet| received2.lock().unwrap().push(packet.clone()))
            .unwrap();

    let reply = client
        .exec(
            dicey::registry::builtins::PATH_SERVER,
            Selector { trait_name: "dicey.SignalManager", elem: "Subscribe" },
            Some(Arg::Pair(Box::new(Arg::Path("/alias")), Box::new(Arg::Selector(Selector { trait_name: "Timer", elem: "Fired" })))),
            Duration::from_secs(1),
        )
        .unwrap();
    let msg = reply.as_message().unwrap();
    assert_eq!(msg.value.unwrap().get_path().unwrap(), "/t");

    server
        .raise("/t", "Timer", "Fired", OwnedValue::Tuple(vec![OwnedValue::Int64(1), OwnedValue::Int32(2)]))
        .unwrap();

    pump.join().unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let got = received.lock().unwrap();
    assert_eq!(got.len(), 1);
    let signal_msg = got[0].as_message().unwrap();
    assert_eq!(signal_msg.op, Op::Signal);
    assert_eq!(signal_msg.path, "/t");

    client.close(ByeReason::Shutdown).unwrap();
    drop(client);
    handle.join().unwrap().unwrap();
}

#[test]
fn scenario_5_timeout_and_late_response_is_dropped() {
    init_logging();
    let (client_stream, server_stream) = UnixStream::pair().unwrap();
    let (tx, rx) = std::sync::mpsc::channel::<u32>();

    // A bare server side that completes the handshake, captures the
    // request's seq, and never answers until told to.
    let server_thread = std::thread::spawn(move || {
        let mut s = server_stream;
        let mut framing = PacketReader::new();
        let hello = framing.read_one(&mut s).unwrap();
        write_packet(&mut s, &Packet::hello(hello.seq(), Version::CURRENT)).unwrap();

        let request = framing.read_one(&mut s).unwrap();
        let seq = request.seq();

        let seq_to_answer = rx.recv().unwrap();
        assert_eq!(seq_to_answer, seq);

        let mut mb = MessageBuilder::new();
        mb.set_seq(seq);
        mb.begin(Op::Response).unwrap();
        mb.set_path("/never/answered").unwrap();
        mb.set_selector(Selector { trait_name: "x.X", elem: "y" }).unwrap();
        mb.set_value(Arg::Unit).unwrap();
        write_packet(&mut s, &mb.build().unwrap()).unwrap();
    });

    let writer = client_stream.try_clone().unwrap();
    let client = Client::connect(writer, client_stream, |_| {}).unwrap();

    let result = client.exec(
        "/never/answered",
        Selector { trait_name: "x.X", elem: "y" },
        Some(Arg::Unit),
        Duration::from_millis(100),
    );
    assert!(matches!(result, Err(DiceyError::TimedOut)));

    // Now let the late response arrive; the client must not crash, and no
    // caller remains waiting to receive it.
    tx.send(1).unwrap();
    server_thread.join().unwrap();
    std::thread::sleep(Duration::from_millis(50));

    client.close(ByeReason::Shutdown).unwrap();
    drop(client);
}

#[test]
fn scenario_6_introspection_reports_sval_trait_and_value_element() {
    init_logging();
    let (client_stream, server_stream) = UnixStream::pair().unwrap();
    let server = Arc::new(Server::new(sval_registry(), SvalHandler { value: Mutex::new(String::new()) }));
    let s2 = Arc::clone(&server);
    let handle = std::thread::spawn(move || s2.serve_one(server_stream));

    let writer = client_stream.try_clone().unwrap();
    let client = Client::connect(writer, client_stream, |_| {}).unwrap();

    let reply = client
        .get("/sval", Selector { trait_name: "dicey.Introspection", elem: "Data" }, Duration::from_secs(1))
        .unwrap();
    let msg = reply.as_message().unwrap();
    let traits = msg.value.unwrap().get_array().unwrap();

    let mut found_sval = false;
    for entry in traits {
        let pair = entry.unwrap().get_pair().unwrap();
        let trait_name = pair.first().unwrap().get_str().unwrap();
        if trait_name != "sval.Sval" {
            continue;
        }
        found_sval = true;
        let elements = pair.second().unwrap().get_array().unwrap();
        let mut found_value = false;
        for elem_entry in elements {
            let elem_pair = elem_entry.unwrap().get_pair().unwrap();
            if elem_pair.first().unwrap().get_str().unwrap() == "Value" {
                found_value = true;
                let mut info = elem_pair.second().unwrap().get_tuple().unwrap();
                let kind = info.next().unwrap().unwrap().get_byte().unwrap();
                let sig = info.next().unwrap().unwrap().get_str().unwrap();
                let readonly = info.next().unwrap().unwrap().get_bool().unwrap();
                assert_eq!(kind, 1); // Property
                assert_eq!(sig, "s");
                assert!(!readonly);
            }
        }
        assert!(found_value);
    }
    assert!(found_sval);

    client.close(ByeReason::Shutdown).unwrap();
    drop(client);
    handle.join().unwrap().unwrap();
}
