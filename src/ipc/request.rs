//! Client-side request/response correlation.
//!
//! Every outbound `GET`/`SET`/`EXEC` is tagged with a `seq`; the matching
//! `RESPONSE` carries the same `seq` back. [`PendingRequests`] is the table
//! a client's reader loop consults to route an incoming response to the
//! thread blocked waiting for it.

use std::collections::HashMap;
use std::sync::mpsc;
use std::time::Duration;

use crate::error::{DiceyError, Result};
use crate::wire::packet::Packet;

/// Table of in-flight requests, keyed by `seq`. Not thread-safe on its own;
/// callers wrap it in a `Mutex` (see [`crate::ipc::client::Client`]).
#[derive(Default)]
pub struct PendingRequests {
    waiting: HashMap<u32, mpsc::Sender<Packet>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        PendingRequests { waiting: HashMap::new() }
    }

    /// Registers `seq` as in-flight, returning the receiving half the
    /// caller should block on.
    pub fn register(&mut self, seq: u32) -> mpsc::Receiver<Packet> {
        let (tx, rx) = mpsc::channel();
        self.waiting.insert(seq, tx);
        rx
    }

    pub fn cancel(&mut self, seq: u32) {
        self.waiting.remove(&seq);
    }

    /// Number of requests currently awaiting a response.
    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }

    /// Routes an incoming `RESPONSE` packet to its waiting caller, if any
    /// is still waiting (it may have already timed out).
    pub fn complete(&mut self, seq: u32, response: Packet) {
        if let Some(tx) = self.waiting.remove(&seq) {
            let _ = tx.send(response);
        }
    }
}

/// Blocks on `rx` until either the response arrives or `timeout` elapses.
/// On timeout the caller is responsible for calling
/// [`PendingRequests::cancel`] so a late response does not leak a sender.
pub fn wait_for_response(rx: &mpsc::Receiver<Packet>, timeout: Duration) -> Result<Packet> {
    rx.recv_timeout(timeout).map_err(|_| DiceyError::TimedOut)
}
