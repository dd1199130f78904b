//! A full implementation of the Dicey IPC protocol: wire format, typed
//! data model, object registry, and client/server runtime.
//!
//! - [`wire`] -- packet framing, the closed type system, signature
//!   grammar, and the value/builder pair that turn bytes into typed values
//!   and back.
//! - [`hashtable`] -- the insert/update-reporting table the registry is
//!   built on.
//! - [`registry`] -- objects, traits, elements and path aliases.
//! - [`ipc`] -- the client and server runtimes, and the transport
//!   abstraction they sit on.
//! - [`error`] -- the stable `DiceyError` codes shared by every layer.

pub mod error;
pub mod hashtable;
pub mod ipc;
pub mod registry;
pub mod wire;

pub use error::{DiceyError, Result};

/// Test-only logging init, shared by unit tests that want to eyeball log
/// output while debugging a failure. Never required for a test to pass.
#[cfg(test)]
pub(crate) mod test_support {
    pub(crate) fn init_logging() {
        static INIT: std::sync::Once = std::sync::Once::new();
        INIT.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });
    }
}
