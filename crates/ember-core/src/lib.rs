//! Core library for Ember: the wire protocol, the keyspace and its TTL
//! engine, the RDB-compatible snapshot codec, the command dispatcher, and
//! the replica-side replication handshake.
//!
//! This crate owns no I/O loop and no CLI; `ember-server` composes these
//! pieces into a running TCP server, and `ember-cli` is a thin client.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod glob;
pub mod protocol;
pub mod replication;
pub mod snapshot;
pub mod store;

pub use config::{Config, Role};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::{Error, Result};
pub use protocol::{Frame, FrameCodec};
pub use store::{Keyspace, Value};

/// Shared, process-wide state handed to every connection task.
pub struct AppContext {
    /// Immutable startup configuration.
    pub config: std::sync::Arc<Config>,
    /// The shared keyspace and expiry table.
    pub keyspace: std::sync::Arc<Keyspace>,
}

impl AppContext {
    /// Builds a context and the dispatcher bound to it.
    #[must_use]
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(std::sync::Arc::clone(&self.keyspace), std::sync::Arc::clone(&self.config))
    }
}
