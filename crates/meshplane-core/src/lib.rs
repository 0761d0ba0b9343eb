//! meshplane-core — control plane for a service mesh.
//!
//! Peers connect over a persistent bidirectional channel, speak a
//! JSON-RPC 2.0 protocol, register as named services, discover each other
//! by name, and exchange messages with at-least-once delivery across
//! reconnects.
//!
//! ## Architecture
//!
//! - **Dispatcher**: parses, validates and routes envelopes to handlers
//! - **RegistryStore**: service bindings tied to channel lifetime
//! - **QueueStore**: ordered, deduplicated, acknowledgable delivery queues
//! - **ChannelSession**: per-connection glue between transport and core
//! - **AuthProvider**: delegated password/2FA collaborator

pub mod auth;
pub mod channel;
pub mod dispatch;
pub mod error;
pub mod queue;
pub mod registry;
pub mod session;

pub use auth::{AuthProvider, MemoryAuth};
pub use channel::{ChannelId, ChannelSink};
pub use dispatch::Dispatcher;
pub use error::{MeshError, MeshResult};
pub use queue::{PendingMessage, QueueStore};
pub use registry::{RegistryStore, ServiceBinding};
pub use session::{ChannelSession, SessionTable};

use std::sync::Arc;

/// Everything a transport needs to serve the control plane: the shared
/// stores, the dispatcher built over them, and the live session table.
#[derive(Clone)]
pub struct ControlPlane {
    /// Service bindings keyed by channel.
    pub registry: RegistryStore,
    /// Per-recipient delivery queues.
    pub queues: QueueStore,
    /// The routing layer.
    pub dispatcher: Arc<Dispatcher>,
    /// Live sessions.
    pub sessions: Arc<SessionTable>,
}

impl ControlPlane {
    /// Wire up fresh stores and a dispatcher for the given service name
    /// and auth collaborator.
    pub fn new(service_name: impl Into<String>, auth: Arc<dyn AuthProvider>) -> Self {
        let registry = RegistryStore::new();
        let queues = QueueStore::new();
        let dispatcher = Arc::new(Dispatcher::new(
            service_name,
            registry.clone(),
            queues.clone(),
            auth,
        ));
        Self {
            registry,
            queues,
            dispatcher,
            sessions: Arc::new(SessionTable::new()),
        }
    }

    /// Open a session for a freshly accepted channel and track it.
    pub fn open_session(&self, sink: Arc<dyn ChannelSink>) -> Arc<ChannelSession> {
        let session = Arc::new(ChannelSession::new(
            Arc::clone(&self.dispatcher),
            self.registry.clone(),
            sink,
        ));
        self.sessions.insert(Arc::clone(&session));
        session
    }

    /// Tear down a session after its channel closed: registry cleanup
    /// first, then the table entry.
    pub fn close_session(&self, session: &ChannelSession) {
        session.closed();
        self.sessions.remove(session.id());
    }
}
