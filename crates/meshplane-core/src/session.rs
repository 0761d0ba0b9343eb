//! Channel session — per-connection glue between transport and core.
//!
//! A [`ChannelSession`] owns the [`ChannelId`] for one live connection,
//! forwards inbound frames to the dispatcher, pushes responses back out
//! through the transport's [`ChannelSink`], and on close tears down the
//! channel's registry binding. The [`SessionTable`] is the explicit table
//! of live sessions.

use crate::channel::{ChannelId, ChannelSink};
use crate::dispatch::Dispatcher;
use crate::registry::RegistryStore;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Per-connection glue. Holds no request state of its own.
pub struct ChannelSession {
    id: ChannelId,
    dispatcher: Arc<Dispatcher>,
    registry: RegistryStore,
    sink: Arc<dyn ChannelSink>,
}

impl ChannelSession {
    /// Create a session with a fresh channel identity.
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        registry: RegistryStore,
        sink: Arc<dyn ChannelSink>,
    ) -> Self {
        Self {
            id: ChannelId::new(),
            dispatcher,
            registry,
            sink,
        }
    }

    /// The channel identity owned by this session.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Handle one inbound text frame: dispatch it and, if a response is
    /// produced, send it back. A send failure means the channel died
    /// mid-flight; that is the transport's concern, so it is logged and
    /// swallowed here.
    pub async fn handle_frame(&self, raw: &str) {
        if let Some(response) = self.dispatcher.dispatch(self.id, raw).await {
            if let Err(e) = self.sink.send_text(response).await {
                debug!(channel = %self.id, error = %e, "Dropped response for closed channel");
            }
        }
    }

    /// Channel close notification. Unconditionally removes this channel's
    /// registry binding; must be called exactly once, and must not wait on
    /// any in-flight request.
    pub fn closed(&self) {
        if let Some(binding) = self.registry.unregister(self.id) {
            info!(channel = %self.id, name = %binding.name, "Channel closed, binding removed");
        } else {
            debug!(channel = %self.id, "Channel closed");
        }
    }
}

/// A live session entry.
#[derive(Clone)]
pub struct SessionEntry {
    /// The session itself.
    pub session: Arc<ChannelSession>,
    /// When the connection was accepted.
    pub connected_at: DateTime<Utc>,
}

/// Explicit table of live sessions, keyed by channel identity.
#[derive(Default)]
pub struct SessionTable {
    sessions: DashMap<ChannelId, SessionEntry>,
}

impl SessionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly accepted session.
    pub fn insert(&self, session: Arc<ChannelSession>) {
        self.sessions.insert(
            session.id(),
            SessionEntry {
                session,
                connected_at: Utc::now(),
            },
        );
    }

    /// Stop tracking a session after its channel closed.
    pub fn remove(&self, id: ChannelId) -> Option<SessionEntry> {
        self.sessions.remove(&id).map(|(_, entry)| entry)
    }

    /// Look up a live session.
    pub fn get(&self, id: ChannelId) -> Option<SessionEntry> {
        self.sessions.get(&id).map(|r| r.value().clone())
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether any sessions are live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
