//! Channel identity and the outbound half of a transport connection.
//!
//! The core never touches sockets. A live connection is represented by an
//! opaque [`ChannelId`] plus a [`ChannelSink`] the transport hands in, and
//! liveness is communicated explicitly through session close.

use crate::error::MeshResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identity of one live bidirectional connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub Uuid);

impl ChannelId {
    /// Create a new random ChannelId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The only outbound capability the core needs from a transport: send one
/// text frame. Implemented by the WebSocket server, and by in-memory
/// sinks in tests.
#[async_trait]
pub trait ChannelSink: Send + Sync + 'static {
    /// Send a single text frame to the peer.
    async fn send_text(&self, frame: String) -> MeshResult<()>;
}
