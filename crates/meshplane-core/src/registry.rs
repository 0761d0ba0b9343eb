//! Service registry — bindings of published service names to channels.
//!
//! The [`RegistryStore`] is a thread-safe, shared map from the owning
//! [`ChannelId`] to the service it published. A binding lives exactly as
//! long as its channel: session close tears it down synchronously.

use crate::channel::ChannelId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// A published service: name plus a reachable address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceBinding {
    /// Service name used for lookup. Not unique across channels.
    pub name: String,
    /// Reachable host.
    pub host: String,
    /// Reachable port, always non-zero.
    pub port: u16,
}

/// Thread-safe registry of service bindings, keyed by owning channel.
#[derive(Debug, Clone, Default)]
pub struct RegistryStore {
    bindings: Arc<RwLock<HashMap<ChannelId, ServiceBinding>>>,
}

impl RegistryStore {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or overwrite the binding for a channel (last-write-wins).
    pub fn register(&self, channel: ChannelId, binding: ServiceBinding) {
        let mut bindings = self.bindings.write().unwrap_or_else(|e| e.into_inner());
        debug!(%channel, name = %binding.name, host = %binding.host, port = binding.port, "Registered service");
        bindings.insert(channel, binding);
    }

    /// Remove the binding owned by a channel. No-op if the channel never
    /// registered.
    pub fn unregister(&self, channel: ChannelId) -> Option<ServiceBinding> {
        let mut bindings = self.bindings.write().unwrap_or_else(|e| e.into_inner());
        let removed = bindings.remove(&channel);
        if let Some(binding) = &removed {
            debug!(%channel, name = %binding.name, "Unregistered service");
        }
        removed
    }

    /// Snapshot of all current bindings. Order is unspecified.
    pub fn list(&self) -> Vec<ServiceBinding> {
        let bindings = self.bindings.read().unwrap_or_else(|e| e.into_inner());
        bindings.values().cloned().collect()
    }

    /// Find the first binding with a matching name, if any.
    pub fn lookup(&self, name: &str) -> Option<ServiceBinding> {
        let bindings = self.bindings.read().unwrap_or_else(|e| e.into_inner());
        bindings.values().find(|b| b.name == name).cloned()
    }

    /// The binding owned by a specific channel, if any.
    pub fn binding_for(&self, channel: ChannelId) -> Option<ServiceBinding> {
        let bindings = self.bindings.read().unwrap_or_else(|e| e.into_inner());
        bindings.get(&channel).cloned()
    }

    /// Number of live bindings.
    pub fn len(&self) -> usize {
        let bindings = self.bindings.read().unwrap_or_else(|e| e.into_inner());
        bindings.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Administrative wipe. Testing/ops tooling only.
    pub fn reset(&self) {
        let mut bindings = self.bindings.write().unwrap_or_else(|e| e.into_inner());
        bindings.clear();
    }
}
