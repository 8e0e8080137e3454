//! Connection Registry
//!
//! Tracks which devices currently hold a live authenticated WebSocket so the
//! server can push freshly queued envelopes instead of waiting for the next
//! connect. Each live connection registers a wake channel; the message path
//! nudges it whenever the device's queue grows.
//!
//! Only one consumer per device: a reconnect replaces the previous channel
//! and the stale connection's receiver observes the close.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::mpsc;
use uuid::Uuid;

/// Key identifying one device's delivery stream.
pub type DeviceKey = (Uuid, u32);

/// Thread-safe registry of connected devices.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<DeviceKey, mpsc::UnboundedSender<()>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        ConnectionRegistry {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a connected device. Returns the wake receiver.
    pub fn register(&self, aci: Uuid, device_id: u32) -> mpsc::UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut connections = self.connections.write().unwrap();
        connections.insert((aci, device_id), tx);
        rx
    }

    /// Unregisters a device; a newer registration for the same device wins.
    pub fn unregister(&self, aci: Uuid, device_id: u32) {
        let mut connections = self.connections.write().unwrap();
        connections.remove(&(aci, device_id));
    }

    /// Wakes the device's consumer. Returns false if no consumer is attached.
    pub fn notify(&self, aci: Uuid, device_id: u32) -> bool {
        let connections = self.connections.read().unwrap();
        match connections.get(&(aci, device_id)) {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub fn connected_count(&self) -> usize {
        self.connections.read().unwrap().len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_notify() {
        let registry = ConnectionRegistry::new();
        let aci = Uuid::new_v4();
        let mut rx = registry.register(aci, 1);

        assert!(registry.notify(aci, 1));
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_notify_offline_device() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.notify(Uuid::new_v4(), 1));
    }

    #[tokio::test]
    async fn test_unregister() {
        let registry = ConnectionRegistry::new();
        let aci = Uuid::new_v4();
        let _rx = registry.register(aci, 1);

        assert_eq!(registry.connected_count(), 1);
        registry.unregister(aci, 1);
        assert_eq!(registry.connected_count(), 0);
        assert!(!registry.notify(aci, 1));
    }

    #[tokio::test]
    async fn test_reconnection_replaces_channel() {
        let registry = ConnectionRegistry::new();
        let aci = Uuid::new_v4();
        let _rx_old = registry.register(aci, 1);
        let mut rx_new = registry.register(aci, 1);

        assert_eq!(registry.connected_count(), 1);
        assert!(registry.notify(aci, 1));
        assert!(rx_new.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_devices_are_independent() {
        let registry = ConnectionRegistry::new();
        let aci = Uuid::new_v4();
        let mut rx1 = registry.register(aci, 1);
        let mut rx2 = registry.register(aci, 2);

        assert!(registry.notify(aci, 2));
        assert!(rx2.recv().await.is_some());
        assert!(rx1.try_recv().is_err());
    }
}
