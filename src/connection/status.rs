// Device connection status shared between the capture worker and its readers

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Error = 3,
}

impl DeviceStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, DeviceStatus::Connected)
    }

    /// Disconnected or failed: a retry may be attempted
    pub fn needs_reconnect(&self) -> bool {
        matches!(self, DeviceStatus::Disconnected | DeviceStatus::Error)
    }
}

impl From<u8> for DeviceStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => DeviceStatus::Disconnected,
            1 => DeviceStatus::Connecting,
            2 => DeviceStatus::Connected,
            3 => DeviceStatus::Error,
            _ => DeviceStatus::Disconnected,
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DeviceStatus::Disconnected => "disconnected",
            DeviceStatus::Connecting => "connecting",
            DeviceStatus::Connected => "connected",
            DeviceStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// Atomic wrapper to share the status between threads
#[derive(Debug, Clone)]
pub struct AtomicDeviceStatus {
    inner: Arc<AtomicU8>,
}

impl AtomicDeviceStatus {
    pub fn new(status: DeviceStatus) -> Self {
        Self {
            inner: Arc::new(AtomicU8::new(status as u8)),
        }
    }

    pub fn get(&self) -> DeviceStatus {
        DeviceStatus::from(self.inner.load(Ordering::Relaxed))
    }

    pub fn set(&self, status: DeviceStatus) {
        self.inner.store(status as u8, Ordering::Relaxed);
    }
}

impl Default for AtomicDeviceStatus {
    fn default() -> Self {
        Self::new(DeviceStatus::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_through_atomic() {
        let status = AtomicDeviceStatus::default();
        assert_eq!(status.get(), DeviceStatus::Disconnected);

        let reader = status.clone();
        status.set(DeviceStatus::Connected);
        assert_eq!(reader.get(), DeviceStatus::Connected);
        assert!(reader.get().is_connected());
    }

    #[test]
    fn test_unknown_value_maps_to_disconnected() {
        assert_eq!(DeviceStatus::from(42), DeviceStatus::Disconnected);
    }

    #[test]
    fn test_needs_reconnect() {
        assert!(DeviceStatus::Error.needs_reconnect());
        assert!(DeviceStatus::Disconnected.needs_reconnect());
        assert!(!DeviceStatus::Connecting.needs_reconnect());
        assert!(!DeviceStatus::Connected.needs_reconnect());
    }
}
