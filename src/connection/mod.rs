// Connection module - Audio device status and reconnection policy

pub mod reconnect;
pub mod status;
pub mod watcher;

pub use reconnect::ReconnectionStrategy;
pub use status::{AtomicDeviceStatus, DeviceStatus};
pub use watcher::{DeviceChange, DeviceWatcher};
