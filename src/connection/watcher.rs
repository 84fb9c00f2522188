// Device watcher - Turns host device polling into change notifications
//
// CPAL has no portable hot-plug callback, so a monitor thread polls the input
// side every couple of seconds and reports differences.

use crate::audio::device::{AudioDeviceManager, InputDeviceSnapshot};
use crossbeam_channel::{Receiver, Sender, select};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceChange {
    /// An input device appeared
    Added(String),
    /// An input device disappeared
    Removed(String),
    /// The host default input switched
    DefaultChanged(Option<String>),
}

/// Compare two polls and report the first relevant difference
pub fn diff_snapshots(
    previous: &InputDeviceSnapshot,
    current: &InputDeviceSnapshot,
) -> Option<DeviceChange> {
    if let Some(added) = current
        .names
        .iter()
        .find(|name| !previous.names.contains(name))
    {
        return Some(DeviceChange::Added(added.clone()));
    }
    if let Some(removed) = previous
        .names
        .iter()
        .find(|name| !current.names.contains(name))
    {
        return Some(DeviceChange::Removed(removed.clone()));
    }
    if previous.default_name != current.default_name {
        return Some(DeviceChange::DefaultChanged(current.default_name.clone()));
    }
    None
}

pub struct DeviceWatcher {
    shutdown_tx: Sender<()>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl DeviceWatcher {
    /// Spawn the polling thread; changes are sent on `changes`
    pub fn spawn(poll_interval: Duration, changes: Sender<DeviceChange>) -> Self {
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
        let thread_handle = thread::Builder::new()
            .name("device-watcher".into())
            .spawn(move || Self::run(poll_interval, changes, shutdown_rx))
            .ok();

        if thread_handle.is_none() {
            log::warn!("Could not spawn device watcher; hot-plug retry disabled");
        }

        Self {
            shutdown_tx,
            thread_handle,
        }
    }

    fn run(poll_interval: Duration, changes: Sender<DeviceChange>, shutdown: Receiver<()>) {
        let manager = AudioDeviceManager::new();
        let mut previous = manager.input_snapshot();

        loop {
            select! {
                recv(shutdown) -> _ => break,
                default(poll_interval) => {
                    let current = manager.input_snapshot();
                    if let Some(change) = diff_snapshots(&previous, &current) {
                        log::info!("Input device change: {:?}", change);
                        if changes.send(change).is_err() {
                            break;
                        }
                    }
                    previous = current;
                }
            }
        }
        log::debug!("Device watcher stopped");
    }
}

impl Drop for DeviceWatcher {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(default: Option<&str>, names: &[&str]) -> InputDeviceSnapshot {
        InputDeviceSnapshot {
            default_name: default.map(str::to_string),
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    #[test]
    fn test_no_change() {
        let a = snapshot(Some("Built-in"), &["Built-in"]);
        assert_eq!(diff_snapshots(&a, &a.clone()), None);
    }

    #[test]
    fn test_device_added() {
        let before = snapshot(Some("Built-in"), &["Built-in"]);
        let after = snapshot(Some("Built-in"), &["Built-in", "USB Interface"]);
        assert_eq!(
            diff_snapshots(&before, &after),
            Some(DeviceChange::Added("USB Interface".into()))
        );
    }

    #[test]
    fn test_device_removed() {
        let before = snapshot(Some("USB Interface"), &["Built-in", "USB Interface"]);
        let after = snapshot(Some("Built-in"), &["Built-in"]);
        assert_eq!(
            diff_snapshots(&before, &after),
            Some(DeviceChange::Removed("USB Interface".into()))
        );
    }

    #[test]
    fn test_default_switched() {
        let before = snapshot(Some("Built-in"), &["Built-in", "USB Interface"]);
        let after = snapshot(Some("USB Interface"), &["Built-in", "USB Interface"]);
        assert_eq!(
            diff_snapshots(&before, &after),
            Some(DeviceChange::DefaultChanged(Some("USB Interface".into())))
        );
    }
}
