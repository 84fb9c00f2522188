// CPAL device discovery for capture (bass input) and playback (click track)

use super::AudioError;
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host, SampleRate, SupportedStreamConfig, SupportedStreamConfigRange};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioDeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// What the host currently exposes on the input side
///
/// Compared between polls to detect plug/unplug and default-device switches.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InputDeviceSnapshot {
    pub default_name: Option<String>,
    pub names: Vec<String>,
}

pub struct AudioDeviceManager {
    host: Host,
}

impl AudioDeviceManager {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// All capture devices the host can open
    pub fn list_input_devices(&self) -> Vec<AudioDeviceInfo> {
        let default_name = self
            .host
            .default_input_device()
            .and_then(|d| d.name().ok())
            .unwrap_or_default();

        let mut devices = Vec::new();
        if let Ok(input_devices) = self.host.input_devices() {
            for (index, device) in input_devices.enumerate() {
                if let Ok(name) = device.name() {
                    devices.push(AudioDeviceInfo {
                        id: format!("audio_in_{}", index),
                        is_default: name == default_name,
                        name,
                    });
                }
            }
        }
        devices
    }

    /// All playback devices the host can open
    pub fn list_output_devices(&self) -> Vec<AudioDeviceInfo> {
        let default_name = self
            .host
            .default_output_device()
            .and_then(|d| d.name().ok())
            .unwrap_or_default();

        let mut devices = Vec::new();
        if let Ok(output_devices) = self.host.output_devices() {
            for (index, device) in output_devices.enumerate() {
                if let Ok(name) = device.name() {
                    devices.push(AudioDeviceInfo {
                        id: format!("audio_out_{}", index),
                        is_default: name == default_name,
                        name,
                    });
                }
            }
        }
        devices
    }

    pub fn input_snapshot(&self) -> InputDeviceSnapshot {
        let default_name = self
            .host
            .default_input_device()
            .and_then(|d| d.name().ok());
        let mut names: Vec<String> = self
            .host
            .input_devices()
            .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
            .unwrap_or_default();
        names.sort();
        InputDeviceSnapshot {
            default_name,
            names,
        }
    }

    /// Named input device, or the host default when `name` is `None`
    pub fn input_device(&self, name: Option<&str>) -> Option<Device> {
        match name {
            None => self.host.default_input_device(),
            Some(wanted) => self.host.input_devices().ok()?.find(|device| {
                device
                    .name()
                    .map(|device_name| device_name == wanted)
                    .unwrap_or(false)
            }),
        }
    }

    /// Named output device, or the host default when `name` is `None`
    pub fn output_device(&self, name: Option<&str>) -> Option<Device> {
        match name {
            None => self.host.default_output_device(),
            Some(wanted) => self.host.output_devices().ok()?.find(|device| {
                device
                    .name()
                    .map(|device_name| device_name == wanted)
                    .unwrap_or(false)
            }),
        }
    }
}

/// Capture configuration at `preferred_rate` when the device supports it, else its default
pub fn input_config(
    device: &Device,
    preferred_rate: Option<u32>,
) -> Result<SupportedStreamConfig, AudioError> {
    if let Some(rate) = preferred_rate {
        if let Some(config) = pick_rate(device.supported_input_configs()?, rate) {
            return Ok(config);
        }
        log::debug!("Input device has no {} Hz mode, using its default", rate);
    }
    Ok(device.default_input_config()?)
}

/// Playback counterpart of [`input_config`]
pub fn output_config(
    device: &Device,
    preferred_rate: Option<u32>,
) -> Result<SupportedStreamConfig, AudioError> {
    if let Some(rate) = preferred_rate {
        if let Some(config) = pick_rate(device.supported_output_configs()?, rate) {
            return Ok(config);
        }
        log::debug!("Output device has no {} Hz mode, using its default", rate);
    }
    Ok(device.default_output_config()?)
}

fn pick_rate(
    mut ranges: impl Iterator<Item = SupportedStreamConfigRange>,
    rate: u32,
) -> Option<SupportedStreamConfig> {
    ranges
        .find(|range| range.min_sample_rate().0 <= rate && rate <= range.max_sample_rate().0)
        .map(|range| range.with_sample_rate(SampleRate(rate)))
}

impl Default for AudioDeviceManager {
    fn default() -> Self {
        Self::new()
    }
}
