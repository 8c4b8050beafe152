//! Read-only directory of audio drivers (cpal hosts) and their devices.
//!
//! Devices are identified by their position in the host's enumeration order, which is stable for
//! as long as the hardware does not change.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host, SupportedBufferSize};

use crate::audio_engine::errors::AudioError;
use crate::audio_engine::sample_format::SampleFormat;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDriverInfo {
    pub index: usize,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDeviceInfo {
    pub index: usize,
    pub name: String,
    pub max_input_channels: u16,
    pub max_output_channels: u16,
    pub default_sample_rate: Option<u32>,
    /// Native format of the default configuration, when it has a counterpart in [`SampleFormat`].
    pub default_sample_format: Option<SampleFormat>,
    /// Smallest and largest callback buffer sizes in frames, when the driver reports them.
    pub buffer_size_range: Option<(u32, u32)>,
}

/// Snapshot of one driver and everything attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioInterfaceInfo {
    pub driver: AudioDriverInfo,
    pub devices: Vec<AudioDeviceInfo>,
    pub default_input_device: Option<usize>,
    pub default_output_device: Option<usize>,
}

impl AudioInterfaceInfo {
    /// Enumerates the named driver, or the default one.
    pub fn query(driver: Option<&str>) -> Result<Self, AudioError> {
        let (driver, host) = open_host(driver)?;
        let devices = host
            .devices()?
            .enumerate()
            .map(|(index, device)| describe(index, &device))
            .collect::<Vec<_>>();

        let default_input_device = host
            .default_input_device()
            .and_then(|d| device_name(&d).ok())
            .and_then(|name| {
                devices
                    .iter()
                    .find(|i| i.name == name && i.max_input_channels > 0)
                    .map(|i| i.index)
            });
        let default_output_device = host
            .default_output_device()
            .and_then(|d| device_name(&d).ok())
            .and_then(|name| {
                devices
                    .iter()
                    .find(|i| i.name == name && i.max_output_channels > 0)
                    .map(|i| i.index)
            });

        Ok(Self {
            driver,
            devices,
            default_input_device,
            default_output_device,
        })
    }

    pub fn input_devices(&self) -> impl Iterator<Item = &AudioDeviceInfo> {
        self.devices.iter().filter(|d| d.max_input_channels > 0)
    }

    pub fn output_devices(&self) -> impl Iterator<Item = &AudioDeviceInfo> {
        self.devices.iter().filter(|d| d.max_output_channels > 0)
    }
}

/// Drivers compiled into this build.
pub fn drivers() -> Vec<AudioDriverInfo> {
    cpal::available_hosts()
        .into_iter()
        .enumerate()
        .map(|(index, id)| AudioDriverInfo {
            index,
            name: id.name().to_string(),
        })
        .collect()
}

/// Opens the named driver, or the platform default when `name` is `None`.
pub fn open_host(name: Option<&str>) -> Result<(AudioDriverInfo, Host), AudioError> {
    let Some(name) = name else {
        let host = cpal::default_host();
        let id = host.id();
        let index = cpal::available_hosts()
            .iter()
            .position(|h| *h == id)
            .unwrap_or_default();
        let info = AudioDriverInfo {
            index,
            name: id.name().to_string(),
        };
        return Ok((info, host));
    };
    let (index, id) = cpal::available_hosts()
        .into_iter()
        .enumerate()
        .find(|(_, id)| id.name() == name)
        .ok_or(AudioError::NoDevice("driver"))?;
    let host = cpal::host_from_id(id)?;
    let info = AudioDriverInfo {
        index,
        name: id.name().to_string(),
    };
    Ok((info, host))
}

/// Looks up a device by enumeration index.
pub fn device_at(host: &Host, index: usize) -> Result<Device, AudioError> {
    host.devices()?
        .nth(index)
        .ok_or(AudioError::DeviceIndex(index))
}

#[allow(deprecated)]
pub fn device_name(device: &Device) -> Result<String, AudioError> {
    Ok(device.name()?)
}

fn channel_and_buffer_limits<I>(configs: I) -> (u16, Option<(u32, u32)>)
where
    I: Iterator<Item = cpal::SupportedStreamConfigRange>,
{
    configs.fold((0, None), |(channels, range), config| {
        let range = match (*config.buffer_size(), range) {
            (SupportedBufferSize::Range { min, max }, Some((lo, hi))) => {
                Some((min.min(lo), max.max(hi)))
            }
            (SupportedBufferSize::Range { min, max }, None) => Some((min, max)),
            (SupportedBufferSize::Unknown, range) => range,
        };
        (channels.max(config.channels()), range)
    })
}

fn describe(index: usize, device: &Device) -> AudioDeviceInfo {
    let name = device_name(device).unwrap_or_else(|_| format!("Device {index}"));

    let (max_input_channels, input_range) = device
        .supported_input_configs()
        .map(channel_and_buffer_limits)
        .unwrap_or((0, None));
    let (max_output_channels, output_range) = device
        .supported_output_configs()
        .map(channel_and_buffer_limits)
        .unwrap_or((0, None));

    let default_config = device
        .default_output_config()
        .or_else(|_| device.default_input_config())
        .ok();

    AudioDeviceInfo {
        index,
        name,
        max_input_channels,
        max_output_channels,
        default_sample_rate: default_config.as_ref().map(|c| c.sample_rate()),
        default_sample_format: default_config
            .as_ref()
            .and_then(|c| SampleFormat::from_cpal(c.sample_format())),
        buffer_size_range: output_range.or(input_range),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drivers_are_indexed_in_order() {
        let drivers = drivers();
        for (i, driver) in drivers.iter().enumerate() {
            assert_eq!(driver.index, i);
            assert!(!driver.name.is_empty());
        }
    }

    #[test]
    fn test_unknown_driver_is_rejected() {
        assert!(matches!(
            open_host(Some("no such driver")),
            Err(AudioError::NoDevice("driver"))
        ));
    }

    #[test]
    fn test_query_default_driver() {
        // Hosts without audio hardware may fail to enumerate; only check consistency when it works.
        let Ok(info) = AudioInterfaceInfo::query(None) else {
            return;
        };
        for (i, device) in info.devices.iter().enumerate() {
            assert_eq!(device.index, i);
        }
        if let Some(index) = info.default_output_device {
            assert!(info.devices[index].max_output_channels > 0);
        }
    }
}
