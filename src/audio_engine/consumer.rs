//! Audio consumers: where processed blocks go.

use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait};

use crate::audio_engine::audio_stream::{
    DeviceStream, OutputRenderer, XrunCounter, build_output_stream, stream_config,
};
use crate::audio_engine::config::{DeviceSelection, EngineConfig, StreamConfig};
use crate::audio_engine::device::{device_at, open_host};
use crate::audio_engine::errors::AudioError;
use crate::audio_engine::queue::{BlockSender, block_queue};
use crate::audio_engine::sample_format::SampleFormat;
use crate::messages::AudioBlock;

pub trait AudioConsumer: Send {
    fn name(&self) -> &str;

    /// Starts accepting blocks. Returns the device stream to keep alive, if one was opened.
    fn start_stream(&mut self) -> Result<Option<DeviceStream>, AudioError>;

    fn stop_stream(&mut self);

    /// Accepts one processed block. May wait briefly for room; never fails.
    fn write(&mut self, block: AudioBlock);

    fn set_sample_rate(&mut self, sample_rate: u32);

    fn set_block_size(&mut self, block_size: usize);

    fn set_sample_format(&mut self, sample_format: SampleFormat);

    fn set_device_selection(&mut self, _devices: &DeviceSelection) {}
}

/// Plays blocks on a live output device.
pub struct InterfaceConsumer {
    devices: DeviceSelection,
    stream: StreamConfig,
    queue_capacity: usize,
    write_timeout: Duration,
    sender: Option<BlockSender>,
    underruns: XrunCounter,
    dropped: usize,
}

impl InterfaceConsumer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            devices: config.devices.clone(),
            stream: config.stream,
            queue_capacity: config.queue_capacity,
            write_timeout: config.write_timeout,
            sender: None,
            underruns: XrunCounter::default(),
            dropped: 0,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.sender.is_some()
    }

    /// Blocks dropped since the stream started because the device stopped draining its queue.
    pub fn dropped_blocks(&self) -> usize {
        self.dropped
    }
}

impl AudioConsumer for InterfaceConsumer {
    fn name(&self) -> &str {
        "Interface Audio Consumer"
    }

    fn start_stream(&mut self) -> Result<Option<DeviceStream>, AudioError> {
        self.stop_stream();

        let (_, host) = open_host(self.devices.driver.as_deref())?;
        let device = match self.devices.output_device {
            Some(index) => device_at(&host, index)?,
            None => host
                .default_output_device()
                .ok_or(AudioError::NoDevice("output"))?,
        };
        let device_channels = device.default_output_config()?.channels();
        let output_channels = self
            .devices
            .output_channels
            .clone()
            .unwrap_or_else(|| (0..usize::from(device_channels)).collect());
        let config = stream_config(
            device_channels,
            self.stream.sample_rate,
            self.stream.block_size,
        );

        let (sender, receiver) = block_queue(self.queue_capacity);
        let renderer = OutputRenderer::new(
            receiver,
            usize::from(device_channels),
            output_channels,
            self.underruns.clone(),
        );
        let stream = build_output_stream(&device, &config, self.stream.sample_format, renderer)?;
        let stream = DeviceStream::play(stream, self.name())?;
        self.sender = Some(sender);
        self.dropped = 0;
        Ok(Some(stream))
    }

    fn stop_stream(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        let underruns = self.underruns.take();
        if underruns > 0 {
            log::warn!("{} played silence {underruns} times", self.name());
        }
        if self.dropped > 0 {
            log::warn!("{} dropped {} blocks", self.name(), self.dropped);
        }
    }

    fn write(&mut self, block: AudioBlock) {
        let Some(sender) = self.sender.as_mut() else {
            return;
        };
        if sender.push_timeout(block, self.write_timeout).is_err() {
            self.dropped += 1;
        }
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        log::debug!("Setting {} sample rate to {sample_rate}", self.name());
        self.stream.sample_rate = sample_rate;
    }

    fn set_block_size(&mut self, block_size: usize) {
        log::debug!("Setting {} block size to {block_size}", self.name());
        self.stream.block_size = block_size;
    }

    fn set_sample_format(&mut self, sample_format: SampleFormat) {
        log::debug!("Setting {} sample format to {sample_format}", self.name());
        self.stream.sample_format = sample_format;
    }

    fn set_device_selection(&mut self, devices: &DeviceSelection) {
        log::debug!(
            "Setting {} device to {:?}, channels {:?}",
            self.name(),
            devices.output_device,
            devices.output_channels
        );
        self.devices = devices.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_consumer_discards_writes() {
        let mut consumer = InterfaceConsumer::new(&EngineConfig::default());
        assert!(!consumer.is_streaming());
        consumer.write(AudioBlock::silence(2, 128));
        assert_eq!(consumer.dropped_blocks(), 0);
        consumer.stop_stream();
    }

    #[test]
    fn test_settings_are_applied() {
        let mut consumer = InterfaceConsumer::new(&EngineConfig::default());
        consumer.set_sample_rate(48_000);
        consumer.set_block_size(256);
        consumer.set_sample_format(SampleFormat::Int16);
        assert_eq!(
            consumer.stream,
            StreamConfig {
                sample_rate: 48_000,
                block_size: 256,
                sample_format: SampleFormat::Int16,
            }
        );
        let devices = DeviceSelection {
            output_channels: Some(vec![1]),
            ..DeviceSelection::default()
        };
        consumer.set_device_selection(&devices);
        assert_eq!(consumer.devices, devices);
    }
}
