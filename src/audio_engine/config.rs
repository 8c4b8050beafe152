//! Explicit engine configuration handed to components at construction.

use std::time::Duration;

use crate::audio_engine::constants::{
    DEFAULT_BLOCK_SIZE, DEFAULT_POLL_INTERVAL_MS, DEFAULT_QUEUE_CAPACITY, DEFAULT_READ_TIMEOUT_MS,
    DEFAULT_SAMPLE_RATE, DEFAULT_WRITE_TIMEOUT_MS, SAMPLE_RATES, is_valid_block_size,
};
use crate::audio_engine::errors::{AudioError, ConversionError, ParameterError};
use crate::audio_engine::sample_format::SampleFormat;

/// Settings every registered component must agree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub sample_rate: u32,
    /// Frames per block.
    pub block_size: usize,
    /// Native sample format of device streams.
    pub sample_format: SampleFormat,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            sample_format: SampleFormat::Float32,
        }
    }
}

pub fn validate_sample_rate(sample_rate: u32) -> Result<(), ParameterError> {
    if SAMPLE_RATES.contains(&sample_rate) {
        Ok(())
    } else {
        Err(ParameterError::Range(format!(
            "sample rate {sample_rate} Hz is not one of {SAMPLE_RATES:?}"
        )))
    }
}

pub fn validate_block_size(block_size: usize) -> Result<(), ParameterError> {
    if is_valid_block_size(block_size) {
        Ok(())
    } else {
        Err(ParameterError::Range(format!(
            "block size {block_size} is not a power of two between 2 and 4096"
        )))
    }
}

/// Device streams carry 8, 16 or 32 bit integers or 32 bit floats.
pub fn validate_sample_format(sample_format: SampleFormat) -> Result<(), ConversionError> {
    match sample_format {
        SampleFormat::Int8 | SampleFormat::Int16 | SampleFormat::Int32 | SampleFormat::Float32 => {
            Ok(())
        }
        other => Err(ConversionError::Unsupported {
            from: other,
            to: SampleFormat::Float32,
        }),
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<(), AudioError> {
        validate_sample_rate(self.sample_rate)?;
        validate_block_size(self.block_size)?;
        validate_sample_format(self.sample_format)?;
        Ok(())
    }

    /// Real-time length of one block.
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / f64::from(self.sample_rate.max(1)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub stream: StreamConfig,
    /// Blocks each source or consumer queue can hold.
    pub queue_capacity: usize,
    /// Run loop polling interval.
    pub poll_interval: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub devices: DeviceSelection,
}

/// Which hardware the interface source and consumer open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSelection {
    /// Audio driver (cpal host) name. `None` selects the platform default.
    pub driver: Option<String>,
    /// Input device index within the driver. `None` selects the driver's default input.
    pub input_device: Option<usize>,
    pub output_device: Option<usize>,
    /// Physical input channels captured, in block channel order.
    pub input_channels: Vec<usize>,
    /// Physical output channels fed by the block channels. `None` feeds every device channel.
    pub output_channels: Option<Vec<usize>>,
}

impl Default for DeviceSelection {
    fn default() -> Self {
        Self {
            driver: None,
            input_device: None,
            output_device: None,
            input_channels: vec![0],
            output_channels: None,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
            devices: DeviceSelection::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.stream.validate().is_ok());
        assert_eq!(config.stream.sample_rate, 44_100);
        assert_eq!(config.stream.block_size, 128);
        assert_eq!(config.queue_capacity, 20);
        assert_eq!(config.devices.input_channels, vec![0]);
        assert!(config.devices.output_channels.is_none());
    }

    #[test]
    fn test_rejections() {
        assert!(matches!(validate_sample_rate(22_050), Err(ParameterError::Range(_))));
        assert!(matches!(validate_block_size(96), Err(ParameterError::Range(_))));
        assert!(validate_sample_format(SampleFormat::Float64).is_err());
        let bad = StreamConfig {
            sample_format: SampleFormat::UInt8,
            ..StreamConfig::default()
        };
        assert!(matches!(bad.validate(), Err(AudioError::Conversion(_))));
    }

    #[test]
    fn test_block_duration() {
        let config = StreamConfig {
            sample_rate: 8_000,
            block_size: 80,
            ..StreamConfig::default()
        };
        assert_eq!(config.block_duration(), Duration::from_millis(10));
    }
}
