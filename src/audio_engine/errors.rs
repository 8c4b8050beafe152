//! Error types for the parameter model, format conversion, file loading and device streams.

use thiserror::Error;

use crate::audio_engine::sample_format::SampleFormat;

/// Errors raised synchronously by knob, footswitch and pedal mutators.
///
/// A call that returns one of these leaves the target object unmodified.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    /// A value lies outside its declared bounds.
    #[error("{0}")]
    Range(String),

    /// Knob precision is not smaller than the knob span.
    #[error("precision {precision} must be less than the knob span {span}")]
    Precision { precision: f64, span: f64 },

    /// Unknown knob mode or footswitch mode.
    #[error("invalid mode '{0}'")]
    Mode(String),

    /// Unknown footswitch type, or an operation not valid for the current type.
    #[error("invalid footswitch type: {0}")]
    InvalidType(String),

    /// Empty or otherwise invalid identifier.
    #[error("name must be a non-empty string")]
    Name,

    /// A named knob, footswitch or variant is already registered.
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    /// A named knob, footswitch or variant is not registered.
    #[error("{kind} '{name}' does not exist")]
    DoesNotExist { kind: &'static str, name: String },
}

/// Errors raised by the sample format converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// No mapping is defined between the two formats.
    #[error("unsupported conversion from {from} to {to}")]
    Unsupported { from: SampleFormat, to: SampleFormat },
}

/// Errors that can occur while loading audio files.
#[derive(Debug, Error)]
pub enum SampleLoadError {
    /// Failed to open the audio file.
    #[error("failed to open file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to decode the audio file.
    #[error("failed to decode audio file: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    /// Audio file has no default track.
    #[error("audio file has no default track")]
    NoDefaultTrack,

    /// Audio file is missing sample rate information.
    #[error("audio file is missing a sample rate")]
    MissingSampleRate,

    /// Audio file is missing channel information.
    #[error("audio file is missing channel information")]
    MissingChannels,

    /// Audio file decoded to zero frames.
    #[error("audio file contains no frames")]
    Empty,
}

/// Errors surfaced by sources, consumers and the pipeline controller.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The operation is not supported by this component.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// No device has been selected or none is available.
    #[error("no {0} device available")]
    NoDevice(&'static str),

    /// The selected device index no longer exists on the host.
    #[error("device index {0} not found")]
    DeviceIndex(usize),

    #[error("failed to enumerate audio hosts: {0}")]
    Host(#[from] cpal::HostUnavailable),

    #[error("failed to enumerate audio devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query device name: {0}")]
    DeviceName(#[from] cpal::DeviceNameError),

    #[error("failed to query supported stream configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("failed to query default stream config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build audio stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    SampleLoad(#[from] SampleLoadError),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    /// The processing thread panicked; its components were lost.
    #[error("processing thread panicked")]
    WorkerPanicked,
}
