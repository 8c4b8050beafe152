//! Audio Engine Module
//!
//! This module provides the real-time audio pipeline. It is organized into sub-modules, each with
//! a specific responsibility:
//!
//! - [`audio_stream`]: cpal streams and the device-callback halves of the pipeline
//! - [`channels`]: channel selection and interleaving
//! - [`config`]: explicit engine configuration
//! - [`constants`]: Configuration constants and limits
//! - [`consumer`]: where processed blocks go
//! - [`controller`]: the processing thread and its reconfiguration
//! - [`device`]: driver and device directory
//! - [`errors`]: Audio-specific error types
//! - [`queue`]: bounded block queue between callbacks and the processing thread
//! - [`sample_format`]: sample format conversion
//! - [`sample_loader`]: Audio file loading and decoding
//! - [`source`]: where blocks come from
//!
//! The [`PipelineController`] ties these together: it pulls a block from the active source, runs
//! it through the active processor and hands it to the consumer.

pub mod audio_stream;
pub mod channels;
pub mod config;
pub mod constants;
pub mod consumer;
pub mod controller;
pub mod device;
pub mod errors;
pub mod queue;
pub mod sample_format;
pub mod sample_loader;
pub mod source;

pub use config::{DeviceSelection, EngineConfig, StreamConfig};
pub use consumer::{AudioConsumer, InterfaceConsumer};
pub use controller::PipelineController;
pub use errors::{AudioError, ConversionError, ParameterError, SampleLoadError};
pub use sample_format::{SampleFormat, Samples, convert};
pub use source::{
    AudioSource, FileSource, FileTransport, InterfaceSource, SourceType, ToneControl, ToneSource,
};
