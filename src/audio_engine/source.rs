//! Audio sources: where the pipeline's blocks come from.
//!
//! - [`FileSource`] plays a decoded file from memory, driven by a [`FileTransport`]
//! - [`InterfaceSource`] captures selected channels of a live input device
//! - [`ToneSource`] synthesizes a phase-continuous sine, tuned through a [`ToneControl`]
//!
//! Sources are moved onto the processing thread while the pipeline runs. Any device stream they
//! open is handed back to the caller of [`AudioSource::start_stream`] as a [`DeviceStream`].

use std::f64::consts::TAU;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait};

use crate::audio_engine::audio_stream::{
    DeviceStream, InputCapture, XrunCounter, build_input_stream, stream_config,
};
use crate::audio_engine::config::{DeviceSelection, EngineConfig, StreamConfig};
use crate::audio_engine::constants::{
    TONE_CHANNELS, TONE_DEFAULT_FREQUENCY_HZ, TONE_DEFAULT_VOLUME_DB,
};
use crate::audio_engine::device::{device_at, open_host};
use crate::audio_engine::errors::{AudioError, ParameterError};
use crate::audio_engine::queue::{BlockReceiver, block_queue};
use crate::audio_engine::sample_format::SampleFormat;
use crate::audio_engine::sample_loader::{DecodedAudio, decode_audio_file};
use crate::messages::AudioBlock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceType {
    File,
    Interface,
    Tone,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::File => "file",
            Self::Interface => "interface",
            Self::Tone => "test tone",
        })
    }
}

pub trait AudioSource: Send {
    fn name(&self) -> &str;

    fn source_type(&self) -> SourceType;

    /// Starts producing blocks. Returns the device stream to keep alive, if one was opened.
    fn start_stream(&mut self) -> Result<Option<DeviceStream>, AudioError>;

    fn stop_stream(&mut self);

    fn is_streaming(&self) -> bool;

    /// Produces the next block, or `None` if there is nothing to play.
    fn read(&mut self) -> Option<AudioBlock>;

    /// Sample rate imposed by the source's material, if any.
    fn fixed_sample_rate(&self) -> Option<u32> {
        None
    }

    fn set_sample_rate(&mut self, sample_rate: u32) -> Result<(), AudioError>;

    fn set_block_size(&mut self, block_size: usize);

    fn set_sample_format(&mut self, sample_format: SampleFormat);

    fn set_device_selection(&mut self, _devices: &DeviceSelection) {}
}

#[derive(Debug, Default)]
struct TransportState {
    playing: AtomicBool,
    looping: AtomicBool,
    position: AtomicUsize,
}

/// Play/pause/stop/loop controls of a [`FileSource`], usable from any thread.
#[derive(Debug, Clone, Default)]
pub struct FileTransport {
    state: Arc<TransportState>,
}

impl FileTransport {
    pub fn play(&self) {
        self.state.playing.store(true, Ordering::Release);
    }

    pub fn pause(&self) {
        self.state.playing.store(false, Ordering::Release);
    }

    /// Pauses and rewinds to the first frame.
    pub fn stop(&self) {
        self.state.playing.store(false, Ordering::Release);
        self.state.position.store(0, Ordering::Release);
    }

    pub fn set_looping(&self, looping: bool) {
        self.state.looping.store(looping, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing.load(Ordering::Acquire)
    }

    pub fn is_looping(&self) -> bool {
        self.state.looping.load(Ordering::Acquire)
    }

    /// Next frame to be read.
    pub fn position(&self) -> usize {
        self.state.position.load(Ordering::Acquire)
    }

    /// Moves the cursor from `from` to `to` unless another thread moved it first.
    fn advance(&self, from: usize, to: usize) {
        let _ = self.state.position.compare_exchange(
            from,
            to,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

/// Plays an audio file decoded into memory.
pub struct FileSource {
    path: Option<PathBuf>,
    audio: Option<DecodedAudio>,
    transport: FileTransport,
    block_size: usize,
    streaming: bool,
}

impl FileSource {
    /// A file source with nothing loaded. It produces no blocks.
    pub fn new(block_size: usize) -> Self {
        Self {
            path: None,
            audio: None,
            transport: FileTransport::default(),
            block_size,
            streaming: false,
        }
    }

    pub fn open(path: &Path, block_size: usize) -> Result<Self, AudioError> {
        let mut source = Self::new(block_size);
        source.load(path)?;
        Ok(source)
    }

    /// Decodes `path` and rewinds. On failure the previous file stays loaded.
    pub fn load(&mut self, path: &Path) -> Result<(), AudioError> {
        log::debug!("Setting the audio file to {}", path.display());
        let audio = decode_audio_file(path)?;
        self.audio = Some(audio);
        self.path = Some(path.to_path_buf());
        self.transport.stop();
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn audio(&self) -> Option<&DecodedAudio> {
        self.audio.as_ref()
    }

    pub fn transport(&self) -> FileTransport {
        self.transport.clone()
    }
}

impl AudioSource for FileSource {
    fn name(&self) -> &str {
        "File Audio Source"
    }

    fn source_type(&self) -> SourceType {
        SourceType::File
    }

    fn start_stream(&mut self) -> Result<Option<DeviceStream>, AudioError> {
        log::debug!("Starting {} stream", self.name());
        self.streaming = true;
        Ok(None)
    }

    fn stop_stream(&mut self) {
        log::debug!("Stopping {} stream", self.name());
        self.streaming = false;
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn read(&mut self) -> Option<AudioBlock> {
        if !self.streaming || !self.transport.is_playing() {
            return None;
        }
        let audio = self.audio.as_ref()?;
        let total = audio.frame_count();
        let start = self.transport.position();
        if total == 0 || self.block_size == 0 {
            return None;
        }
        let start = start % total;
        let end = start + self.block_size;

        if self.transport.is_looping() {
            let mut block = AudioBlock::silence(audio.channel_count(), self.block_size);
            for (dest, src) in block.channels_mut().iter_mut().zip(&audio.channels) {
                for (i, sample) in dest.iter_mut().enumerate() {
                    *sample = src[(start + i) % total];
                }
            }
            self.transport.advance(start, end % total);
            return Some(block);
        }

        let block = audio.block_at(start, self.block_size);
        if end >= total {
            // Remainder was zero-padded; playback is complete.
            self.transport.stop();
        } else {
            self.transport.advance(start, end);
        }
        Some(block)
    }

    fn fixed_sample_rate(&self) -> Option<u32> {
        self.audio.as_ref().map(|audio| audio.sample_rate)
    }

    fn set_sample_rate(&mut self, sample_rate: u32) -> Result<(), AudioError> {
        match self.fixed_sample_rate() {
            Some(fixed) if fixed != sample_rate => Err(AudioError::UnsupportedOperation(
                "the sample rate of a file source is fixed by its file",
            )),
            _ => Ok(()),
        }
    }

    fn set_block_size(&mut self, block_size: usize) {
        log::debug!("Setting {} block size to {block_size}", self.name());
        self.block_size = block_size;
    }

    fn set_sample_format(&mut self, _sample_format: SampleFormat) {}
}

/// Captures the selected channels of a live input device.
pub struct InterfaceSource {
    devices: DeviceSelection,
    stream: StreamConfig,
    queue_capacity: usize,
    read_timeout: Duration,
    receiver: Option<BlockReceiver>,
    overruns: XrunCounter,
}

impl InterfaceSource {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            devices: config.devices.clone(),
            stream: config.stream,
            queue_capacity: config.queue_capacity,
            read_timeout: config.read_timeout,
            receiver: None,
            overruns: XrunCounter::default(),
        }
    }

    pub fn channels(&self) -> &[usize] {
        &self.devices.input_channels
    }
}

impl AudioSource for InterfaceSource {
    fn name(&self) -> &str {
        "Interface Audio Source"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Interface
    }

    fn start_stream(&mut self) -> Result<Option<DeviceStream>, AudioError> {
        self.stop_stream();

        let (_, host) = open_host(self.devices.driver.as_deref())?;
        let device = match self.devices.input_device {
            Some(index) => device_at(&host, index)?,
            None => host
                .default_input_device()
                .ok_or(AudioError::NoDevice("input"))?,
        };
        let device_channels = device.default_input_config()?.channels();
        let config = stream_config(
            device_channels,
            self.stream.sample_rate,
            self.stream.block_size,
        );

        let (sender, receiver) = block_queue(self.queue_capacity);
        let capture = InputCapture::new(
            sender,
            usize::from(device_channels),
            self.devices.input_channels.clone(),
            self.stream.block_size,
            self.overruns.clone(),
        );
        let stream = build_input_stream(&device, &config, self.stream.sample_format, capture)?;
        let stream = DeviceStream::play(stream, self.name())?;
        self.receiver = Some(receiver);
        Ok(Some(stream))
    }

    fn stop_stream(&mut self) {
        if self.receiver.take().is_none() {
            return;
        }
        let overruns = self.overruns.take();
        if overruns > 0 {
            log::warn!("{} dropped {overruns} blocks on a full queue", self.name());
        }
    }

    fn is_streaming(&self) -> bool {
        self.receiver.is_some()
    }

    fn read(&mut self) -> Option<AudioBlock> {
        let (channels, frames) = (self.devices.input_channels.len(), self.stream.block_size);
        let receiver = self.receiver.as_mut()?;
        Some(
            receiver
                .pop_timeout(self.read_timeout)
                .unwrap_or_else(|| AudioBlock::silence(channels, frames)),
        )
    }

    fn set_sample_rate(&mut self, sample_rate: u32) -> Result<(), AudioError> {
        log::debug!("Setting {} sample rate to {sample_rate}", self.name());
        self.stream.sample_rate = sample_rate;
        Ok(())
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
            devices.input_device,
            devices.input_channels
        );
        self.devices = devices.clone();
    }
}

#[derive(Debug)]
struct ToneState {
    frequency: AtomicU64,
    volume_db: AtomicU64,
    simulated_cpu_usage: AtomicU64,
}

/// Live settings of a [`ToneSource`]. Changes apply from the next block.
#[derive(Debug, Clone)]
pub struct ToneControl {
    state: Arc<ToneState>,
}

impl Default for ToneControl {
    fn default() -> Self {
        Self {
            state: Arc::new(ToneState {
                frequency: AtomicU64::new(TONE_DEFAULT_FREQUENCY_HZ.to_bits()),
                volume_db: AtomicU64::new(TONE_DEFAULT_VOLUME_DB.to_bits()),
                simulated_cpu_usage: AtomicU64::new(0f64.to_bits()),
            }),
        }
    }
}

fn load_f64(cell: &AtomicU64) -> f64 {
    f64::from_bits(cell.load(Ordering::Relaxed))
}

impl ToneControl {
    pub fn frequency(&self) -> f64 {
        load_f64(&self.state.frequency)
    }

    pub fn set_frequency(&self, frequency: f64) -> Result<(), ParameterError> {
        if !frequency.is_finite() || frequency < 0.0 {
            return Err(ParameterError::Range(format!(
                "test tone frequency must be a non-negative number of Hz, got {frequency}"
            )));
        }
        log::debug!("Setting test tone frequency to {frequency}");
        self.state
            .frequency
            .store(frequency.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    pub fn volume_db(&self) -> f64 {
        load_f64(&self.state.volume_db)
    }

    pub fn set_volume_db(&self, volume_db: f64) -> Result<(), ParameterError> {
        if volume_db.is_nan() {
            return Err(ParameterError::Range("test tone volume must be a number".into()));
        }
        log::debug!("Setting test tone volume to {volume_db} dB");
        self.state
            .volume_db
            .store(volume_db.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    pub fn simulated_cpu_usage(&self) -> f64 {
        load_f64(&self.state.simulated_cpu_usage)
    }

    /// Fraction of each block's real-time duration the source sleeps for, in `[0, 1]`.
    pub fn set_simulated_cpu_usage(&self, usage: f64) -> Result<(), ParameterError> {
        if !(0.0..=1.0).contains(&usage) {
            return Err(ParameterError::Range(format!(
                "simulated CPU usage must be in the range [0, 1], got {usage}"
            )));
        }
        log::debug!("Setting test tone simulated CPU usage to {} %", usage * 100.0);
        self.state
            .simulated_cpu_usage
            .store(usage.to_bits(), Ordering::Relaxed);
        Ok(())
    }
}

/// Stereo sine generator.
pub struct ToneSource {
    control: ToneControl,
    stream: StreamConfig,
    theta: f64,
    streaming: bool,
}

impl ToneSource {
    pub fn new(stream: &StreamConfig) -> Self {
        Self::with_control(stream, ToneControl::default())
    }

    pub fn with_control(stream: &StreamConfig, control: ToneControl) -> Self {
        Self {
            control,
            stream: *stream,
            theta: 0.0,
            streaming: false,
        }
    }

    pub fn control(&self) -> ToneControl {
        self.control.clone()
    }
}

impl AudioSource for ToneSource {
    fn name(&self) -> &str {
        "Test Tone Audio Source"
    }

    fn source_type(&self) -> SourceType {
        SourceType::Tone
    }

    fn start_stream(&mut self) -> Result<Option<DeviceStream>, AudioError> {
        log::debug!("Starting {} stream", self.name());
        self.streaming = true;
        Ok(None)
    }

    fn stop_stream(&mut self) {
        log::debug!("Stopping {} stream", self.name());
        self.streaming = false;
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn read(&mut self) -> Option<AudioBlock> {
        if !self.streaming {
            return None;
        }
        let gain = 10f64.powf(self.control.volume_db() / 20.0);
        let block_size = self.stream.block_size;
        let step = TAU * self.control.frequency() / f64::from(self.stream.sample_rate.max(1));
        let tone = (0..block_size)
            .map(|i| (gain * (self.theta + step * i as f64).sin()) as f32)
            .collect::<Vec<_>>();
        self.theta = (self.theta + step * block_size as f64) % TAU;

        let usage = self.control.simulated_cpu_usage();
        if usage > 0.0 {
            thread::sleep(self.stream.block_duration().mul_f64(usage));
        }
        AudioBlock::from_channels(vec![tone; TONE_CHANNELS])
    }

    fn set_sample_rate(&mut self, sample_rate: u32) -> Result<(), AudioError> {
        log::debug!("Setting {} sample rate to {sample_rate}", self.name());
        self.stream.sample_rate = sample_rate;
        Ok(())
    }

    fn set_block_size(&mut self, block_size: usize) {
        log::debug!("Setting {} block size to {block_size}", self.name());
        self.stream.block_size = block_size;
    }

    fn set_sample_format(&mut self, sample_format: SampleFormat) {
        self.stream.sample_format = sample_format;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_engine::sample_loader::write_pcm16_wav;

    fn five_frame_file(dir: &Path) -> PathBuf {
        let path = dir.join("ramp.wav");
        write_pcm16_wav(&path, 1, 8_000, &[0, 8_192, 16_384, -8_192, -16_384]).unwrap();
        path
    }

    #[test]
    fn test_file_source_needs_streaming_and_play() {
        let tmp = tempfile::tempdir().unwrap();
        let mut source = FileSource::open(&five_frame_file(tmp.path()), 4).unwrap();
        assert!(source.read().is_none());

        source.start_stream().unwrap();
        assert!(source.read().is_none());

        source.transport().play();
        assert!(source.read().is_some());
    }

    #[test]
    fn test_file_source_zero_pads_and_stops_at_end() {
        let tmp = tempfile::tempdir().unwrap();
        let mut source = FileSource::open(&five_frame_file(tmp.path()), 4).unwrap();
        let transport = source.transport();
        source.start_stream().unwrap();
        transport.play();

        let first = source.read().unwrap();
        assert_eq!(first.channel(0), Some(&[0.0, 0.25, 0.5, -0.25][..]));
        assert_eq!(transport.position(), 4);

        let last = source.read().unwrap();
        assert_eq!(last.channel(0), Some(&[-0.5, 0.0, 0.0, 0.0][..]));
        assert!(!transport.is_playing());
        assert_eq!(transport.position(), 0);
        assert!(source.read().is_none());
    }

    #[test]
    fn test_file_source_loops() {
        let tmp = tempfile::tempdir().unwrap();
        let mut source = FileSource::open(&five_frame_file(tmp.path()), 4).unwrap();
        let transport = source.transport();
        transport.set_looping(true);
        source.start_stream().unwrap();
        transport.play();

        source.read().unwrap();
        let wrapped = source.read().unwrap();
        assert_eq!(wrapped.channel(0), Some(&[-0.5, 0.0, 0.25, 0.5][..]));
        assert!(transport.is_playing());
        assert_eq!(transport.position(), 3);
    }

    #[test]
    fn test_file_transport_stop_rewinds() {
        let tmp = tempfile::tempdir().unwrap();
        let mut source = FileSource::open(&five_frame_file(tmp.path()), 2).unwrap();
        let transport = source.transport();
        source.start_stream().unwrap();
        transport.play();
        source.read().unwrap();
        transport.pause();
        assert!(source.read().is_none());
        assert_eq!(transport.position(), 2);

        transport.stop();
        transport.play();
        let block = source.read().unwrap();
        assert_eq!(block.channel(0), Some(&[0.0, 0.25][..]));
    }

    #[test]
    fn test_file_sample_rate_is_fixed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut source = FileSource::open(&five_frame_file(tmp.path()), 4).unwrap();
        assert_eq!(source.fixed_sample_rate(), Some(8_000));
        assert!(source.set_sample_rate(8_000).is_ok());
        assert!(matches!(
            source.set_sample_rate(44_100),
            Err(AudioError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_empty_file_source_is_silent() {
        let mut source = FileSource::new(4);
        source.start_stream().unwrap();
        source.transport().play();
        assert!(source.read().is_none());
        assert_eq!(source.fixed_sample_rate(), None);
        assert!(source.set_sample_rate(48_000).is_ok());
    }

    #[test]
    fn test_failed_load_keeps_previous_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = five_frame_file(tmp.path());
        let mut source = FileSource::open(&path, 4).unwrap();
        assert!(source.load(&tmp.path().join("missing.wav")).is_err());
        assert_eq!(source.path(), Some(path.as_path()));
    }

    fn tone_source(block_size: usize) -> ToneSource {
        let stream = StreamConfig {
            sample_rate: 8_000,
            block_size,
            ..StreamConfig::default()
        };
        let mut source = ToneSource::new(&stream);
        source.start_stream().unwrap();
        source
    }

    #[test]
    fn test_tone_is_phase_continuous_across_blocks() {
        let mut whole = tone_source(128);
        let mut split = tone_source(32);
        let expected = whole.read().unwrap();
        let pieces = (0..4)
            .flat_map(|_| split.read().unwrap().into_channels().swap_remove(0))
            .collect::<Vec<_>>();
        for (a, b) in expected.channel(0).unwrap().iter().zip(&pieces) {
            assert!((a - b).abs() < 1e-4, "{a} != {b}");
        }
    }

    #[test]
    fn test_tone_shape_and_level() {
        let mut source = tone_source(64);
        let block = source.read().unwrap();
        assert_eq!(block.channel_count(), 2);
        assert_eq!(block.frame_count(), 64);
        assert_eq!(block.channel(0), block.channel(1));
        let peak = block.channel(0).unwrap().iter().fold(0f32, |m, s| m.max(s.abs()));
        assert!(peak <= 0.1 + 1e-6);
        assert!(peak > 0.09);
    }

    #[test]
    fn test_simulated_cpu_usage_holds_part_of_a_block() {
        let mut source = tone_source(800);
        source.control().set_simulated_cpu_usage(0.5).unwrap();
        let started = std::time::Instant::now();
        source.read().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_tone_control_is_shared_and_validated() {
        let mut source = tone_source(16);
        let control = source.control();
        control.set_volume_db(0.0).unwrap();
        control.set_frequency(0.0).unwrap();
        assert!(source.read().unwrap().channel(0).unwrap().iter().all(|s| *s == 0.0));

        assert!(matches!(
            control.set_simulated_cpu_usage(1.5),
            Err(ParameterError::Range(_))
        ));
        assert!(control.set_frequency(f64::NAN).is_err());
        assert_eq!(control.simulated_cpu_usage(), 0.0);
    }

    #[test]
    fn test_stopped_tone_produces_nothing() {
        let mut source = tone_source(16);
        source.stop_stream();
        assert!(source.read().is_none());
    }

    #[test]
    fn test_interface_source_idle_reads_nothing() {
        let mut source = InterfaceSource::new(&EngineConfig::default());
        assert!(!source.is_streaming());
        assert!(source.read().is_none());
        assert_eq!(source.channels(), &[0]);
        source.set_device_selection(&DeviceSelection {
            input_channels: vec![1, 0],
            ..DeviceSelection::default()
        });
        assert_eq!(source.channels(), &[1, 0]);
    }
}
