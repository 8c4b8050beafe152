//! Audio Stream Module
//!
//! Device-side halves of the pipeline and the cpal streams that drive them:
//! - [`InputCapture`] turns input callback buffers into fixed-size blocks on a queue
//! - [`OutputRenderer`] drains queued blocks into output callback buffers
//! - stream builders dispatching on the device's native sample format
//!
//! Both helpers run on the driver's thread. They never block, and faults (full or empty queues)
//! are counted in shared atomics instead of being logged from the callback.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, Device, Stream, StreamConfig};
use env_logger::{Builder, Env};

use crate::audio_engine::channels::{deinterleave, interleave_remapped};
use crate::audio_engine::errors::{AudioError, ConversionError};
use crate::audio_engine::queue::{BlockReceiver, BlockSender};
use crate::audio_engine::sample_format::{DeviceSample, SampleFormat};
use crate::messages::AudioBlock;

/// Environment variable holding an `env_logger` filter, e.g. `PEDALFX_LOG=pedalfx=debug`.
pub const LOG_ENV: &str = "PEDALFX_LOG";

/// Pipeline events at info, dependency chatter only from warn up.
pub const DEFAULT_LOG_FILTER: &str = "warn,pedalfx=info";

/// Installs the process logger unless one is already installed.
pub fn setup_logger() {
    let _ = Builder::from_env(Env::new().filter_or(LOG_ENV, DEFAULT_LOG_FILTER))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} {}: {}",
                buf.timestamp_millis(),
                record.level(),
                short_target(record.target()),
                record.args()
            )
        })
        .try_init();
}

/// Drops the crate prefix from this crate's module paths.
fn short_target(target: &str) -> &str {
    target.strip_prefix("pedalfx::").unwrap_or(target)
}

/// cpal stream settings for one pipeline configuration.
pub fn stream_config(device_channels: u16, sample_rate: u32, block_size: usize) -> StreamConfig {
    StreamConfig {
        channels: device_channels,
        sample_rate,
        buffer_size: BufferSize::Fixed(block_size as u32),
    }
}

/// A playing device stream. Dropping it closes the stream.
///
/// cpal streams may be bound to the thread that created them, so they are held by the caller of
/// `start_stream` rather than by the source or consumer that moves onto the processing thread.
pub struct DeviceStream {
    stream: Stream,
    label: String,
}

impl DeviceStream {
    /// Starts `stream` playing.
    pub fn play(stream: Stream, label: impl Into<String>) -> Result<Self, AudioError> {
        stream.play()?;
        let label = label.into();
        log::info!("Started {label} stream");
        Ok(Self { stream, label })
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Drop for DeviceStream {
    fn drop(&mut self) {
        if let Err(err) = self.stream.pause() {
            log::warn!("Failed to pause {} stream: {err}", self.label);
        }
        log::info!("Stopped {} stream", self.label);
    }
}

/// Shared fault counter for one stream.
#[derive(Debug, Clone, Default)]
pub struct XrunCounter(Arc<AtomicUsize>);

impl XrunCounter {
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the count and resets it to zero.
    pub fn take(&self) -> usize {
        self.0.swap(0, Ordering::Relaxed)
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

/// Input callback state: assembles exact `block_size` blocks from the selected device channels.
pub struct InputCapture {
    sender: BlockSender,
    device_channels: usize,
    selected: Vec<usize>,
    block_size: usize,
    pending: Vec<Vec<f32>>,
    overruns: XrunCounter,
}

impl InputCapture {
    pub fn new(
        sender: BlockSender,
        device_channels: usize,
        selected: Vec<usize>,
        block_size: usize,
        overruns: XrunCounter,
    ) -> Self {
        let pending = vec![Vec::with_capacity(block_size); selected.len()];
        Self {
            sender,
            device_channels,
            selected,
            block_size,
            pending,
            overruns,
        }
    }

    fn pending_frames(&self) -> usize {
        self.pending.first().map_or(0, Vec::len)
    }

    /// Consumes one callback buffer. Full blocks are queued; a full queue drops the block.
    pub fn capture<T: DeviceSample>(&mut self, data: &[T]) {
        if self.device_channels == 0 || self.block_size == 0 || self.selected.is_empty() {
            return;
        }
        let mut frames = data.chunks_exact(self.device_channels).len();
        let mut offset = 0;
        while frames > 0 {
            let take = frames.min(self.block_size - self.pending_frames());
            let end = offset + take * self.device_channels;
            deinterleave(
                &data[offset..end],
                self.device_channels,
                &self.selected,
                &mut self.pending,
            );
            offset = end;
            frames -= take;

            if self.pending_frames() == self.block_size {
                let fresh = vec![Vec::with_capacity(self.block_size); self.selected.len()];
                let channels = std::mem::replace(&mut self.pending, fresh);
                if let Some(block) = AudioBlock::from_channels(channels) {
                    if self.sender.try_push(block).is_err() {
                        self.overruns.increment();
                    }
                }
            }
        }
    }
}

/// Output callback state: plays queued blocks across callback boundaries.
pub struct OutputRenderer {
    receiver: BlockReceiver,
    device_channels: usize,
    output_channels: Vec<usize>,
    current: Option<AudioBlock>,
    cursor: usize,
    underruns: XrunCounter,
}

impl OutputRenderer {
    pub fn new(
        receiver: BlockReceiver,
        device_channels: usize,
        output_channels: Vec<usize>,
        underruns: XrunCounter,
    ) -> Self {
        Self {
            receiver,
            device_channels,
            output_channels,
            current: None,
            cursor: 0,
            underruns,
        }
    }

    /// Fills one callback buffer. Whatever the queue cannot supply is silence.
    pub fn render<T: DeviceSample>(&mut self, out: &mut [T]) {
        out.fill(T::from_f32(0.0));
        if self.device_channels == 0 {
            return;
        }
        let total = out.len() / self.device_channels;
        let mut written = 0;
        while written < total {
            let exhausted = self
                .current
                .as_ref()
                .is_none_or(|b| self.cursor >= b.frame_count());
            if exhausted {
                match self.receiver.try_pop() {
                    Some(block) if block.frame_count() > 0 => {
                        self.current = Some(block);
                        self.cursor = 0;
                    }
                    Some(_) => continue,
                    None => {
                        self.current = None;
                        self.underruns.increment();
                        return;
                    }
                }
            }
            let Some(block) = self.current.as_ref() else {
                return;
            };
            let n = interleave_remapped(
                block.channels(),
                self.cursor,
                &self.output_channels,
                self.device_channels,
                &mut out[written * self.device_channels..],
            );
            self.cursor += n;
            written += n;
        }
    }
}

fn stream_error(direction: &'static str) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| log::error!("Audio {direction} stream error: {err}")
}

fn build_input<T: DeviceSample>(
    device: &Device,
    config: &StreamConfig,
    mut capture: InputCapture,
) -> Result<Stream, AudioError> {
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| capture.capture(data),
        stream_error("input"),
        None,
    )?;
    Ok(stream)
}

fn build_output<T: DeviceSample>(
    device: &Device,
    config: &StreamConfig,
    mut renderer: OutputRenderer,
) -> Result<Stream, AudioError> {
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| renderer.render(data),
        stream_error("output"),
        None,
    )?;
    Ok(stream)
}

/// Builds an input stream delivering samples in `format`.
pub fn build_input_stream(
    device: &Device,
    config: &StreamConfig,
    format: SampleFormat,
    capture: InputCapture,
) -> Result<Stream, AudioError> {
    match format {
        SampleFormat::Int8 => build_input::<i8>(device, config, capture),
        SampleFormat::Int16 => build_input::<i16>(device, config, capture),
        SampleFormat::Int32 => build_input::<i32>(device, config, capture),
        SampleFormat::Float32 => build_input::<f32>(device, config, capture),
        other => Err(ConversionError::Unsupported {
            from: other,
            to: SampleFormat::Float32,
        }
        .into()),
    }
}

/// Builds an output stream expecting samples in `format`.
pub fn build_output_stream(
    device: &Device,
    config: &StreamConfig,
    format: SampleFormat,
    renderer: OutputRenderer,
) -> Result<Stream, AudioError> {
    match format {
        SampleFormat::Int8 => build_output::<i8>(device, config, renderer),
        SampleFormat::Int16 => build_output::<i16>(device, config, renderer),
        SampleFormat::Int32 => build_output::<i32>(device, config, renderer),
        SampleFormat::Float32 => build_output::<f32>(device, config, renderer),
        other => Err(ConversionError::Unsupported {
            from: SampleFormat::Float32,
            to: other,
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_engine::queue::block_queue;

    #[test]
    fn test_logger_setup() {
        // Only the first call installs a logger.
        setup_logger();
        setup_logger();
        log::info!("logger installed");
    }

    #[test]
    fn test_log_targets() {
        assert!(DEFAULT_LOG_FILTER.contains("pedalfx=info"));
        assert_eq!(short_target("pedalfx::audio_engine::controller"), "audio_engine::controller");
        assert_eq!(short_target("pedalfx"), "pedalfx");
        assert_eq!(short_target("symphonia_core::probe"), "symphonia_core::probe");
    }

    #[test]
    fn test_capture_assembles_exact_blocks_from_odd_callbacks() {
        let (tx, mut rx) = block_queue(8);
        let overruns = XrunCounter::default();
        let mut capture = InputCapture::new(tx, 2, vec![1], 4, overruns.clone());

        // 3 frames, then 6 frames: one full block after the second call, 1 frame pending.
        let first = [0.0f32, 1.0, 0.0, 2.0, 0.0, 3.0];
        let second = [0.0f32, 4.0, 0.0, 5.0, 0.0, 6.0, 0.0, 7.0, 0.0, 8.0, 0.0, 9.0];
        capture.capture(&first);
        assert!(rx.try_pop().is_none());
        capture.capture(&second);

        let block = rx.try_pop().unwrap();
        assert_eq!(block.channel_count(), 1);
        assert_eq!(block.channel(0), Some(&[1.0, 2.0, 3.0, 4.0][..]));
        let block = rx.try_pop().unwrap();
        assert_eq!(block.channel(0), Some(&[5.0, 6.0, 7.0, 8.0][..]));
        assert!(rx.try_pop().is_none());
        assert_eq!(overruns.get(), 0);
    }

    #[test]
    fn test_capture_keeps_oldest_block_and_counts_overruns_when_queue_full() {
        let (tx, mut rx) = block_queue(1);
        let overruns = XrunCounter::default();
        let mut capture = InputCapture::new(tx, 1, vec![0], 2, overruns.clone());
        capture.capture(&[0.1f32, 0.2, 0.3, 0.4, 0.5, 0.6]);
        assert_eq!(rx.len(), 1);
        assert_eq!(overruns.take(), 2);
        assert_eq!(overruns.get(), 0);
        let kept = rx.try_pop().unwrap();
        assert_eq!(kept.channel(0), Some(&[0.1, 0.2][..]));
    }

    #[test]
    fn test_render_spans_callback_boundaries() {
        let (mut tx, rx) = block_queue(4);
        tx.try_push(AudioBlock::from_channels(vec![vec![0.1, 0.2, 0.3, 0.4]]).unwrap())
            .unwrap();
        tx.try_push(AudioBlock::from_channels(vec![vec![0.5, 0.6, 0.7, 0.8]]).unwrap())
            .unwrap();
        let underruns = XrunCounter::default();
        let mut renderer = OutputRenderer::new(rx, 2, vec![0, 1], underruns.clone());

        let mut out = [0.0f32; 6];
        renderer.render(&mut out);
        assert_eq!(out, [0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
        renderer.render(&mut out);
        assert_eq!(out, [0.4, 0.4, 0.5, 0.5, 0.6, 0.6]);
        assert_eq!(underruns.get(), 0);

        renderer.render(&mut out);
        assert_eq!(out, [0.7, 0.7, 0.8, 0.8, 0.0, 0.0]);
        assert_eq!(underruns.get(), 1);
    }

    #[test]
    fn test_render_underrun_is_silence() {
        let (_tx, rx) = block_queue(4);
        let underruns = XrunCounter::default();
        let mut renderer = OutputRenderer::new(rx, 2, vec![0, 1], underruns.clone());
        let mut out = [5i16; 8];
        renderer.render(&mut out);
        assert_eq!(out, [0; 8]);
        assert_eq!(underruns.get(), 1);
    }

    #[test]
    fn test_render_converts_to_device_format() {
        let (mut tx, rx) = block_queue(1);
        tx.try_push(AudioBlock::from_channels(vec![vec![0.5, -1.0]]).unwrap())
            .unwrap();
        let mut renderer = OutputRenderer::new(rx, 1, vec![0], XrunCounter::default());
        let mut out = [0i16; 2];
        renderer.render(&mut out);
        assert_eq!(out, [16_383, -32_767]);
    }

    #[test]
    fn test_stream_config_uses_block_size() {
        let config = stream_config(2, 48_000, 256);
        assert_eq!(config.channels, 2);
        assert_eq!(config.buffer_size, BufferSize::Fixed(256));
    }
}
