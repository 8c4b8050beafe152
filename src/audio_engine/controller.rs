//! Pipeline controller.
//!
//! The controller owns the processing thread and the stream configuration. While idle it holds the
//! active source, processor and consumer; [`PipelineController::start`] moves them onto a worker
//! thread that loops `source -> processor -> consumer` until [`PipelineController::stop`] joins it
//! and takes them back. Every reconfiguration stops the pipeline, applies the change to all
//! components and restarts, so components never see a configuration change mid-stream.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio_engine::audio_stream::{DeviceStream, setup_logger};
use crate::audio_engine::config::{
    DeviceSelection, EngineConfig, StreamConfig, validate_block_size, validate_sample_format,
    validate_sample_rate,
};
use crate::audio_engine::consumer::{AudioConsumer, InterfaceConsumer};
use crate::audio_engine::device::{AudioDriverInfo, AudioInterfaceInfo, drivers, open_host};
use crate::audio_engine::errors::{AudioError, ParameterError};
use crate::audio_engine::sample_format::SampleFormat;
use crate::audio_engine::source::{
    AudioSource, FileSource, FileTransport, InterfaceSource, SourceType, ToneControl, ToneSource,
};
use crate::effects::{AudioProcessor, PassThrough, PedalProcessor};
use crate::pedal::{Observers, Pedal, SubscriptionId};

struct Pipeline {
    source: Box<dyn AudioSource>,
    processor: Box<dyn AudioProcessor>,
    consumer: Box<dyn AudioConsumer>,
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Pipeline>,
    /// Closed after the worker has exited.
    streams: Vec<DeviceStream>,
}

fn run(mut pipeline: Pipeline, stop: &AtomicBool, poll_interval: Duration) -> Pipeline {
    while !stop.load(Ordering::Acquire) {
        if let Some(block) = pipeline.source.read() {
            let block = pipeline.processor.process_audio(block);
            pipeline.consumer.write(block);
        }
        thread::sleep(poll_interval);
    }
    pipeline
}

/// Starts the consumer and then the source. On failure nothing is left running.
fn open_streams(pipeline: &mut Pipeline) -> Result<Vec<DeviceStream>, AudioError> {
    let mut streams = Vec::new();
    streams.extend(pipeline.consumer.start_stream()?);
    match pipeline.source.start_stream() {
        Ok(stream) => streams.extend(stream),
        Err(err) => {
            drop(streams);
            pipeline.consumer.stop_stream();
            return Err(err);
        }
    }
    Ok(streams)
}

pub struct PipelineController {
    config: EngineConfig,
    initialized: bool,
    /// Present while stopped. Exactly one of `idle` and `worker` is set unless the worker panicked.
    idle: Option<Pipeline>,
    worker: Option<Worker>,
    active: SourceType,
    /// Registered sources other than the active one.
    sources: BTreeMap<SourceType, Box<dyn AudioSource>>,
    /// Rate to restore once a fixed-rate source is deselected.
    previous_sample_rate: Option<u32>,
    /// Source to return to when the test tone stops.
    previous_source: Option<SourceType>,
    tone: ToneControl,
    file_transport: FileTransport,
    config_changed: Observers<StreamConfig>,
}

impl PipelineController {
    /// Builds a controller with the file, interface and test tone sources, a pass-through
    /// processor and the interface consumer. The file source is active and empty.
    pub fn new(config: EngineConfig) -> Result<Self, AudioError> {
        setup_logger();
        config.stream.validate()?;
        let file = FileSource::new(config.stream.block_size);
        let file_transport = file.transport();
        let tone = ToneSource::new(&config.stream);
        let tone_control = tone.control();
        let interface = InterfaceSource::new(&config);
        let consumer = InterfaceConsumer::new(&config);
        let others: Vec<Box<dyn AudioSource>> = vec![Box::new(interface), Box::new(tone)];
        Ok(Self::assemble(
            config,
            Box::new(file),
            others,
            Box::new(PassThrough),
            Box::new(consumer),
            tone_control,
            file_transport,
        ))
    }

    fn assemble(
        config: EngineConfig,
        mut source: Box<dyn AudioSource>,
        others: Vec<Box<dyn AudioSource>>,
        mut processor: Box<dyn AudioProcessor>,
        mut consumer: Box<dyn AudioConsumer>,
        tone: ToneControl,
        file_transport: FileTransport,
    ) -> Self {
        let stream = config.stream;
        if let Err(err) = source.set_sample_rate(stream.sample_rate) {
            log::warn!("{}: {err}", source.name());
        }
        source.set_block_size(stream.block_size);
        source.set_sample_format(stream.sample_format);
        source.set_device_selection(&config.devices);
        processor.set_sample_rate(stream.sample_rate);
        processor.set_block_size(stream.block_size);
        processor.set_sample_format(stream.sample_format);
        consumer.set_sample_rate(stream.sample_rate);
        consumer.set_block_size(stream.block_size);
        consumer.set_sample_format(stream.sample_format);
        consumer.set_device_selection(&config.devices);

        let active = source.source_type();
        let sources = others
            .into_iter()
            .map(|s| (s.source_type(), s))
            .collect();
        Self {
            config,
            initialized: false,
            idle: Some(Pipeline {
                source,
                processor,
                consumer,
            }),
            worker: None,
            active,
            sources,
            previous_sample_rate: None,
            previous_source: None,
            tone,
            file_transport,
            config_changed: Observers::new(),
        }
    }

    /// Marks the controller ready and starts the pipeline.
    pub fn initialize(&mut self) -> Result<(), AudioError> {
        self.initialized = true;
        self.start()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stream_config(&self) -> StreamConfig {
        self.config.stream
    }

    /// Subscribes to stream configuration changes. `callback` is called with the current
    /// configuration before this returns.
    pub fn subscribe_config<F>(&mut self, mut callback: F) -> SubscriptionId
    where
        F: FnMut(&StreamConfig) + Send + 'static,
    {
        callback(&self.config.stream);
        self.config_changed.subscribe(callback)
    }

    pub fn unsubscribe_config(&mut self, id: SubscriptionId) -> bool {
        self.config_changed.unsubscribe(id)
    }

    /// Opens the device streams and spawns the processing thread.
    ///
    /// Does nothing before [`initialize`](Self::initialize) or while already running.
    pub fn start(&mut self) -> Result<(), AudioError> {
        if !self.initialized || self.worker.is_some() {
            return Ok(());
        }
        let mut pipeline = self.idle.take().ok_or(AudioError::WorkerPanicked)?;
        let streams = match open_streams(&mut pipeline) {
            Ok(streams) => streams,
            Err(err) => {
                self.idle = Some(pipeline);
                return Err(err);
            }
        };

        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let poll_interval = self.config.poll_interval;
        let handle = thread::spawn(move || run(pipeline, &flag, poll_interval));
        self.worker = Some(Worker {
            stop,
            handle,
            streams,
        });
        log::info!("Audio pipeline started");
        Ok(())
    }

    /// Signals the processing thread, waits for it to exit, then closes the streams.
    pub fn stop(&mut self) -> Result<(), AudioError> {
        let Some(Worker {
            stop,
            handle,
            streams,
        }) = self.worker.take()
        else {
            return Ok(());
        };
        stop.store(true, Ordering::Release);
        let joined = handle.join();
        drop(streams);

        let mut pipeline = joined.map_err(|_| {
            log::error!("Audio processing thread panicked");
            AudioError::WorkerPanicked
        })?;
        pipeline.source.stop_stream();
        pipeline.consumer.stop_stream();
        self.idle = Some(pipeline);
        log::info!("Audio pipeline stopped");
        Ok(())
    }

    /// Stops, applies `change` and restarts if the pipeline was running.
    fn reconfigure<F>(&mut self, change: F) -> Result<(), AudioError>
    where
        F: FnOnce(&mut Self) -> Result<(), AudioError>,
    {
        let was_running = self.is_running();
        self.stop()?;
        let applied = change(self);
        if was_running {
            self.start()?;
        }
        applied
    }

    fn notify_config(&mut self) {
        self.config_changed.notify(&self.config.stream);
    }

    /// Pushes `sample_rate` to every component. The source is asked first and may refuse.
    fn apply_sample_rate(&mut self, sample_rate: u32) -> Result<(), AudioError> {
        let pipeline = self.idle.as_mut().ok_or(AudioError::WorkerPanicked)?;
        pipeline.source.set_sample_rate(sample_rate)?;
        log::debug!("Setting sample rate to {sample_rate} Hz");
        self.config.stream.sample_rate = sample_rate;
        pipeline.processor.set_sample_rate(sample_rate);
        pipeline.consumer.set_sample_rate(sample_rate);
        self.notify_config();
        Ok(())
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<(), AudioError> {
        validate_sample_rate(sample_rate)?;
        self.reconfigure(|this| this.apply_sample_rate(sample_rate))
    }

    pub fn set_block_size(&mut self, block_size: usize) -> Result<(), AudioError> {
        validate_block_size(block_size)?;
        self.reconfigure(|this| {
            let pipeline = this.idle.as_mut().ok_or(AudioError::WorkerPanicked)?;
            log::debug!("Setting block size to {block_size} samples");
            this.config.stream.block_size = block_size;
            pipeline.source.set_block_size(block_size);
            pipeline.processor.set_block_size(block_size);
            pipeline.consumer.set_block_size(block_size);
            this.notify_config();
            Ok(())
        })
    }

    pub fn set_sample_format(&mut self, sample_format: SampleFormat) -> Result<(), AudioError> {
        validate_sample_format(sample_format)?;
        self.reconfigure(|this| {
            let pipeline = this.idle.as_mut().ok_or(AudioError::WorkerPanicked)?;
            log::debug!("Setting sample format to {sample_format}");
            this.config.stream.sample_format = sample_format;
            pipeline.source.set_sample_format(sample_format);
            pipeline.processor.set_sample_format(sample_format);
            pipeline.consumer.set_sample_format(sample_format);
            this.notify_config();
            Ok(())
        })
    }

    pub fn source_type(&self) -> SourceType {
        self.active
    }

    /// Makes `next` the active source, adopting its fixed sample rate if it has one and
    /// restoring the rate that was replaced once no fixed-rate source is active. On failure
    /// `next` is handed back unchanged.
    fn activate(
        &mut self,
        mut next: Box<dyn AudioSource>,
    ) -> Result<(), (AudioError, Box<dyn AudioSource>)> {
        let current_rate = self.config.stream.sample_rate;
        let fixed_rate = next.fixed_sample_rate();
        let rate = fixed_rate.unwrap_or(self.previous_sample_rate.unwrap_or(current_rate));

        let Some(pipeline) = self.idle.as_mut() else {
            return Err((AudioError::WorkerPanicked, next));
        };
        if let Err(err) = next.set_sample_rate(rate) {
            return Err((err, next));
        }
        let stream = self.config.stream;
        next.set_block_size(stream.block_size);
        next.set_sample_format(stream.sample_format);
        next.set_device_selection(&self.config.devices);

        if rate != current_rate {
            log::debug!("Setting sample rate to {rate} Hz");
            self.config.stream.sample_rate = rate;
            pipeline.processor.set_sample_rate(rate);
            pipeline.consumer.set_sample_rate(rate);
        }
        match fixed_rate {
            Some(_) => {
                self.previous_sample_rate.get_or_insert(current_rate);
            }
            None => self.previous_sample_rate = None,
        }

        log::debug!("Setting audio source to {}", next.name());
        self.active = next.source_type();
        let previous = std::mem::replace(&mut pipeline.source, next);
        if previous.source_type() != self.active {
            self.sources.insert(previous.source_type(), previous);
        }
        if rate != current_rate {
            self.notify_config();
        }
        Ok(())
    }

    /// Selects a registered source.
    pub fn set_source(&mut self, source_type: SourceType) -> Result<(), AudioError> {
        self.reconfigure(|this| {
            if this.active == source_type {
                return Ok(());
            }
            let next = this
                .sources
                .remove(&source_type)
                .ok_or_else(|| ParameterError::DoesNotExist {
                    kind: "source",
                    name: source_type.to_string(),
                })?;
            this.activate(next).map_err(|(err, next)| {
                log::warn!("Keeping {} as audio source: {err}", this.active);
                this.sources.insert(source_type, next);
                err
            })
        })
    }

    /// Registers `source`, replacing any source of the same type. Replacing the active source
    /// takes effect immediately.
    pub fn add_source(&mut self, source: Box<dyn AudioSource>) -> Result<(), AudioError> {
        self.reconfigure(|this| {
            if source.source_type() == this.active {
                this.activate(source).map_err(|(err, _)| err)
            } else {
                this.sources.insert(source.source_type(), source);
                Ok(())
            }
        })
    }

    pub fn set_consumer(&mut self, mut consumer: Box<dyn AudioConsumer>) -> Result<(), AudioError> {
        self.reconfigure(|this| {
            let pipeline = this.idle.as_mut().ok_or(AudioError::WorkerPanicked)?;
            let stream = this.config.stream;
            consumer.set_sample_rate(stream.sample_rate);
            consumer.set_block_size(stream.block_size);
            consumer.set_sample_format(stream.sample_format);
            consumer.set_device_selection(&this.config.devices);
            log::debug!("Setting audio consumer to {}", consumer.name());
            pipeline.consumer = consumer;
            Ok(())
        })
    }

    pub fn set_processor(
        &mut self,
        mut processor: Box<dyn AudioProcessor>,
    ) -> Result<(), AudioError> {
        self.reconfigure(|this| {
            let pipeline = this.idle.as_mut().ok_or(AudioError::WorkerPanicked)?;
            let stream = this.config.stream;
            processor.set_sample_rate(stream.sample_rate);
            processor.set_block_size(stream.block_size);
            processor.set_sample_format(stream.sample_format);
            log::debug!("Setting audio processor to {}", processor.name());
            pipeline.processor = processor;
            Ok(())
        })
    }

    /// Processes audio with `pedal`'s selected variant.
    pub fn set_pedal(&mut self, pedal: Arc<Mutex<Pedal>>) -> Result<(), AudioError> {
        let processor = PedalProcessor::new(pedal, self.config.stream.sample_rate);
        self.set_processor(Box::new(processor))
    }

    /// Switches to the test tone, remembering the current source.
    pub fn play_test_tone(&mut self) -> Result<(), AudioError> {
        log::debug!("Playing test tone");
        if self.active != SourceType::Tone {
            self.previous_source = Some(self.active);
        }
        self.set_source(SourceType::Tone)
    }

    /// Returns to the source that was active before [`play_test_tone`](Self::play_test_tone).
    pub fn stop_test_tone(&mut self) -> Result<(), AudioError> {
        log::debug!("Stopping test tone");
        match self.previous_source.take() {
            Some(source_type) => self.set_source(source_type),
            None => Ok(()),
        }
    }

    pub fn test_tone(&self) -> ToneControl {
        self.tone.clone()
    }

    pub fn set_test_tone_frequency(&self, frequency: f64) -> Result<(), ParameterError> {
        self.tone.set_frequency(frequency)
    }

    pub fn set_test_tone_volume_db(&self, volume_db: f64) -> Result<(), ParameterError> {
        self.tone.set_volume_db(volume_db)
    }

    pub fn set_simulated_cpu_usage(&self, usage: f64) -> Result<(), ParameterError> {
        self.tone.set_simulated_cpu_usage(usage)
    }

    /// Loads `path` into a new file source and selects it. The pipeline adopts the file's sample
    /// rate until another source is selected.
    pub fn set_audio_file(&mut self, path: &Path) -> Result<(), AudioError> {
        self.reconfigure(|this| {
            let file = FileSource::open(path, this.config.stream.block_size)?;
            let transport = file.transport();
            this.activate(Box::new(file)).map_err(|(err, _)| err)?;
            this.sources.remove(&SourceType::File);
            this.file_transport = transport;
            Ok(())
        })
    }

    pub fn file_transport(&self) -> FileTransport {
        self.file_transport.clone()
    }

    pub fn play_audio_file(&self) {
        self.file_transport.play();
    }

    pub fn pause_audio_file(&self) {
        self.file_transport.pause();
    }

    pub fn stop_audio_file(&self) {
        self.file_transport.stop();
    }

    pub fn set_audio_file_loop_state(&self, looping: bool) {
        self.file_transport.set_looping(looping);
    }

    /// Drivers and devices of the selected driver.
    /// Drivers that [`set_audio_driver`](Self::set_audio_driver) accepts by name.
    pub fn audio_drivers(&self) -> Vec<AudioDriverInfo> {
        drivers()
    }

    pub fn audio_interface_info(&self) -> Result<AudioInterfaceInfo, AudioError> {
        AudioInterfaceInfo::query(self.config.devices.driver.as_deref())
    }

    fn update_devices<F>(&mut self, change: F) -> Result<(), AudioError>
    where
        F: FnOnce(&mut DeviceSelection),
    {
        self.reconfigure(|this| {
            let pipeline = this.idle.as_mut().ok_or(AudioError::WorkerPanicked)?;
            change(&mut this.config.devices);
            pipeline.source.set_device_selection(&this.config.devices);
            pipeline.consumer.set_device_selection(&this.config.devices);
            for source in this.sources.values_mut() {
                source.set_device_selection(&this.config.devices);
            }
            Ok(())
        })
    }

    /// Selects a driver by name, or the platform default. Device choices reset to the driver's
    /// defaults.
    pub fn set_audio_driver(&mut self, driver: Option<&str>) -> Result<(), AudioError> {
        let (info, _) = open_host(driver)?;
        log::debug!("Setting audio driver to {}", info.name);
        let driver = driver.map(str::to_string);
        self.update_devices(|devices| {
            devices.driver = driver;
            devices.input_device = None;
            devices.output_device = None;
        })
    }

    pub fn set_audio_input_device(&mut self, index: Option<usize>) -> Result<(), AudioError> {
        self.update_devices(|devices| devices.input_device = index)
    }

    pub fn set_audio_output_device(&mut self, index: Option<usize>) -> Result<(), AudioError> {
        self.update_devices(|devices| devices.output_device = index)
    }

    pub fn set_audio_input_channels(&mut self, channels: Vec<usize>) -> Result<(), AudioError> {
        if channels.is_empty() {
            return Err(
                ParameterError::Range("at least one input channel must be selected".into()).into(),
            );
        }
        self.update_devices(|devices| devices.input_channels = channels)
    }

    /// `None` feeds every physical output channel.
    pub fn set_audio_output_channels(
        &mut self,
        channels: Option<Vec<usize>>,
    ) -> Result<(), AudioError> {
        if channels.as_ref().is_some_and(Vec::is_empty) {
            return Err(
                ParameterError::Range("at least one output channel must be selected".into()).into(),
            );
        }
        self.update_devices(|devices| devices.output_channels = channels)
    }
}

impl Drop for PipelineController {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::error!("Failed to stop audio pipeline: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_engine::sample_loader::write_pcm16_wav;
    use crate::messages::AudioBlock;
    use std::collections::VecDeque;
    use std::time::Instant;

    /// Settings most recently pushed to a test component.
    type Seen = Arc<Mutex<Option<StreamConfig>>>;

    fn record(seen: &Seen, update: impl FnOnce(&mut StreamConfig)) {
        let mut guard = seen.lock().unwrap();
        let config = guard.get_or_insert_with(StreamConfig::default);
        update(config);
    }

    struct QueueSource {
        source_type: SourceType,
        blocks: VecDeque<AudioBlock>,
        fixed_rate: Option<u32>,
        rejects_rates: bool,
        streaming: bool,
        seen: Seen,
    }

    impl QueueSource {
        fn boxed(source_type: SourceType, blocks: Vec<AudioBlock>) -> Box<Self> {
            Box::new(Self {
                source_type,
                blocks: blocks.into(),
                fixed_rate: None,
                rejects_rates: false,
                streaming: false,
                seen: Seen::default(),
            })
        }
    }

    impl AudioSource for QueueSource {
        fn name(&self) -> &str {
            "Queue Source"
        }

        fn source_type(&self) -> SourceType {
            self.source_type
        }

        fn start_stream(&mut self) -> Result<Option<DeviceStream>, AudioError> {
            self.streaming = true;
            Ok(None)
        }

        fn stop_stream(&mut self) {
            self.streaming = false;
        }

        fn is_streaming(&self) -> bool {
            self.streaming
        }

        fn read(&mut self) -> Option<AudioBlock> {
            if !self.streaming {
                return None;
            }
            self.blocks.pop_front()
        }

        fn fixed_sample_rate(&self) -> Option<u32> {
            self.fixed_rate
        }

        fn set_sample_rate(&mut self, sample_rate: u32) -> Result<(), AudioError> {
            if self.rejects_rates || self.fixed_rate.is_some_and(|fixed| fixed != sample_rate) {
                return Err(AudioError::UnsupportedOperation("fixed rate"));
            }
            record(&self.seen, |c| c.sample_rate = sample_rate);
            Ok(())
        }

        fn set_block_size(&mut self, block_size: usize) {
            record(&self.seen, |c| c.block_size = block_size);
        }

        fn set_sample_format(&mut self, sample_format: SampleFormat) {
            record(&self.seen, |c| c.sample_format = sample_format);
        }
    }

    #[derive(Default)]
    struct CollectingConsumer {
        written: Arc<Mutex<Vec<AudioBlock>>>,
        seen: Seen,
    }

    impl AudioConsumer for CollectingConsumer {
        fn name(&self) -> &str {
            "Collecting Consumer"
        }

        fn start_stream(&mut self) -> Result<Option<DeviceStream>, AudioError> {
            Ok(None)
        }

        fn stop_stream(&mut self) {}

        fn write(&mut self, block: AudioBlock) {
            self.written.lock().unwrap().push(block);
        }

        fn set_sample_rate(&mut self, sample_rate: u32) {
            record(&self.seen, |c| c.sample_rate = sample_rate);
        }

        fn set_block_size(&mut self, block_size: usize) {
            record(&self.seen, |c| c.block_size = block_size);
        }

        fn set_sample_format(&mut self, sample_format: SampleFormat) {
            record(&self.seen, |c| c.sample_format = sample_format);
        }
    }

    struct Gain(f32);

    impl AudioProcessor for Gain {
        fn name(&self) -> &str {
            "Gain"
        }

        fn process_audio(&mut self, mut block: AudioBlock) -> AudioBlock {
            block.scale(self.0);
            block
        }
    }

    struct Panics;

    impl AudioProcessor for Panics {
        fn name(&self) -> &str {
            "Panics"
        }

        fn process_audio(&mut self, _block: AudioBlock) -> AudioBlock {
            panic!("processor failure");
        }
    }

    fn block(value: f32) -> AudioBlock {
        AudioBlock::from_channels(vec![vec![value; 4]; 2]).unwrap()
    }

    fn controller(
        source: Box<dyn AudioSource>,
        others: Vec<Box<dyn AudioSource>>,
        processor: Box<dyn AudioProcessor>,
    ) -> (PipelineController, Arc<Mutex<Vec<AudioBlock>>>, Seen) {
        let consumer = CollectingConsumer::default();
        let written = Arc::clone(&consumer.written);
        let seen = Arc::clone(&consumer.seen);
        let controller = PipelineController::assemble(
            EngineConfig::default(),
            source,
            others,
            processor,
            Box::new(consumer),
            ToneControl::default(),
            FileTransport::default(),
        );
        (controller, written, seen)
    }

    fn wait_for(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        done()
    }

    #[test]
    fn test_run_loop_moves_blocks_through_processor() {
        let source = QueueSource::boxed(SourceType::File, vec![block(0.25), block(0.5)]);
        let (mut controller, written, _) = controller(source, vec![], Box::new(Gain(2.0)));

        controller.initialize().unwrap();
        assert!(controller.is_running());
        assert!(wait_for(|| written.lock().unwrap().len() == 2));
        controller.stop().unwrap();
        assert!(!controller.is_running());

        let written = written.lock().unwrap();
        assert_eq!(*written, vec![block(0.5), block(1.0)]);
    }

    #[test]
    fn test_start_requires_initialize() {
        let source = QueueSource::boxed(SourceType::File, vec![block(1.0)]);
        let (mut controller, written, _) = controller(source, vec![], Box::new(PassThrough));
        controller.start().unwrap();
        assert!(!controller.is_running());
        assert!(written.lock().unwrap().is_empty());
        controller.stop().unwrap();
    }

    #[test]
    fn test_reconfiguration_reaches_every_component_and_restarts() {
        let source = QueueSource::boxed(SourceType::File, vec![]);
        let source_seen = Arc::clone(&source.seen);
        let (mut controller, _, consumer_seen) =
            controller(source, vec![], Box::new(PassThrough));
        controller.initialize().unwrap();

        controller.set_block_size(256).unwrap();
        controller.set_sample_rate(48_000).unwrap();
        controller.set_sample_format(SampleFormat::Int16).unwrap();
        assert!(controller.is_running());

        let expected = StreamConfig {
            sample_rate: 48_000,
            block_size: 256,
            sample_format: SampleFormat::Int16,
        };
        assert_eq!(controller.stream_config(), expected);
        assert_eq!(*source_seen.lock().unwrap(), Some(expected));
        assert_eq!(*consumer_seen.lock().unwrap(), Some(expected));
    }

    #[test]
    fn test_invalid_settings_are_rejected_without_change() {
        let source = QueueSource::boxed(SourceType::File, vec![]);
        let (mut controller, _, _) = controller(source, vec![], Box::new(PassThrough));
        assert!(matches!(
            controller.set_sample_rate(22_050),
            Err(AudioError::Parameter(ParameterError::Range(_)))
        ));
        assert!(controller.set_block_size(100).is_err());
        assert!(controller.set_sample_format(SampleFormat::Float64).is_err());
        assert_eq!(controller.stream_config(), StreamConfig::default());
    }

    #[test]
    fn test_fixed_rate_source_is_adopted_then_restored() {
        let tone = QueueSource::boxed(SourceType::Tone, vec![]);
        let mut file = QueueSource::boxed(SourceType::File, vec![]);
        file.fixed_rate = Some(8_000);
        let (mut controller, _, consumer_seen) =
            controller(tone, vec![file as Box<dyn AudioSource>], Box::new(PassThrough));

        controller.set_source(SourceType::File).unwrap();
        assert_eq!(controller.source_type(), SourceType::File);
        assert_eq!(controller.stream_config().sample_rate, 8_000);
        assert_eq!(consumer_seen.lock().unwrap().unwrap().sample_rate, 8_000);
        assert!(matches!(
            controller.set_sample_rate(48_000),
            Err(AudioError::UnsupportedOperation(_))
        ));

        controller.set_source(SourceType::Tone).unwrap();
        assert_eq!(controller.stream_config().sample_rate, 44_100);
    }

    #[test]
    fn test_unknown_source_is_rejected() {
        let source = QueueSource::boxed(SourceType::File, vec![]);
        let (mut controller, _, _) = controller(source, vec![], Box::new(PassThrough));
        assert!(matches!(
            controller.set_source(SourceType::Interface),
            Err(AudioError::Parameter(ParameterError::DoesNotExist { .. }))
        ));
        assert_eq!(controller.source_type(), SourceType::File);
    }

    #[test]
    fn test_failed_source_switch_keeps_source_registered() {
        let tone = QueueSource::boxed(SourceType::Tone, vec![]);
        let mut file = QueueSource::boxed(SourceType::File, vec![]);
        file.rejects_rates = true;
        let (mut controller, _, _) =
            controller(tone, vec![file as Box<dyn AudioSource>], Box::new(PassThrough));

        for _ in 0..2 {
            assert!(matches!(
                controller.set_source(SourceType::File),
                Err(AudioError::UnsupportedOperation(_))
            ));
            assert_eq!(controller.source_type(), SourceType::Tone);
        }
        assert_eq!(controller.stream_config().sample_rate, 44_100);
    }

    #[test]
    fn test_test_tone_returns_to_previous_source() {
        let interface = QueueSource::boxed(SourceType::Interface, vec![]);
        let tone = QueueSource::boxed(SourceType::Tone, vec![]);
        let (mut controller, _, _) = controller(interface, vec![tone as Box<dyn AudioSource>], Box::new(PassThrough));

        controller.play_test_tone().unwrap();
        assert_eq!(controller.source_type(), SourceType::Tone);
        controller.play_test_tone().unwrap();
        controller.stop_test_tone().unwrap();
        assert_eq!(controller.source_type(), SourceType::Interface);
        controller.stop_test_tone().unwrap();
        assert_eq!(controller.source_type(), SourceType::Interface);
    }

    #[test]
    fn test_config_subscribers_get_current_then_changes() {
        let source = QueueSource::boxed(SourceType::File, vec![]);
        let (mut controller, _, _) = controller(source, vec![], Box::new(PassThrough));
        let rates = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&rates);
        let id = controller.subscribe_config(move |c| sink.lock().unwrap().push(c.sample_rate));

        controller.set_sample_rate(96_000).unwrap();
        assert!(controller.unsubscribe_config(id));
        controller.set_sample_rate(48_000).unwrap();
        assert_eq!(*rates.lock().unwrap(), vec![44_100, 96_000]);
    }

    #[test]
    fn test_replacing_processor_while_running() {
        let source = QueueSource::boxed(SourceType::File, vec![]);
        let (mut controller, _, _) = controller(source, vec![], Box::new(PassThrough));
        controller.initialize().unwrap();
        controller.set_processor(Box::new(Gain(0.5))).unwrap();
        controller.set_consumer(Box::new(CollectingConsumer::default())).unwrap();
        assert!(controller.is_running());
    }

    #[test]
    fn test_worker_panic_is_reported() {
        let source = QueueSource::boxed(SourceType::File, vec![block(1.0)]);
        let (mut controller, _, _) = controller(source, vec![], Box::new(Panics));
        controller.initialize().unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(matches!(controller.stop(), Err(AudioError::WorkerPanicked)));
        assert!(matches!(
            controller.set_block_size(64),
            Err(AudioError::WorkerPanicked)
        ));
    }

    #[test]
    fn test_audio_file_sets_rate_until_other_source() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tone.wav");
        write_pcm16_wav(&path, 2, 16_000, &[0, 0, 1_000, -1_000]).unwrap();

        let mut controller = PipelineController::new(EngineConfig::default()).unwrap();
        controller.set_audio_file(&path).unwrap();
        assert_eq!(controller.source_type(), SourceType::File);
        assert_eq!(controller.stream_config().sample_rate, 16_000);
        assert!(!controller.file_transport().is_playing());
        controller.play_audio_file();
        assert!(controller.file_transport().is_playing());

        controller.play_test_tone().unwrap();
        assert_eq!(controller.stream_config().sample_rate, 44_100);
        controller.stop_test_tone().unwrap();
        assert_eq!(controller.stream_config().sample_rate, 16_000);
    }

    #[test]
    fn test_new_rejects_invalid_stream_config() {
        let mut config = EngineConfig::default();
        config.stream.block_size = 100;
        assert!(matches!(
            PipelineController::new(config),
            Err(AudioError::Parameter(ParameterError::Range(_)))
        ));
    }

    #[test]
    fn test_listed_drivers_can_be_selected() {
        let mut controller = PipelineController::new(EngineConfig::default()).unwrap();
        for driver in controller.audio_drivers() {
            if open_host(Some(&driver.name)).is_err() {
                continue;
            }
            controller.set_audio_driver(Some(&driver.name)).unwrap();
            assert_eq!(controller.config().devices.driver.as_deref(), Some(driver.name.as_str()));
        }
        assert!(controller.set_audio_driver(Some("no such driver")).is_err());
        controller.set_audio_driver(None).unwrap();
        assert!(controller.config().devices.driver.is_none());
    }

    #[test]
    fn test_channel_selection_validation() {
        let mut controller = PipelineController::new(EngineConfig::default()).unwrap();
        assert!(controller.set_audio_input_channels(vec![]).is_err());
        assert!(controller.set_audio_output_channels(Some(vec![])).is_err());
        controller.set_audio_input_channels(vec![1]).unwrap();
        controller.set_audio_output_channels(Some(vec![0, 1])).unwrap();
        assert_eq!(controller.config().devices.input_channels, vec![1]);
        assert_eq!(controller.config().devices.output_channels, Some(vec![0, 1]));
        assert!(controller.set_simulated_cpu_usage(2.0).is_err());
    }
}
