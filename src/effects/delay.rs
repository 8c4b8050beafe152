//! Feedback delay with dry/wet mix.

use crate::audio_engine::constants::DELAY_MAKEUP_GAIN;
use crate::audio_engine::errors::ParameterError;
use crate::effects::{ON_OFF_FOOTSWITCH, OUTPUT_KNOB, output_knob};
use crate::messages::AudioBlock;
use crate::pedal::{Footswitch, Knob, KnobSettings, Pedal, VariantKind};

pub const FEEDBACK_KNOB: &str = "Feedback";
pub const TIME_KNOB: &str = "Time";
pub const DRY_WET_KNOB: &str = "Dry/Wet";

/// The stock delay pedal: one "Default" variant.
pub fn delay_pedal() -> Result<Pedal, ParameterError> {
    let unit = |default: f64| KnobSettings {
        minimum_value: 0.0,
        maximum_value: 1.0,
        default_value: default,
        precision: 0.01,
        display_enabled: true,
        value: default,
        ..KnobSettings::default()
    };

    let mut pedal = Pedal::new("Delay")?;
    pedal.add_knob(Knob::with_settings(FEEDBACK_KNOB, unit(0.3))?)?;
    pedal.add_knob(Knob::with_settings(TIME_KNOB, unit(0.5))?)?;
    pedal.add_knob(Knob::with_settings(DRY_WET_KNOB, unit(0.5))?)?;
    pedal.add_knob(output_knob(0.0, 0.0)?)?;
    let mut on_off = Footswitch::latching(ON_OFF_FOOTSWITCH, true)?;
    on_off.set_display_enabled(true);
    pedal.add_footswitch(on_off)?;
    pedal.add_variant("Default", VariantKind::Delay)?;
    pedal.reset_modified();
    Ok(pedal)
}

/// Per-block parameter snapshot, all values linearized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelaySettings {
    pub on: bool,
    /// Delay time in seconds.
    pub time: f64,
    /// Longest selectable delay time in seconds. Sizes the delay line.
    pub time_max: f64,
    pub feedback: f32,
    pub dry_wet: f32,
    pub output: f32,
}

impl DelaySettings {
    pub fn from_pedal(pedal: &Pedal) -> Result<Self, ParameterError> {
        let time = pedal
            .knob(TIME_KNOB)
            .ok_or_else(|| ParameterError::DoesNotExist {
                kind: "knob",
                name: TIME_KNOB.to_string(),
            })?;
        Ok(Self {
            on: pedal.footswitch_state(ON_OFF_FOOTSWITCH)?,
            time: time.value_linearized(),
            time_max: time.maximum_value_linearized(),
            feedback: pedal.knob_value(FEEDBACK_KNOB)? as f32,
            dry_wet: pedal.knob_value(DRY_WET_KNOB)? as f32,
            output: pedal.knob_value(OUTPUT_KNOB)? as f32,
        })
    }
}

/// Circular sample buffer for one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_index: usize,
}

impl DelayLine {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity],
            write_index: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// Runs `samples` through the line in place.
    ///
    /// `delay` is clamped to the capacity. Each sample is read before its slot is written, so a
    /// delay equal to the capacity returns the sample written one full lap earlier.
    pub fn process(&mut self, samples: &mut [f32], delay: usize, feedback: f32, dry_wet: f32) {
        let capacity = self.capacity();
        if capacity == 0 {
            // Zero-length line: the wet signal is the input itself.
            return;
        }
        let delay = delay.min(capacity);

        for x in samples.iter_mut() {
            let input = *x;
            let delayed = if delay == 0 {
                input
            } else {
                self.buffer[(self.write_index + capacity - delay) % capacity]
            };
            self.buffer[self.write_index] = input + feedback * delayed;
            *x = (1.0 - dry_wet) * input + dry_wet * delayed;
            self.write_index = (self.write_index + 1) % capacity;
        }
    }
}

/// Delay DSP state: one line per channel, advanced in lockstep.
#[derive(Debug, Clone)]
pub struct Delay {
    sample_rate: u32,
    lines: Vec<DelayLine>,
}

impl Delay {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            lines: Vec::new(),
        }
    }

    /// Discards buffered audio. Lines are reallocated for the new rate on the next block.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        if self.sample_rate != sample_rate {
            log::debug!("Setting Delay sample rate to {sample_rate}");
            self.sample_rate = sample_rate;
            self.lines.clear();
        }
    }

    pub fn lines(&self) -> &[DelayLine] {
        &self.lines
    }

    fn samples(&self, seconds: f64) -> usize {
        (seconds.max(0.0) * f64::from(self.sample_rate)).floor() as usize
    }

    fn ensure_lines(&mut self, channel_count: usize, capacity: usize) {
        let fits = self.lines.len() == channel_count
            && self.lines.first().is_none_or(|l| l.capacity() == capacity);
        if !fits {
            log::debug!("Allocating {channel_count} delay lines of {capacity} samples");
            self.lines = vec![DelayLine::new(capacity); channel_count];
        }
    }

    pub fn process(&mut self, block: &mut AudioBlock, settings: &DelaySettings) {
        if settings.on {
            let capacity = self.samples(settings.time_max);
            self.ensure_lines(block.channel_count(), capacity);
            let delay = self.samples(settings.time);
            for (line, channel) in self.lines.iter_mut().zip(block.channels_mut()) {
                line.process(channel, delay, settings.feedback, settings.dry_wet);
            }
            block.scale(DELAY_MAKEUP_GAIN);
        }
        block.scale(settings.output);
    }
}
