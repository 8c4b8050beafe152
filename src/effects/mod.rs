//! Effect processors.
//!
//! An [`AudioProcessor`] turns one block into another block of the same shape and may keep state
//! between calls. The pipeline runs a single processor at a time and never calls it concurrently.
//!
//! [`PedalProcessor`] is the processor behind a [`Pedal`]: it reads the pedal's knobs and
//! footswitches once per block and dispatches to the DSP of the selected variant.

pub mod delay;
pub mod filters;
pub mod saturate;
pub mod volume;

use std::sync::{Arc, Mutex, PoisonError};

use crate::audio_engine::errors::ParameterError;
use crate::audio_engine::sample_format::SampleFormat;
use crate::messages::AudioBlock;
use crate::pedal::{Knob, KnobMode, KnobSettings, Pedal, VariantKind};

use delay::{Delay, DelaySettings};
use saturate::{SaturateSettings, SmoothSaturate};
use volume::VolumeSettings;

pub const OUTPUT_KNOB: &str = "Output";
pub const ON_OFF_FOOTSWITCH: &str = "On/Off";

/// Logarithmic output level knob from -50 dB up to `maximum_db`.
pub fn output_knob(maximum_db: f64, value_db: f64) -> Result<Knob, ParameterError> {
    Knob::with_settings(
        OUTPUT_KNOB,
        KnobSettings {
            minimum_value: -50.0,
            maximum_value: maximum_db,
            default_value: 0.0,
            precision: 1.0,
            mode: KnobMode::Logarithmic,
            display_enabled: true,
            value: value_db,
            ..KnobSettings::default()
        },
    )
}

pub trait AudioProcessor: Send {
    fn name(&self) -> &str;

    /// Transforms one block. The result has the same channel and frame count.
    fn process_audio(&mut self, block: AudioBlock) -> AudioBlock;

    fn set_sample_rate(&mut self, _sample_rate: u32) {}

    fn set_block_size(&mut self, _block_size: usize) {}

    fn set_sample_format(&mut self, _sample_format: SampleFormat) {}
}

/// Returns every block unchanged.
#[derive(Debug, Default)]
pub struct PassThrough;

impl AudioProcessor for PassThrough {
    fn name(&self) -> &str {
        "Pass Through"
    }

    fn process_audio(&mut self, block: AudioBlock) -> AudioBlock {
        block
    }
}

/// Knob and footswitch values for one block, tagged by variant.
#[derive(Debug, Clone, Copy, PartialEq)]
enum VariantSettings {
    Bypass,
    Delay(DelaySettings),
    SaturateDefault(SaturateSettings),
    SaturateSmooth(SaturateSettings),
    Volume(VolumeSettings),
}

impl VariantSettings {
    fn from_pedal(pedal: &Pedal) -> Result<Self, ParameterError> {
        let Some(variant) = pedal.variant() else {
            return Ok(Self::Bypass);
        };
        Ok(match variant.kind {
            VariantKind::Bypass => Self::Bypass,
            VariantKind::Delay => Self::Delay(DelaySettings::from_pedal(pedal)?),
            VariantKind::SaturateDefault => Self::SaturateDefault(SaturateSettings::from_pedal(pedal)?),
            VariantKind::SaturateSmooth => Self::SaturateSmooth(SaturateSettings::from_pedal(pedal)?),
            VariantKind::Volume => Self::Volume(VolumeSettings::from_pedal(pedal)?),
        })
    }
}

/// Runs the selected variant of a shared pedal.
///
/// The pedal stays editable from other threads; it is locked only long enough to copy the values
/// the current block needs.
pub struct PedalProcessor {
    name: String,
    pedal: Arc<Mutex<Pedal>>,
    delay: Delay,
    smooth: SmoothSaturate,
    last_error: Option<ParameterError>,
}

impl PedalProcessor {
    pub fn new(pedal: Arc<Mutex<Pedal>>, sample_rate: u32) -> Self {
        let name = pedal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .name()
            .to_string();
        Self {
            name,
            pedal,
            delay: Delay::new(sample_rate),
            smooth: SmoothSaturate::new(sample_rate),
            last_error: None,
        }
    }

    pub fn pedal(&self) -> Arc<Mutex<Pedal>> {
        Arc::clone(&self.pedal)
    }

    fn settings(&mut self) -> Option<VariantSettings> {
        let result = {
            let pedal = self.pedal.lock().unwrap_or_else(PoisonError::into_inner);
            VariantSettings::from_pedal(&pedal)
        };
        match result {
            Ok(settings) => {
                self.last_error = None;
                Some(settings)
            }
            Err(err) => {
                if self.last_error.as_ref() != Some(&err) {
                    log::warn!("{} pedal bypassed: {err}", self.name);
                    self.last_error = Some(err);
                }
                None
            }
        }
    }
}

impl AudioProcessor for PedalProcessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn process_audio(&mut self, mut block: AudioBlock) -> AudioBlock {
        match self.settings() {
            None | Some(VariantSettings::Bypass) => {}
            Some(VariantSettings::Delay(settings)) => self.delay.process(&mut block, &settings),
            Some(VariantSettings::SaturateDefault(settings)) => {
                saturate::saturate_default(&mut block, &settings)
            }
            Some(VariantSettings::SaturateSmooth(settings)) => {
                self.smooth.process(&mut block, &settings)
            }
            Some(VariantSettings::Volume(settings)) => volume::volume(&mut block, &settings),
        }
        block
    }

    fn set_sample_rate(&mut self, sample_rate: u32) {
        self.delay.set_sample_rate(sample_rate);
        self.smooth.set_sample_rate(sample_rate);
    }
}
