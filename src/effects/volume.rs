//! Output level pedal.

use crate::audio_engine::errors::ParameterError;
use crate::effects::{ON_OFF_FOOTSWITCH, OUTPUT_KNOB, output_knob};
use crate::messages::AudioBlock;
use crate::pedal::{Footswitch, Pedal, VariantKind};

/// The stock volume pedal: -50 to +20 dB output, one "Default" variant.
pub fn volume_pedal() -> Result<Pedal, ParameterError> {
    let mut pedal = Pedal::new("Volume")?;
    pedal.add_knob(output_knob(20.0, 0.0)?)?;
    let mut on_off = Footswitch::latching(ON_OFF_FOOTSWITCH, true)?;
    on_off.set_display_enabled(true);
    pedal.add_footswitch(on_off)?;
    pedal.add_variant("Default", VariantKind::Volume)?;
    pedal.reset_modified();
    Ok(pedal)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeSettings {
    pub on: bool,
    pub output: f32,
}

impl VolumeSettings {
    pub fn from_pedal(pedal: &Pedal) -> Result<Self, ParameterError> {
        Ok(Self {
            on: pedal.footswitch_state(ON_OFF_FOOTSWITCH)?,
            output: pedal.knob_value(OUTPUT_KNOB)? as f32,
        })
    }
}

/// Applies the output gain while on. Unlike the other effects, off means untouched.
pub fn volume(block: &mut AudioBlock, settings: &VolumeSettings) {
    if settings.on {
        block.scale(settings.output);
    }
}
