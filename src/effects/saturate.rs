//! Hard-clip saturation, optionally shaped by a fixed pre-filter chain.

use crate::audio_engine::constants::{
    SATURATE_BAND_STOP_HIGH_HZ, SATURATE_BAND_STOP_LOW_HZ, SATURATE_BAND_STOP_ORDER,
    SATURATE_HIGH_PASS_HZ, SATURATE_HIGH_PASS_ORDER, SATURATE_LOW_PASS_HZ, SATURATE_LOW_PASS_ORDER,
};
use crate::audio_engine::errors::ParameterError;
use crate::effects::filters::{FilterBand, FilterChain, FilterChainState, SosFilter};
use crate::effects::{ON_OFF_FOOTSWITCH, OUTPUT_KNOB, output_knob};
use crate::messages::AudioBlock;
use crate::pedal::{Footswitch, Knob, KnobMode, KnobSettings, Pedal, VariantKind};

pub const AMOUNT_KNOB: &str = "Amount";

/// The stock saturate pedal with "Default" and "Smooth" variants, "Smooth" selected.
pub fn saturate_pedal() -> Result<Pedal, ParameterError> {
    let mut pedal = Pedal::new("Saturate")?;
    pedal.add_knob(Knob::with_settings(
        AMOUNT_KNOB,
        KnobSettings {
            minimum_value: 0.0,
            maximum_value: 40.0,
            default_value: 0.0,
            precision: 1.0,
            mode: KnobMode::Logarithmic,
            display_enabled: true,
            value: 10.0,
            ..KnobSettings::default()
        },
    )?)?;
    pedal.add_knob(output_knob(0.0, -17.0)?)?;
    let mut on_off = Footswitch::latching(ON_OFF_FOOTSWITCH, true)?;
    on_off.set_display_enabled(true);
    pedal.add_footswitch(on_off)?;
    pedal.add_variant("Default", VariantKind::SaturateDefault)?;
    pedal.add_variant("Smooth", VariantKind::SaturateSmooth)?;
    pedal.reset_modified();
    Ok(pedal)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaturateSettings {
    pub on: bool,
    /// Linear drive gain.
    pub amount: f32,
    pub output: f32,
}

impl SaturateSettings {
    pub fn from_pedal(pedal: &Pedal) -> Result<Self, ParameterError> {
        Ok(Self {
            on: pedal.footswitch_state(ON_OFF_FOOTSWITCH)?,
            amount: pedal.knob_value(AMOUNT_KNOB)? as f32,
            output: pedal.knob_value(OUTPUT_KNOB)? as f32,
        })
    }
}

fn clip(block: &mut AudioBlock, drive: f32) {
    for sample in block.channels_mut().iter_mut().flatten() {
        *sample = (drive * *sample).clamp(-1.0, 1.0);
    }
}

/// Static clip: `clip(amount * x, -1, 1)` while on, then the output gain.
pub fn saturate_default(block: &mut AudioBlock, settings: &SaturateSettings) {
    if settings.on {
        clip(block, settings.amount);
    }
    block.scale(settings.output);
}

/// High-pass, band-stop and low-pass in series, designed for one sample rate.
pub fn smooth_filter_chain(sample_rate: u32) -> FilterChain {
    let fs = f64::from(sample_rate);
    FilterChain::new(vec![
        SosFilter::butterworth(
            SATURATE_HIGH_PASS_ORDER,
            FilterBand::HighPass(SATURATE_HIGH_PASS_HZ),
            fs,
        ),
        SosFilter::butterworth(
            SATURATE_BAND_STOP_ORDER,
            FilterBand::BandStop(SATURATE_BAND_STOP_LOW_HZ, SATURATE_BAND_STOP_HIGH_HZ),
            fs,
        ),
        SosFilter::butterworth(
            SATURATE_LOW_PASS_ORDER,
            FilterBand::LowPass(SATURATE_LOW_PASS_HZ),
            fs,
        ),
    ])
}

/// Filtered saturation with per-channel filter memory carried across blocks.
#[derive(Debug, Clone)]
pub struct SmoothSaturate {
    sample_rate: u32,
    chain: FilterChain,
    states: Vec<FilterChainState>,
}

impl SmoothSaturate {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            chain: smooth_filter_chain(sample_rate),
            states: Vec::new(),
        }
    }

    /// Redesigns the filters and clears their memory.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        if self.sample_rate != sample_rate {
            log::debug!("Setting Smooth Saturate sample rate to {sample_rate}");
            self.sample_rate = sample_rate;
            self.chain = smooth_filter_chain(sample_rate);
            self.states.clear();
        }
    }

    pub fn process(&mut self, block: &mut AudioBlock, settings: &SaturateSettings) {
        if settings.on {
            if self.states.len() != block.channel_count() {
                self.states
                    .resize_with(block.channel_count(), || self.chain.new_state());
            }
            for (state, channel) in self.states.iter_mut().zip(block.channels_mut()) {
                self.chain.process(state, channel);
            }
            clip(block, settings.amount);
        }
        block.scale(settings.output);
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use super::*;

    fn on(amount: f32) -> SaturateSettings {
        SaturateSettings {
            on: true,
            amount,
            output: 1.0,
        }
    }

    fn sine(len: usize, freq: f64, fs: f64) -> Vec<f32> {
        (0..len)
            .map(|n| (0.5 * (2.0 * PI * freq * n as f64 / fs).sin()) as f32)
            .collect()
    }

    #[test]
    fn test_default_clips_drive() {
        let mut block = AudioBlock::from_channels(vec![vec![0.8; 4], vec![-0.3; 4]]).unwrap();
        let settings = SaturateSettings {
            output: 0.5,
            ..on(2.0)
        };
        saturate_default(&mut block, &settings);
        assert_eq!(block.channel(0), Some(&[0.5; 4][..]));
        assert!(block.channel(1).unwrap().iter().all(|s| (*s + 0.3).abs() < 1e-6));
    }

    #[test]
    fn test_default_off_only_scales() {
        let mut block = AudioBlock::from_channels(vec![vec![0.8, -2.0]]).unwrap();
        let settings = SaturateSettings {
            on: false,
            amount: 10.0,
            output: 0.5,
        };
        saturate_default(&mut block, &settings);
        assert_eq!(block.channel(0), Some(&[0.4, -1.0][..]));
    }

    #[test]
    fn test_stock_pedal_amount_is_decibels() {
        let mut pedal = saturate_pedal().unwrap();
        pedal.set_knob_value(AMOUNT_KNOB, 20.0).unwrap();
        pedal.set_knob_value(OUTPUT_KNOB, 0.0).unwrap();
        let settings = SaturateSettings::from_pedal(&pedal).unwrap();
        assert!((settings.amount - 10.0).abs() < 1e-5);
        assert_eq!(settings.output, 1.0);
        assert_eq!(
            pedal.variant().map(|v| v.kind),
            Some(VariantKind::SaturateSmooth)
        );
    }

    #[test]
    fn test_smooth_is_continuous_across_blocks() {
        let fs = 44_100;
        let signal = sine(8_192, 1_000.0, f64::from(fs));

        let mut whole = SmoothSaturate::new(fs);
        let mut one_block = AudioBlock::from_channels(vec![signal.clone(), signal.clone()]).unwrap();
        whole.process(&mut one_block, &on(1.0));

        let mut split = SmoothSaturate::new(fs);
        let mut pieces = Vec::new();
        for chunk in signal.chunks(100) {
            let mut block = AudioBlock::from_channels(vec![chunk.to_vec(), chunk.to_vec()]).unwrap();
            split.process(&mut block, &on(1.0));
            pieces.extend_from_slice(block.channel(1).unwrap());
        }

        for (i, (a, b)) in one_block.channel(1).unwrap().iter().zip(&pieces).enumerate() {
            assert!((a - b).abs() < 1e-6, "sample {i}: {a} vs {b}");
        }
    }

    #[test]
    fn test_smooth_state_frozen_while_off() {
        let fs = 48_000;
        let signal = sine(512, 440.0, f64::from(fs));
        let mut effect = SmoothSaturate::new(fs);
        let mut first = AudioBlock::from_channels(vec![signal.clone()]).unwrap();
        effect.process(&mut first, &on(1.0));
        let snapshot = effect.states.clone();

        let off = SaturateSettings {
            on: false,
            ..on(1.0)
        };
        let mut bypassed = AudioBlock::from_channels(vec![signal.clone()]).unwrap();
        effect.process(&mut bypassed, &off);

        assert_eq!(effect.states, snapshot);
        assert_eq!(bypassed.channel(0), Some(signal.as_slice()));
    }

    #[test]
    fn test_smooth_attenuates_rumble() {
        let fs = 44_100;
        let mut effect = SmoothSaturate::new(fs);
        let mut block = AudioBlock::from_channels(vec![sine(44_100, 20.0, f64::from(fs))]).unwrap();
        effect.process(&mut block, &on(1.0));
        let tail = &block.channel(0).unwrap()[22_050..];
        assert!(tail.iter().all(|s| s.abs() < 0.01));
    }
}
