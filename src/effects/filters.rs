//! Butterworth IIR design and cascaded second-order-section filtering.
//!
//! Filters are designed as analog Butterworth prototypes, transformed to the requested band,
//! mapped to the z-plane with a prewarped bilinear transform and split into biquads built from
//! conjugate pole pairs. Each biquad is scaled to unity gain at its passband reference point
//! (DC for low-pass and band-stop, Nyquist for high-pass), so the cascade has unity passband gain.
//!
//! Sections run in transposed direct form II. State lives in [`FilterChainState`], separate from
//! the coefficients, so one design serves every channel and state carries across blocks.

use std::f64::consts::PI;

use num_complex::Complex64;

const PAIR_EPSILON: f64 = 1e-12;

/// Frequency response shape of a Butterworth design.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterBand {
    LowPass(f64),
    HighPass(f64),
    /// Lower and upper band edges in Hz.
    BandStop(f64, f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    fn identity() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    /// Magnitude of the transfer function at z = 1 (`dc == true`) or z = -1.
    fn gain_at(&self, dc: bool) -> f64 {
        let s = if dc { 1.0 } else { -1.0 };
        let num = self.b0 + s * self.b1 + self.b2;
        let den = 1.0 + s * self.a1 + self.a2;
        (num / den).abs()
    }

    fn normalized(mut self, dc: bool) -> Self {
        let gain = self.gain_at(dc);
        if !gain.is_finite() || gain < PAIR_EPSILON {
            return Self::identity();
        }
        self.b0 /= gain;
        self.b1 /= gain;
        self.b2 /= gain;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BiquadState {
    z1: f64,
    z2: f64,
}

fn biquad_process(coeffs: &BiquadCoeffs, state: &mut BiquadState, x: f64) -> f64 {
    let y = coeffs.b0 * x + state.z1;
    state.z1 = coeffs.b1 * x - coeffs.a1 * y + state.z2;
    state.z2 = coeffs.b2 * x - coeffs.a2 * y;
    y
}

fn clamp_freq_hz(fs_hz: f64, freq_hz: f64) -> f64 {
    let nyquist = fs_hz * 0.5;
    let max_hz = (nyquist * 0.9).max(1.0);
    freq_hz.clamp(1.0, max_hz)
}

/// Maps a digital frequency to the analog frequency the bilinear transform sends onto it.
fn prewarp(fs_hz: f64, freq_hz: f64) -> f64 {
    2.0 * fs_hz * (PI * freq_hz / fs_hz).tan()
}

/// Left-half-plane poles of the normalized analog Butterworth prototype.
fn prototype_poles(order: usize) -> Vec<Complex64> {
    let n = order as f64;
    (0..order)
        .map(|k| {
            let m = 2.0 * k as f64 - n + 1.0;
            -Complex64::from_polar(1.0, PI * m / (2.0 * n))
        })
        .collect()
}

fn bilinear(fs_hz: f64, pole: Complex64) -> Complex64 {
    let fs2 = Complex64::new(2.0 * fs_hz, 0.0);
    (fs2 + pole) / (fs2 - pole)
}

/// Numerator polynomial for one section, given how many poles it carries.
#[derive(Debug, Clone, Copy)]
enum Zeros {
    /// All zeros at z = -1.
    Nyquist,
    /// All zeros at z = 1.
    Dc,
    /// Zero pair on the unit circle at the given angle.
    Notch(f64),
}

impl Zeros {
    fn numerator(self, pole_count: usize) -> [f64; 3] {
        match (self, pole_count) {
            (Self::Nyquist, 1) => [1.0, 1.0, 0.0],
            (Self::Nyquist, _) => [1.0, 2.0, 1.0],
            (Self::Dc, 1) => [1.0, -1.0, 0.0],
            (Self::Dc, _) => [1.0, -2.0, 1.0],
            (Self::Notch(theta), _) => [1.0, -2.0 * theta.cos(), 1.0],
        }
    }
}

/// Groups digital poles into first and second order denominators.
fn pole_sections(poles: &[Complex64]) -> Vec<(usize, [f64; 2])> {
    let mut sections = Vec::new();
    let mut real = Vec::new();
    for pole in poles {
        if pole.im > PAIR_EPSILON {
            sections.push((2, [-2.0 * pole.re, pole.norm_sqr()]));
        } else if pole.im.abs() <= PAIR_EPSILON {
            real.push(pole.re);
        }
    }
    for pair in real.chunks(2) {
        match pair {
            [p1, p2] => sections.push((2, [-(p1 + p2), p1 * p2])),
            [p] => sections.push((1, [-p, 0.0])),
            _ => {}
        }
    }
    sections
}

/// A cascade of biquads implementing one filter.
#[derive(Debug, Clone, PartialEq)]
pub struct SosFilter {
    sections: Vec<BiquadCoeffs>,
}

impl SosFilter {
    /// Designs a digital Butterworth filter of the given prototype `order` at `fs_hz`.
    ///
    /// Band-stop designs carry twice `order` poles. Corner frequencies are clamped below Nyquist.
    pub fn butterworth(order: usize, band: FilterBand, fs_hz: f64) -> Self {
        if order == 0 || !fs_hz.is_finite() || fs_hz <= 0.0 {
            return Self {
                sections: Vec::new(),
            };
        }
        let prototype = prototype_poles(order);

        let (analog, zeros, dc_reference) = match band {
            FilterBand::LowPass(freq) => {
                let wo = prewarp(fs_hz, clamp_freq_hz(fs_hz, freq));
                let poles = prototype.iter().map(|p| *p * wo).collect::<Vec<_>>();
                (poles, Zeros::Nyquist, true)
            }
            FilterBand::HighPass(freq) => {
                let wo = prewarp(fs_hz, clamp_freq_hz(fs_hz, freq));
                let poles = prototype.iter().map(|p| wo / *p).collect::<Vec<_>>();
                (poles, Zeros::Dc, false)
            }
            FilterBand::BandStop(low, high) => {
                let w1 = prewarp(fs_hz, clamp_freq_hz(fs_hz, low.min(high)));
                let w2 = prewarp(fs_hz, clamp_freq_hz(fs_hz, low.max(high)));
                let wo = (w1 * w2).sqrt();
                let bw = w2 - w1;
                let mut poles = Vec::with_capacity(2 * order);
                for p in &prototype {
                    let p_hp = (bw / 2.0) / *p;
                    let root = (p_hp * p_hp - wo * wo).sqrt();
                    poles.push(p_hp + root);
                    poles.push(p_hp - root);
                }
                let theta = 2.0 * (wo / (2.0 * fs_hz)).atan();
                (poles, Zeros::Notch(theta), true)
            }
        };

        let digital = analog.iter().map(|p| bilinear(fs_hz, *p)).collect::<Vec<_>>();
        let sections = pole_sections(&digital)
            .into_iter()
            .map(|(pole_count, [a1, a2])| {
                let [b0, b1, b2] = zeros.numerator(pole_count);
                BiquadCoeffs { b0, b1, b2, a1, a2 }.normalized(dc_reference)
            })
            .collect();

        Self { sections }
    }

    pub fn sections(&self) -> &[BiquadCoeffs] {
        &self.sections
    }
}

/// Several filters applied in series.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterChain {
    filters: Vec<SosFilter>,
}

impl FilterChain {
    pub fn new(filters: Vec<SosFilter>) -> Self {
        Self { filters }
    }

    pub fn section_count(&self) -> usize {
        self.filters.iter().map(|f| f.sections.len()).sum()
    }

    /// Zeroed state sized for this chain.
    pub fn new_state(&self) -> FilterChainState {
        FilterChainState {
            sections: vec![BiquadState::default(); self.section_count()],
        }
    }

    /// Filters `samples` in place, continuing from and updating `state`.
    pub fn process(&self, state: &mut FilterChainState, samples: &mut [f32]) {
        if state.sections.len() != self.section_count() {
            *state = self.new_state();
        }
        for sample in samples.iter_mut() {
            let mut x = f64::from(*sample);
            let coeffs = self.filters.iter().flat_map(|f| f.sections.iter());
            for (c, s) in coeffs.zip(state.sections.iter_mut()) {
                x = biquad_process(c, s, x);
            }
            *sample = x as f32;
        }
    }
}

/// Filter memory for one channel of a [`FilterChain`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChainState {
    sections: Vec<BiquadState>,
}

impl FilterChainState {
    pub fn reset(&mut self) {
        self.sections.iter_mut().for_each(|s| *s = BiquadState::default());
    }
}
