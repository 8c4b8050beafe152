//! Bit-exact conversion between fixed-point and floating point sample representations.
//!
//! Integer width changes are arithmetic shifts by the bit-width difference (widening shifts
//! left, narrowing shifts right and truncates). Integer to float divides by the magnitude of the
//! source type's minimum, float to integer multiplies by the target type's maximum and truncates.

use std::fmt;

use crate::audio_engine::errors::ConversionError;

/// Sample representation used on a device stream.
///
/// `UInt8` and `Float64` can be reported by devices but have no defined mapping in [`convert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    Int8,
    Int16,
    Int32,
    Float32,
    UInt8,
    Float64,
}

impl SampleFormat {
    pub fn name(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
            Self::UInt8 => "uint8",
            Self::Float64 => "float64",
        }
    }

    /// Maps a device format reported by cpal, if it has a counterpart here.
    pub fn from_cpal(format: cpal::SampleFormat) -> Option<Self> {
        match format {
            cpal::SampleFormat::I8 => Some(Self::Int8),
            cpal::SampleFormat::I16 => Some(Self::Int16),
            cpal::SampleFormat::I32 => Some(Self::Int32),
            cpal::SampleFormat::F32 => Some(Self::Float32),
            cpal::SampleFormat::U8 => Some(Self::UInt8),
            cpal::SampleFormat::F64 => Some(Self::Float64),
            _ => None,
        }
    }

    pub fn to_cpal(self) -> cpal::SampleFormat {
        match self {
            Self::Int8 => cpal::SampleFormat::I8,
            Self::Int16 => cpal::SampleFormat::I16,
            Self::Int32 => cpal::SampleFormat::I32,
            Self::Float32 => cpal::SampleFormat::F32,
            Self::UInt8 => cpal::SampleFormat::U8,
            Self::Float64 => cpal::SampleFormat::F64,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A buffer of samples tagged with its representation.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Float32(Vec<f32>),
    UInt8(Vec<u8>),
    Float64(Vec<f64>),
}

impl Samples {
    pub fn format(&self) -> SampleFormat {
        match self {
            Self::Int8(_) => SampleFormat::Int8,
            Self::Int16(_) => SampleFormat::Int16,
            Self::Int32(_) => SampleFormat::Int32,
            Self::Float32(_) => SampleFormat::Float32,
            Self::UInt8(_) => SampleFormat::UInt8,
            Self::Float64(_) => SampleFormat::Float64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Int8(v) => v.len(),
            Self::Int16(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Float32(v) => v.len(),
            Self::UInt8(v) => v.len(),
            Self::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Converts `samples` into `target`, returning a new buffer.
///
/// Converting a buffer to its own format returns a copy.
pub fn convert(samples: &Samples, target: SampleFormat) -> Result<Samples, ConversionError> {
    let from = samples.format();
    let unsupported = ConversionError::Unsupported { from, to: target };

    let converted = match (samples, target) {
        (Samples::Int8(v), SampleFormat::Int8) => Samples::Int8(v.clone()),
        (Samples::Int16(v), SampleFormat::Int16) => Samples::Int16(v.clone()),
        (Samples::Int32(v), SampleFormat::Int32) => Samples::Int32(v.clone()),
        (Samples::Float32(v), SampleFormat::Float32) => Samples::Float32(v.clone()),

        (Samples::Int8(v), SampleFormat::Int16) => Samples::Int16(map(v, i8_to_i16)),
        (Samples::Int8(v), SampleFormat::Int32) => Samples::Int32(map(v, i8_to_i32)),
        (Samples::Int16(v), SampleFormat::Int32) => Samples::Int32(map(v, i16_to_i32)),
        (Samples::Int32(v), SampleFormat::Int16) => Samples::Int16(map(v, i32_to_i16)),
        (Samples::Int32(v), SampleFormat::Int8) => Samples::Int8(map(v, i32_to_i8)),
        (Samples::Int16(v), SampleFormat::Int8) => Samples::Int8(map(v, i16_to_i8)),

        (Samples::Int8(v), SampleFormat::Float32) => Samples::Float32(map(v, i8_to_f32)),
        (Samples::Int16(v), SampleFormat::Float32) => Samples::Float32(map(v, i16_to_f32)),
        (Samples::Int32(v), SampleFormat::Float32) => Samples::Float32(map(v, i32_to_f32)),
        (Samples::Float32(v), SampleFormat::Int8) => Samples::Int8(map(v, f32_to_i8)),
        (Samples::Float32(v), SampleFormat::Int16) => Samples::Int16(map(v, f32_to_i16)),
        (Samples::Float32(v), SampleFormat::Int32) => Samples::Int32(map(v, f32_to_i32)),

        _ => return Err(unsupported),
    };

    Ok(converted)
}

fn map<S: Copy, T>(input: &[S], f: fn(S) -> T) -> Vec<T> {
    input.iter().map(|s| f(*s)).collect()
}

pub fn i8_to_i16(s: i8) -> i16 {
    i16::from(s) << 8
}

pub fn i8_to_i32(s: i8) -> i32 {
    i32::from(s) << 24
}

pub fn i16_to_i32(s: i16) -> i32 {
    i32::from(s) << 16
}

pub fn i32_to_i16(s: i32) -> i16 {
    (s >> 16) as i16
}

pub fn i32_to_i8(s: i32) -> i8 {
    (s >> 24) as i8
}

pub fn i16_to_i8(s: i16) -> i8 {
    (s >> 8) as i8
}

pub fn i8_to_f32(s: i8) -> f32 {
    f32::from(s) / 128.0
}

pub fn i16_to_f32(s: i16) -> f32 {
    f32::from(s) / 32_768.0
}

pub fn i32_to_f32(s: i32) -> f32 {
    (f64::from(s) / 2_147_483_648.0) as f32
}

// `as` truncates toward zero and saturates outside the target range.
pub fn f32_to_i8(s: f32) -> i8 {
    (s * f32::from(i8::MAX)) as i8
}

pub fn f32_to_i16(s: f32) -> i16 {
    (s * f32::from(i16::MAX)) as i16
}

pub fn f32_to_i32(s: f32) -> i32 {
    (f64::from(s) * f64::from(i32::MAX)) as i32
}

/// Per-sample access used by device callbacks, which cannot allocate a [`Samples`] buffer.
pub trait DeviceSample: cpal::SizedSample + Send + 'static {
    const FORMAT: SampleFormat;

    fn to_f32(self) -> f32;
    fn from_f32(sample: f32) -> Self;
}

impl DeviceSample for i8 {
    const FORMAT: SampleFormat = SampleFormat::Int8;

    fn to_f32(self) -> f32 {
        i8_to_f32(self)
    }

    fn from_f32(sample: f32) -> Self {
        f32_to_i8(sample)
    }
}

impl DeviceSample for i16 {
    const FORMAT: SampleFormat = SampleFormat::Int16;

    fn to_f32(self) -> f32 {
        i16_to_f32(self)
    }

    fn from_f32(sample: f32) -> Self {
        f32_to_i16(sample)
    }
}

impl DeviceSample for i32 {
    const FORMAT: SampleFormat = SampleFormat::Int32;

    fn to_f32(self) -> f32 {
        i32_to_f32(self)
    }

    fn from_f32(sample: f32) -> Self {
        f32_to_i32(sample)
    }
}

impl DeviceSample for f32 {
    const FORMAT: SampleFormat = SampleFormat::Float32;

    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(sample: f32) -> Self {
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widening_shifts_left() {
        let out = convert(&Samples::Int8(vec![1, -1, i8::MIN, i8::MAX]), SampleFormat::Int16).unwrap();
        assert_eq!(out, Samples::Int16(vec![256, -256, i16::MIN, 32_512]));

        let out = convert(&Samples::Int16(vec![1, -2]), SampleFormat::Int32).unwrap();
        assert_eq!(out, Samples::Int32(vec![65_536, -131_072]));
    }

    #[test]
    fn test_narrowing_truncates() {
        // Arithmetic shift rounds toward negative infinity.
        let out = convert(&Samples::Int16(vec![255, -1, 511, i16::MIN]), SampleFormat::Int8).unwrap();
        assert_eq!(out, Samples::Int8(vec![0, -1, 1, i8::MIN]));

        let out = convert(&Samples::Int32(vec![i32::MAX, 65_535]), SampleFormat::Int16).unwrap();
        assert_eq!(out, Samples::Int16(vec![i16::MAX, 0]));
    }

    #[test]
    fn test_int_to_float_uses_negative_full_scale() {
        let out = convert(&Samples::Int16(vec![i16::MIN, 0, 16_384]), SampleFormat::Float32).unwrap();
        assert_eq!(out, Samples::Float32(vec![-1.0, 0.0, 0.5]));

        let out = convert(&Samples::Int8(vec![i8::MAX]), SampleFormat::Float32).unwrap();
        assert_eq!(out, Samples::Float32(vec![127.0 / 128.0]));
    }

    #[test]
    fn test_float_to_int_scales_by_max_and_truncates() {
        let out = convert(&Samples::Float32(vec![1.0, -1.0, 0.5]), SampleFormat::Int16).unwrap();
        assert_eq!(out, Samples::Int16(vec![32_767, -32_767, 16_383]));

        let out = convert(&Samples::Float32(vec![0.999]), SampleFormat::Int8).unwrap();
        assert_eq!(out, Samples::Int8(vec![126]));
    }

    #[test]
    fn test_round_trip_all_supported_pairs() {
        let formats = [
            SampleFormat::Int8,
            SampleFormat::Int16,
            SampleFormat::Int32,
            SampleFormat::Float32,
        ];
        let reference = [-0.75f32, -0.25, 0.0, 0.25, 0.5];

        for from in formats {
            let original = convert(&Samples::Float32(reference.to_vec()), from).unwrap();
            for to in formats {
                let there = convert(&original, to).unwrap();
                let back = convert(&there, from).unwrap();
                let a = convert(&original, SampleFormat::Float32).unwrap();
                let b = convert(&back, SampleFormat::Float32).unwrap();
                let (Samples::Float32(a), Samples::Float32(b)) = (a, b) else {
                    panic!("expected float buffers");
                };
                for (x, y) in a.iter().zip(b.iter()) {
                    assert!((x - y).abs() < 0.02, "{from} -> {to}: {x} vs {y}");
                }
            }
        }
    }

    #[test]
    fn test_unsupported_pair_names_both_formats() {
        let err = convert(&Samples::UInt8(vec![128]), SampleFormat::Float32).unwrap_err();
        assert_eq!(
            err,
            ConversionError::Unsupported {
                from: SampleFormat::UInt8,
                to: SampleFormat::Float32
            }
        );
        assert_eq!(err.to_string(), "unsupported conversion from uint8 to float32");

        assert!(convert(&Samples::Float32(vec![0.0]), SampleFormat::Float64).is_err());
    }

    #[test]
    fn test_device_sample_matches_buffer_conversion() {
        assert_eq!(<i16 as DeviceSample>::to_f32(-16_384), -0.5);
        assert_eq!(<i16 as DeviceSample>::from_f32(0.5), 16_383);
        assert_eq!(<i32 as DeviceSample>::from_f32(1.0), i32::MAX);
        assert_eq!(<f32 as DeviceSample>::FORMAT, SampleFormat::Float32);
    }
}
