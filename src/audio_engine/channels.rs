//! Channel selection and layout mapping between device buffers and planar blocks.

use crate::audio_engine::sample_format::DeviceSample;

/// Appends the `selected` device channels of an interleaved buffer to `planar`, one destination
/// per selected channel.
///
/// Trailing partial frames are ignored. A selected index beyond the device's channel count reads
/// as silence.
pub fn deinterleave<T: DeviceSample>(
    interleaved: &[T],
    device_channels: usize,
    selected: &[usize],
    planar: &mut [Vec<f32>],
) {
    if device_channels == 0 {
        return;
    }
    for frame in interleaved.chunks_exact(device_channels) {
        for (dest, &channel) in planar.iter_mut().zip(selected) {
            dest.push(frame.get(channel).map_or(0.0, |s| s.to_f32()));
        }
    }
}

/// Writes planar frames into an interleaved device buffer.
///
/// `output_channels[i]` is the physical channel fed by source channel `i % sources.len()`, so a
/// mono source feeds every listed channel. Physical channels that are not listed, or lie beyond
/// `device_channels`, are left untouched. `start` is the first source frame to copy; as many
/// frames as fit in both `sources` and `out` are written. Returns the frame count written.
pub fn interleave_remapped<T: DeviceSample>(
    sources: &[Vec<f32>],
    start: usize,
    output_channels: &[usize],
    device_channels: usize,
    out: &mut [T],
) -> usize {
    if device_channels == 0 {
        return 0;
    }
    let available = sources.first().map_or(0, |c| c.len().saturating_sub(start));
    let frames = available.min(out.len() / device_channels);
    if sources.is_empty() {
        return frames;
    }
    for (f, frame) in out.chunks_exact_mut(device_channels).take(frames).enumerate() {
        for (i, &physical) in output_channels.iter().enumerate() {
            if let Some(slot) = frame.get_mut(physical) {
                *slot = T::from_f32(sources[i % sources.len()][start + f]);
            }
        }
    }
    frames
}
