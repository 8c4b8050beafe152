//! Data passed between the device callbacks, the processing thread and parameter observers.
//!
//! [`AudioBlock`] is the unit that travels through the bounded queues. Ownership of a block moves
//! with it: a callback builds it, the queue holds it, the processing thread consumes it.

/// One block of planar multi-channel audio.
///
/// Every channel holds the same number of frames.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    channels: Vec<Vec<f32>>,
}

impl AudioBlock {
    /// Wraps planar channel data. Returns `None` if the channels differ in length.
    pub fn from_channels(channels: Vec<Vec<f32>>) -> Option<Self> {
        let frames = channels.first().map_or(0, Vec::len);
        if channels.iter().any(|c| c.len() != frames) {
            return None;
        }
        Some(Self { channels })
    }

    /// A block of zeros with the given shape.
    pub fn silence(channel_count: usize, frame_count: usize) -> Self {
        Self {
            channels: vec![vec![0.0; frame_count]; channel_count],
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut [Vec<f32>] {
        &mut self.channels
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }

    /// Multiplies every sample by `gain`.
    pub fn scale(&mut self, gain: f32) {
        for sample in self.channels.iter_mut().flatten() {
            *sample *= gain;
        }
    }
}

/// Payload of a rename notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameChange {
    pub old_name: String,
    pub new_name: String,
}
