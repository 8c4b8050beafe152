//! Guitar effect pedals running on a real-time audio pipeline.
//!
//! Audio comes from a file, a live input or a test tone, passes through one pedal variant and is
//! played on an output device.

pub mod audio_engine;
pub mod effects;
pub mod messages;
pub mod pedal;

pub use audio_engine::{AudioError, EngineConfig, PipelineController, SourceType, StreamConfig};
pub use effects::{AudioProcessor, PedalProcessor};
pub use pedal::{Footswitch, Knob, Pedal};
