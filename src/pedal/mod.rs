//! Parameter model: knobs, footswitches and the pedals that group them.

pub mod footswitch;
pub mod knob;
pub mod observers;
#[allow(clippy::module_inception)]
pub mod pedal;

pub use footswitch::{Footswitch, FootswitchType};
pub use knob::{Knob, KnobMode, KnobSettings};
pub use observers::{Observers, SubscriptionId};
pub use pedal::{Pedal, Variant, VariantKind};
