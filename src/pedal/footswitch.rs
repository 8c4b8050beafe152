//! Discrete effect parameter with latching, momentary and mode-cycling behaviour.

use std::fmt;
use std::str::FromStr;

use crate::audio_engine::errors::ParameterError;
use crate::messages::NameChange;
use crate::pedal::observers::Observers;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FootswitchType {
    /// Each press toggles the state.
    #[default]
    Latching,
    /// The state differs from the default only while held.
    Momentary,
    /// Each press advances through a list of named modes.
    Mode,
}

impl FootswitchType {
    pub const ALL: [FootswitchType; 3] = [Self::Latching, Self::Momentary, Self::Mode];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Latching => "latching",
            Self::Momentary => "momentary",
            Self::Mode => "mode",
        }
    }
}

impl FromStr for FootswitchType {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParameterError::InvalidType(s.to_string()))
    }
}

impl fmt::Display for FootswitchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
pub struct FootswitchEvents {
    pub state_changed: Observers<bool>,
    pub mode_changed: Observers<String>,
    pub name_changed: Observers<NameChange>,
    pub removed: Observers<String>,
}

#[derive(Debug)]
pub struct Footswitch {
    name: String,
    footswitch_type: FootswitchType,
    default_state: bool,
    state: bool,
    modes: Vec<String>,
    mode_index: usize,
    display_enabled: bool,
    modified: bool,
    pub events: FootswitchEvents,
}

impl Footswitch {
    /// A latching switch that starts in `default_state`.
    pub fn latching(name: impl Into<String>, default_state: bool) -> Result<Self, ParameterError> {
        Self::new(name, FootswitchType::Latching, default_state, Vec::new())
    }

    pub fn momentary(name: impl Into<String>, default_state: bool) -> Result<Self, ParameterError> {
        Self::new(name, FootswitchType::Momentary, default_state, Vec::new())
    }

    /// A mode switch positioned on the first of `modes`.
    pub fn with_modes(name: impl Into<String>, modes: Vec<String>) -> Result<Self, ParameterError> {
        Self::new(name, FootswitchType::Mode, true, modes)
    }

    pub fn new(
        name: impl Into<String>,
        footswitch_type: FootswitchType,
        default_state: bool,
        modes: Vec<String>,
    ) -> Result<Self, ParameterError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ParameterError::Name);
        }
        Ok(Self {
            name,
            footswitch_type,
            default_state,
            state: default_state,
            modes,
            mode_index: 0,
            display_enabled: false,
            modified: false,
            events: FootswitchEvents::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn footswitch_type(&self) -> FootswitchType {
        self.footswitch_type
    }

    pub fn default_state(&self) -> bool {
        self.default_state
    }

    pub fn state(&self) -> bool {
        self.state
    }

    pub fn modes(&self) -> &[String] {
        &self.modes
    }

    /// Current mode, if the switch has any modes.
    pub fn mode(&self) -> Option<&str> {
        self.modes.get(self.mode_index).map(String::as_str)
    }

    pub fn display_enabled(&self) -> bool {
        self.display_enabled
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn reset_modified(&mut self) {
        self.modified = false;
    }

    pub fn set_footswitch_type(&mut self, footswitch_type: FootswitchType) {
        if self.footswitch_type != footswitch_type {
            log::debug!("Set {} footswitch type to {}", self.name, footswitch_type);
            self.footswitch_type = footswitch_type;
            self.modified = true;
        }
    }

    /// Parses `footswitch_type` before applying it.
    pub fn set_footswitch_type_str(&mut self, footswitch_type: &str) -> Result<(), ParameterError> {
        self.set_footswitch_type(footswitch_type.parse()?);
        Ok(())
    }

    pub fn set_default_state(&mut self, default_state: bool) {
        if self.default_state != default_state {
            log::debug!("Set {} footswitch default state to {}", self.name, default_state);
            self.default_state = default_state;
            self.modified = true;
        }
    }

    /// Only valid for latching and momentary switches.
    pub fn set_state(&mut self, state: bool) -> Result<(), ParameterError> {
        if self.footswitch_type == FootswitchType::Mode {
            return Err(ParameterError::InvalidType(format!(
                "{} footswitch is a mode switch and has no on/off state",
                self.name
            )));
        }
        if self.state != state {
            log::debug!("Set {} footswitch state to {}", self.name, state);
            self.state = state;
            self.modified = true;
            self.events.state_changed.notify(&state);
        }
        Ok(())
    }

    /// Replaces the mode list and selects its first entry.
    pub fn set_modes(&mut self, modes: Vec<String>) {
        if self.modes == modes {
            return;
        }
        log::debug!("Set {} footswitch modes to {:?}", self.name, modes);
        self.modes = modes;
        self.mode_index = 0;
        self.modified = true;
        if let Some(mode) = self.modes.first().cloned() {
            self.events.mode_changed.notify(&mode);
        }
    }

    /// Only valid for mode switches, and `mode` must be one of [`Footswitch::modes`].
    pub fn set_mode(&mut self, mode: &str) -> Result<(), ParameterError> {
        if self.footswitch_type != FootswitchType::Mode {
            return Err(ParameterError::InvalidType(format!(
                "{} footswitch is a {} switch and has no modes",
                self.name, self.footswitch_type
            )));
        }
        let index = self
            .modes
            .iter()
            .position(|m| m == mode)
            .ok_or_else(|| ParameterError::Mode(mode.to_string()))?;
        self.select_mode(index);
        Ok(())
    }

    /// Advances to the next mode, wrapping around. No-op without modes.
    pub fn next_mode(&mut self) {
        if !self.modes.is_empty() {
            self.select_mode((self.mode_index + 1) % self.modes.len());
        }
    }

    fn select_mode(&mut self, index: usize) {
        if self.mode_index == index {
            return;
        }
        self.mode_index = index;
        self.modified = true;
        let mode = self.modes[index].clone();
        log::debug!("Set {} footswitch mode to {}", self.name, mode);
        self.events.mode_changed.notify(&mode);
    }

    /// User pressed the switch.
    pub fn press(&mut self) {
        match self.footswitch_type {
            FootswitchType::Latching => self.apply_state(!self.state),
            FootswitchType::Momentary => self.apply_state(!self.default_state),
            FootswitchType::Mode => self.next_mode(),
        }
    }

    /// User released the switch. Only momentary switches react.
    pub fn release(&mut self) {
        if self.footswitch_type == FootswitchType::Momentary {
            self.apply_state(self.default_state);
        }
    }

    fn apply_state(&mut self, state: bool) {
        if self.state != state {
            log::debug!("Set {} footswitch state to {}", self.name, state);
            self.state = state;
            self.events.state_changed.notify(&state);
        }
    }

    pub fn set_display_enabled(&mut self, enabled: bool) {
        if self.display_enabled != enabled {
            log::debug!(
                "{} {} footswitch display",
                if enabled { "Enable" } else { "Disable" },
                self.name
            );
            self.display_enabled = enabled;
            self.modified = true;
        }
    }

    pub(crate) fn change_name(&mut self, new_name: impl Into<String>) -> Result<(), ParameterError> {
        let new_name = new_name.into();
        if new_name.is_empty() {
            return Err(ParameterError::Name);
        }
        if self.name != new_name {
            log::debug!("{} footswitch name changed to {}", self.name, new_name);
            let old_name = std::mem::replace(&mut self.name, new_name);
            self.modified = true;
            let change = NameChange {
                old_name,
                new_name: self.name.clone(),
            };
            self.events.name_changed.notify(&change);
        }
        Ok(())
    }

    pub(crate) fn remove(&mut self) {
        log::debug!("Remove {} footswitch", self.name);
        let name = self.name.clone();
        self.events.removed.notify(&name);
    }
}
