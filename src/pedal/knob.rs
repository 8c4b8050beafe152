//! Continuous effect parameter.

use std::fmt;
use std::str::FromStr;

use crate::audio_engine::errors::ParameterError;
use crate::messages::NameChange;
use crate::pedal::observers::Observers;

/// Scale law mapping a knob's raw value to the unit used by DSP code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KnobMode {
    #[default]
    Linear,
    /// Raw values are decibels, linearized with `10^(v/20)`.
    Logarithmic,
}

impl KnobMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Logarithmic => "logarithmic",
        }
    }

    pub fn linearize(self, value: f64) -> f64 {
        match self {
            Self::Linear => value,
            Self::Logarithmic => 10f64.powf(value / 20.0),
        }
    }
}

impl FromStr for KnobMode {
    type Err = ParameterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(Self::Linear),
            "logarithmic" => Ok(Self::Logarithmic),
            other => Err(ParameterError::Mode(other.to_string())),
        }
    }
}

impl fmt::Display for KnobMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Construction parameters for a [`Knob`].
#[derive(Debug, Clone, PartialEq)]
pub struct KnobSettings {
    pub minimum_value: f64,
    pub maximum_value: f64,
    pub default_value: f64,
    pub precision: f64,
    pub sensitivity: f64,
    pub mode: KnobMode,
    pub display_enabled: bool,
    pub value: f64,
}

impl Default for KnobSettings {
    fn default() -> Self {
        Self {
            minimum_value: 0.0,
            maximum_value: 1.0,
            default_value: 0.5,
            precision: 0.01,
            sensitivity: 1.0,
            mode: KnobMode::Linear,
            display_enabled: false,
            value: 0.5,
        }
    }
}

/// Observer lists for a single knob.
#[derive(Debug, Default)]
pub struct KnobEvents {
    /// Receives the new raw value.
    pub value_changed: Observers<f64>,
    pub name_changed: Observers<NameChange>,
    /// Receives the name of the removed knob.
    pub removed: Observers<String>,
}

#[derive(Debug)]
pub struct Knob {
    name: String,
    minimum_value: f64,
    maximum_value: f64,
    default_value: f64,
    value: f64,
    precision: f64,
    sensitivity: f64,
    mode: KnobMode,
    display_enabled: bool,
    minimum_value_linearized: f64,
    maximum_value_linearized: f64,
    default_value_linearized: f64,
    value_linearized: f64,
    modified: bool,
    pub events: KnobEvents,
}

fn range_error(what: &str) -> ParameterError {
    ParameterError::Range(format!("{what} must be within the minimum and maximum values"))
}

fn check_precision(precision: f64, minimum: f64, maximum: f64) -> Result<(), ParameterError> {
    let span = maximum - minimum;
    if precision >= span {
        return Err(ParameterError::Precision { precision, span });
    }
    Ok(())
}

impl Knob {
    /// Creates a knob with default settings.
    pub fn new(name: impl Into<String>) -> Result<Self, ParameterError> {
        Self::with_settings(name, KnobSettings::default())
    }

    pub fn with_settings(name: impl Into<String>, settings: KnobSettings) -> Result<Self, ParameterError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ParameterError::Name);
        }
        let KnobSettings {
            minimum_value,
            maximum_value,
            default_value,
            precision,
            sensitivity,
            mode,
            display_enabled,
            value,
        } = settings;

        if minimum_value > maximum_value {
            return Err(ParameterError::Range(
                "minimum value must be less than maximum value".to_string(),
            ));
        }
        if !(minimum_value..=maximum_value).contains(&default_value) {
            return Err(range_error("default value"));
        }
        if !(minimum_value..=maximum_value).contains(&value) {
            return Err(range_error("value"));
        }
        check_precision(precision, minimum_value, maximum_value)?;

        let mut knob = Self {
            name,
            minimum_value,
            maximum_value,
            default_value,
            value,
            precision,
            sensitivity,
            mode,
            display_enabled,
            minimum_value_linearized: 0.0,
            maximum_value_linearized: 0.0,
            default_value_linearized: 0.0,
            value_linearized: 0.0,
            modified: false,
            events: KnobEvents::default(),
        };
        knob.relinearize();
        Ok(knob)
    }

    fn relinearize(&mut self) {
        self.minimum_value_linearized = self.mode.linearize(self.minimum_value);
        self.maximum_value_linearized = self.mode.linearize(self.maximum_value);
        self.default_value_linearized = self.mode.linearize(self.default_value);
        self.value_linearized = self.mode.linearize(self.value);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn value_linearized(&self) -> f64 {
        self.value_linearized
    }

    pub fn minimum_value(&self) -> f64 {
        self.minimum_value
    }

    pub fn minimum_value_linearized(&self) -> f64 {
        self.minimum_value_linearized
    }

    pub fn maximum_value(&self) -> f64 {
        self.maximum_value
    }

    pub fn maximum_value_linearized(&self) -> f64 {
        self.maximum_value_linearized
    }

    pub fn default_value(&self) -> f64 {
        self.default_value
    }

    pub fn default_value_linearized(&self) -> f64 {
        self.default_value_linearized
    }

    pub fn precision(&self) -> f64 {
        self.precision
    }

    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }

    pub fn mode(&self) -> KnobMode {
        self.mode
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

    pub fn set_value(&mut self, value: f64) -> Result<(), ParameterError> {
        if !(self.minimum_value..=self.maximum_value).contains(&value) {
            return Err(range_error("value"));
        }
        if self.value != value {
            log::debug!(
                "{} knob set to {}{}",
                self.name,
                value,
                if self.mode == KnobMode::Logarithmic { " dB" } else { "" }
            );
            self.value = value;
            self.value_linearized = self.mode.linearize(value);
            self.modified = true;
            self.events.value_changed.notify(&value);
        }
        Ok(())
    }

    pub fn set_minimum_value(&mut self, minimum_value: f64) -> Result<(), ParameterError> {
        if minimum_value > self.maximum_value {
            return Err(ParameterError::Range(
                "minimum value must be less than maximum value".to_string(),
            ));
        }
        if minimum_value > self.default_value || minimum_value > self.value {
            return Err(ParameterError::Range(
                "minimum value must not exceed the default value or the current value".to_string(),
            ));
        }
        check_precision(self.precision, minimum_value, self.maximum_value)?;

        if self.minimum_value != minimum_value {
            log::debug!("{} knob minimum value set to {}", self.name, minimum_value);
            self.minimum_value = minimum_value;
            self.minimum_value_linearized = self.mode.linearize(minimum_value);
            self.modified = true;
        }
        Ok(())
    }

    pub fn set_maximum_value(&mut self, maximum_value: f64) -> Result<(), ParameterError> {
        if maximum_value < self.minimum_value {
            return Err(ParameterError::Range(
                "maximum value must be greater than minimum value".to_string(),
            ));
        }
        if maximum_value < self.default_value || maximum_value < self.value {
            return Err(ParameterError::Range(
                "maximum value must not be below the default value or the current value".to_string(),
            ));
        }
        check_precision(self.precision, self.minimum_value, maximum_value)?;

        if self.maximum_value != maximum_value {
            log::debug!("{} knob maximum value set to {}", self.name, maximum_value);
            self.maximum_value = maximum_value;
            self.maximum_value_linearized = self.mode.linearize(maximum_value);
            self.modified = true;
        }
        Ok(())
    }

    pub fn set_default_value(&mut self, default_value: f64) -> Result<(), ParameterError> {
        if !(self.minimum_value..=self.maximum_value).contains(&default_value) {
            return Err(range_error("default value"));
        }
        if self.default_value != default_value {
            log::debug!("{} knob default value set to {}", self.name, default_value);
            self.default_value = default_value;
            self.default_value_linearized = self.mode.linearize(default_value);
            self.modified = true;
        }
        Ok(())
    }

    pub fn set_precision(&mut self, precision: f64) -> Result<(), ParameterError> {
        check_precision(precision, self.minimum_value, self.maximum_value)?;
        if self.precision != precision {
            log::debug!("{} knob precision set to {}", self.name, precision);
            self.precision = precision;
            self.modified = true;
        }
        Ok(())
    }

    pub fn set_sensitivity(&mut self, sensitivity: f64) {
        if self.sensitivity != sensitivity {
            log::debug!("{} knob sensitivity set to {}", self.name, sensitivity);
            self.sensitivity = sensitivity;
            self.modified = true;
        }
    }

    /// Switches the scale law. The value returns to the default and every linearized field is
    /// re-derived under the new law.
    pub fn set_mode(&mut self, mode: KnobMode) {
        if self.mode == mode {
            return;
        }
        log::debug!("{} knob mode set to {}", self.name, mode);
        self.mode = mode;
        let value_changed = self.value != self.default_value;
        self.value = self.default_value;
        self.relinearize();
        self.modified = true;
        if value_changed {
            let value = self.value;
            self.events.value_changed.notify(&value);
        }
    }

    pub fn set_display_enabled(&mut self, enabled: bool) {
        if self.display_enabled != enabled {
            log::debug!(
                "{} {} knob display",
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
            log::debug!("{} knob name changed to {}", self.name, new_name);
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

    /// Announces removal to the knob's observers.
    pub(crate) fn remove(&mut self) {
        log::debug!("Removing {} knob", self.name);
        let name = self.name.clone();
        self.events.removed.notify(&name);
    }
}
