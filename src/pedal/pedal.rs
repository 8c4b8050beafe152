//! Pedal container: named knobs, footswitches and selectable variants.
//!
//! Children are stored by value and looked up by their own name, so a pedal never holds a second
//! copy of a child's identity that could drift. Renames and removals that must stay unique go
//! through the pedal, which then notifies its own observers.

use crate::audio_engine::errors::ParameterError;
use crate::messages::NameChange;
use crate::pedal::footswitch::Footswitch;
use crate::pedal::knob::Knob;
use crate::pedal::observers::Observers;

/// Statically compiled DSP strategy behind a pedal variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantKind {
    Delay,
    SaturateDefault,
    SaturateSmooth,
    Volume,
    /// Audio passes through untouched.
    Bypass,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub name: String,
    pub kind: VariantKind,
}

#[derive(Debug, Default)]
pub struct PedalEvents {
    pub name_changed: Observers<NameChange>,
    pub knob_added: Observers<String>,
    pub knob_removed: Observers<String>,
    pub knob_renamed: Observers<NameChange>,
    pub footswitch_added: Observers<String>,
    pub footswitch_removed: Observers<String>,
    pub footswitch_renamed: Observers<NameChange>,
    pub variant_set: Observers<Variant>,
    pub variant_added: Observers<Variant>,
    pub variant_removed: Observers<Variant>,
    pub variant_renamed: Observers<NameChange>,
    pub pedal_color_set: Observers<String>,
    pub text_color_set: Observers<String>,
}

pub const DEFAULT_PEDAL_COLOR: &str = "#0000FF";
pub const DEFAULT_TEXT_COLOR: &str = "#FFFFFF";

#[derive(Debug)]
pub struct Pedal {
    name: String,
    knobs: Vec<Knob>,
    footswitches: Vec<Footswitch>,
    variants: Vec<Variant>,
    variant: Option<String>,
    pedal_color: String,
    text_color: String,
    modified: bool,
    pub events: PedalEvents,
}

fn does_not_exist(kind: &'static str, name: &str) -> ParameterError {
    ParameterError::DoesNotExist {
        kind,
        name: name.to_string(),
    }
}

fn already_exists(kind: &'static str, name: &str) -> ParameterError {
    ParameterError::AlreadyExists {
        kind,
        name: name.to_string(),
    }
}

impl Pedal {
    pub fn new(name: impl Into<String>) -> Result<Self, ParameterError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ParameterError::Name);
        }
        Ok(Self {
            name,
            knobs: Vec::new(),
            footswitches: Vec::new(),
            variants: Vec::new(),
            variant: None,
            pedal_color: DEFAULT_PEDAL_COLOR.to_string(),
            text_color: DEFAULT_TEXT_COLOR.to_string(),
            modified: false,
            events: PedalEvents::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn change_name(&mut self, new_name: impl Into<String>) -> Result<(), ParameterError> {
        let new_name = new_name.into();
        if new_name.is_empty() {
            return Err(ParameterError::Name);
        }
        if self.name != new_name {
            log::debug!("{} pedal name changed to {}", self.name, new_name);
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

    // Knobs

    pub fn knobs(&self) -> &[Knob] {
        &self.knobs
    }

    pub fn knob(&self, name: &str) -> Option<&Knob> {
        self.knobs.iter().find(|k| k.name() == name)
    }

    /// Mutable access for value, mode and display changes. Renaming and removal only go through
    /// [`Pedal::rename_knob`] and [`Pedal::remove_knob`]:
    ///
    /// ```compile_fail
    /// use pedalfx::{Knob, Pedal};
    ///
    /// let mut pedal = Pedal::new("Boost").unwrap();
    /// pedal.add_knob(Knob::new("Gain").unwrap()).unwrap();
    /// pedal.knob_mut("Gain").unwrap().change_name("Level").unwrap();
    /// ```
    pub fn knob_mut(&mut self, name: &str) -> Option<&mut Knob> {
        self.knobs.iter_mut().find(|k| k.name() == name)
    }

    /// Linearized value of the named knob.
    pub fn knob_value(&self, name: &str) -> Result<f64, ParameterError> {
        self.knob(name)
            .map(Knob::value_linearized)
            .ok_or_else(|| does_not_exist("knob", name))
    }

    pub fn set_knob_value(&mut self, name: &str, value: f64) -> Result<(), ParameterError> {
        self.knob_mut(name)
            .ok_or_else(|| does_not_exist("knob", name))?
            .set_value(value)
    }

    pub fn add_knob(&mut self, knob: Knob) -> Result<(), ParameterError> {
        if self.knob(knob.name()).is_some() {
            return Err(already_exists("knob", knob.name()));
        }
        log::debug!("Add {} knob to {} pedal", knob.name(), self.name);
        let name = knob.name().to_string();
        self.knobs.push(knob);
        self.modified = true;
        self.events.knob_added.notify(&name);
        Ok(())
    }

    /// Adds a default knob named "Knob N" with the lowest free N and returns that name.
    pub fn add_default_knob(&mut self) -> Result<String, ParameterError> {
        let name = (1..)
            .map(|i| format!("Knob {i}"))
            .find(|n| self.knob(n).is_none())
            .unwrap_or_default();
        self.add_knob(Knob::new(name.clone())?)?;
        Ok(name)
    }

    pub fn remove_knob(&mut self, name: &str) -> Result<Knob, ParameterError> {
        let index = self
            .knobs
            .iter()
            .position(|k| k.name() == name)
            .ok_or_else(|| does_not_exist("knob", name))?;
        let mut knob = self.knobs.remove(index);
        knob.remove();
        log::debug!("Remove {} knob from {} pedal", name, self.name);
        self.modified = true;
        self.events.knob_removed.notify(&name.to_string());
        Ok(knob)
    }

    pub fn rename_knob(&mut self, old_name: &str, new_name: &str) -> Result<(), ParameterError> {
        if old_name == new_name {
            return Ok(());
        }
        if self.knob(new_name).is_some() {
            return Err(already_exists("knob", new_name));
        }
        self.knob_mut(old_name)
            .ok_or_else(|| does_not_exist("knob", old_name))?
            .change_name(new_name)?;
        self.modified = true;
        self.events.knob_renamed.notify(&NameChange {
            old_name: old_name.to_string(),
            new_name: new_name.to_string(),
        });
        Ok(())
    }

    // Footswitches

    pub fn footswitches(&self) -> &[Footswitch] {
        &self.footswitches
    }

    pub fn footswitch(&self, name: &str) -> Option<&Footswitch> {
        self.footswitches.iter().find(|f| f.name() == name)
    }

    /// Mutable access for state and display changes. Renaming and removal only go through
    /// [`Pedal::rename_footswitch`] and [`Pedal::remove_footswitch`]:
    ///
    /// ```compile_fail
    /// use pedalfx::{Footswitch, Pedal};
    ///
    /// let mut pedal = Pedal::new("Boost").unwrap();
    /// pedal.add_footswitch(Footswitch::latching("On/Off", true).unwrap()).unwrap();
    /// pedal.footswitch_mut("On/Off").unwrap().remove();
    /// ```
    pub fn footswitch_mut(&mut self, name: &str) -> Option<&mut Footswitch> {
        self.footswitches.iter_mut().find(|f| f.name() == name)
    }

    pub fn footswitch_state(&self, name: &str) -> Result<bool, ParameterError> {
        self.footswitch(name)
            .map(Footswitch::state)
            .ok_or_else(|| does_not_exist("footswitch", name))
    }

    pub fn add_footswitch(&mut self, footswitch: Footswitch) -> Result<(), ParameterError> {
        if self.footswitch(footswitch.name()).is_some() {
            return Err(already_exists("footswitch", footswitch.name()));
        }
        log::debug!("Add {} footswitch to {} pedal", footswitch.name(), self.name);
        let name = footswitch.name().to_string();
        self.footswitches.push(footswitch);
        self.modified = true;
        self.events.footswitch_added.notify(&name);
        Ok(())
    }

    /// Adds a latching footswitch named "Footswitch N" with the lowest free N.
    pub fn add_default_footswitch(&mut self) -> Result<String, ParameterError> {
        let name = (1..)
            .map(|i| format!("Footswitch {i}"))
            .find(|n| self.footswitch(n).is_none())
            .unwrap_or_default();
        self.add_footswitch(Footswitch::latching(name.clone(), true)?)?;
        Ok(name)
    }

    pub fn remove_footswitch(&mut self, name: &str) -> Result<Footswitch, ParameterError> {
        let index = self
            .footswitches
            .iter()
            .position(|f| f.name() == name)
            .ok_or_else(|| does_not_exist("footswitch", name))?;
        let mut footswitch = self.footswitches.remove(index);
        footswitch.remove();
        log::debug!("Remove {} footswitch from {} pedal", name, self.name);
        self.modified = true;
        self.events.footswitch_removed.notify(&name.to_string());
        Ok(footswitch)
    }

    pub fn rename_footswitch(&mut self, old_name: &str, new_name: &str) -> Result<(), ParameterError> {
        if old_name == new_name {
            return Ok(());
        }
        if self.footswitch(new_name).is_some() {
            return Err(already_exists("footswitch", new_name));
        }
        self.footswitch_mut(old_name)
            .ok_or_else(|| does_not_exist("footswitch", old_name))?
            .change_name(new_name)?;
        self.modified = true;
        self.events.footswitch_renamed.notify(&NameChange {
            old_name: old_name.to_string(),
            new_name: new_name.to_string(),
        });
        Ok(())
    }

    // Variants

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    /// Currently selected variant.
    pub fn variant(&self) -> Option<&Variant> {
        let selected = self.variant.as_deref()?;
        self.variants.iter().find(|v| v.name == selected)
    }

    /// Adds a variant and selects it.
    pub fn add_variant(&mut self, name: impl Into<String>, kind: VariantKind) -> Result<(), ParameterError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ParameterError::Name);
        }
        if self.variants.iter().any(|v| v.name == name) {
            return Err(already_exists("variant", &name));
        }
        log::debug!("Add {} {} pedal variant", name, self.name);
        let variant = Variant { name, kind };
        self.variants.push(variant.clone());
        self.modified = true;
        self.events.variant_added.notify(&variant);
        self.set_variant(&variant.name)
    }

    pub fn set_variant(&mut self, name: &str) -> Result<(), ParameterError> {
        let variant = self
            .variants
            .iter()
            .find(|v| v.name == name)
            .cloned()
            .ok_or_else(|| does_not_exist("variant", name))?;
        if self.variant.as_deref() != Some(name) {
            log::debug!("Set {} pedal variant to {}", self.name, name);
            self.variant = Some(variant.name.clone());
            self.modified = true;
            self.events.variant_set.notify(&variant);
        }
        Ok(())
    }

    /// Removes a variant. Removing the selected one leaves no variant selected.
    pub fn remove_variant(&mut self, name: &str) -> Result<(), ParameterError> {
        let index = self
            .variants
            .iter()
            .position(|v| v.name == name)
            .ok_or_else(|| does_not_exist("variant", name))?;
        log::debug!("Remove {} {} pedal variant", name, self.name);
        let variant = self.variants.remove(index);
        if self.variant.as_deref() == Some(name) {
            self.variant = None;
        }
        self.modified = true;
        self.events.variant_removed.notify(&variant);
        Ok(())
    }

    pub fn rename_variant(&mut self, old_name: &str, new_name: &str) -> Result<(), ParameterError> {
        if new_name.is_empty() {
            return Err(ParameterError::Name);
        }
        if old_name == new_name {
            return Ok(());
        }
        if self.variants.iter().any(|v| v.name == new_name) {
            return Err(already_exists("variant", new_name));
        }
        let variant = self
            .variants
            .iter_mut()
            .find(|v| v.name == old_name)
            .ok_or_else(|| does_not_exist("variant", old_name))?;
        log::debug!("Change {} {} pedal variant to {}", old_name, self.name, new_name);
        variant.name = new_name.to_string();
        if self.variant.as_deref() == Some(old_name) {
            self.variant = Some(new_name.to_string());
        }
        self.modified = true;
        self.events.variant_renamed.notify(&NameChange {
            old_name: old_name.to_string(),
            new_name: new_name.to_string(),
        });
        Ok(())
    }

    // Colours

    pub fn pedal_color(&self) -> &str {
        &self.pedal_color
    }

    pub fn text_color(&self) -> &str {
        &self.text_color
    }

    pub fn set_pedal_color(&mut self, color: impl Into<String>) {
        let color = color.into();
        if self.pedal_color != color {
            log::debug!("Set {} pedal color to {}", self.name, color);
            self.pedal_color = color;
            self.modified = true;
            self.events.pedal_color_set.notify(&self.pedal_color);
        }
    }

    pub fn set_text_color(&mut self, color: impl Into<String>) {
        let color = color.into();
        if self.text_color != color {
            log::debug!("Set {} pedal text color to {}", self.name, color);
            self.text_color = color;
            self.modified = true;
            self.events.text_color_set.notify(&self.text_color);
        }
    }

    /// True if the pedal or any of its knobs or footswitches changed since the last reset.
    pub fn is_modified(&self) -> bool {
        self.modified
            || self.knobs.iter().any(Knob::is_modified)
            || self.footswitches.iter().any(Footswitch::is_modified)
    }

    pub fn reset_modified(&mut self) {
        self.modified = false;
        self.knobs.iter_mut().for_each(Knob::reset_modified);
        self.footswitches.iter_mut().for_each(Footswitch::reset_modified);
    }
}
