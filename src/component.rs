//! # Component Board
//!
//! The simulated hardware: an ordered list of slots addressed by a 1-based
//! pin number. Slot `pin` lives at index `pin - 1`; pins are contiguous from
//! 1 to the board length.
//!
//! The default layout matches the playground kit: red, green and blue LEDs on
//! pins 1-3, a buzzer on pin 4, a motor on pin 5 and spare red LEDs after
//! that.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_COMPONENT_COUNT: usize = 20;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ComponentType {
    Led,
    Buzzer,
    Motor,
}

/// One addressable slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentState {
    pub pin: usize,
    pub is_enabled: bool,
    pub is_input: bool,
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl ComponentState {
    /// The slot the default kit puts on `pin`, switched off.
    pub fn default_for_pin(pin: usize) -> Self {
        let (component_type, color) = match pin {
            1 => (ComponentType::Led, Some("red")),
            2 => (ComponentType::Led, Some("green")),
            3 => (ComponentType::Led, Some("blue")),
            4 => (ComponentType::Buzzer, None),
            5 => (ComponentType::Motor, None),
            _ => (ComponentType::Led, Some("red")),
        };
        Self {
            pin,
            is_enabled: false,
            is_input: false,
            component_type,
            color: color.map(str::to_string),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComponentError {
    #[error("Nambari ya kifaa si sahihi: {value}")]
    PinOutOfRange { value: f64, count: usize },
}

pub type ComponentResult<T> = Result<T, ComponentError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentBoard {
    slots: Vec<ComponentState>,
}

impl Default for ComponentBoard {
    fn default() -> Self {
        Self::new(DEFAULT_COMPONENT_COUNT)
    }
}

impl ComponentBoard {
    pub fn new(count: usize) -> Self {
        Self {
            slots: (1..=count).map(ComponentState::default_for_pin).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[ComponentState] {
        &self.slots
    }

    pub fn get(&self, pin: usize) -> Option<&ComponentState> {
        pin.checked_sub(1).and_then(|index| self.slots.get(index))
    }

    /// Maps an evaluated pin value to a slot index.
    ///
    /// Only whole numbers in `1..=len` address a slot.
    pub fn index_for_pin(&self, value: f64) -> ComponentResult<usize> {
        let in_range = value.is_finite()
            && value.fract() == 0.0
            && value >= 1.0
            && value <= self.slots.len() as f64;
        if !in_range {
            return Err(ComponentError::PinOutOfRange {
                value,
                count: self.slots.len(),
            });
        }
        Ok(value as usize - 1)
    }

    pub fn set_enabled(&mut self, index: usize, is_enabled: bool) -> ComponentResult<()> {
        let count = self.slots.len();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(ComponentError::PinOutOfRange {
                value: (index + 1) as f64,
                count,
            })?;
        slot.is_enabled = is_enabled;
        Ok(())
    }

    /// Switches every slot off.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.is_enabled = false;
        }
    }

    /// Grows with default slots or truncates; surviving slots keep their state.
    pub fn resize(&mut self, count: usize) {
        if count < self.slots.len() {
            self.slots.truncate(count);
        } else {
            let next = self.slots.len() + 1;
            self.slots
                .extend((next..=count).map(ComponentState::default_for_pin));
        }
    }
}
