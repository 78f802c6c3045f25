//! RESPONSEPixx button codes.
//!
//! Each button has two unrelated codes: the pattern seen on the digital inputs
//! while it is pressed, and the digital-output bit driving its light. Both are
//! active low. The two code spaces never overlap and must not be mixed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::PixxError;

/// Mask of the digital-input bits that carry button state.
pub const INPUT_MASK: u32 = 0xFFFF;

/// Mask of the digital-output bits that drive the button lights.
pub const OUTPUT_MASK: u32 = 0x1F_0000;

/// A button on the response box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    /// Red button.
    Red,
    /// Yellow button.
    Yellow,
    /// Green button.
    Green,
    /// Blue button.
    Blue,
    /// White button.
    White,
}

impl Button {
    /// Every button, in code order.
    pub const ALL: [Button; 5] = [
        Button::Red,
        Button::Yellow,
        Button::Green,
        Button::Blue,
        Button::White,
    ];

    /// Digital-input pattern while only this button is pressed.
    pub const fn input_code(self) -> u32 {
        match self {
            Button::Red => 0xFFFE,
            Button::Yellow => 0xFFFD,
            Button::Green => 0xFFFB,
            Button::Blue => 0xFFF7,
            Button::White => 0xFFEF,
        }
    }

    /// Digital-output bit of this button's light.
    pub const fn output_code(self) -> u32 {
        match self {
            Button::Red => 0x1_0000,
            Button::Yellow => 0x2_0000,
            Button::Green => 0x4_0000,
            Button::Blue => 0x8_0000,
            Button::White => 0x10_0000,
        }
    }

    /// Lowercase colour name.
    pub fn name(self) -> &'static str {
        match self {
            Button::Red => "red",
            Button::Yellow => "yellow",
            Button::Green => "green",
            Button::Blue => "blue",
            Button::White => "white",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for Button {
    type Err = PixxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Button::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PixxError::UnknownButton(s.to_owned()))
    }
}

/// Whether a button is held down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ButtonState {
    /// Pressed.
    Down,
    /// Released.
    Up,
}

impl fmt::Display for ButtonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            ButtonState::Down => "down",
            ButtonState::Up => "up",
        })
    }
}

/// State of every button at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ButtonStates([ButtonState; 5]);

impl ButtonStates {
    /// All buttons released.
    pub const fn all_up() -> Self {
        Self([ButtonState::Up; 5])
    }

    /// State of one button.
    pub fn get(&self, button: Button) -> ButtonState {
        self.0[button.index()]
    }

    /// Buttons currently held down.
    pub fn pressed(&self) -> BTreeSet<Button> {
        self.iter()
            .filter(|(_, s)| *s == ButtonState::Down)
            .map(|(b, _)| b)
            .collect()
    }

    /// Iterate over `(button, state)` in code order.
    pub fn iter(&self) -> impl Iterator<Item = (Button, ButtonState)> + '_ {
        Button::ALL.into_iter().map(|b| (b, self.get(b)))
    }
}

impl Default for ButtonStates {
    fn default() -> Self {
        Self::all_up()
    }
}

/// Buttons whose light is on in a digital-output mask.
///
/// A light is on when its output bit is cleared. Bits outside
/// [`OUTPUT_MASK`] are ignored.
pub fn buttons_from_output_bits(bitmask: u32) -> BTreeSet<Button> {
    Button::ALL
        .into_iter()
        .filter(|b| bitmask & b.output_code() == 0)
        .collect()
}

/// Digital-output mask that lights exactly `buttons`.
pub fn output_bits_from_buttons<'a>(buttons: impl IntoIterator<Item = &'a Button>) -> u32 {
    buttons
        .into_iter()
        .fold(OUTPUT_MASK, |mask, b| mask & !b.output_code())
}

/// Decode a digital-input mask into the state of every button.
///
/// A button is down when its input bit is cleared within the low 16 bits.
pub fn state_from_input_bits(bitmask: u32) -> ButtonStates {
    let mut states = ButtonStates::all_up();
    for button in Button::ALL {
        if !(bitmask | button.input_code()) & INPUT_MASK != 0 {
            states.0[button.index()] = ButtonState::Down;
        }
    }
    states
}

/// Digital-input mask seen while exactly `buttons` are held.
pub fn input_bits_from_buttons<'a>(buttons: impl IntoIterator<Item = &'a Button>) -> u32 {
    buttons
        .into_iter()
        .fold(INPUT_MASK, |mask, b| mask & b.input_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_subsets() -> impl Iterator<Item = BTreeSet<Button>> {
        (0u32..32).map(|bits| {
            Button::ALL
                .into_iter()
                .enumerate()
                .filter(|(i, _)| bits & (1 << i) != 0)
                .map(|(_, b)| b)
                .collect()
        })
    }

    #[test]
    fn test_codes_are_disjoint() {
        for a in Button::ALL {
            assert_eq!(a.output_code() & INPUT_MASK, 0);
            for b in Button::ALL {
                if a != b {
                    assert_ne!(a.input_code(), b.input_code());
                    assert_eq!(a.output_code() & b.output_code(), 0);
                }
            }
        }
    }

    #[test]
    fn test_output_round_trip_for_every_subset() {
        for lit in all_subsets() {
            let mask = output_bits_from_buttons(&lit);
            assert_eq!(buttons_from_output_bits(mask), lit, "mask {mask:#x}");
        }
    }

    #[test]
    fn test_output_bits_are_active_low() {
        assert!(buttons_from_output_bits(OUTPUT_MASK).is_empty());
        assert_eq!(buttons_from_output_bits(0).len(), Button::ALL.len());
        assert_eq!(
            buttons_from_output_bits(OUTPUT_MASK & !Button::Green.output_code()),
            BTreeSet::from([Button::Green])
        );
    }

    #[test]
    fn test_single_press_decodes() {
        for button in Button::ALL {
            let states = state_from_input_bits(button.input_code());
            for (other, state) in states.iter() {
                let expected = if other == button {
                    ButtonState::Down
                } else {
                    ButtonState::Up
                };
                assert_eq!(state, expected, "{button} pressed, checking {other}");
            }
        }
        assert_eq!(state_from_input_bits(0xFFFF), ButtonStates::all_up());
    }

    #[test]
    fn test_input_decoding_ignores_upper_bits() {
        let chord = input_bits_from_buttons(&[Button::Red, Button::Blue]);
        let states = state_from_input_bits(chord | 0xABCD_0000);
        assert_eq!(states.pressed(), BTreeSet::from([Button::Red, Button::Blue]));
    }

    #[test]
    fn test_input_decoding_is_idempotent() {
        for mask in [0u32, 0xFFFF, 0xFFFE, 0xFFE0, 0x1234, 0xFFFF_FFFF] {
            assert_eq!(state_from_input_bits(mask), state_from_input_bits(mask));
        }
    }

    #[test]
    fn test_button_names() {
        assert_eq!("Red".parse::<Button>().unwrap(), Button::Red);
        assert_eq!(" white ".parse::<Button>().unwrap(), Button::White);
        assert!(matches!(
            "purple".parse::<Button>(),
            Err(PixxError::UnknownButton(name)) if name == "purple"
        ));
        assert_eq!(Button::Blue.to_string(), "blue");
    }
}
