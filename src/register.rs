//! Register names, values and the explicit register table.
//!
//! The vendor SDK exposes its registers through dozens of `get*`/`set*`/`is*Enabled`
//! accessors. Instead of enumerating those by reflection, every register this crate
//! touches is listed in a [`RegisterMap`], together with whether it may be written
//! and whether it belongs to the display state a calibration is taken under.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::PixxError;

/// A named device register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Register {
    /// Video composition mode (`"C24"`, `"M16"`, `"C48"`).
    VideoMode,
    /// Backlight intensity (0-255).
    BacklightIntensity,
    /// Scanning backlight on/off.
    ScanningBackLight,
    /// Visible pixels per horizontal line.
    VisiblePixelsPerHorizontalLine,
    /// Visible lines per vertical frame.
    VisibleLinePerVerticalFrame,
    /// Current digital-input bitmask.
    DinValue,
    /// Digital-output bitmask (button lights, active low).
    DinOutputValue,
    /// Digital-output drive strength (0.0-1.0).
    DinOutputStrength,
    /// Digital I/O direction mask (set bits are outputs).
    DinBitDirection,
    /// Hardware debounce of digital inputs.
    DinDebounce,
}

impl Register {
    /// Every register known to the crate.
    pub const ALL: [Register; 10] = [
        Register::VideoMode,
        Register::BacklightIntensity,
        Register::ScanningBackLight,
        Register::VisiblePixelsPerHorizontalLine,
        Register::VisibleLinePerVerticalFrame,
        Register::DinValue,
        Register::DinOutputValue,
        Register::DinOutputStrength,
        Register::DinBitDirection,
        Register::DinDebounce,
    ];

    /// The SDK name of this register.
    pub fn name(self) -> &'static str {
        match self {
            Register::VideoMode => "VideoMode",
            Register::BacklightIntensity => "BacklightIntensity",
            Register::ScanningBackLight => "ScanningBackLight",
            Register::VisiblePixelsPerHorizontalLine => "VisiblePixelsPerHorizontalLine",
            Register::VisibleLinePerVerticalFrame => "VisibleLinePerVerticalFrame",
            Register::DinValue => "DinValue",
            Register::DinOutputValue => "DinOutputValue",
            Register::DinOutputStrength => "DinOutputStrength",
            Register::DinBitDirection => "DinBitDirection",
            Register::DinDebounce => "DinDebounce",
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Register {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Register::ALL
            .into_iter()
            .find(|r| r.name() == s)
            .ok_or_else(|| format!("unknown register '{s}'"))
    }
}

/// The value held by a register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegisterValue {
    /// An on/off flag.
    Bool(bool),
    /// An integer or bitmask.
    Int(i64),
    /// A fractional setting.
    Float(f64),
    /// A symbolic setting such as the video mode.
    Text(String),
}

impl RegisterValue {
    /// The flag, if this is a boolean register.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RegisterValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer, if this is an integer register.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            RegisterValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The value as a float; integers are widened.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            RegisterValue::Float(v) => Some(*v),
            RegisterValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// The text, if this is a symbolic register.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RegisterValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterValue::Bool(b) => write!(f, "{b}"),
            RegisterValue::Int(i) => write!(f, "{i}"),
            RegisterValue::Float(v) => write!(f, "{v}"),
            RegisterValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for RegisterValue {
    fn from(value: bool) -> Self {
        RegisterValue::Bool(value)
    }
}

impl From<i64> for RegisterValue {
    fn from(value: i64) -> Self {
        RegisterValue::Int(value)
    }
}

impl From<f64> for RegisterValue {
    fn from(value: f64) -> Self {
        RegisterValue::Float(value)
    }
}

impl From<&str> for RegisterValue {
    fn from(value: &str) -> Self {
        RegisterValue::Text(value.to_owned())
    }
}

/// Whether a register may be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Status register, never written.
    ReadOnly,
    /// Configuration register.
    ReadWrite,
}

/// One row of the register table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterEntry {
    /// The register.
    pub register: Register,
    /// Read/write permission.
    pub access: Access,
    /// Part of the display state recorded with a calibration.
    pub calibrated: bool,
}

/// The explicit table of registers mirrored by a
/// [`RegisterCache`](crate::RegisterCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterMap {
    entries: Vec<RegisterEntry>,
}

impl RegisterMap {
    /// An empty table.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// The table for a VIEWPixx display with an attached RESPONSEPixx.
    pub fn viewpixx() -> Self {
        use Access::{ReadOnly, ReadWrite};

        Self::empty()
            .with(Register::VideoMode, ReadWrite, true)
            .with(Register::BacklightIntensity, ReadWrite, true)
            .with(Register::ScanningBackLight, ReadWrite, true)
            .with(Register::VisiblePixelsPerHorizontalLine, ReadOnly, true)
            .with(Register::VisibleLinePerVerticalFrame, ReadOnly, true)
            .with(Register::DinValue, ReadOnly, false)
            .with(Register::DinOutputValue, ReadWrite, false)
            .with(Register::DinOutputStrength, ReadWrite, false)
            .with(Register::DinBitDirection, ReadWrite, false)
            .with(Register::DinDebounce, ReadWrite, false)
    }

    /// Add or replace a row.
    pub fn with(mut self, register: Register, access: Access, calibrated: bool) -> Self {
        let entry = RegisterEntry {
            register,
            access,
            calibrated,
        };
        match self.entries.iter_mut().find(|e| e.register == register) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
        self
    }

    /// Look up a row.
    pub fn entry(&self, register: Register) -> Option<&RegisterEntry> {
        self.entries.iter().find(|e| e.register == register)
    }

    /// Check that `register` is mapped and writable.
    pub fn check_writable(&self, register: Register) -> Result<(), PixxError> {
        match self.entry(register) {
            None => Err(PixxError::UnmappedRegister(register)),
            Some(e) if e.access == Access::ReadOnly => Err(PixxError::ReadOnlyRegister(register)),
            Some(_) => Ok(()),
        }
    }

    /// Iterate over all rows in table order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisterEntry> {
        self.entries.iter()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self::viewpixx()
    }
}

/// Register values captured at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegisterSnapshot(pub BTreeMap<Register, RegisterValue>);

impl RegisterSnapshot {
    /// Value of one register, if captured.
    pub fn get(&self, register: Register) -> Option<&RegisterValue> {
        self.0.get(&register)
    }

    /// Whether nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in register order.
    pub fn iter(&self) -> impl Iterator<Item = (&Register, &RegisterValue)> {
        self.0.iter()
    }
}

impl FromIterator<(Register, RegisterValue)> for RegisterSnapshot {
    fn from_iter<I: IntoIterator<Item = (Register, RegisterValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
