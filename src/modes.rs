//! Video mode definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PixxError;
use crate::register::RegisterValue;

/// A VIEWPixx video composition mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoMode {
    /// 24-bit colour, 8 bits per gun. Default mode, no software correction.
    C24,
    /// 16-bit monochrome: red and green carry the high and low luminance bytes.
    M16,
    /// 48-bit colour at half horizontal resolution.
    C48,
}

impl VideoMode {
    /// Every supported mode.
    pub const ALL: [VideoMode; 3] = [VideoMode::C24, VideoMode::M16, VideoMode::C48];

    /// The register value naming this mode.
    pub fn name(self) -> &'static str {
        match self {
            VideoMode::C24 => "C24",
            VideoMode::M16 => "M16",
            VideoMode::C48 => "C48",
        }
    }

    /// Whether the mode offers more than 8-bit luminance and may carry a CLUT.
    pub fn supports_extended_resolution(self) -> bool {
        match self {
            VideoMode::C24 => false,
            VideoMode::M16 | VideoMode::C48 => true,
        }
    }
}

impl fmt::Display for VideoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VideoMode {
    type Err = PixxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VideoMode::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PixxError::UnknownVideoMode(s.to_owned()))
    }
}

impl From<VideoMode> for RegisterValue {
    fn from(mode: VideoMode) -> Self {
        RegisterValue::Text(mode.name().to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_resolution_modes() {
        assert!(!VideoMode::C24.supports_extended_resolution());
        assert!(VideoMode::M16.supports_extended_resolution());
        assert!(VideoMode::C48.supports_extended_resolution());
    }

    #[test]
    fn test_mode_names() {
        for mode in VideoMode::ALL {
            assert_eq!(mode.name().parse::<VideoMode>().unwrap(), mode);
        }
        assert_eq!("m16".parse::<VideoMode>().unwrap(), VideoMode::M16);
        assert!(matches!(
            "L48".parse::<VideoMode>(),
            Err(PixxError::UnknownVideoMode(_))
        ));
        assert_eq!(RegisterValue::from(VideoMode::C48), RegisterValue::from("C48"));
    }
}
