//! TOML configuration for a device session.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::buttons::Button;
use crate::display::{RenderSurface, ViewPixx};
use crate::error::PixxError;
use crate::modes::VideoMode;
use crate::response::WatchConfig;
use crate::transport::DeviceTransport;

/// Top-level configuration. Every section is optional.
///
/// ```toml
/// [display]
/// mode = "M16"
/// backlight = 200
///
/// [response]
/// light_intensity = 0.5
/// lights = { buttons = ["red", "green"] }
///
/// [response.watch]
/// buttons = ["red", "green"]
/// events = ["down"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PixxConfig {
    /// Display settings applied on connect.
    pub display: DisplayConfig,
    /// Button box settings.
    pub response: ResponseConfig,
}

impl PixxConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, PixxError> {
        let config: Self = toml::from_str(s)?;
        debug!("loaded config: {:?}", config);
        Ok(config)
    }
}

/// Display settings. Unset fields leave the device as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Video mode.
    pub mode: Option<VideoMode>,
    /// Backlight intensity.
    pub backlight: Option<u8>,
    /// Scanning backlight.
    pub scanning_backlight: Option<bool>,
}

impl DisplayConfig {
    /// Push the configured settings to `display`.
    pub fn apply<T: DeviceTransport, S: RenderSurface>(
        &self,
        display: &mut ViewPixx<T, S>,
    ) -> Result<(), PixxError> {
        if let Some(mode) = self.mode {
            display.set_mode(mode)?;
        }
        if let Some(intensity) = self.backlight {
            display.set_backlight(intensity)?;
        }
        if let Some(enabled) = self.scanning_backlight {
            display.set_scanning_backlight(enabled)?;
        }
        Ok(())
    }
}

/// Which button lights to switch on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightsConfig {
    /// All lights off.
    Off,
    /// Light the watched buttons.
    #[default]
    Watched,
    /// Light exactly these buttons.
    Buttons(BTreeSet<Button>),
}

/// Button box settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Buttons and edges to report.
    pub watch: WatchConfig,
    /// Button lights.
    pub lights: LightsConfig,
    /// Light drive strength between 0 and 1.
    pub light_intensity: f64,
    /// Sleep between polls while waiting for an event, in microseconds.
    pub poll_interval_us: u64,
}

impl ResponseConfig {
    /// Sleep between polls while waiting.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }

    /// Buttons to light.
    pub fn lit_buttons(&self) -> BTreeSet<Button> {
        match &self.lights {
            LightsConfig::Off => BTreeSet::new(),
            LightsConfig::Watched => self.watch.buttons.clone(),
            LightsConfig::Buttons(buttons) => buttons.clone(),
        }
    }
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            watch: WatchConfig::default(),
            lights: LightsConfig::default(),
            light_intensity: 1.0,
            poll_interval_us: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buttons::ButtonState;
    use crate::cache::RegisterCache;
    use crate::mock::{MockDevice, MockSurface};
    use crate::register::{Register, RegisterMap, RegisterValue};

    #[test]
    fn test_empty_document_gives_defaults() {
        let config = PixxConfig::from_toml_str("").unwrap();
        assert_eq!(config, PixxConfig::default());
        assert_eq!(config.response.poll_interval(), Duration::from_micros(10));
        assert_eq!(config.response.lit_buttons().len(), Button::ALL.len());
        assert_eq!(config.response.watch.events.len(), 2);
    }

    #[test]
    fn test_full_document() {
        let config = PixxConfig::from_toml_str(
            r#"
            [display]
            mode = "M16"
            backlight = 200

            [response]
            light_intensity = 0.5
            poll_interval_us = 250
            lights = { buttons = ["blue"] }

            [response.watch]
            buttons = ["red", "green"]
            events = ["down"]
            "#,
        )
        .unwrap();

        assert_eq!(config.display.mode, Some(VideoMode::M16));
        assert_eq!(config.display.backlight, Some(200));
        assert_eq!(config.display.scanning_backlight, None);
        assert_eq!(config.response.light_intensity, 0.5);
        assert_eq!(config.response.poll_interval(), Duration::from_micros(250));
        assert_eq!(config.response.lit_buttons(), BTreeSet::from([Button::Blue]));
        assert_eq!(
            config.response.watch,
            WatchConfig::new([Button::Red, Button::Green], [ButtonState::Down])
        );
    }

    #[test]
    fn test_lights_off() {
        let config = PixxConfig::from_toml_str("[response]\nlights = \"off\"\n").unwrap();
        assert!(config.response.lit_buttons().is_empty());
    }

    #[test]
    fn test_bad_document_is_config_error() {
        for doc in [
            "[display]\nmode = \"L48\"\n",
            "[display]\nbacklight = 300\n",
            "[response.watch]\nbuttons = [\"purple\"]\n",
        ] {
            assert!(
                matches!(PixxConfig::from_toml_str(doc), Err(PixxError::Config(_))),
                "{doc}"
            );
        }
    }

    #[test]
    fn test_display_config_applies_only_set_fields() {
        let device = MockDevice::new();
        let cache = RegisterCache::new(device.clone(), RegisterMap::viewpixx()).into_shared();
        let mut display = ViewPixx::new(cache, MockSurface::new()).unwrap();

        let config = DisplayConfig {
            mode: Some(VideoMode::C48),
            scanning_backlight: Some(true),
            ..DisplayConfig::default()
        };
        config.apply(&mut display).unwrap();

        assert_eq!(device.register(Register::VideoMode), Some(RegisterValue::from("C48")));
        assert_eq!(device.register(Register::ScanningBackLight), Some(RegisterValue::Bool(true)));
        assert_eq!(device.register(Register::BacklightIntensity), Some(RegisterValue::Int(255)));
    }
}
