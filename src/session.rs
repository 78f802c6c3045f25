//! One connection to a VPixx device.

use log::info;

use crate::cache::{RegisterCache, SharedCache};
use crate::config::{PixxConfig, ResponseConfig};
use crate::display::{RenderSurface, ViewPixx};
use crate::error::PixxError;
use crate::register::{RegisterMap, RegisterSnapshot};
use crate::response::ResponsePixx;
use crate::transport::DeviceTransport;

/// A connected device.
///
/// Owns the register cache that the display controller and the response box
/// share, so both see the same snapshot and each other's writes.
pub struct DeviceSession<T: DeviceTransport> {
    cache: SharedCache<T>,
}

impl<T: DeviceTransport> DeviceSession<T> {
    /// Connect using the VIEWPixx register table.
    pub fn open(transport: T) -> Result<Self, PixxError> {
        Self::with_map(transport, RegisterMap::viewpixx())
    }

    /// Connect using a custom register table.
    ///
    /// The whole table is read once so a dead transport is reported here.
    pub fn with_map(transport: T, map: RegisterMap) -> Result<Self, PixxError> {
        let mut cache = RegisterCache::new(transport, map);
        cache.refresh()?;
        info!("device session opened ({} registers)", cache.map().len());
        Ok(Self {
            cache: cache.into_shared(),
        })
    }

    /// The shared register cache.
    pub fn cache(&self) -> SharedCache<T> {
        self.cache.clone()
    }

    /// Re-read every register.
    pub fn refresh(&self) -> Result<(), PixxError> {
        self.cache.borrow_mut().refresh()
    }

    /// Capture the registers a calibration depends on.
    pub fn register_snapshot(&self) -> Result<RegisterSnapshot, PixxError> {
        let mut cache = self.cache.borrow_mut();
        cache.refresh()?;
        cache.snapshot()
    }

    /// Attach a display controller rendering on `surface`.
    pub fn display<S: RenderSurface>(&self, surface: S) -> Result<ViewPixx<T, S>, PixxError> {
        ViewPixx::new(self.cache(), surface)
    }

    /// Attach the button box.
    pub fn response_box(&self, config: &ResponseConfig) -> Result<ResponsePixx<T>, PixxError> {
        ResponsePixx::new(self.cache(), config)
    }

    /// Attach both halves and apply `config`.
    pub fn configure<S: RenderSurface>(
        &self,
        surface: S,
        config: &PixxConfig,
    ) -> Result<(ViewPixx<T, S>, ResponsePixx<T>), PixxError> {
        let mut display = self.display(surface)?;
        config.display.apply(&mut display)?;
        let response = self.response_box(&config.response)?;
        Ok((display, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buttons::{Button, ButtonState};
    use crate::clut::Clut;
    use crate::mock::{MockDevice, MockSurface};
    use crate::modes::VideoMode;
    use crate::register::{Register, RegisterValue};

    #[test]
    fn test_open_reads_whole_table() {
        let device = MockDevice::new();
        let _session = DeviceSession::open(device.clone()).unwrap();
        assert_eq!(device.read_count(), Register::ALL.len());
    }

    #[test]
    fn test_open_reports_dead_transport() {
        let device = MockDevice::new();
        device.fail_after_reads(0);
        assert!(matches!(
            DeviceSession::open(device),
            Err(PixxError::DeviceIo(_))
        ));
    }

    #[test]
    fn test_display_and_response_share_cache() {
        let device = MockDevice::new();
        let session = DeviceSession::open(device.clone()).unwrap();
        let mut display = session.display(MockSurface::new()).unwrap();
        let mut buttons = session.response_box(&ResponseConfig::default()).unwrap();

        display.set_mode(VideoMode::M16).unwrap();
        buttons.start().unwrap();
        device.push_transition(0.2, Button::White.input_code());
        let events = buttons.poll().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].state, ButtonState::Down);

        let snapshot = session.register_snapshot().unwrap();
        assert_eq!(snapshot.get(Register::VideoMode), Some(&RegisterValue::from("M16")));
        assert_eq!(
            device.register(Register::DinDebounce),
            Some(RegisterValue::Bool(true))
        );
        display.set_clut(Some(Clut::identity())).unwrap();
    }

    #[test]
    fn test_configure_applies_config() {
        let device = MockDevice::new();
        let session = DeviceSession::open(device.clone()).unwrap();
        let config = PixxConfig::from_toml_str(
            "[display]\nmode = \"C48\"\nbacklight = 100\n[response]\nlights = \"off\"\n",
        )
        .unwrap();

        let (display, buttons) = session.configure(MockSurface::new(), &config).unwrap();
        assert_eq!(display.mode().unwrap(), VideoMode::C48);
        assert_eq!(display.backlight().unwrap(), 100);
        assert!(buttons.button_lights().unwrap().is_empty());
    }
}
