//! Unofficial Rust API for VPixx VIEWPixx displays and RESPONSEPixx button boxes.
//!
//! This crate drives the parts of a VPixx setup that matter for luminance-critical
//! experiments: the VIEWPixx video modes with extended luminance resolution, the
//! software CLUT that linearizes them from a calibration, and the hardware-timed
//! button log of the RESPONSEPixx.
//!
//! Hardware access goes through the [`DeviceTransport`] trait and GPU work through
//! [`RenderSurface`], so the same code runs against a real device or the mocks.
//!
//! # Example
//!
//! ```
//! use pixx_core::{
//!     Button, CalibrationRecord, CalibrationSeries, DeviceSession, MockDevice, MockSurface,
//!     ResponseConfig, VideoMode,
//! };
//!
//! fn main() -> Result<(), pixx_core::PixxError> {
//!     let device = MockDevice::new();
//!     let session = DeviceSession::open(device.clone())?;
//!
//!     // Switch to 16-bit monochrome and load a calibration
//!     let mut display = session.display(MockSurface::new())?;
//!     display.set_mode(VideoMode::M16)?;
//!
//!     let levels = vec![0.0, 0.5, 1.0];
//!     let lums = vec![0.2, 25.0, 100.0];
//!     let series = CalibrationSeries::new(levels, [lums.clone(), lums.clone(), lums.clone(), lums]);
//!     let record = CalibrationRecord::new("2026-10-01", series)
//!         .with_register(display.register_snapshot()?);
//!     display.linearize(&record, true)?;
//!
//!     // Log button presses with device timestamps
//!     let mut buttons = session.response_box(&ResponseConfig::default())?;
//!     buttons.start()?;
//!     device.push_transition(0.42, Button::Red.input_code());
//!     for event in buttons.poll()? {
//!         println!("{} {} at {:.2}s", event.button, event.state, event.time);
//!     }
//!     buttons.stop()?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! Use [`MockDevice`] to test code without hardware:
//!
//! ```
//! use pixx_core::{Button, DeviceSession, MockDevice, ResponseConfig};
//!
//! let device = MockDevice::new();
//! let session = DeviceSession::open(device.clone()).unwrap();
//! let buttons = session.response_box(&ResponseConfig::default()).unwrap();
//! device.push_transition(0.0, Button::Blue.input_code());
//! assert!(buttons.button_state().unwrap().pressed().contains(&Button::Blue));
//! ```
//!
//! # Disclaimer
//!
//! This is an **unofficial** library. It is not affiliated with or endorsed by VPixx
//! Technologies. Use at your own risk.

#![warn(missing_docs)]

mod buttons;
mod cache;
mod calibration;
mod clut;
mod config;
mod display;
mod error;
mod mock;
mod modes;
mod register;
mod response;
mod session;
mod transport;

// Re-export public API
pub use buttons::{
    Button, ButtonState, ButtonStates, INPUT_MASK, OUTPUT_MASK, buttons_from_output_bits,
    input_bits_from_buttons, output_bits_from_buttons, state_from_input_bits,
};
pub use cache::{RegisterCache, SharedCache};
pub use calibration::CalibrationRecord;
pub use clut::{
    CLUT_CHANNELS, CLUT_SIZE, CalibrationSeries, Clut, ClutTexture, TEXTURE_SIDE, build_clut,
    interpolate,
};
pub use config::{DisplayConfig, LightsConfig, PixxConfig, ResponseConfig};
pub use display::{ProgramId, RenderBinding, RenderSurface, TextureId, ViewPixx};
pub use error::{CalibrationError, PixxError, TransportError};
pub use mock::{MockDevice, MockSurface, MockTrigger, SurfaceCall};
pub use modes::VideoMode;
pub use register::{Access, Register, RegisterEntry, RegisterMap, RegisterSnapshot, RegisterValue};
pub use response::{
    ButtonEvent, DIN_LOG_BUFFER_BYTES, DIN_LOG_SAMPLE_RATE, LIGHT_PIN_DIRECTION, ResponsePixx,
    WatchConfig,
};
pub use session::DeviceSession;
pub use transport::{DeviceTransport, LogHandle, LogStatus, TransitionLogEntry};
