//! RESPONSEPixx button box event decoding.

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::thread;
use std::time::{Duration, Instant};

use crate::buttons::{
    Button, ButtonState, ButtonStates, buttons_from_output_bits, output_bits_from_buttons,
    state_from_input_bits,
};
use crate::cache::SharedCache;
use crate::config::ResponseConfig;
use crate::error::PixxError;
use crate::register::Register;
use crate::transport::{DeviceTransport, LogHandle};

/// Size of the on-device buffer the transition log is written to.
pub const DIN_LOG_BUFFER_BYTES: usize = 12_000_000;

/// Rate at which the hardware samples the digital inputs, in Hz.
pub const DIN_LOG_SAMPLE_RATE: u32 = 1000;

/// Digital I/O direction mask turning the light pins into outputs.
pub const LIGHT_PIN_DIRECTION: i64 = 0x1F_0000;

/// Which buttons and edges a [`ResponsePixx`] reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Buttons to report.
    pub buttons: BTreeSet<Button>,
    /// Edges to report.
    pub events: BTreeSet<ButtonState>,
}

impl WatchConfig {
    /// Watch `buttons` for `events`.
    pub fn new(
        buttons: impl IntoIterator<Item = Button>,
        events: impl IntoIterator<Item = ButtonState>,
    ) -> Self {
        Self {
            buttons: buttons.into_iter().collect(),
            events: events.into_iter().collect(),
        }
    }

    /// Whether a transition of `button` into `state` is reported.
    pub fn wants(&self, button: Button, state: ButtonState) -> bool {
        self.buttons.contains(&button) && self.events.contains(&state)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self::new(Button::ALL, [ButtonState::Down, ButtonState::Up])
    }
}

/// A button press or release.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ButtonEvent {
    /// The button.
    pub button: Button,
    /// The state it moved into.
    pub state: ButtonState,
    /// Seconds since [`ResponsePixx::start`], rounded to hundredths.
    pub time: f64,
}

#[derive(Debug)]
struct LogSession {
    log: LogHandle,
    start_time: f64,
    previous: ButtonStates,
}

/// The RESPONSEPixx button box.
///
/// Button transitions are logged by the hardware with device timestamps, so
/// events keep their timing no matter how late they are polled.
///
/// # Example
///
/// ```
/// use pixx_core::{Button, ButtonState, DeviceSession, MockDevice, ResponseConfig};
///
/// let device = MockDevice::new();
/// let session = DeviceSession::open(device.clone())?;
/// let mut buttons = session.response_box(&ResponseConfig::default())?;
///
/// buttons.start()?;
/// device.push_transition(0.25, Button::Green.input_code());
/// let events = buttons.poll()?;
/// assert_eq!(events[0].button, Button::Green);
/// assert_eq!(events[0].state, ButtonState::Down);
/// buttons.stop()?;
/// # Ok::<(), pixx_core::PixxError>(())
/// ```
pub struct ResponsePixx<T: DeviceTransport> {
    cache: SharedCache<T>,
    watch: WatchConfig,
    poll_interval: Duration,
    session: Option<LogSession>,
}

impl<T: DeviceTransport> ResponsePixx<T> {
    /// Attach to the button box: enable the light outputs and apply the
    /// configured lights and intensity.
    pub fn new(cache: SharedCache<T>, config: &ResponseConfig) -> Result<Self, PixxError> {
        let mut response = Self {
            cache,
            watch: config.watch.clone(),
            poll_interval: config.poll_interval(),
            session: None,
        };
        response
            .cache
            .borrow_mut()
            .set(Register::DinBitDirection, LIGHT_PIN_DIRECTION)?;
        response.set_button_lights(&config.lit_buttons())?;
        response.set_light_intensity(config.light_intensity)?;
        response.cache.borrow_mut().refresh()?;
        Ok(response)
    }

    /// The buttons and edges being reported.
    pub fn watch(&self) -> &WatchConfig {
        &self.watch
    }

    /// Whether a log session is running.
    pub fn is_started(&self) -> bool {
        self.session.is_some()
    }

    /// Start logging button transitions.
    ///
    /// Records the device time and button state as the baseline for
    /// [`poll`](Self::poll), and arms the hardware debounce (30 ms).
    ///
    /// # Errors
    ///
    /// - [`PixxError::AlreadyStarted`] if a session is already running
    /// - [`PixxError::DeviceIo`] if the log cannot be opened or armed; nothing is
    ///   left open
    pub fn start(&mut self) -> Result<(), PixxError> {
        if self.session.is_some() {
            return Err(PixxError::AlreadyStarted);
        }
        let log = self
            .cache
            .borrow_mut()
            .transport_mut()
            .open_log(DIN_LOG_BUFFER_BYTES, DIN_LOG_SAMPLE_RATE)?;

        // The baseline is read with the log running so no transition falls
        // between the two.
        let (start_time, previous) = match self.arm() {
            Ok(armed) => armed,
            Err(e) => {
                let mut cache = self.cache.borrow_mut();
                if let Err(close) = cache.transport_mut().close_log(log) {
                    warn!("failed to close transition log after start error: {}", close);
                }
                return Err(e);
            }
        };

        self.session = Some(LogSession {
            log,
            start_time,
            previous,
        });
        info!("button log {:?} started at t={:.3}s", log, start_time);
        Ok(())
    }

    fn arm(&self) -> Result<(f64, ButtonStates), PixxError> {
        let previous = self.button_state()?;
        let mut cache = self.cache.borrow_mut();
        let start_time = cache.transport_mut().device_time()?;
        cache.set(Register::DinDebounce, true)?;
        cache.refresh()?;
        Ok((start_time, previous))
    }

    /// Drain the transitions logged since the last call.
    ///
    /// Each log entry is compared with the state before it, so a press and
    /// release logged between two polls both produce events. Only the count of
    /// entries reported by the status query is read.
    pub fn poll(&mut self) -> Result<Vec<ButtonEvent>, PixxError> {
        let session = self.session.as_mut().ok_or(PixxError::NotStarted)?;

        let entries = {
            let mut cache = self.cache.borrow_mut();
            let transport = cache.transport_mut();
            let status = transport.log_status(session.log)?;
            if status.pending == 0 {
                return Ok(Vec::new());
            }
            transport.read_log(session.log, status.pending)?
        };

        let mut events = Vec::new();
        for entry in entries {
            trace!("log entry t={} bits={:#06x}", entry.timestamp, entry.bitmask);
            let state = state_from_input_bits(entry.bitmask);
            let time = round_hundredths(entry.timestamp - session.start_time);
            events.extend(
                state
                    .iter()
                    .filter(|&(button, new)| new != session.previous.get(button))
                    .filter(|&(button, new)| self.watch.wants(button, new))
                    .map(|(button, state)| ButtonEvent {
                        button,
                        state,
                        time,
                    }),
            );
            session.previous = state;
        }
        Ok(events)
    }

    /// Poll until an event arrives or `timeout` passes.
    ///
    /// With `clear`, pending transitions are discarded first so that only new
    /// events count. `None` waits forever. Returns `None` on timeout.
    pub fn wait_for_event(
        &mut self,
        timeout: Option<Duration>,
        clear: bool,
    ) -> Result<Option<Vec<ButtonEvent>>, PixxError> {
        if clear {
            self.clear()?;
        }
        let started = Instant::now();
        loop {
            let events = self.poll()?;
            if !events.is_empty() {
                return Ok(Some(events));
            }
            if timeout.is_some_and(|t| started.elapsed() >= t) {
                return Ok(None);
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Discard logged transitions without producing events.
    pub fn clear(&mut self) -> Result<(), PixxError> {
        let session = self.session.as_ref().ok_or(PixxError::NotStarted)?;
        let mut cache = self.cache.borrow_mut();
        let transport = cache.transport_mut();
        let status = transport.log_status(session.log)?;
        if status.pending > 0 {
            let dropped = transport.read_log(session.log, status.pending)?;
            debug!("cleared {} logged transitions", dropped.len());
        }
        Ok(())
    }

    /// Stop logging. Transitions not yet polled are lost.
    ///
    /// If the device fails to close the log the session stays running, so
    /// `stop` can be retried and dropping still closes it.
    pub fn stop(&mut self) -> Result<(), PixxError> {
        let log = self.session.as_ref().ok_or(PixxError::NotStarted)?.log;
        {
            let mut cache = self.cache.borrow_mut();
            cache.transport_mut().close_log(log)?;
            cache.invalidate();
        }
        self.session = None;
        info!("button log {:?} stopped", log);
        Ok(())
    }

    /// Current state of every button, read fresh from the device.
    pub fn button_state(&self) -> Result<ButtonStates, PixxError> {
        let mut cache = self.cache.borrow_mut();
        cache.refresh()?;
        let bits = cache.get_int(Register::DinValue)?;
        Ok(state_from_input_bits(bits as u32))
    }

    /// Buttons whose light is on.
    pub fn button_lights(&self) -> Result<BTreeSet<Button>, PixxError> {
        let mut cache = self.cache.borrow_mut();
        cache.refresh()?;
        let bits = cache.get_int(Register::DinOutputValue)?;
        Ok(buttons_from_output_bits(bits as u32))
    }

    /// Light exactly `buttons`.
    pub fn set_button_lights(&mut self, buttons: &BTreeSet<Button>) -> Result<(), PixxError> {
        if self.button_lights()? == *buttons {
            return Ok(());
        }
        let bits = output_bits_from_buttons(buttons);
        self.cache
            .borrow_mut()
            .set(Register::DinOutputValue, i64::from(bits))?;
        debug!("button lights set to {:?}", buttons);
        Ok(())
    }

    /// Light drive strength between 0 and 1.
    pub fn light_intensity(&self) -> Result<f64, PixxError> {
        let mut cache = self.cache.borrow_mut();
        cache.refresh()?;
        cache.get_float(Register::DinOutputStrength)
    }

    /// Set the light drive strength, clamped to `[0, 1]`.
    pub fn set_light_intensity(&mut self, intensity: f64) -> Result<(), PixxError> {
        let mut cache = self.cache.borrow_mut();
        cache.refresh()?;
        cache.set(Register::DinOutputStrength, intensity.clamp(0.0, 1.0))?;
        Ok(())
    }
}

impl<T: DeviceTransport> Drop for ResponsePixx<T> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match self.cache.try_borrow_mut() {
            Ok(mut cache) => {
                if let Err(e) = cache.transport_mut().close_log(session.log) {
                    warn!("failed to close button log {:?}: {}", session.log, e);
                }
            }
            Err(_) => warn!("button log {:?} left open: cache in use", session.log),
        }
    }
}

fn round_hundredths(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}
