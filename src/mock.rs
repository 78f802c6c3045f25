//! Mock transport and render surface for testing.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::clut::ClutTexture;
use crate::display::{ProgramId, RenderSurface, TextureId};
use crate::error::{PixxError, TransportError};
use crate::modes::VideoMode;
use crate::register::{Register, RegisterValue};
use crate::transport::{DeviceTransport, LogHandle, LogStatus, TransitionLogEntry};

// =============================================================================
// MockDevice
// =============================================================================

struct DeviceState {
    registers: BTreeMap<Register, RegisterValue>,
    reads: usize,
    writes: Vec<(Register, RegisterValue)>,
    reads_until_failure: usize,
    time: f64,
    next_log: u32,
    open_log: Option<LogHandle>,
    pending: VecDeque<TransitionLogEntry>,
    deferred: Vec<(MockTrigger, TransitionLogEntry)>,
    closed_logs: usize,
    fail_next_close: bool,
}

impl DeviceState {
    fn apply_transition(&mut self, entry: TransitionLogEntry) {
        self.registers
            .insert(Register::DinValue, RegisterValue::Int(i64::from(entry.bitmask)));
        self.time = self.time.max(entry.timestamp);
        if self.open_log.is_some() {
            self.pending.push_back(entry);
        }
    }

    fn fire(&mut self, trigger: MockTrigger) {
        let (due, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.deferred)
            .into_iter()
            .partition(|(t, _)| *t == trigger);
        self.deferred = rest;
        for (_, entry) in due {
            self.apply_transition(entry);
        }
    }
}

/// Transport call a deferred transition is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockTrigger {
    /// Right before `open_log` starts logging, so the entry is not logged.
    OpenLog,
    /// Right after `log_status` has counted the pending entries.
    LogStatus,
}

/// A mock VPixx transport.
///
/// This allows testing code that depends on [`DeviceTransport`] without a device
/// attached. Clones share state, so a test can keep one handle while the other
/// is owned by a [`RegisterCache`](crate::RegisterCache).
///
/// # Example
///
/// ```
/// use pixx_core::{DeviceTransport, MockDevice, Register, RegisterValue};
///
/// let mut mock = MockDevice::new();
/// mock.write_register(Register::BacklightIntensity, &RegisterValue::Int(10)).unwrap();
/// assert_eq!(mock.register(Register::BacklightIntensity), Some(RegisterValue::Int(10)));
/// ```
#[derive(Clone)]
pub struct MockDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl MockDevice {
    /// Create a mock in the VIEWPixx power-on state: mode C24, full backlight,
    /// no buttons held, all lights off.
    pub fn new() -> Self {
        let registers = BTreeMap::from([
            (Register::VideoMode, RegisterValue::from("C24")),
            (Register::BacklightIntensity, RegisterValue::Int(255)),
            (Register::ScanningBackLight, RegisterValue::Bool(false)),
            (Register::VisiblePixelsPerHorizontalLine, RegisterValue::Int(1920)),
            (Register::VisibleLinePerVerticalFrame, RegisterValue::Int(1200)),
            (Register::DinValue, RegisterValue::Int(0xFFFF)),
            (Register::DinOutputValue, RegisterValue::Int(0x1F_0000)),
            (Register::DinOutputStrength, RegisterValue::Float(1.0)),
            (Register::DinBitDirection, RegisterValue::Int(0)),
            (Register::DinDebounce, RegisterValue::Bool(false)),
        ]);
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                registers,
                reads: 0,
                writes: Vec::new(),
                reads_until_failure: usize::MAX,
                time: 0.0,
                next_log: 1,
                open_log: None,
                pending: VecDeque::new(),
                deferred: Vec::new(),
                closed_logs: 0,
                fail_next_close: false,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Change a register behind the cache's back, as the hardware would.
    pub fn set_register(&self, register: Register, value: impl Into<RegisterValue>) {
        self.state().registers.insert(register, value.into());
    }

    /// Current device-side value of a register.
    pub fn register(&self, register: Register) -> Option<RegisterValue> {
        self.state().registers.get(&register).cloned()
    }

    /// Number of register reads so far.
    pub fn read_count(&self) -> usize {
        self.state().reads
    }

    /// Number of register writes so far.
    pub fn write_count(&self) -> usize {
        self.state().writes.len()
    }

    /// Every register write, in order.
    pub fn writes(&self) -> Vec<(Register, RegisterValue)> {
        self.state().writes.clone()
    }

    /// Let `reads` more register reads succeed, then fail every further read
    /// with [`TransportError::Disconnected`]. `usize::MAX` disables failures.
    pub fn fail_after_reads(&self, reads: usize) {
        self.state().reads_until_failure = reads;
    }

    /// Set the device clock.
    pub fn set_time(&self, seconds: f64) {
        self.state().time = seconds;
    }

    /// Simulate an input transition: update the input register and, if a log is
    /// open, append an entry.
    pub fn push_transition(&self, timestamp: f64, bitmask: u32) {
        self.state()
            .apply_transition(TransitionLogEntry::new(timestamp, bitmask));
    }

    /// Like [`push_transition`](Self::push_transition), but happening during the
    /// next transport call matching `trigger`.
    pub fn push_transition_on(&self, trigger: MockTrigger, timestamp: f64, bitmask: u32) {
        self.state()
            .deferred
            .push((trigger, TransitionLogEntry::new(timestamp, bitmask)));
    }

    /// Make the next `close_log` fail with [`TransportError::Disconnected`]
    /// and leave the log open.
    pub fn fail_next_close(&self) {
        self.state().fail_next_close = true;
    }

    /// Entries logged but not yet read.
    pub fn pending_entries(&self) -> usize {
        self.state().pending.len()
    }

    /// Whether a transition log is open.
    pub fn is_logging(&self) -> bool {
        self.state().open_log.is_some()
    }

    /// Number of logs closed so far.
    pub fn closed_logs(&self) -> usize {
        self.state().closed_logs
    }

    fn check_log(state: &DeviceState, log: LogHandle) -> Result<(), TransportError> {
        if state.open_log == Some(log) {
            Ok(())
        } else {
            Err(TransportError::Rejected {
                operation: "log access",
                code: -1,
            })
        }
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceTransport for MockDevice {
    fn read_register(&mut self, register: Register) -> Result<RegisterValue, TransportError> {
        let mut state = self.state();
        if state.reads_until_failure == 0 {
            return Err(TransportError::Disconnected);
        }
        if state.reads_until_failure != usize::MAX {
            state.reads_until_failure -= 1;
        }
        state.reads += 1;
        state
            .registers
            .get(&register)
            .cloned()
            .ok_or(TransportError::Rejected {
                operation: "read_register",
                code: -2,
            })
    }

    fn write_register(
        &mut self,
        register: Register,
        value: &RegisterValue,
    ) -> Result<(), TransportError> {
        let mut state = self.state();
        state.registers.insert(register, value.clone());
        state.writes.push((register, value.clone()));
        Ok(())
    }

    fn open_log(
        &mut self,
        _buffer_bytes: usize,
        _sample_rate: u32,
    ) -> Result<LogHandle, TransportError> {
        let mut state = self.state();
        if state.open_log.is_some() {
            return Err(TransportError::Rejected {
                operation: "open_log",
                code: -3,
            });
        }
        state.fire(MockTrigger::OpenLog);
        let log = LogHandle(state.next_log);
        state.next_log += 1;
        state.open_log = Some(log);
        state.pending.clear();
        Ok(log)
    }

    fn log_status(&mut self, log: LogHandle) -> Result<LogStatus, TransportError> {
        let mut state = self.state();
        Self::check_log(&state, log)?;
        let status = LogStatus {
            pending: state.pending.len(),
        };
        state.fire(MockTrigger::LogStatus);
        Ok(status)
    }

    fn read_log(
        &mut self,
        log: LogHandle,
        count: usize,
    ) -> Result<Vec<TransitionLogEntry>, TransportError> {
        let mut state = self.state();
        Self::check_log(&state, log)?;
        let count = count.min(state.pending.len());
        Ok(state.pending.drain(..count).collect())
    }

    fn close_log(&mut self, log: LogHandle) -> Result<(), TransportError> {
        let mut state = self.state();
        Self::check_log(&state, log)?;
        if std::mem::take(&mut state.fail_next_close) {
            return Err(TransportError::Disconnected);
        }
        state.open_log = None;
        state.pending.clear();
        state.closed_logs += 1;
        Ok(())
    }

    fn device_time(&mut self) -> Result<f64, TransportError> {
        Ok(self.state().time)
    }
}

// =============================================================================
// MockSurface
// =============================================================================

/// A call made on a [`MockSurface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceCall {
    /// `compile_program(mode)`
    Compile(VideoMode),
    /// `upload_clut` returned this texture.
    Upload(TextureId),
    /// `release_clut(texture)`
    Release(TextureId),
    /// `set_correction(program, clut)`
    SetCorrection(ProgramId, Option<TextureId>),
}

struct SurfaceState {
    gamma: [f32; 3],
    calls: Vec<SurfaceCall>,
    next_id: u32,
    live: BTreeSet<TextureId>,
    fail_next_upload: bool,
    fail_next_compile: bool,
}

/// A mock render surface that records every call.
///
/// Clones share state.
#[derive(Clone)]
pub struct MockSurface {
    state: Arc<Mutex<SurfaceState>>,
}

impl MockSurface {
    /// A surface without native gamma correction.
    pub fn new() -> Self {
        Self::with_gamma([1.0; 3])
    }

    /// A surface applying the given per-gun gamma.
    pub fn with_gamma(gamma: [f32; 3]) -> Self {
        Self {
            state: Arc::new(Mutex::new(SurfaceState {
                gamma,
                calls: Vec::new(),
                next_id: 1,
                live: BTreeSet::new(),
                fail_next_upload: false,
                fail_next_compile: false,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SurfaceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Calls recorded so far.
    pub fn calls(&self) -> Vec<SurfaceCall> {
        self.state().calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Textures uploaded and not yet released.
    pub fn live_textures(&self) -> usize {
        self.state().live.len()
    }

    /// Make the next upload fail.
    pub fn fail_next_upload(&self) {
        self.state().fail_next_upload = true;
    }

    /// Make the next program compilation fail.
    pub fn fail_next_compile(&self) {
        self.state().fail_next_compile = true;
    }
}

impl Default for MockSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSurface for MockSurface {
    fn native_gamma(&self) -> [f32; 3] {
        self.state().gamma
    }

    fn compile_program(&mut self, mode: VideoMode) -> Result<ProgramId, PixxError> {
        let mut state = self.state();
        if std::mem::take(&mut state.fail_next_compile) {
            return Err(PixxError::Surface(format!("no program for mode {mode}")));
        }
        let id = state.next_id;
        state.next_id += 1;
        state.calls.push(SurfaceCall::Compile(mode));
        Ok(ProgramId(id))
    }

    fn upload_clut(&mut self, texture: &ClutTexture) -> Result<TextureId, PixxError> {
        let mut state = self.state();
        if std::mem::take(&mut state.fail_next_upload) {
            return Err(PixxError::Surface("out of texture memory".into()));
        }
        if texture.data.len() != texture.width * texture.height * 4 {
            return Err(PixxError::Surface("texture size mismatch".into()));
        }
        let id = TextureId(state.next_id);
        state.next_id += 1;
        state.live.insert(id);
        state.calls.push(SurfaceCall::Upload(id));
        Ok(id)
    }

    fn release_clut(&mut self, texture: TextureId) {
        let mut state = self.state();
        state.live.remove(&texture);
        state.calls.push(SurfaceCall::Release(texture));
    }

    fn set_correction(
        &mut self,
        program: ProgramId,
        clut: Option<TextureId>,
    ) -> Result<(), PixxError> {
        let mut state = self.state();
        if let Some(texture) = clut {
            if !state.live.contains(&texture) {
                return Err(PixxError::Surface(format!("texture {texture:?} not uploaded")));
            }
        }
        state.calls.push(SurfaceCall::SetCorrection(program, clut));
        Ok(())
    }
}
