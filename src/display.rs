//! VIEWPixx display controller.

use log::{debug, info, warn};
use std::collections::HashMap;

use crate::cache::{RegisterCache, SharedCache};
use crate::calibration::CalibrationRecord;
use crate::clut::{Clut, ClutTexture};
use crate::error::PixxError;
use crate::modes::VideoMode;
use crate::register::{Access, Register, RegisterSnapshot, RegisterValue};
use crate::transport::DeviceTransport;

// =============================================================================
// Render Surface Trait
// =============================================================================

/// Handle to a compiled composition program on the render surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProgramId(pub u32);

/// Handle to an uploaded CLUT texture on the render surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextureId(pub u32);

/// Trait for the GPU side the display composes frames on.
///
/// This allows for mock implementations in tests.
pub trait RenderSurface {
    /// Per-gun gamma the surface applies natively. `[1.0; 3]` means none.
    fn native_gamma(&self) -> [f32; 3];

    /// Build the composition program for `mode`.
    fn compile_program(&mut self, mode: VideoMode) -> Result<ProgramId, PixxError>;

    /// Upload a CLUT texture. The texture must be complete when this returns.
    fn upload_clut(&mut self, texture: &ClutTexture) -> Result<TextureId, PixxError>;

    /// Free a CLUT texture.
    fn release_clut(&mut self, texture: TextureId);

    /// Point `program` at `clut` and set its correction flag.
    ///
    /// With `Some`, the texture is bound before the flag is raised. With `None`,
    /// the flag is cleared and the program no longer samples any texture.
    fn set_correction(
        &mut self,
        program: ProgramId,
        clut: Option<TextureId>,
    ) -> Result<(), PixxError>;
}

/// What the composition step needs to render the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderBinding {
    /// Active video mode.
    pub mode: VideoMode,
    /// Program for that mode.
    pub program: ProgramId,
    /// Bound CLUT texture, if any.
    pub clut: Option<TextureId>,
    /// Whether the program applies the CLUT.
    pub correction_enabled: bool,
}

// =============================================================================
// ViewPixx
// =============================================================================

/// The VIEWPixx display controller.
///
/// Keeps the video mode register, the per-mode composition programs and the
/// software CLUT consistent:
/// - a CLUT can only be bound in a mode with extended luminance resolution
/// - extended modes require the surface's native gamma to be identity
/// - a program is compiled once per mode and reused for the session
///
/// # Example
///
/// ```
/// use pixx_core::{DeviceSession, MockDevice, MockSurface, VideoMode, Clut};
///
/// let session = DeviceSession::open(MockDevice::new())?;
/// let mut display = session.display(MockSurface::new())?;
/// display.set_mode(VideoMode::M16)?;
/// display.set_clut(Some(Clut::identity()))?;
/// assert!(display.render_binding()?.correction_enabled);
/// # Ok::<(), pixx_core::PixxError>(())
/// ```
pub struct ViewPixx<T: DeviceTransport, S: RenderSurface> {
    cache: SharedCache<T>,
    surface: S,
    programs: HashMap<VideoMode, ProgramId>,
    clut: Option<Clut>,
    texture: Option<TextureId>,
    correction_enabled: bool,
}

impl<T: DeviceTransport, S: RenderSurface> ViewPixx<T, S> {
    /// Attach a display controller to a device session.
    ///
    /// # Errors
    ///
    /// - [`PixxError::IncompatibleGammaCorrection`] if the device is already in an
    ///   extended mode and the surface applies gamma correction
    /// - [`PixxError::DeviceIo`] if the mode register cannot be read
    pub fn new(cache: SharedCache<T>, surface: S) -> Result<Self, PixxError> {
        let mut display = Self {
            cache,
            surface,
            programs: HashMap::new(),
            clut: None,
            texture: None,
            correction_enabled: false,
        };
        display.resync()?;
        Ok(display)
    }

    /// Current video mode, read fresh from the device.
    pub fn mode(&self) -> Result<VideoMode, PixxError> {
        let mut cache = self.cache.borrow_mut();
        cache.refresh()?;
        read_mode(&mut cache)
    }

    /// Switch the video mode.
    ///
    /// # Errors
    ///
    /// - [`PixxError::UnsupportedModeForClut`] if a CLUT is bound and `mode` has no
    ///   extended resolution
    /// - [`PixxError::IncompatibleGammaCorrection`] if `mode` is extended and the
    ///   surface applies gamma correction
    ///
    /// Both are raised before the device is touched, as is a failure to compile
    /// the program for `mode`.
    pub fn set_mode(&mut self, mode: VideoMode) -> Result<(), PixxError> {
        self.check_mode(mode)?;
        self.program(mode)?;
        let current = self.mode()?;
        if mode != current {
            let mut cache = self.cache.borrow_mut();
            cache.set(Register::VideoMode, mode)?;
            cache.refresh()?;
            info!("video mode {} -> {}", current, mode);
        }
        self.resync()
    }

    /// Install or remove the software CLUT.
    ///
    /// A new table is uploaded and bound before the previous texture is released,
    /// so rendering never samples a half-written or freed table.
    ///
    /// # Errors
    ///
    /// - [`PixxError::InvalidClutShape`] unless the table is `[4, 65536]`
    /// - [`PixxError::UnsupportedModeForClut`] if the current mode has no extended resolution
    /// - [`PixxError::Surface`] if the upload fails; the previous table stays bound
    pub fn set_clut(&mut self, table: Option<Clut>) -> Result<(), PixxError> {
        let mode = self.mode()?;
        match table {
            Some(clut) => {
                let texture = clut.to_texture()?;
                if !mode.supports_extended_resolution() {
                    return Err(PixxError::UnsupportedModeForClut(mode));
                }
                self.check_gamma(mode)?;
                let program = self.program(mode)?;

                let uploaded = self.surface.upload_clut(&texture)?;
                if let Err(e) = self.surface.set_correction(program, Some(uploaded)) {
                    self.surface.release_clut(uploaded);
                    return Err(e);
                }
                let previous = self.texture.replace(uploaded);
                self.clut = Some(clut);
                self.correction_enabled = true;
                if let Some(old) = previous {
                    self.surface.release_clut(old);
                    debug!("released CLUT texture {:?}", old);
                }
                info!("installed CLUT as texture {:?} in mode {}", uploaded, mode);
            }
            None => {
                if let Some(old) = self.texture {
                    let program = self.program(mode)?;
                    self.surface.set_correction(program, None)?;
                    self.texture = None;
                    self.surface.release_clut(old);
                    info!("removed CLUT texture {:?}", old);
                }
                self.clut = None;
                self.correction_enabled = false;
            }
        }
        self.resync()
    }

    /// The installed CLUT, if any.
    pub fn clut(&self) -> Option<&Clut> {
        self.clut.as_ref()
    }

    /// Build a CLUT from a calibration and install it.
    ///
    /// With `assert_register`, every register stored with the calibration must
    /// equal the live device state.
    pub fn linearize(
        &mut self,
        record: &CalibrationRecord,
        assert_register: bool,
    ) -> Result<(), PixxError> {
        if assert_register {
            let live = self.register_snapshot()?;
            record.check_register(&live)?;
        }
        let clut = record.build_clut()?;
        self.set_clut(Some(clut))
    }

    /// Capture the registers that describe the display configuration.
    pub fn register_snapshot(&self) -> Result<RegisterSnapshot, PixxError> {
        let mut cache = self.cache.borrow_mut();
        cache.refresh()?;
        cache.snapshot()
    }

    /// Restore a captured register state, e.g. the one stored with a calibration.
    ///
    /// Read-only registers are skipped. The video mode goes through
    /// [`set_mode`](Self::set_mode) so its checks apply, and those checks run
    /// before any register is written.
    pub fn apply_register_snapshot(&mut self, snapshot: &RegisterSnapshot) -> Result<(), PixxError> {
        let mode = match snapshot.get(Register::VideoMode) {
            Some(value) => Some(parse_mode(value)?),
            None => None,
        };
        if let Some(mode) = mode {
            self.check_mode(mode)?;
        }

        {
            let mut cache = self.cache.borrow_mut();
            let writable: Vec<(Register, RegisterValue)> = snapshot
                .iter()
                .filter(|(r, _)| **r != Register::VideoMode)
                .filter(|(r, _)| {
                    cache
                        .map()
                        .entry(**r)
                        .is_some_and(|e| e.access == Access::ReadWrite)
                })
                .map(|(r, v)| (*r, v.clone()))
                .collect();
            for (register, value) in writable {
                cache.set(register, value)?;
            }
            cache.refresh()?;
        }

        match mode {
            Some(mode) => self.set_mode(mode),
            None => self.resync(),
        }
    }

    /// Visible `(width, height)` in pixels.
    pub fn size(&self) -> Result<(u32, u32), PixxError> {
        let mut cache = self.cache.borrow_mut();
        cache.refresh()?;
        let width = pixel_count(&mut cache, Register::VisiblePixelsPerHorizontalLine)?;
        let height = pixel_count(&mut cache, Register::VisibleLinePerVerticalFrame)?;
        Ok((width, height))
    }

    /// Backlight intensity between 0 and 255.
    pub fn backlight(&self) -> Result<u8, PixxError> {
        let mut cache = self.cache.borrow_mut();
        cache.refresh()?;
        Ok(cache.get_int(Register::BacklightIntensity)?.clamp(0, 255) as u8)
    }

    /// Set the backlight intensity. No write happens if it is unchanged.
    pub fn set_backlight(&mut self, intensity: u8) -> Result<(), PixxError> {
        let mut cache = self.cache.borrow_mut();
        cache.refresh()?;
        if cache.set(Register::BacklightIntensity, i64::from(intensity))? {
            debug!("backlight set to {}", intensity);
        }
        Ok(())
    }

    /// Whether the scanning backlight is on.
    pub fn scanning_backlight(&self) -> Result<bool, PixxError> {
        let mut cache = self.cache.borrow_mut();
        cache.refresh()?;
        cache.get_bool(Register::ScanningBackLight)
    }

    /// Turn the scanning backlight on or off.
    pub fn set_scanning_backlight(&mut self, enabled: bool) -> Result<(), PixxError> {
        let mut cache = self.cache.borrow_mut();
        cache.refresh()?;
        cache.set(Register::ScanningBackLight, enabled)?;
        Ok(())
    }

    /// Program and CLUT binding for the composition step.
    pub fn render_binding(&mut self) -> Result<RenderBinding, PixxError> {
        let mode = self.mode()?;
        let program = self.program(mode)?;
        Ok(RenderBinding {
            mode,
            program,
            clut: self.texture,
            correction_enabled: self.correction_enabled,
        })
    }

    /// The render surface.
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Bring the surface in line with the current mode and CLUT.
    fn resync(&mut self) -> Result<(), PixxError> {
        let mode = self.mode()?;
        let program = self.program(mode)?;
        if mode.supports_extended_resolution() {
            self.check_gamma(mode)?;
            self.surface.set_correction(program, self.texture)?;
            self.correction_enabled = self.texture.is_some();
            debug!(
                "mode {} synced, correction {}",
                mode,
                if self.correction_enabled { "on" } else { "off" }
            );
        } else if self.texture.is_some() {
            return Err(PixxError::UnsupportedModeForClut(mode));
        } else {
            self.correction_enabled = false;
        }
        Ok(())
    }

    fn program(&mut self, mode: VideoMode) -> Result<ProgramId, PixxError> {
        if let Some(&program) = self.programs.get(&mode) {
            return Ok(program);
        }
        let program = self.surface.compile_program(mode)?;
        debug!("compiled program {:?} for mode {}", program, mode);
        self.programs.insert(mode, program);
        Ok(program)
    }

    fn check_mode(&self, mode: VideoMode) -> Result<(), PixxError> {
        if mode.supports_extended_resolution() {
            self.check_gamma(mode)
        } else if self.texture.is_some() {
            Err(PixxError::UnsupportedModeForClut(mode))
        } else {
            Ok(())
        }
    }

    fn check_gamma(&self, mode: VideoMode) -> Result<(), PixxError> {
        let gamma = self.surface.native_gamma();
        if gamma.iter().all(|g| (g - 1.0).abs() <= f32::EPSILON) {
            Ok(())
        } else {
            Err(PixxError::IncompatibleGammaCorrection { mode, gamma })
        }
    }
}

impl<T: DeviceTransport, S: RenderSurface> Drop for ViewPixx<T, S> {
    fn drop(&mut self) {
        let Some(texture) = self.texture.take() else {
            return;
        };
        // The surface outlives us: no program may sample the texture once freed.
        let bound: Vec<ProgramId> = self
            .programs
            .iter()
            .filter(|(mode, _)| mode.supports_extended_resolution())
            .map(|(_, &program)| program)
            .collect();
        for program in bound {
            if let Err(e) = self.surface.set_correction(program, None) {
                warn!("failed to disable correction on {:?}: {}", program, e);
            }
        }
        self.surface.release_clut(texture);
    }
}

fn pixel_count<T: DeviceTransport>(
    cache: &mut RegisterCache<T>,
    register: Register,
) -> Result<u32, PixxError> {
    let value = cache.get_int(register)?;
    u32::try_from(value).map_err(|_| PixxError::UnexpectedRegisterValue {
        register,
        value: RegisterValue::Int(value),
    })
}

fn read_mode<T: DeviceTransport>(cache: &mut RegisterCache<T>) -> Result<VideoMode, PixxError> {
    let value = cache.get(Register::VideoMode)?;
    parse_mode(&value)
}

fn parse_mode(value: &RegisterValue) -> Result<VideoMode, PixxError> {
    match value.as_text() {
        Some(name) => name.parse(),
        None => Err(PixxError::UnexpectedRegisterValue {
            register: Register::VideoMode,
            value: value.clone(),
        }),
    }
}
