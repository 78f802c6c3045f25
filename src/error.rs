//! Error types for the VPixx device layer.

use crate::modes::VideoMode;
use crate::register::{Register, RegisterValue};

/// Failures reported by a [`DeviceTransport`](crate::DeviceTransport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The underlying channel to the device failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The device refused an operation.
    #[error("Device rejected {operation} (error code: {code})")]
    Rejected {
        /// The operation that was attempted.
        operation: &'static str,
        /// Vendor error code.
        code: i32,
    },

    /// The device is no longer reachable.
    #[error("Device disconnected")]
    Disconnected,
}

/// Malformed calibration data handed to the CLUT builder.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalibrationError {
    /// A luminance row does not have one entry per level.
    #[error("Expected matching levels and luminances, got {levels} levels and {lums} luminances in gun {gun}")]
    ShapeMismatch {
        /// Gun index (0 = luminance).
        gun: usize,
        /// Number of levels.
        levels: usize,
        /// Number of luminances in the row.
        lums: usize,
    },

    /// Fewer than two levels were measured.
    #[error("Expected at least 2 levels, got {0}")]
    TooFewLevels(usize),

    /// Levels are not strictly ascending.
    #[error("Expected strictly increasing levels, got {previous} followed by {next}")]
    LevelsNotAscending {
        /// The earlier level.
        previous: f64,
        /// The offending level.
        next: f64,
    },

    /// The first level is not zero.
    #[error("Expected levels starting with 0, got {0}")]
    LevelsStart(f64),

    /// The last level is neither 1.0 nor 255.
    #[error("Expected levels ending with 1.0 or 255, got {0}")]
    LevelsEnd(f64),

    /// A level or luminance is NaN or infinite.
    #[error("Calibration contains a non-finite value")]
    NonFinite,
}

/// Errors that can occur when driving a VPixx device.
#[derive(Debug, thiserror::Error)]
pub enum PixxError {
    /// Transport-level failure. Never retried by this crate.
    #[error("Device IO failed: {0}")]
    DeviceIo(#[from] TransportError),

    /// The calibration data could not be turned into a CLUT.
    #[error("Invalid calibration: {0}")]
    Calibration(#[from] CalibrationError),

    /// A CLUT did not have the `[4, 65536]` shape.
    #[error("Expected CLUT shape [4, 65536], got [{rows}, {columns}]")]
    InvalidClutShape {
        /// Number of rows supplied.
        rows: usize,
        /// Length of the shortest or mismatching row.
        columns: usize,
    },

    /// A CLUT was bound while the display runs a mode without extended resolution.
    #[error("Software CLUT is only supported with high luminance-resolution modes (M16, C48), got {0}")]
    UnsupportedModeForClut(VideoMode),

    /// Extended-resolution mode requested while native gamma correction is active.
    #[error("High luminance resolution (mode={mode}) is incompatible with native gamma correction, expected gamma 1, got {gamma:?}")]
    IncompatibleGammaCorrection {
        /// The extended mode that was requested.
        mode: VideoMode,
        /// The surface's per-gun gamma.
        gamma: [f32; 3],
    },

    /// The event decoder was used before [`ResponsePixx::start`](crate::ResponsePixx::start).
    #[error("Event watching not started - call start() first")]
    NotStarted,

    /// [`ResponsePixx::start`](crate::ResponsePixx::start) called on a running session.
    #[error("Event watching already started - only one log consumer allowed")]
    AlreadyStarted,

    /// A register differs from the state the calibration was taken under.
    #[error("Calibration register mismatch: expected {register}={expected}, got {register}={actual}")]
    CalibrationMismatch {
        /// The mismatching register.
        register: Register,
        /// Value stored with the calibration.
        expected: RegisterValue,
        /// Value read from the device.
        actual: RegisterValue,
    },

    /// The calibration record carries no register snapshot to assert against.
    #[error("No register data found in calibration '{0}'")]
    MissingCalibrationRegister(String),

    /// The register is not part of the configured register map.
    #[error("Register {0} is not mapped")]
    UnmappedRegister(Register),

    /// The register map marks the register as read-only.
    #[error("Register {0} is read-only")]
    ReadOnlyRegister(Register),

    /// A register held a value of the wrong kind.
    #[error("Unexpected value {value} in register {register}")]
    UnexpectedRegisterValue {
        /// The register that was read.
        register: Register,
        /// The value found there.
        value: RegisterValue,
    },

    /// A button name outside the closed set.
    #[error("Unknown button '{0}'")]
    UnknownButton(String),

    /// A video mode name outside the closed set.
    #[error("Unsupported video mode '{0}'")]
    UnknownVideoMode(String),

    /// The render surface failed to create or bind a resource.
    #[error("Render surface error: {0}")]
    Surface(String),

    /// Configuration text could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}
