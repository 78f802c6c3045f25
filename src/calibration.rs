//! Calibration records as exchanged with the calibration store.

use serde::{Deserialize, Serialize};

use crate::clut::{CalibrationSeries, Clut, build_clut};
use crate::error::PixxError;
use crate::register::RegisterSnapshot;

/// A persisted display calibration.
///
/// Besides the measurements it carries the register state the display was in
/// while measuring, so a CLUT is only applied under the same configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    /// Calibration name, usually a date stamp.
    pub name: String,
    /// Luminance measurements.
    pub series: CalibrationSeries,
    /// Register state at measurement time.
    #[serde(default)]
    pub register: Option<RegisterSnapshot>,
}

impl CalibrationRecord {
    /// A record without register data.
    pub fn new(name: impl Into<String>, series: CalibrationSeries) -> Self {
        Self {
            name: name.into(),
            series,
            register: None,
        }
    }

    /// Attach the register state the measurements were taken under.
    pub fn with_register(mut self, register: RegisterSnapshot) -> Self {
        self.register = Some(register);
        self
    }

    /// Check that every stored register equals its live value.
    ///
    /// # Errors
    ///
    /// - [`PixxError::MissingCalibrationRegister`] if the record has no register data
    /// - [`PixxError::UnmappedRegister`] if a stored register was not captured live
    /// - [`PixxError::CalibrationMismatch`] on the first differing register
    pub fn check_register(&self, live: &RegisterSnapshot) -> Result<(), PixxError> {
        let stored = self
            .register
            .as_ref()
            .ok_or_else(|| PixxError::MissingCalibrationRegister(self.name.clone()))?;

        for (&register, expected) in stored.iter() {
            let actual = live
                .get(register)
                .ok_or(PixxError::UnmappedRegister(register))?;
            if actual != expected {
                return Err(PixxError::CalibrationMismatch {
                    register,
                    expected: expected.clone(),
                    actual: actual.clone(),
                });
            }
        }
        Ok(())
    }

    /// Build the CLUT for this calibration.
    pub fn build_clut(&self) -> Result<Clut, PixxError> {
        Ok(build_clut(&self.series)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::{Register, RegisterValue};

    fn record() -> CalibrationRecord {
        let levels = vec![0.0, 0.5, 1.0];
        let row = vec![0.1, 20.0, 90.0];
        let series = CalibrationSeries::new(levels, [row.clone(), row.clone(), row.clone(), row]);
        CalibrationRecord::new("2026-10-01", series).with_register(
            [
                (Register::VideoMode, RegisterValue::from("M16")),
                (Register::BacklightIntensity, RegisterValue::from(255i64)),
            ]
            .into_iter()
            .collect(),
        )
    }

    #[test]
    fn test_matching_register_passes() {
        let live: RegisterSnapshot = [
            (Register::VideoMode, RegisterValue::from("M16")),
            (Register::BacklightIntensity, RegisterValue::from(255i64)),
            (Register::ScanningBackLight, RegisterValue::from(false)),
        ]
        .into_iter()
        .collect();
        assert!(record().check_register(&live).is_ok());
    }

    #[test]
    fn test_any_differing_register_fails() {
        let live: RegisterSnapshot = [
            (Register::VideoMode, RegisterValue::from("M16")),
            (Register::BacklightIntensity, RegisterValue::from(200i64)),
        ]
        .into_iter()
        .collect();
        match record().check_register(&live) {
            Err(PixxError::CalibrationMismatch {
                register,
                expected,
                actual,
            }) => {
                assert_eq!(register, Register::BacklightIntensity);
                assert_eq!(expected, RegisterValue::from(255i64));
                assert_eq!(actual, RegisterValue::from(200i64));
            }
            other => panic!("expected mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_data_fails() {
        let mut bare = record();
        bare.register = None;
        assert!(matches!(
            bare.check_register(&RegisterSnapshot::default()),
            Err(PixxError::MissingCalibrationRegister(name)) if name == "2026-10-01"
        ));

        let partial: RegisterSnapshot = [(Register::VideoMode, RegisterValue::from("M16"))]
            .into_iter()
            .collect();
        assert!(matches!(
            record().check_register(&partial),
            Err(PixxError::UnmappedRegister(Register::BacklightIntensity))
        ));
    }

    #[test]
    fn test_build_clut_surfaces_calibration_errors() {
        let mut bad = record();
        bad.series.levels = vec![0.0, 0.7, 0.6];
        assert!(matches!(bad.build_clut(), Err(PixxError::Calibration(_))));
        assert!(record().build_clut().unwrap().is_monotone());
    }
}
