//! Colour lookup table construction.
//!
//! A calibration measures luminance at a handful of input levels for the overall
//! luminance and each colour gun. The CLUT inverts that relation so that 16-bit
//! desired luminances map onto the input levels producing them.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{CalibrationError, PixxError};

/// Rows in a CLUT: luminance followed by the red, green and blue guns.
pub const CLUT_CHANNELS: usize = 4;

/// Entries per CLUT row (one per 16-bit input level).
pub const CLUT_SIZE: usize = 1 << 16;

/// Side length of the square texture a CLUT is uploaded as.
pub const TEXTURE_SIDE: usize = 256;

const NORMALIZE_EPSILON: f64 = 1e-8;
const LEVEL_TOLERANCE: f64 = 1e-9;

/// Luminances measured at a series of input levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSeries {
    /// Input levels, strictly ascending, from 0 to 1 (or 0 to 255).
    pub levels: Vec<f64>,
    /// Measured luminance per gun (0 = luminance, 1-3 = RGB), one entry per level.
    pub lums: [Vec<f64>; CLUT_CHANNELS],
}

impl CalibrationSeries {
    /// Create a series.
    pub fn new(levels: Vec<f64>, lums: [Vec<f64>; CLUT_CHANNELS]) -> Self {
        Self { levels, lums }
    }

    /// Number of measured levels.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Whether nothing was measured.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// A `[4 × 65536]` lookup table of output levels in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Clut {
    rows: Vec<Vec<f32>>,
}

impl Clut {
    /// Wrap raw rows. The shape is checked when the table is installed.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Self {
        Self { rows }
    }

    /// A table that leaves every level unchanged.
    pub fn identity() -> Self {
        let row: Vec<f32> = (0..CLUT_SIZE)
            .map(|i| (i as f64 / (CLUT_SIZE - 1) as f64) as f32)
            .collect();
        Self {
            rows: vec![row; CLUT_CHANNELS],
        }
    }

    /// `(rows, columns)`, with columns taken from the first row.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.rows.first().map_or(0, Vec::len))
    }

    /// Check for exactly four rows of 65536 entries.
    pub fn validate_shape(&self) -> Result<(), PixxError> {
        let rows = self.rows.len();
        let bad_row = self.rows.iter().find(|r| r.len() != CLUT_SIZE);
        match (rows, bad_row) {
            (CLUT_CHANNELS, None) => Ok(()),
            (_, Some(row)) => Err(PixxError::InvalidClutShape {
                rows,
                columns: row.len(),
            }),
            (_, None) => Err(PixxError::InvalidClutShape {
                rows,
                columns: self.shape().1,
            }),
        }
    }

    /// One channel's row.
    pub fn row(&self, channel: usize) -> Option<&[f32]> {
        self.rows.get(channel).map(Vec::as_slice)
    }

    /// Corrected output for `level` in `channel`.
    pub fn lookup(&self, channel: usize, level: u16) -> Option<f32> {
        self.row(channel)?.get(level as usize).copied()
    }

    /// Whether every row is non-decreasing.
    pub fn is_monotone(&self) -> bool {
        self.rows
            .iter()
            .all(|row| row.windows(2).all(|w| w[0] <= w[1]))
    }

    /// Pack the table into a 256×256 RGBA float texture.
    ///
    /// Texel `i` holds the red, green and blue gun rows in RGB and the luminance
    /// row in alpha, so the shader can index by a 16-bit level split into two bytes.
    pub fn to_texture(&self) -> Result<ClutTexture, PixxError> {
        self.validate_shape()?;
        let mut data = Vec::with_capacity(CLUT_SIZE * CLUT_CHANNELS);
        for i in 0..CLUT_SIZE {
            data.extend([self.rows[1][i], self.rows[2][i], self.rows[3][i], self.rows[0][i]]);
        }
        Ok(ClutTexture {
            width: TEXTURE_SIDE,
            height: TEXTURE_SIDE,
            data,
        })
    }
}

/// A CLUT laid out for upload as an RGBA32F texture.
#[derive(Debug, Clone, PartialEq)]
pub struct ClutTexture {
    /// Texture width in texels.
    pub width: usize,
    /// Texture height in texels.
    pub height: usize,
    /// Row-major RGBA texels.
    pub data: Vec<f32>,
}

/// Build a CLUT that linearises the measured luminance.
///
/// Decreasing luminance samples are dropped per gun with a warning; malformed
/// levels are rejected.
pub fn build_clut(series: &CalibrationSeries) -> Result<Clut, CalibrationError> {
    let levels = normalized_levels(&series.levels)?;
    for (gun, row) in series.lums.iter().enumerate() {
        if row.len() != levels.len() {
            return Err(CalibrationError::ShapeMismatch {
                gun,
                levels: levels.len(),
                lums: row.len(),
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(CalibrationError::NonFinite);
        }
    }

    let targets: Vec<f64> = (0..CLUT_SIZE)
        .map(|i| i as f64 / (CLUT_SIZE - 1) as f64)
        .collect();

    let rows = series
        .lums
        .iter()
        .enumerate()
        .map(|(gun, row)| {
            let lums = normalize(row);
            let (xp, fp) = increasing_samples(gun, &lums, &levels);
            targets
                .iter()
                .map(|&t| interpolate(t, &xp, &fp) as f32)
                .collect()
        })
        .collect();

    debug!("built CLUT from {} calibration levels", levels.len());
    Ok(Clut { rows })
}

/// Piecewise-linear interpolation of `x` over ascending `xp`, clamped at both ends.
///
/// `xp` may contain repeated points; an empty `xp` yields 0.
pub fn interpolate(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len().min(fp.len());
    if n == 0 {
        return 0.0;
    }
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    // xp[i - 1] <= x < xp[i]
    let i = xp[..n].partition_point(|&v| v <= x);
    let (x0, x1) = (xp[i - 1], xp[i]);
    let (y0, y1) = (fp[i - 1], fp[i]);
    y0 + (x - x0) * (y1 - y0) / (x1 - x0)
}

fn normalized_levels(levels: &[f64]) -> Result<Vec<f64>, CalibrationError> {
    if levels.len() < 2 {
        return Err(CalibrationError::TooFewLevels(levels.len()));
    }
    if levels.iter().any(|v| !v.is_finite()) {
        return Err(CalibrationError::NonFinite);
    }
    if let Some(w) = levels.windows(2).find(|w| w[1] <= w[0]) {
        return Err(CalibrationError::LevelsNotAscending {
            previous: w[0],
            next: w[1],
        });
    }
    if levels[0] != 0.0 {
        return Err(CalibrationError::LevelsStart(levels[0]));
    }

    let last = levels[levels.len() - 1];
    if (last - 255.0).abs() < LEVEL_TOLERANCE {
        Ok(levels.iter().map(|v| v / 255.0).collect())
    } else if (last - 1.0).abs() < LEVEL_TOLERANCE {
        Ok(levels.to_vec())
    } else {
        Err(CalibrationError::LevelsEnd(last))
    }
}

fn normalize(row: &[f64]) -> Vec<f64> {
    let min = row.iter().copied().fold(f64::INFINITY, f64::min);
    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min + NORMALIZE_EPSILON;
    row.iter().map(|v| (v - min) / range).collect()
}

/// Keep the samples of one gun whose luminance never falls below an earlier kept sample.
fn increasing_samples(gun: usize, lums: &[f64], levels: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut xp = Vec::with_capacity(lums.len());
    let mut fp = Vec::with_capacity(lums.len());
    for (&lum, &level) in lums.iter().zip(levels) {
        match xp.last() {
            Some(&prev) if lum < prev => {}
            _ => {
                xp.push(lum);
                fp.push(level);
            }
        }
    }

    let dropped = lums.len() - xp.len();
    if dropped > 0 {
        warn!(
            "gun {}: expected increasing luminance, dropped {} of {} samples",
            gun,
            dropped,
            lums.len()
        );
    }
    (xp, fp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linspace(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 / (n - 1) as f64).collect()
    }

    fn gamma_series(n: usize, gamma: f64, max_lum: f64) -> CalibrationSeries {
        let levels = linspace(n);
        let row: Vec<f64> = levels.iter().map(|l| 0.3 + max_lum * l.powf(gamma)).collect();
        CalibrationSeries::new(levels, [row.clone(), row.clone(), row.clone(), row])
    }

    #[test]
    fn test_monotone_calibration_gives_monotone_clut() {
        for (n, gamma) in [(2, 1.0), (9, 2.2), (17, 1.8), (64, 2.6)] {
            let clut = build_clut(&gamma_series(n, gamma, 120.0)).unwrap();
            assert_eq!(clut.shape(), (CLUT_CHANNELS, CLUT_SIZE));
            assert!(clut.validate_shape().is_ok());
            assert!(clut.is_monotone(), "n={n} gamma={gamma}");
        }
    }

    #[test]
    fn test_clut_spans_full_range() {
        let clut = build_clut(&gamma_series(33, 2.2, 100.0)).unwrap();
        for channel in 0..CLUT_CHANNELS {
            assert_eq!(clut.lookup(channel, 0), Some(0.0));
            assert_eq!(clut.lookup(channel, u16::MAX), Some(1.0));
        }
    }

    #[test]
    fn test_clut_inverts_gamma() {
        let clut = build_clut(&gamma_series(256, 2.2, 100.0)).unwrap();
        let half = clut.lookup(0, 32768).unwrap() as f64;
        assert!((half - 0.5f64.powf(1.0 / 2.2)).abs() < 1e-2, "got {half}");
    }

    #[test]
    fn test_linear_display_gives_identity() {
        let clut = build_clut(&gamma_series(5, 1.0, 50.0)).unwrap();
        let identity = Clut::identity();
        for level in [0u16, 1000, 16384, 40000, u16::MAX] {
            let got = clut.lookup(2, level).unwrap();
            let want = identity.lookup(2, level).unwrap();
            assert!((got - want).abs() < 1e-5, "level {level}: {got} vs {want}");
        }
    }

    #[test]
    fn test_non_ascending_levels_rejected() {
        let row = vec![0.0, 1.0, 2.0, 3.0];
        let series = CalibrationSeries::new(
            vec![0.0, 0.2, 0.1, 1.0],
            [row.clone(), row.clone(), row.clone(), row],
        );
        assert_eq!(
            build_clut(&series),
            Err(CalibrationError::LevelsNotAscending {
                previous: 0.2,
                next: 0.1
            })
        );
    }

    #[test]
    fn test_levels_in_byte_range_are_rescaled() {
        let unit = gamma_series(9, 2.0, 80.0);
        let mut bytes = unit.clone();
        bytes.levels = unit.levels.iter().map(|l| l * 255.0).collect();
        assert_eq!(build_clut(&bytes).unwrap(), build_clut(&unit).unwrap());
    }

    #[test]
    fn test_bad_level_endpoints_rejected() {
        let mut series = gamma_series(5, 2.0, 10.0);
        series.levels[0] = 0.01;
        assert_eq!(build_clut(&series), Err(CalibrationError::LevelsStart(0.01)));

        let mut series = gamma_series(5, 2.0, 10.0);
        series.levels[4] = 100.0;
        assert_eq!(build_clut(&series), Err(CalibrationError::LevelsEnd(100.0)));
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let mut series = gamma_series(5, 2.0, 10.0);
        series.lums[3].pop();
        assert_eq!(
            build_clut(&series),
            Err(CalibrationError::ShapeMismatch {
                gun: 3,
                levels: 5,
                lums: 4
            })
        );
        assert_eq!(
            build_clut(&CalibrationSeries::new(vec![0.0], Default::default())),
            Err(CalibrationError::TooFewLevels(1))
        );
    }

    #[test]
    fn test_decreasing_samples_dropped_per_gun() {
        let mut series = gamma_series(6, 2.0, 10.0);
        // gun 1 dips at level 0.6
        series.lums[1][3] = series.lums[1][1];
        let clut = build_clut(&series).unwrap();
        assert!(clut.is_monotone());

        let untouched = build_clut(&gamma_series(6, 2.0, 10.0)).unwrap();
        assert_eq!(clut.row(0), untouched.row(0));
        assert_ne!(clut.row(1), untouched.row(1));
    }

    #[test]
    fn test_flat_gun_does_not_produce_nan() {
        let mut series = gamma_series(4, 2.0, 10.0);
        series.lums[3] = vec![5.0; 4];
        let clut = build_clut(&series).unwrap();
        assert!(clut.row(3).unwrap().iter().all(|v| v.is_finite()));
        assert!(clut.is_monotone());
    }

    #[test]
    fn test_interpolate_clamps_and_handles_repeats() {
        let xp = [0.0, 0.5, 0.5, 1.0];
        let fp = [0.0, 0.2, 0.4, 1.0];
        assert_eq!(interpolate(-1.0, &xp, &fp), 0.0);
        assert_eq!(interpolate(2.0, &xp, &fp), 1.0);
        assert!((interpolate(0.25, &xp, &fp) - 0.1).abs() < 1e-12);
        assert!((interpolate(0.75, &xp, &fp) - 0.7).abs() < 1e-12);
        assert_eq!(interpolate(0.5, &[], &[]), 0.0);
    }

    #[test]
    fn test_shape_validation() {
        let three = Clut::from_rows(vec![vec![0.0; CLUT_SIZE]; 3]);
        assert!(matches!(
            three.validate_shape(),
            Err(PixxError::InvalidClutShape { rows: 3, columns: CLUT_SIZE })
        ));
        let short = Clut::from_rows(vec![vec![0.0; 256]; 4]);
        assert!(matches!(
            short.validate_shape(),
            Err(PixxError::InvalidClutShape { rows: 4, columns: 256 })
        ));
    }

    #[test]
    fn test_texture_layout() {
        let mut rows = vec![vec![0.0f32; CLUT_SIZE]; CLUT_CHANNELS];
        for (channel, row) in rows.iter_mut().enumerate() {
            row[300] = channel as f32 + 1.0;
        }
        let texture = Clut::from_rows(rows).to_texture().unwrap();
        assert_eq!((texture.width, texture.height), (256, 256));
        assert_eq!(texture.data.len(), 256 * 256 * 4);
        assert_eq!(&texture.data[300 * 4..301 * 4], &[2.0, 3.0, 4.0, 1.0]);
    }
}
