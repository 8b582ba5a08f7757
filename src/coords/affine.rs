//! Pixel-to-stage affine transform.

use crate::error::CoordinateError;

/// 2×3 affine transform mapping pixel displacements to stage displacements.
///
/// Serialized as six `_`-separated numbers in column-major order:
/// `m00_m10_m01_m11_m02_m12`. Only the linear part is used for displacement
/// conversion; the translation terms are kept so the string round-trips.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
    pub m11: f64,
    pub m02: f64,
    pub m12: f64,
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self {
            m00: 1.0,
            m10: 0.0,
            m01: 0.0,
            m11: 1.0,
            m02: 0.0,
            m12: 0.0,
        }
    }

    /// Uniform scale with no rotation, e.g. the pixel size in microns.
    pub fn scale(pixel_size: f64) -> Self {
        Self {
            m00: pixel_size,
            m11: pixel_size,
            ..Self::identity()
        }
    }

    /// Parse the `_`-separated form. Singular matrices are rejected because
    /// stage-to-pixel conversion needs the inverse.
    pub fn parse(value: &str) -> Result<Self, CoordinateError> {
        let parts: Vec<f64> = value
            .split('_')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| CoordinateError::InvalidAffine(value.to_string()))?;

        if parts.len() != 6 || parts.iter().any(|v| !v.is_finite()) {
            return Err(CoordinateError::InvalidAffine(value.to_string()));
        }

        let transform = Self {
            m00: parts[0],
            m10: parts[1],
            m01: parts[2],
            m11: parts[3],
            m02: parts[4],
            m12: parts[5],
        };

        if transform.determinant().abs() < f64::EPSILON {
            return Err(CoordinateError::SingularAffine(value.to_string()));
        }

        Ok(transform)
    }

    pub fn determinant(&self) -> f64 {
        self.m00 * self.m11 - self.m01 * self.m10
    }

    /// Stage displacement for a pixel displacement.
    pub fn pixel_to_stage_delta(&self, dx: f64, dy: f64) -> (f64, f64) {
        (
            self.m00 * dx + self.m01 * dy,
            self.m10 * dx + self.m11 * dy,
        )
    }

    /// Pixel displacement for a stage displacement.
    pub fn stage_to_pixel_delta(&self, dx: f64, dy: f64) -> (f64, f64) {
        let det = self.determinant();
        (
            (self.m11 * dx - self.m01 * dy) / det,
            (-self.m10 * dx + self.m00 * dy) / det,
        )
    }
}

impl std::fmt::Display for AffineTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_{}_{}",
            self.m00, self.m10, self.m01, self.m11, self.m02, self.m12
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
