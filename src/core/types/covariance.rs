//! Pose covariance types.

use serde::{Deserialize, Serialize};

/// 3x3 covariance matrix for 2D pose uncertainty (x, y, theta).
///
/// Stored as a row-major array: [xx, xy, xt, yx, yy, yt, tx, ty, tt]
/// where t = theta.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Covariance2D {
    /// Row-major 3x3 matrix data
    data: [f64; 9],
}

impl Covariance2D {
    /// Create a zero covariance matrix.
    #[inline]
    pub fn zero() -> Self {
        Self { data: [0.0; 9] }
    }

    /// Create a diagonal covariance matrix from variances.
    #[inline]
    pub fn diagonal(xx: f64, yy: f64, tt: f64) -> Self {
        Self {
            data: [xx, 0.0, 0.0, 0.0, yy, 0.0, 0.0, 0.0, tt],
        }
    }

    /// Create from a row-major array.
    #[inline]
    pub fn from_array(data: [f64; 9]) -> Self {
        Self { data }
    }

    /// Variance of x (element [0,0]).
    #[inline]
    pub fn var_x(&self) -> f64 {
        self.data[0]
    }

    /// Variance of y (element [1,1]).
    #[inline]
    pub fn var_y(&self) -> f64 {
        self.data[4]
    }

    /// Variance of theta (element [2,2]).
    #[inline]
    pub fn var_theta(&self) -> f64 {
        self.data[8]
    }

    /// x-y cross covariance (element [0,1]).
    #[inline]
    pub fn cov_xy(&self) -> f64 {
        self.data[1]
    }

    /// Raw data as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[f64; 9] {
        &self.data
    }

    /// Expand into a row-major 6x6 covariance (x, y, z, roll, pitch, yaw).
    ///
    /// Only the x/y block and the yaw variance are populated; everything
    /// else is zero, matching what downstream consumers expect from a
    /// planar estimator.
    pub fn to_6x6(&self) -> [f64; 36] {
        let mut out = [0.0; 36];
        for i in 0..2 {
            for j in 0..2 {
                out[6 * i + j] = self.data[3 * i + j];
            }
        }
        out[6 * 5 + 5] = self.data[8];
        out
    }

    /// Extract the planar block from a row-major 6x6 covariance.
    ///
    /// Used when an externally supplied initial pose arrives with a full
    /// 6-DOF covariance; only x/y and yaw terms are meaningful here.
    pub fn from_6x6(cov: &[f64; 36]) -> Self {
        let mut data = [0.0; 9];
        for i in 0..2 {
            for j in 0..2 {
                data[3 * i + j] = cov[6 * i + j];
            }
        }
        data[8] = cov[6 * 5 + 5];
        Self { data }
    }
}

impl Default for Covariance2D {
    fn default() -> Self {
        Self::zero()
    }
}
