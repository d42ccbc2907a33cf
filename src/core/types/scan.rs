//! Laser scan types.

use serde::{Deserialize, Serialize};

/// Raw laser scan in polar coordinates.
///
/// A single sweep from a 2D range finder. Each measurement is a range
/// value at `angle_min + i * angle_increment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaserScan {
    /// Start angle in radians
    pub angle_min: f32,
    /// End angle in radians
    pub angle_max: f32,
    /// Angular resolution (radians between consecutive readings)
    pub angle_increment: f32,
    /// Minimum valid range in meters
    pub range_min: f32,
    /// Maximum valid range in meters
    pub range_max: f32,
    /// Range measurements in meters
    pub ranges: Vec<f32>,
}

impl LaserScan {
    /// Create a new laser scan.
    pub fn new(
        angle_min: f32,
        angle_max: f32,
        angle_increment: f32,
        range_min: f32,
        range_max: f32,
        ranges: Vec<f32>,
    ) -> Self {
        Self {
            angle_min,
            angle_max,
            angle_increment,
            range_min,
            range_max,
            ranges,
        }
    }

    /// Number of range measurements.
    #[inline]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Check if the scan has no measurements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// A laser scan together with its sensor frame and acquisition time.
///
/// This is the unit of work for the update cycle controller: the frame id
/// selects the laser registration entry and the timestamp anchors the
/// odometry lookup and the transform expiration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanMessage {
    /// Sensor frame the ranges are expressed in.
    pub frame_id: String,
    /// Acquisition time in microseconds.
    pub timestamp_us: u64,
    /// The scan itself.
    pub scan: LaserScan,
}

/// Preprocessed beam data handed to the sensor models.
///
/// Ranges have the per-laser min/max overrides applied and carry their
/// bearing in the base frame (sensor mounting yaw folded in).
#[derive(Debug, Clone)]
pub struct BeamData {
    /// (range, bearing) pairs in the base frame.
    pub beams: Vec<(f32, f32)>,
    /// Effective maximum range after overrides.
    pub range_max: f32,
    /// Sensor position in the base frame (mounting yaw is already folded
    /// into the bearings, so only the translation matters here).
    pub laser_offset: crate::core::types::Point2D,
}

impl BeamData {
    /// Number of beams.
    #[inline]
    pub fn len(&self) -> usize {
        self.beams.len()
    }

    /// Check if there are no beams.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.beams.is_empty()
    }
}
