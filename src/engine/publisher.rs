//! Pose estimate publishing with a NaN guard.
//!
//! A localization consumer downstream treats a published pose as ground
//! truth for planning, so an estimate carrying NaN anywhere in the pose
//! or covariance must never leave the engine. The guard drops the bad
//! estimate and keeps the previous one in place.

use crate::core::types::{Covariance2D, Pose2D};

/// A stamped pose estimate with full 6x6 covariance (row-major).
///
/// Only the planar block and the yaw entry are populated; the layout
/// matches what downstream consumers of 3D pose messages expect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseEstimate {
    /// Scan timestamp the estimate corresponds to, microseconds.
    pub timestamp_us: u64,
    /// Estimated pose in the map frame.
    pub pose: Pose2D,
    /// Row-major 6x6 covariance.
    pub covariance: [f64; 36],
}

/// Gatekeeper for outgoing pose estimates.
#[derive(Debug, Clone, Default)]
pub struct PosePublisher {
    last: Option<PoseEstimate>,
}

impl PosePublisher {
    /// Publisher with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and record an estimate.
    ///
    /// Returns `None` (and logs) when the pose or any covariance entry is
    /// not finite; the last good estimate is kept untouched.
    pub fn publish(
        &mut self,
        timestamp_us: u64,
        pose: &Pose2D,
        covariance: &Covariance2D,
    ) -> Option<PoseEstimate> {
        let cov6 = covariance.to_6x6();

        let finite = pose.x.is_finite()
            && pose.y.is_finite()
            && pose.theta.is_finite()
            && cov6.iter().all(|v| v.is_finite());
        if !finite {
            log::warn!(
                "refusing to publish pose with non-finite values: ({}, {}, {})",
                pose.x,
                pose.y,
                pose.theta
            );
            return None;
        }

        let estimate = PoseEstimate {
            timestamp_us,
            pose: *pose,
            covariance: cov6,
        };
        self.last = Some(estimate);
        Some(estimate)
    }

    /// Most recent estimate that passed the guard.
    pub fn last(&self) -> Option<&PoseEstimate> {
        self.last.as_ref()
    }
}
