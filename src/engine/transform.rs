//! Frame transform seam.
//!
//! The update cycle needs two lookups: the odometric pose of the base at
//! scan time, and the static mounting pose of a laser on the base. Both
//! come through a trait so the engine can run against a real transform
//! tree or a scripted one in tests.

use crate::core::types::Pose2D;
use thiserror::Error;

/// Errors from transform lookups.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The requested frame is not in the transform tree.
    #[error("frame '{0}' is not known")]
    UnknownFrame(String),

    /// The tree has the frame but no data covering the requested time.
    #[error("transform for '{frame}' unavailable at t={timestamp_us}us")]
    Unavailable {
        /// Frame whose transform was requested.
        frame: String,
        /// Requested lookup time in microseconds.
        timestamp_us: u64,
    },
}

/// Source of frame transforms.
pub trait TransformProvider {
    /// Pose of the robot base in the odometry frame at the given time.
    fn odom_pose(&self, timestamp_us: u64) -> Result<Pose2D, TransformError>;

    /// Static mounting pose of a sensor frame relative to the base.
    fn sensor_pose(&self, frame_id: &str) -> Result<Pose2D, TransformError>;
}
