//! Scan-driven localization engine.
//!
//! Ties the filter to the outside world: laser registration, odometry
//! lookups through the transform seam, update gating, and guarded pose
//! output.

mod lasers;
mod localizer;
mod publisher;
mod transform;

pub use lasers::{LaserEntry, LaserRegistry};
pub use localizer::{CycleOutcome, Localizer, LocalizerError, MapOdomCorrection};
pub use publisher::{PoseEstimate, PosePublisher};
pub use transform::{TransformError, TransformProvider};
