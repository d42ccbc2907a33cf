//! Core data types for localization.
//!
//! - [`Point2D`]: 2D point in meters
//! - [`Pose2D`]: Robot pose (x, y, theta) in meters and radians
//! - [`Covariance2D`]: 3x3 covariance matrix for pose uncertainty
//! - [`LaserScan`] / [`ScanMessage`]: Range-finder input
//! - [`BeamData`]: Preprocessed beams handed to the sensor models

mod covariance;
mod pose;
mod scan;

pub use covariance::Covariance2D;
pub use pose::{Point2D, Pose2D};
pub use scan::{BeamData, LaserScan, ScanMessage};
