//! Core foundation layer.
//!
//! Bottom layer of the localization stack with no internal dependencies.
//!
//! # Contents
//!
//! - [`types`]: Core data types (poses, covariances, scans)
//! - [`math`]: Mathematical primitives (angle normalization, differences)

pub mod math;
pub mod types;
