//! Localizer configuration.
//!
//! One flat config struct covering the motion model, the sensor model,
//! the particle population, and the update cycle controller. Defaults
//! follow the values that ship with the reference indoor setups.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while interpreting configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The motion model name does not match a known variant.
    #[error("unknown motion model '{0}' (expected 'differential' or 'omnidirectional')")]
    UnknownMotionModel(String),

    /// The sensor model name does not match a known variant.
    #[error(
        "unknown sensor model '{0}' (expected 'beam', 'likelihood_field' \
         or 'likelihood_field_prob')"
    )]
    UnknownSensorModel(String),
}

/// Known motion model variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MotionModelKind {
    /// Differential drive (rot1 / trans / rot2 decomposition).
    #[default]
    Differential,
    /// Omnidirectional base with strafe noise.
    Omnidirectional,
}

impl FromStr for MotionModelKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "differential" => Ok(MotionModelKind::Differential),
            "omnidirectional" | "omni" => Ok(MotionModelKind::Omnidirectional),
            other => Err(ConfigError::UnknownMotionModel(other.to_string())),
        }
    }
}

/// Known sensor model variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SensorModelKind {
    /// Per-beam mixture model with ray casting.
    Beam,
    /// Precomputed distance-field lookup.
    #[default]
    LikelihoodField,
    /// Likelihood field with probabilistic beam skipping.
    LikelihoodFieldProb,
}

impl FromStr for SensorModelKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beam" => Ok(SensorModelKind::Beam),
            "likelihood_field" => Ok(SensorModelKind::LikelihoodField),
            "likelihood_field_prob" => Ok(SensorModelKind::LikelihoodFieldProb),
            other => Err(ConfigError::UnknownSensorModel(other.to_string())),
        }
    }
}

/// Full localizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizerConfig {
    /// Rotation noise from rotation (rad/rad). Typical: 0.1-0.3.
    pub alpha1: f64,
    /// Rotation noise from translation (rad/m).
    pub alpha2: f64,
    /// Translation noise from translation (m/m).
    pub alpha3: f64,
    /// Translation noise from rotation (m/rad).
    pub alpha4: f64,
    /// Strafe noise, only used by the omnidirectional model.
    pub alpha5: f64,

    /// Which motion model variant to build.
    pub motion_model: MotionModelKind,
    /// Which sensor model variant to build.
    pub sensor_model: SensorModelKind,

    /// Mixture weight for the correct-range hit component.
    pub z_hit: f64,
    /// Mixture weight for unexpectedly short readings (beam model only).
    pub z_short: f64,
    /// Mixture weight for max-range readings (beam model only).
    pub z_max: f64,
    /// Mixture weight for uniformly random readings.
    pub z_rand: f64,
    /// Standard deviation of the hit component in meters.
    pub sigma_hit: f64,
    /// Decay rate of the short-reading exponential (beam model only).
    pub lambda_short: f64,
    /// Clamp distance for the likelihood field in meters.
    pub likelihood_max_dist: f64,

    /// Cap on beams evaluated per scan; larger scans are subsampled evenly.
    pub max_beams: usize,
    /// Override for the sensor's minimum range; negative = use the scan's.
    pub laser_min_range: f64,
    /// Override for the sensor's maximum range; negative = use the scan's.
    pub laser_max_range: f64,

    /// Enable probabilistic beam skipping (likelihood_field_prob only).
    pub do_beamskip: bool,
    /// A beam is "surprising" when its endpoint is further than this from
    /// any obstacle, in meters.
    pub beam_skip_distance: f64,
    /// Skip a beam when this fraction of particles finds it surprising.
    pub beam_skip_threshold: f64,
    /// When more than this fraction of beams would be skipped, integrate
    /// everything anyway (the pose estimate is probably bad).
    pub beam_skip_error_threshold: f64,

    /// Lower bound on the particle population.
    pub min_particles: usize,
    /// Upper bound on the particle population.
    pub max_particles: usize,
    /// KLD sampling error bound. Typical: 0.05.
    pub pf_err: f64,
    /// Upper standard normal quantile for the KLD bound.
    pub pf_z: f64,
    /// Exponential decay for the slow weight average (augmented MCL).
    /// 0 disables random-particle injection.
    pub recovery_alpha_slow: f64,
    /// Exponential decay for the fast weight average (augmented MCL).
    pub recovery_alpha_fast: f64,
    /// Resample every N filter updates.
    pub resample_interval: u32,
    /// The belief counts as converged when every particle lies within
    /// this distance of the population mean, in meters. Diagnostic only.
    pub converged_distance: f64,

    /// Translation threshold before a filter update, in meters.
    pub update_min_d: f64,
    /// Rotation threshold before a filter update, in radians.
    pub update_min_a: f64,

    /// Validity horizon added to the map->odom correction, in seconds.
    pub transform_tolerance: f64,
    /// Whether to emit the map->odom correction at all.
    pub tf_broadcast: bool,

    /// Global (map) frame id.
    pub global_frame_id: String,
    /// Odometry frame id.
    pub odom_frame_id: String,
    /// Robot base frame id.
    pub base_frame_id: String,

    /// KLD histogram / cluster bin size along x and y, in meters.
    pub bin_size_xy: f64,
    /// KLD histogram / cluster bin size along theta, in radians.
    pub bin_size_theta: f64,

    /// RNG seed; 0 draws from entropy, anything else is deterministic.
    pub seed: u64,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            alpha1: 0.2,
            alpha2: 0.2,
            alpha3: 0.2,
            alpha4: 0.2,
            alpha5: 0.2,
            motion_model: MotionModelKind::Differential,
            sensor_model: SensorModelKind::LikelihoodField,
            z_hit: 0.5,
            z_short: 0.05,
            z_max: 0.05,
            z_rand: 0.5,
            sigma_hit: 0.2,
            lambda_short: 0.1,
            likelihood_max_dist: 2.0,
            max_beams: 60,
            laser_min_range: -1.0,
            laser_max_range: 100.0,
            do_beamskip: false,
            beam_skip_distance: 0.5,
            beam_skip_threshold: 0.3,
            beam_skip_error_threshold: 0.9,
            min_particles: 500,
            max_particles: 2000,
            pf_err: 0.05,
            pf_z: 0.99,
            recovery_alpha_slow: 0.0,
            recovery_alpha_fast: 0.0,
            resample_interval: 1,
            converged_distance: 0.5,
            update_min_d: 0.25,
            update_min_a: 0.2,
            transform_tolerance: 1.0,
            tf_broadcast: true,
            global_frame_id: "map".to_string(),
            odom_frame_id: "odom".to_string(),
            base_frame_id: "base_footprint".to_string(),
            bin_size_xy: 0.5,
            bin_size_theta: 10.0f64.to_radians(),
            seed: 0,
        }
    }
}

impl LocalizerConfig {
    /// Semantic checks, applied once at construction.
    ///
    /// An inverted particle range is corrected rather than rejected: the
    /// filter can still run, just without room to adapt.
    pub fn validate(&mut self) {
        if self.min_particles > self.max_particles {
            log::warn!(
                "min_particles ({}) is greater than max_particles ({}); \
                 raising max_particles to match",
                self.min_particles,
                self.max_particles
            );
            self.max_particles = self.min_particles;
        }
    }
}
