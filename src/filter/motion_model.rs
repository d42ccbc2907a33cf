//! Odometry motion models for the prediction step.
//!
//! Implements the sampling motion models from Probabilistic Robotics
//! (Thrun et al.). Motion is decomposed into an initial rotation, a
//! translation, and a final rotation; each component picks up noise
//! scaled by the alpha coefficients.
//!
//! The variants form a closed set dispatched by pattern match. Sampling
//! is a pure function of the inputs and the injected RNG, so particle
//! propagation stays deterministic under a fixed seed.

use crate::config::{LocalizerConfig, MotionModelKind};
use crate::core::math::{angle_diff, normalize_angle};
use crate::core::types::Pose2D;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Noise coefficients shared by both model variants.
///
/// - `alpha1`: rotation noise from rotation (rad/rad)
/// - `alpha2`: rotation noise from translation (rad/m)
/// - `alpha3`: translation noise from translation (m/m)
/// - `alpha4`: translation noise from rotation (m/rad)
/// - `alpha5`: strafe noise, omnidirectional only
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionNoise {
    /// Rotation noise from rotation.
    pub alpha1: f32,
    /// Rotation noise from translation.
    pub alpha2: f32,
    /// Translation noise from translation.
    pub alpha3: f32,
    /// Translation noise from rotation.
    pub alpha4: f32,
    /// Strafe noise (omnidirectional only).
    pub alpha5: f32,
}

impl Default for MotionNoise {
    fn default() -> Self {
        Self {
            alpha1: 0.2,
            alpha2: 0.2,
            alpha3: 0.2,
            alpha4: 0.2,
            alpha5: 0.2,
        }
    }
}

/// Odometric pose change between two filter updates.
///
/// The delta is the raw difference of odometry poses (angles wrapped).
/// `heading_old` is the odometric heading before the motion; the
/// rot1/trans/rot2 decomposition needs it to separate "turn toward the
/// target" from "turn at the target".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdomDelta {
    /// Pose change in the odometry frame.
    pub delta: Pose2D,
    /// Odometric heading before the motion.
    pub heading_old: f32,
}

impl OdomDelta {
    /// Compute the delta between two odometry poses.
    pub fn between(old: &Pose2D, new: &Pose2D) -> Self {
        Self {
            delta: Pose2D::new(new.x - old.x, new.y - old.y, angle_diff(old.theta, new.theta)),
            heading_old: old.theta,
        }
    }

    /// Zero displacement at the given heading.
    pub fn zero(heading: f32) -> Self {
        Self {
            delta: Pose2D::identity(),
            heading_old: heading,
        }
    }

    /// Translation magnitude in meters.
    #[inline]
    pub fn translation(&self) -> f32 {
        (self.delta.x * self.delta.x + self.delta.y * self.delta.y).sqrt()
    }
}

/// Closed set of odometry motion models.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MotionModel {
    /// Differential drive: rot1 / trans / rot2.
    Differential(MotionNoise),
    /// Omnidirectional base: adds strafe noise through alpha4/alpha5.
    Omnidirectional(MotionNoise),
}

impl MotionModel {
    /// Build the model selected by the configuration.
    pub fn from_config(config: &LocalizerConfig) -> Self {
        let noise = MotionNoise {
            alpha1: config.alpha1 as f32,
            alpha2: config.alpha2 as f32,
            alpha3: config.alpha3 as f32,
            alpha4: config.alpha4 as f32,
            alpha5: config.alpha5 as f32,
        };
        match config.motion_model {
            MotionModelKind::Differential => MotionModel::Differential(noise),
            MotionModelKind::Omnidirectional => MotionModel::Omnidirectional(noise),
        }
    }

    /// Sample a new pose for one particle given the odometric delta.
    pub fn sample<R: Rng>(&self, pose: &Pose2D, odom: &OdomDelta, rng: &mut R) -> Pose2D {
        match self {
            MotionModel::Differential(noise) => sample_differential(noise, pose, odom, rng),
            MotionModel::Omnidirectional(noise) => sample_omni(noise, pose, odom, rng),
        }
    }
}

/// Zero-mean Gaussian draw with the given standard deviation.
#[inline]
fn gaussian<R: Rng>(rng: &mut R, sigma: f32) -> f32 {
    if sigma <= 0.0 {
        return 0.0;
    }
    let n: f32 = rng.sample(StandardNormal);
    n * sigma
}

fn sample_differential<R: Rng>(
    noise: &MotionNoise,
    pose: &Pose2D,
    odom: &OdomDelta,
    rng: &mut R,
) -> Pose2D {
    let trans = odom.translation();

    // Avoid computing a bearing out of numerical noise when the robot is
    // effectively rotating in place.
    let rot1 = if trans < 0.01 {
        0.0
    } else {
        angle_diff(odom.heading_old, odom.delta.y.atan2(odom.delta.x))
    };
    let rot2 = angle_diff(rot1, odom.delta.theta);

    // Treat backward motion as forward motion with flipped rotations so a
    // reversing robot does not accrue a full pi of rotation noise.
    let rot1_noise = angle_diff(rot1, 0.0)
        .abs()
        .min(angle_diff(rot1, std::f32::consts::PI).abs());
    let rot2_noise = angle_diff(rot2, 0.0)
        .abs()
        .min(angle_diff(rot2, std::f32::consts::PI).abs());

    let sigma_rot1 =
        (noise.alpha1 * rot1_noise * rot1_noise + noise.alpha2 * trans * trans).sqrt();
    let sigma_trans = (noise.alpha3 * trans * trans
        + noise.alpha4 * rot1_noise * rot1_noise
        + noise.alpha4 * rot2_noise * rot2_noise)
        .sqrt();
    let sigma_rot2 =
        (noise.alpha1 * rot2_noise * rot2_noise + noise.alpha2 * trans * trans).sqrt();

    let rot1_hat = angle_diff(gaussian(rng, sigma_rot1), rot1);
    let trans_hat = trans - gaussian(rng, sigma_trans);
    let rot2_hat = angle_diff(gaussian(rng, sigma_rot2), rot2);

    Pose2D::new(
        pose.x + trans_hat * (pose.theta + rot1_hat).cos(),
        pose.y + trans_hat * (pose.theta + rot1_hat).sin(),
        pose.theta + rot1_hat + rot2_hat,
    )
}

fn sample_omni<R: Rng>(
    noise: &MotionNoise,
    pose: &Pose2D,
    odom: &OdomDelta,
    rng: &mut R,
) -> Pose2D {
    let trans = odom.translation();
    let rot = odom.delta.theta;
    let bearing = angle_diff(odom.heading_old, odom.delta.y.atan2(odom.delta.x));

    let trans_hat =
        trans - gaussian(rng, (noise.alpha3 * trans * trans + noise.alpha1 * rot * rot).sqrt());
    let rot_hat =
        rot - gaussian(rng, (noise.alpha1 * rot * rot + noise.alpha2 * trans * trans).sqrt());
    let strafe_hat =
        gaussian(rng, (noise.alpha4 * rot * rot + noise.alpha5 * trans * trans).sqrt());

    let heading = normalize_angle(pose.theta + bearing);
    let (sin_h, cos_h) = heading.sin_cos();

    Pose2D::new(
        pose.x + trans_hat * cos_h - strafe_hat * sin_h,
        pose.y + trans_hat * sin_h + strafe_hat * cos_h,
        pose.theta + rot_hat,
    )
}
