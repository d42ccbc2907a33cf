//! Beam range-finder model.
//!
//! Scores each beam against the range a perfect sensor would report from
//! the hypothesized pose, using the four-component mixture from
//! Probabilistic Robotics: a Gaussian around the expected range, an
//! exponential for unexpectedly short readings, a point mass at max
//! range, and a uniform noise floor.

use crate::core::types::{BeamData, Pose2D};
use crate::filter::Particle;
use crate::map::{calc_range, OccupancyMap};

/// Beam mixture model parameters.
#[derive(Debug, Clone, Copy)]
pub struct BeamModel {
    /// Weight of the correct-range Gaussian.
    pub z_hit: f64,
    /// Weight of the short-reading exponential.
    pub z_short: f64,
    /// Weight of the max-range point mass.
    pub z_max: f64,
    /// Weight of the uniform noise floor.
    pub z_rand: f64,
    /// Standard deviation of the hit Gaussian in meters.
    pub sigma_hit: f64,
    /// Decay rate of the short-reading exponential.
    pub lambda_short: f64,
}

impl BeamModel {
    /// Reweight every particle against the beam data.
    ///
    /// Returns the total weight after the update. Per-beam mixture
    /// probabilities are aggregated as the robust sum `p += pz^3` rather
    /// than a raw product, which underflows and lets a single outlier
    /// beam zero a particle.
    pub fn update_weights(
        &self,
        data: &BeamData,
        particles: &mut [Particle],
        map: &OccupancyMap,
    ) -> f64 {
        let mut total = 0.0;

        for particle in particles.iter_mut() {
            let sensor = sensor_origin(&particle.pose, data);
            let mut p = 1.0f64;

            for &(obs_range, bearing) in &data.beams {
                let world_bearing = particle.pose.theta + bearing;
                let expected =
                    calc_range(map, sensor.x, sensor.y, world_bearing, data.range_max) as f64;
                let obs = obs_range as f64;
                let z = obs - expected;

                let mut pz =
                    self.z_hit * (-(z * z) / (2.0 * self.sigma_hit * self.sigma_hit)).exp();
                if z < 0.0 {
                    pz += self.z_short * self.lambda_short * (-self.lambda_short * obs).exp();
                }
                if obs_range >= data.range_max {
                    pz += self.z_max;
                }
                if obs_range < data.range_max {
                    pz += self.z_rand / data.range_max as f64;
                }

                p += pz * pz * pz;
            }

            particle.weight *= p;
            total += particle.weight;
        }

        total
    }
}

/// World position of the sensor for a hypothesized base pose.
#[inline]
pub(super) fn sensor_origin(pose: &Pose2D, data: &BeamData) -> crate::core::types::Point2D {
    pose.transform_point(&data.laser_offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Point2D;
    use crate::map::GridData;

    fn corridor_map() -> OccupancyMap {
        // 4m x 1m corridor with a wall at the +X end.
        let width = 40;
        let height = 10;
        let mut values = vec![0i8; width * height];
        for j in 0..height {
            values[j * width + width - 1] = 100;
        }
        OccupancyMap::from_grid(
            &GridData {
                frame_id: "map".to_string(),
                width,
                height,
                resolution: 0.1,
                origin_x: 0.0,
                origin_y: 0.0,
                values,
            },
            "map",
        )
        .unwrap()
    }

    fn model() -> BeamModel {
        BeamModel {
            z_hit: 0.8,
            z_short: 0.05,
            z_max: 0.05,
            z_rand: 0.1,
            sigma_hit: 0.2,
            lambda_short: 0.1,
        }
    }

    fn beams(ranges: &[f32]) -> BeamData {
        BeamData {
            beams: ranges.iter().map(|&r| (r, 0.0)).collect(),
            range_max: 8.0,
            laser_offset: Point2D::new(0.0, 0.0),
        }
    }

    #[test]
    fn test_correct_range_beats_wrong_range() {
        let map = corridor_map();
        let m = model();

        // Robot at x=1.0 facing the wall at x≈3.95: expected range ≈ 2.95.
        let mut good = vec![Particle::new(Pose2D::new(1.0, 0.5, 0.0))];
        let mut bad = vec![Particle::new(Pose2D::new(2.5, 0.5, 0.0))];

        let data = beams(&[2.95]);
        m.update_weights(&data, &mut good, &map);
        m.update_weights(&data, &mut bad, &map);

        assert!(
            good[0].weight > bad[0].weight,
            "good {} vs bad {}",
            good[0].weight,
            bad[0].weight
        );
    }

    #[test]
    fn test_empty_beams_leave_weights_unchanged() {
        let map = corridor_map();
        let m = model();
        let mut particles = vec![Particle::new(Pose2D::new(1.0, 0.5, 0.0))];
        let before = particles[0].weight;

        let total = m.update_weights(&beams(&[]), &mut particles, &map);
        assert_eq!(particles[0].weight, before);
        assert_eq!(total, before);
    }

    #[test]
    fn test_max_range_reading_not_zeroed() {
        let map = corridor_map();
        let m = model();
        let mut particles = vec![Particle::new(Pose2D::new(1.0, 0.5, 0.0))];

        let total = m.update_weights(&beams(&[8.0]), &mut particles, &map);
        assert!(total > 0.0);
        assert!(particles[0].weight.is_finite());
    }
}
