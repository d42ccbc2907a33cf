//! Likelihood-field sensor models.
//!
//! Instead of ray casting, these models project each beam endpoint into
//! the map and look up the precomputed distance to the nearest obstacle.
//! The plain variant scores every beam; the probabilistic variant first
//! takes a vote across particles and skips beams that most of the belief
//! finds surprising, which keeps people and furniture that are absent
//! from the map from dragging the estimate around.

use crate::core::types::BeamData;
use crate::filter::Particle;

use super::beam::sensor_origin;
use super::distance_field::DistanceField;

/// Shared likelihood-field parameters.
#[derive(Debug, Clone, Copy)]
pub struct FieldParams {
    /// Weight of the hit Gaussian.
    pub z_hit: f64,
    /// Weight of the uniform noise floor.
    pub z_rand: f64,
    /// Standard deviation of the hit Gaussian in meters.
    pub sigma_hit: f64,
}

impl FieldParams {
    /// Mixture probability for one endpoint distance.
    #[inline]
    fn pz(&self, dist: f64, range_max: f64) -> f64 {
        let hit = (-(dist * dist) / (2.0 * self.sigma_hit * self.sigma_hit)).exp();
        self.z_hit * hit + self.z_rand / range_max
    }
}

/// Plain likelihood-field model.
#[derive(Debug, Clone)]
pub struct LikelihoodFieldModel {
    /// Mixture parameters.
    pub params: FieldParams,
    /// Distance-to-obstacle lookup.
    pub field: DistanceField,
}

impl LikelihoodFieldModel {
    /// Reweight every particle; returns the total weight afterwards.
    ///
    /// Beams at or beyond max range carry no endpoint information and are
    /// skipped. A scan with no usable beams leaves all weights untouched.
    pub fn update_weights(&self, data: &BeamData, particles: &mut [Particle]) -> f64 {
        let range_max = data.range_max as f64;
        let mut total = 0.0;

        for particle in particles.iter_mut() {
            let sensor = sensor_origin(&particle.pose, data);
            let mut p = 1.0f64;

            for &(obs_range, bearing) in &data.beams {
                if obs_range >= data.range_max {
                    continue;
                }
                let world_bearing = particle.pose.theta + bearing;
                let ex = sensor.x + obs_range * world_bearing.cos();
                let ey = sensor.y + obs_range * world_bearing.sin();
                let dist = self.field.distance_at(ex, ey) as f64;

                let pz = self.params.pz(dist, range_max);
                p += pz * pz * pz;
            }

            particle.weight *= p;
            total += particle.weight;
        }

        total
    }
}

/// Likelihood-field model with probabilistic beam skipping.
#[derive(Debug, Clone)]
pub struct LikelihoodFieldProbModel {
    /// Mixture parameters.
    pub params: FieldParams,
    /// Distance-to-obstacle lookup.
    pub field: DistanceField,
    /// Master switch; when off the model scores like the plain variant.
    pub do_beamskip: bool,
    /// Endpoint distance beyond which a beam counts as surprising, meters.
    pub beam_skip_distance: f64,
    /// Fraction of particles that must be surprised to skip a beam.
    pub beam_skip_threshold: f64,
    /// When more than this fraction of beams would be skipped, the pose
    /// estimate itself is suspect and every beam is integrated instead.
    pub beam_skip_error_threshold: f64,
}

impl LikelihoodFieldProbModel {
    /// Reweight every particle; returns the total weight afterwards.
    ///
    /// Two passes: the first votes per beam on whether its endpoint is far
    /// from any obstacle under each particle, the second scores only the
    /// beams that survived the vote.
    pub fn update_weights(&self, data: &BeamData, particles: &mut [Particle]) -> f64 {
        let usable: Vec<usize> = data
            .beams
            .iter()
            .enumerate()
            .filter(|(_, &(r, _))| r < data.range_max)
            .map(|(i, _)| i)
            .collect();

        if usable.is_empty() || particles.is_empty() {
            return particles.iter().map(|p| p.weight).sum();
        }

        if !self.do_beamskip {
            return self.score(data, particles, &usable, None);
        }

        // First pass: per-beam surprise counts across the particle set.
        let mut surprise_counts = vec![0usize; data.beams.len()];
        for particle in particles.iter() {
            let sensor = sensor_origin(&particle.pose, data);
            for &i in &usable {
                let (obs_range, bearing) = data.beams[i];
                let world_bearing = particle.pose.theta + bearing;
                let ex = sensor.x + obs_range * world_bearing.cos();
                let ey = sensor.y + obs_range * world_bearing.sin();
                if self.field.distance_at(ex, ey) as f64 > self.beam_skip_distance {
                    surprise_counts[i] += 1;
                }
            }
        }

        let vote_cutoff = (self.beam_skip_threshold * particles.len() as f64).ceil() as usize;
        let skipped: Vec<bool> = surprise_counts
            .iter()
            .map(|&c| c >= vote_cutoff.max(1))
            .collect();
        let skip_count = usable.iter().filter(|&&i| skipped[i]).count();

        // Too many skipped beams means the belief disagrees with the map
        // wholesale; skipping would only entrench the bad estimate.
        let skip_fraction = skip_count as f64 / usable.len() as f64;
        let apply_skip = skip_fraction <= self.beam_skip_error_threshold;
        if !apply_skip && skip_count > 0 {
            log::warn!(
                "beam skipping disabled this cycle: {:.0}% of beams were surprising, \
                 integrating all of them",
                skip_fraction * 100.0
            );
        }

        let skip_mask = if apply_skip { Some(skipped.as_slice()) } else { None };
        self.score(data, particles, &usable, skip_mask)
    }

    /// Second pass: integrate the surviving beams into particle weights.
    fn score(
        &self,
        data: &BeamData,
        particles: &mut [Particle],
        usable: &[usize],
        skip_mask: Option<&[bool]>,
    ) -> f64 {
        let range_max = data.range_max as f64;
        let mut total = 0.0;

        for particle in particles.iter_mut() {
            let sensor = sensor_origin(&particle.pose, data);
            let mut p = 1.0f64;

            for &i in usable {
                if skip_mask.map_or(false, |mask| mask[i]) {
                    continue;
                }
                let (obs_range, bearing) = data.beams[i];
                let world_bearing = particle.pose.theta + bearing;
                let ex = sensor.x + obs_range * world_bearing.cos();
                let ey = sensor.y + obs_range * world_bearing.sin();
                let dist = self.field.distance_at(ex, ey) as f64;

                let pz = self.params.pz(dist, range_max);
                p += pz * pz * pz;
            }

            particle.weight *= p;
            total += particle.weight;
        }

        total
    }
}
