//! Adaptive particle filter core.
//!
//! Double-buffered sample sets with KLD-adaptive resampling and
//! augmented-MCL recovery. The filter owns the belief but none of the
//! models: the motion and sensor models are passed in per step, and all
//! randomness flows through an injected RNG so a seeded run is exactly
//! reproducible.

pub mod cluster;
pub mod kld;
pub mod motion_model;
pub mod sensor_model;

pub use cluster::{extract, set_statistics, ClusterParams, Hypothesis};
pub use motion_model::{MotionModel, MotionNoise, OdomDelta};
pub use sensor_model::SensorModel;

use crate::config::LocalizerConfig;
use crate::core::types::{Covariance2D, Pose2D};
use crate::map::OccupancyMap;
use kld::{resample_limit, BinHistogram};
use rand::Rng;
use rand_distr::StandardNormal;

/// One weighted pose hypothesis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    /// Hypothesized robot pose in the map frame.
    pub pose: Pose2D,
    /// Unnormalized or normalized weight, depending on filter phase.
    pub weight: f64,
}

impl Particle {
    /// Particle with unit weight.
    pub fn new(pose: Pose2D) -> Self {
        Self { pose, weight: 1.0 }
    }
}

/// Adaptive Monte Carlo particle filter.
///
/// Two sample sets are kept and resampling writes from the active one
/// into the other, then flips; nothing outside the filter ever holds an
/// index into a set across a resample.
#[derive(Debug, Clone)]
pub struct ParticleFilter {
    sets: [Vec<Particle>; 2],
    current: usize,
    min_particles: usize,
    max_particles: usize,
    kld_err: f64,
    kld_z: f64,
    alpha_slow: f64,
    alpha_fast: f64,
    w_slow: f64,
    w_fast: f64,
    converged: bool,
    converged_distance: f64,
    histogram: BinHistogram,
}

impl ParticleFilter {
    /// Filter shell with no particles; call one of the `init_*` methods
    /// before stepping it.
    pub fn new(config: &LocalizerConfig) -> Self {
        Self {
            sets: [
                Vec::with_capacity(config.max_particles),
                Vec::with_capacity(config.max_particles),
            ],
            current: 0,
            min_particles: config.min_particles,
            max_particles: config.max_particles,
            kld_err: config.pf_err,
            kld_z: config.pf_z,
            alpha_slow: config.recovery_alpha_slow,
            alpha_fast: config.recovery_alpha_fast,
            w_slow: 0.0,
            w_fast: 0.0,
            converged: false,
            converged_distance: config.converged_distance,
            histogram: BinHistogram::new(config.bin_size_xy, config.bin_size_theta),
        }
    }

    /// Active sample set.
    pub fn particles(&self) -> &[Particle] {
        &self.sets[self.current]
    }

    /// Mutable active sample set, for the sensor model's weight update.
    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.sets[self.current]
    }

    /// Number of particles in the active set.
    pub fn len(&self) -> usize {
        self.sets[self.current].len()
    }

    /// True before any initialization.
    pub fn is_empty(&self) -> bool {
        self.sets[self.current].is_empty()
    }

    /// Slow/fast weight averages driving random-particle injection.
    pub fn recovery_averages(&self) -> (f64, f64) {
        (self.w_slow, self.w_fast)
    }

    /// Whether the last update left every particle within the convergence
    /// distance of the population mean.
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Concentrate the belief around a known pose.
    ///
    /// Draws the full population from independent Gaussians with the
    /// covariance's diagonal; cross terms are ignored, which matches how
    /// initial poses are specified in practice.
    pub fn init_gaussian<R: Rng>(&mut self, mean: &Pose2D, cov: &Covariance2D, rng: &mut R) {
        let sx = cov.var_x().max(0.0).sqrt() as f32;
        let sy = cov.var_y().max(0.0).sqrt() as f32;
        let st = cov.var_theta().max(0.0).sqrt() as f32;

        let set = &mut self.sets[self.current];
        set.clear();
        let weight = 1.0 / self.max_particles as f64;
        for _ in 0..self.max_particles {
            let nx: f32 = rng.sample(StandardNormal);
            let ny: f32 = rng.sample(StandardNormal);
            let nt: f32 = rng.sample(StandardNormal);
            set.push(Particle {
                pose: Pose2D::new(mean.x + nx * sx, mean.y + ny * sy, mean.theta + nt * st),
                weight,
            });
        }

        self.w_slow = 0.0;
        self.w_fast = 0.0;
        self.converged = false;
    }

    /// Spread the belief uniformly over the map's free space.
    ///
    /// A map with no free cells leaves the filter empty; the caller
    /// treats that as a failed (re)initialization.
    pub fn init_uniform<R: Rng>(&mut self, map: &OccupancyMap, rng: &mut R) {
        let set = &mut self.sets[self.current];
        set.clear();
        let weight = 1.0 / self.max_particles as f64;
        for _ in 0..self.max_particles {
            match map.random_free_pose(rng) {
                Some(pose) => set.push(Particle { pose, weight }),
                None => break,
            }
        }

        self.w_slow = 0.0;
        self.w_fast = 0.0;
        self.converged = false;
    }

    /// Prediction step: propagate every particle through the motion model.
    pub fn predict<R: Rng>(&mut self, model: &MotionModel, odom: &OdomDelta, rng: &mut R) {
        for particle in self.sets[self.current].iter_mut() {
            particle.pose = model.sample(&particle.pose, odom, rng);
        }
    }

    /// Fold a finished sensor update into the belief.
    ///
    /// `total` is the summed weight the sensor model returned. Weights are
    /// normalized to sum to one and the slow/fast averages of augmented
    /// MCL are advanced. A non-positive total (belief fully inconsistent
    /// with the scan) falls back to uniform weights.
    pub fn integrate_measurement(&mut self, total: f64) {
        let n = self.sets[self.current].len();
        if n == 0 {
            return;
        }

        if total > 0.0 {
            for particle in self.sets[self.current].iter_mut() {
                particle.weight /= total;
            }

            let w_avg = total / n as f64;
            if self.w_slow == 0.0 {
                self.w_slow = w_avg;
            } else {
                self.w_slow += self.alpha_slow * (w_avg - self.w_slow);
            }
            if self.w_fast == 0.0 {
                self.w_fast = w_avg;
            } else {
                self.w_fast += self.alpha_fast * (w_avg - self.w_fast);
            }
        } else {
            log::warn!("sensor update produced zero total weight, resetting to uniform");
            let uniform = 1.0 / n as f64;
            for particle in self.sets[self.current].iter_mut() {
                particle.weight = uniform;
            }
        }

        self.update_converged();
    }

    /// Refresh the convergence flag from the active set.
    fn update_converged(&mut self) {
        let set = &self.sets[self.current];
        if set.is_empty() {
            self.converged = false;
            return;
        }

        let n = set.len() as f32;
        let mean_x = set.iter().map(|p| p.pose.x).sum::<f32>() / n;
        let mean_y = set.iter().map(|p| p.pose.y).sum::<f32>() / n;

        let threshold = self.converged_distance as f32;
        self.converged = set.iter().all(|p| {
            (p.pose.x - mean_x).abs() <= threshold && (p.pose.y - mean_y).abs() <= threshold
        });
    }

    /// Fraction of draws replaced by random free-space poses this cycle.
    fn injection_ratio(&self) -> f64 {
        if self.alpha_slow <= 0.0 || self.alpha_fast <= 0.0 || self.w_slow <= 0.0 {
            return 0.0;
        }
        (1.0 - self.w_fast / self.w_slow).max(0.0)
    }

    /// Resampling step: low-variance draws with KLD-adaptive early stop
    /// and augmented-MCL random injection.
    ///
    /// Writes into the inactive set and flips. The new population carries
    /// uniform weights; its size lands between the configured minimum and
    /// maximum, shrunk toward the KLD bound when the belief is compact.
    pub fn resample<R: Rng>(&mut self, map: &OccupancyMap, rng: &mut R) {
        let n = self.sets[self.current].len();
        if n == 0 {
            return;
        }

        let w_diff = self.injection_ratio();
        if w_diff > 0.0 {
            log::info!("injecting random particles, ratio {:.3}", w_diff);
        }

        // Cumulative weight ladder over the source set.
        let mut cumulative = Vec::with_capacity(n);
        let mut running = 0.0f64;
        for particle in &self.sets[self.current] {
            running += particle.weight;
            cumulative.push(running);
        }
        let total = running.max(f64::MIN_POSITIVE);

        self.histogram.clear();
        let next = 1 - self.current;
        self.sets[next].clear();

        // Single random offset, then equally spaced draws; stepping by the
        // maximum population keeps the draw sequence valid however early
        // the KLD bound lets us stop.
        let step = total / self.max_particles as f64;
        let mut position = rng.gen_range(0.0..step);
        let mut source = 0usize;
        let mut limit = self.max_particles;

        while self.sets[next].len() < self.max_particles {
            let pose = if w_diff > 0.0 && rng.gen::<f64>() < w_diff {
                match map.random_free_pose(rng) {
                    Some(pose) => pose,
                    None => self.draw_at(&cumulative, &mut source, position),
                }
            } else {
                self.draw_at(&cumulative, &mut source, position)
            };
            position += step;

            if self.histogram.insert(&pose) {
                limit = resample_limit(
                    self.histogram.occupied_bins(),
                    self.kld_err,
                    self.kld_z,
                    self.max_particles,
                );
            }
            self.sets[next].push(Particle::new(pose));

            let count = self.sets[next].len();
            if count >= self.min_particles && count >= limit {
                break;
            }
        }

        let uniform = 1.0 / self.sets[next].len() as f64;
        for particle in self.sets[next].iter_mut() {
            particle.weight = uniform;
        }

        // Injection means the belief was failing to track; forget the
        // averages so recovery does not keep firing on stale evidence.
        if w_diff > 0.0 {
            self.w_slow = 0.0;
            self.w_fast = 0.0;
        }

        self.current = next;
        self.update_converged();
    }

    /// Source pose for a low-variance draw position.
    fn draw_at(&self, cumulative: &[f64], source: &mut usize, position: f64) -> Pose2D {
        while *source + 1 < cumulative.len() && cumulative[*source] < position {
            *source += 1;
        }
        self.sets[self.current][*source].pose
    }
}
