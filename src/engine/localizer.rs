//! Laser-driven localization update cycle.
//!
//! The localizer owns the map, the particle filter, and both models, and
//! steps them once per incoming scan: register the laser if new, fetch
//! the odometric pose, gate on accumulated motion, predict, correct,
//! resample on schedule, then extract a pose hypothesis and the map->odom
//! correction. Everything a scan produced is returned in a `CycleOutcome`
//! so the caller decides how to ship it.

use crate::config::LocalizerConfig;
use crate::core::math::normalize_angle;
use crate::core::types::{BeamData, Covariance2D, Point2D, Pose2D, ScanMessage};
use crate::filter::{cluster, ClusterParams, MotionModel, OdomDelta, ParticleFilter, SensorModel};
use crate::map::{GridData, MapError, OccupancyMap};

use super::lasers::LaserRegistry;
use super::publisher::{PoseEstimate, PosePublisher};
use super::transform::{TransformError, TransformProvider};

use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Initial belief when no pose has been supplied: origin, half a meter of
/// positional spread and fifteen degrees of heading spread.
const DEFAULT_INIT_VAR_XY: f64 = 0.25;
const DEFAULT_INIT_VAR_THETA: f64 = (std::f64::consts::PI / 12.0) * (std::f64::consts::PI / 12.0);

/// Errors surfaced by the update cycle.
#[derive(Debug, Error)]
pub enum LocalizerError {
    /// The occupancy grid was rejected.
    #[error("map rejected: {0}")]
    Map(#[from] MapError),

    /// A new laser frame could not be resolved against the base.
    #[error("laser '{frame}' could not be registered")]
    LaserRegistration {
        /// Scan frame that failed to register.
        frame: String,
        /// Underlying transform failure.
        #[source]
        source: TransformError,
    },

    /// The odometric pose at scan time was unavailable.
    #[error("odometry pose unavailable")]
    OdomUnavailable(#[source] TransformError),

    /// The map has no free cells to draw poses from.
    #[error("map has no free space")]
    NoFreeSpace,
}

/// Map->odom frame correction with a validity horizon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapOdomCorrection {
    /// Pose of the odometry frame in the map frame.
    pub transform: Pose2D,
    /// Time after which consumers must treat the correction as stale.
    pub valid_until_us: u64,
}

/// Everything one scan produced.
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    /// Newly published pose estimate, when the filter updated and the
    /// estimate passed the output guard.
    pub pose: Option<PoseEstimate>,
    /// Fresh or rebroadcast map->odom correction.
    pub correction: Option<MapOdomCorrection>,
    /// Current particle poses; withheld until a first pose has shipped.
    pub cloud: Option<Vec<Pose2D>>,
    /// Whether this cycle resampled the particle population.
    pub resampled: bool,
}

/// Scan-driven adaptive Monte Carlo localizer.
pub struct Localizer {
    config: LocalizerConfig,
    map: OccupancyMap,
    filter: ParticleFilter,
    motion_model: MotionModel,
    sensor_model: SensorModel,
    cluster_params: ClusterParams,
    lasers: LaserRegistry,
    publisher: PosePublisher,
    rng: SmallRng,

    active: bool,
    last_odom_pose: Option<Pose2D>,
    resample_count: u32,
    force_update: bool,
    force_publication: bool,
    pending_init: Option<(Pose2D, Covariance2D)>,
    latest_correction: Option<Pose2D>,
    odom_error_count: u32,
    last_no_pose_warn: Option<Instant>,
}

impl Localizer {
    /// Build a localizer over an occupancy grid.
    ///
    /// The belief starts as a Gaussian around the map origin; callers
    /// that know better supply an initial pose or request global
    /// localization before feeding scans.
    pub fn new(config: LocalizerConfig, grid: &GridData) -> Result<Self, LocalizerError> {
        let mut config = config;
        config.validate();

        let map = OccupancyMap::from_grid(grid, &config.global_frame_id)?;
        let motion_model = MotionModel::from_config(&config);
        let sensor_model = SensorModel::from_config(&config, &map);
        let cluster_params = ClusterParams {
            bin_size_xy: config.bin_size_xy,
            bin_size_theta: config.bin_size_theta,
        };
        let mut rng = if config.seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(config.seed)
        };

        let mut filter = ParticleFilter::new(&config);
        filter.init_gaussian(
            &Pose2D::identity(),
            &Covariance2D::diagonal(DEFAULT_INIT_VAR_XY, DEFAULT_INIT_VAR_XY, DEFAULT_INIT_VAR_THETA),
            &mut rng,
        );

        Ok(Self {
            config,
            map,
            filter,
            motion_model,
            sensor_model,
            cluster_params,
            lasers: LaserRegistry::new(),
            publisher: PosePublisher::new(),
            rng,
            active: false,
            last_odom_pose: None,
            resample_count: 0,
            force_update: false,
            force_publication: false,
            pending_init: None,
            latest_correction: None,
            odom_error_count: 0,
            last_no_pose_warn: None,
        })
    }

    /// Start processing scans; applies any initial pose received while
    /// inactive.
    pub fn activate(&mut self) {
        self.active = true;
        log::info!("localizer activated");
        if let Some((pose, cov)) = self.pending_init.take() {
            self.apply_initial_pose(&pose, &cov);
        }
    }

    /// Stop processing scans. The belief is kept.
    pub fn deactivate(&mut self) {
        self.active = false;
        log::info!("localizer deactivated");
    }

    /// Whether scans are currently being processed.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Current particle poses, for introspection and tests.
    pub fn particle_poses(&self) -> Vec<Pose2D> {
        self.filter.particles().iter().map(|p| p.pose).collect()
    }

    /// Number of registered lasers.
    pub fn laser_count(&self) -> usize {
        self.lasers.len()
    }

    /// Whether the belief has collapsed to a single tight cluster.
    pub fn converged(&self) -> bool {
        self.filter.converged()
    }

    /// Pose hypotheses for the current belief, heaviest first.
    pub fn hypotheses(&self) -> Vec<crate::filter::Hypothesis> {
        cluster::extract(self.filter.particles(), &self.cluster_params)
    }

    /// Concentrate the belief around a user-supplied pose.
    ///
    /// Poses in any frame but the global one are ignored with a warning.
    /// While inactive the pose is held and applied on activation.
    pub fn set_initial_pose(&mut self, frame_id: &str, pose: &Pose2D, covariance: &Covariance2D) {
        if frame_id != self.config.global_frame_id {
            log::warn!(
                "ignoring initial pose in frame '{}'; only '{}' is accepted",
                frame_id,
                self.config.global_frame_id
            );
            return;
        }
        if !self.active {
            log::info!("initial pose received while inactive, deferring to activation");
            self.pending_init = Some((*pose, *covariance));
            return;
        }
        self.apply_initial_pose(pose, covariance);
    }

    fn apply_initial_pose(&mut self, pose: &Pose2D, covariance: &Covariance2D) {
        log::info!(
            "setting pose ({:.3}, {:.3}, {:.3})",
            pose.x,
            pose.y,
            pose.theta
        );
        self.filter.init_gaussian(pose, covariance, &mut self.rng);
        // Next scan re-anchors the odometry bookkeeping and must update.
        self.last_odom_pose = None;
        self.lasers.mark_all_stale();
        self.force_update = true;
        self.latest_correction = None;
    }

    /// Scatter the belief uniformly over the map's free space.
    pub fn request_global_localization(&mut self) -> Result<(), LocalizerError> {
        if self.map.free_cell_count() == 0 {
            return Err(LocalizerError::NoFreeSpace);
        }
        log::info!("initializing with uniform distribution over free space");
        self.filter.init_uniform(&self.map, &mut self.rng);
        self.last_odom_pose = None;
        self.lasers.mark_all_stale();
        self.force_update = true;
        self.latest_correction = None;
        Ok(())
    }

    /// Force the next scan through the filter regardless of motion.
    pub fn request_nomotion_update(&mut self) {
        self.force_update = true;
    }

    /// Process one laser scan.
    ///
    /// Returns the cycle's products; an inactive localizer returns an
    /// empty outcome without touching the belief.
    pub fn handle_scan<T: TransformProvider>(
        &mut self,
        msg: &ScanMessage,
        tf: &T,
    ) -> Result<CycleOutcome, LocalizerError> {
        let mut outcome = CycleOutcome::default();
        if !self.active {
            return Ok(outcome);
        }

        if !self.lasers.contains(&msg.frame_id) {
            let mount = tf.sensor_pose(&msg.frame_id).map_err(|source| {
                log::error!("cannot resolve laser frame '{}'", msg.frame_id);
                LocalizerError::LaserRegistration {
                    frame: msg.frame_id.clone(),
                    source,
                }
            })?;
            self.lasers.register(&msg.frame_id, &mount);
        }

        let odom_pose = match tf.odom_pose(msg.timestamp_us) {
            Ok(pose) => {
                self.odom_error_count = 0;
                pose
            }
            Err(err) => {
                self.odom_error_count += 1;
                if self.odom_error_count % 20 == 0 {
                    log::warn!(
                        "failed to get odometry pose {} times in a row: {}",
                        self.odom_error_count,
                        err
                    );
                }
                return Err(LocalizerError::OdomUnavailable(err));
            }
        };

        let (delta, moved) = match self.last_odom_pose {
            Some(prev) => {
                let delta = OdomDelta::between(&prev, &odom_pose);
                let moved = delta.translation() as f64 >= self.config.update_min_d
                    || (delta.delta.theta.abs() as f64) >= self.config.update_min_a;
                (delta, moved)
            }
            None => {
                // First scan since (re)initialization: anchor odometry,
                // run a zero-motion update, and publish off-schedule.
                self.resample_count = 0;
                self.lasers.mark_all_stale();
                self.force_publication = true;
                (OdomDelta::zero(odom_pose.theta), true)
            }
        };

        if moved || self.force_update {
            self.lasers.mark_all_stale();
        }

        let mut updated = false;
        if self.lasers.take_update(&msg.frame_id) {
            self.force_update = false;
            updated = true;

            self.filter.predict(&self.motion_model, &delta, &mut self.rng);
            self.last_odom_pose = Some(odom_pose);

            let (offset, yaw) = match self.lasers.get(&msg.frame_id) {
                Some(entry) => (entry.offset, entry.yaw),
                None => (Point2D::new(0.0, 0.0), 0.0),
            };
            let data = self.beam_data(msg, offset, yaw);
            let total =
                self.sensor_model
                    .update_weights(&data, self.filter.particles_mut(), &self.map);
            self.filter.integrate_measurement(total);

            self.resample_count += 1;
            if self.resample_count % self.config.resample_interval.max(1) == 0 {
                self.filter.resample(&self.map, &mut self.rng);
                outcome.resampled = true;
            }

            // A fresh estimate is only worth extracting when the belief
            // changed shape: after a resample, right after (re)init, or
            // while downstream still has nothing. Other update cycles fall
            // through and rebroadcast the cached correction.
            let force_publication = std::mem::take(&mut self.force_publication);
            if outcome.resampled || force_publication || self.publisher.last().is_none() {
                let hypotheses = cluster::extract(self.filter.particles(), &self.cluster_params);
                match hypotheses.first() {
                    Some(best) if best.weight > 0.0 => {
                        let (_, covariance) = cluster::set_statistics(self.filter.particles());
                        if let Some(estimate) =
                            self.publisher.publish(msg.timestamp_us, &best.mean, &covariance)
                        {
                            outcome.pose = Some(estimate);
                            self.latest_correction = Some(best.mean.compose(&odom_pose.inverse()));
                        }
                    }
                    _ => log::error!("no pose hypothesis with positive weight"),
                }
            }

            if outcome.pose.is_none() && self.publisher.last().is_none() {
                // Once per two seconds at most.
                let due = self
                    .last_no_pose_warn
                    .map_or(true, |t| t.elapsed() >= Duration::from_secs(2));
                if due {
                    log::warn!("no pose has been published yet, downstream has no estimate");
                    self.last_no_pose_warn = Some(Instant::now());
                }
            }
        }

        if self.config.tf_broadcast {
            if let Some(transform) = self.latest_correction {
                let tolerance_us = (self.config.transform_tolerance * 1e6) as u64;
                outcome.correction = Some(MapOdomCorrection {
                    transform,
                    valid_until_us: msg.timestamp_us + tolerance_us,
                });
            }
        }

        if updated && self.publisher.last().is_some() {
            outcome.cloud = Some(self.particle_poses());
        }

        Ok(outcome)
    }

    /// Subsample a scan into scored beams in the base frame.
    ///
    /// Applies the configured range overrides, maps non-finite and
    /// too-short readings to max range, and folds the laser mounting yaw
    /// into each bearing.
    fn beam_data(&self, msg: &ScanMessage, offset: Point2D, yaw: f32) -> BeamData {
        let scan = &msg.scan;

        let mut range_min = scan.range_min;
        let mut range_max = scan.range_max;
        if self.config.laser_min_range >= 0.0 {
            range_min = range_min.max(self.config.laser_min_range as f32);
        }
        if self.config.laser_max_range > 0.0 {
            range_max = range_max.min(self.config.laser_max_range as f32);
        }

        let n = scan.ranges.len();
        let step = if self.config.max_beams > 1 && n > self.config.max_beams {
            (n - 1) / (self.config.max_beams - 1)
        } else {
            1
        }
        .max(1);

        let mut beams = Vec::with_capacity(n / step + 1);
        let mut i = 0;
        while i < n {
            let mut range = scan.ranges[i];
            // Readings below the minimum usually mean "no return"; treat
            // them like max-range so the models discount them.
            if !range.is_finite() || range <= range_min {
                range = range_max;
            }
            let bearing = normalize_angle(scan.angle_min + i as f32 * scan.angle_increment + yaw);
            beams.push((range, bearing));
            i += step;
        }

        BeamData {
            beams,
            range_max,
            laser_offset: offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::LaserScan;

    struct FixedTf {
        odom: Pose2D,
    }

    impl TransformProvider for FixedTf {
        fn odom_pose(&self, _timestamp_us: u64) -> Result<Pose2D, TransformError> {
            Ok(self.odom)
        }
        fn sensor_pose(&self, _frame_id: &str) -> Result<Pose2D, TransformError> {
            Ok(Pose2D::identity())
        }
    }

    fn boxed_map() -> GridData {
        // 5m x 5m room with walls on all sides.
        let width = 50;
        let height = 50;
        let mut values = vec![0i8; width * height];
        for i in 0..width {
            values[i] = 100;
            values[(height - 1) * width + i] = 100;
        }
        for j in 0..height {
            values[j * width] = 100;
            values[j * width + width - 1] = 100;
        }
        GridData {
            frame_id: "map".to_string(),
            width,
            height,
            resolution: 0.1,
            origin_x: 0.0,
            origin_y: 0.0,
            values,
        }
    }

    fn scan_msg(timestamp_us: u64, ranges: Vec<f32>) -> ScanMessage {
        let n = ranges.len().max(2);
        ScanMessage {
            frame_id: "laser".to_string(),
            timestamp_us,
            scan: LaserScan {
                angle_min: -1.0,
                angle_max: 1.0,
                angle_increment: 2.0 / (n - 1) as f32,
                range_min: 0.1,
                range_max: 8.0,
                ranges,
            },
        }
    }

    fn test_config() -> LocalizerConfig {
        LocalizerConfig {
            min_particles: 50,
            max_particles: 300,
            seed: 11,
            ..Default::default()
        }
    }

    #[test]
    fn test_inactive_localizer_ignores_scans() {
        let mut localizer = Localizer::new(test_config(), &boxed_map()).unwrap();
        let tf = FixedTf {
            odom: Pose2D::identity(),
        };
        let outcome = localizer.handle_scan(&scan_msg(0, vec![1.0; 10]), &tf).unwrap();
        assert!(outcome.pose.is_none());
        assert!(outcome.correction.is_none());
        assert!(!outcome.resampled);
    }

    #[test]
    fn test_first_scan_updates_and_publishes() {
        let mut localizer = Localizer::new(test_config(), &boxed_map()).unwrap();
        localizer.activate();
        localizer.set_initial_pose(
            "map",
            &Pose2D::new(2.5, 2.5, 0.0),
            &Covariance2D::diagonal(0.05, 0.05, 0.02),
        );

        let tf = FixedTf {
            odom: Pose2D::identity(),
        };
        let outcome = localizer.handle_scan(&scan_msg(0, vec![2.0; 20]), &tf).unwrap();
        assert!(outcome.pose.is_some());
        assert!(outcome.correction.is_some());
        assert!(outcome.resampled);
        assert!(outcome.cloud.is_some());
    }

    #[test]
    fn test_small_motion_is_gated() {
        let mut localizer = Localizer::new(test_config(), &boxed_map()).unwrap();
        localizer.activate();
        localizer.set_initial_pose(
            "map",
            &Pose2D::new(2.5, 2.5, 0.0),
            &Covariance2D::diagonal(0.05, 0.05, 0.02),
        );

        let tf = FixedTf {
            odom: Pose2D::identity(),
        };
        localizer.handle_scan(&scan_msg(0, vec![2.0; 20]), &tf).unwrap();

        // 5cm of motion: below the 0.25m threshold.
        let tf = FixedTf {
            odom: Pose2D::new(0.05, 0.0, 0.0),
        };
        let outcome = localizer.handle_scan(&scan_msg(1_000_000, vec![2.0; 20]), &tf).unwrap();
        assert!(outcome.pose.is_none(), "gated cycle must not publish a new pose");
        assert!(!outcome.resampled);
        // The cached correction is rebroadcast with a fresh horizon.
        let correction = outcome.correction.unwrap();
        assert_eq!(correction.valid_until_us, 1_000_000 + 1_000_000);
    }

    #[test]
    fn test_forced_update_ignores_gate() {
        let mut localizer = Localizer::new(test_config(), &boxed_map()).unwrap();
        localizer.activate();
        localizer.set_initial_pose(
            "map",
            &Pose2D::new(2.5, 2.5, 0.0),
            &Covariance2D::diagonal(0.05, 0.05, 0.02),
        );

        let tf = FixedTf {
            odom: Pose2D::identity(),
        };
        localizer.handle_scan(&scan_msg(0, vec![2.0; 20]), &tf).unwrap();

        localizer.request_nomotion_update();
        let outcome = localizer.handle_scan(&scan_msg(1, vec![2.0; 20]), &tf).unwrap();
        assert!(outcome.pose.is_some());
    }

    #[test]
    fn test_nonresample_update_only_rebroadcasts() {
        let config = LocalizerConfig {
            resample_interval: 3,
            ..test_config()
        };
        let mut localizer = Localizer::new(config, &boxed_map()).unwrap();
        localizer.activate();
        localizer.set_initial_pose(
            "map",
            &Pose2D::new(2.5, 2.5, 0.0),
            &Covariance2D::diagonal(0.05, 0.05, 0.02),
        );

        let tf = FixedTf {
            odom: Pose2D::identity(),
        };
        // First scan after init publishes even off the resample schedule.
        let first = localizer.handle_scan(&scan_msg(0, vec![2.0; 20]), &tf).unwrap();
        assert!(!first.resampled);
        assert!(first.pose.is_some());

        // Forced update between resamples: the filter runs, but only the
        // cached correction goes back out.
        localizer.request_nomotion_update();
        let second = localizer.handle_scan(&scan_msg(1_000_000, vec![2.0; 20]), &tf).unwrap();
        assert!(!second.resampled);
        assert!(second.pose.is_none(), "non-resample cycle must not publish");
        assert!(second.correction.is_some());

        // Third update hits the schedule, resamples and publishes again.
        localizer.request_nomotion_update();
        let third = localizer.handle_scan(&scan_msg(2_000_000, vec![2.0; 20]), &tf).unwrap();
        assert!(third.resampled);
        assert!(third.pose.is_some());
    }

    #[test]
    fn test_wrong_frame_initial_pose_ignored() {
        let mut localizer = Localizer::new(test_config(), &boxed_map()).unwrap();
        localizer.activate();

        let before = localizer.particle_poses();
        localizer.set_initial_pose(
            "odom",
            &Pose2D::new(2.5, 2.5, 0.0),
            &Covariance2D::diagonal(0.05, 0.05, 0.02),
        );
        assert_eq!(before, localizer.particle_poses());
    }

    #[test]
    fn test_pending_initial_pose_applies_on_activate() {
        let mut localizer = Localizer::new(test_config(), &boxed_map()).unwrap();
        localizer.set_initial_pose(
            "map",
            &Pose2D::new(2.0, 3.0, 0.5),
            &Covariance2D::diagonal(0.01, 0.01, 0.01),
        );
        // Not applied yet.
        let centered_early = localizer
            .particle_poses()
            .iter()
            .filter(|p| (p.x - 2.0).abs() < 0.5)
            .count();
        assert!(centered_early < localizer.particle_poses().len() / 2);

        localizer.activate();
        let centered: usize = localizer
            .particle_poses()
            .iter()
            .filter(|p| (p.x - 2.0).abs() < 0.5 && (p.y - 3.0).abs() < 0.5)
            .count();
        assert_eq!(centered, localizer.particle_poses().len());
    }

    #[test]
    fn test_odom_failure_surfaces_error() {
        struct FailingTf;
        impl TransformProvider for FailingTf {
            fn odom_pose(&self, timestamp_us: u64) -> Result<Pose2D, TransformError> {
                Err(TransformError::Unavailable {
                    frame: "odom".to_string(),
                    timestamp_us,
                })
            }
            fn sensor_pose(&self, _frame_id: &str) -> Result<Pose2D, TransformError> {
                Ok(Pose2D::identity())
            }
        }

        let mut localizer = Localizer::new(test_config(), &boxed_map()).unwrap();
        localizer.activate();
        let result = localizer.handle_scan(&scan_msg(0, vec![2.0; 20]), &FailingTf);
        assert!(matches!(result, Err(LocalizerError::OdomUnavailable(_))));
    }

    #[test]
    fn test_beam_subsampling_and_range_mapping() {
        let config = LocalizerConfig {
            max_beams: 5,
            ..test_config()
        };
        let localizer = Localizer::new(config, &boxed_map()).unwrap();

        let mut ranges = vec![2.0f32; 21];
        ranges[0] = 0.05; // below range_min
        ranges[4] = f32::NAN;
        let msg = scan_msg(0, ranges);

        let data = localizer.beam_data(&msg, Point2D::new(0.0, 0.0), 0.0);
        // step = (21-1)/(5-1) = 5 -> indices 0, 5, 10, 15, 20.
        assert_eq!(data.beams.len(), 5);
        // Too-short reading mapped to max range.
        assert_eq!(data.beams[0].0, 8.0);
        assert_eq!(data.beams[1].0, 2.0);
    }

    #[test]
    fn test_global_localization_scatters_particles() {
        let mut localizer = Localizer::new(test_config(), &boxed_map()).unwrap();
        localizer.activate();
        localizer.request_global_localization().unwrap();

        let poses = localizer.particle_poses();
        let min_x = poses.iter().map(|p| p.x).fold(f32::MAX, f32::min);
        let max_x = poses.iter().map(|p| p.x).fold(f32::MIN, f32::max);
        assert!(max_x - min_x > 3.0, "spread: {}", max_x - min_x);
    }
}
