//! Update-cycle plumbing: lifecycle gating, laser registration, motion
//! thresholds, and correction rebroadcast.

use disha_mcl::map::calc_range;
use disha_mcl::{
    Covariance2D, GridData, LaserScan, Localizer, LocalizerConfig, LocalizerError, OccupancyMap,
    Pose2D, ScanMessage, TransformError, TransformProvider,
};

struct SimTf {
    odom: Pose2D,
    laser_known: bool,
}

impl SimTf {
    fn at(odom: Pose2D) -> Self {
        Self {
            odom,
            laser_known: true,
        }
    }
}

impl TransformProvider for SimTf {
    fn odom_pose(&self, _timestamp_us: u64) -> Result<Pose2D, TransformError> {
        Ok(self.odom)
    }
    fn sensor_pose(&self, frame_id: &str) -> Result<Pose2D, TransformError> {
        if self.laser_known {
            Ok(Pose2D::new(0.1, 0.0, 0.0))
        } else {
            Err(TransformError::UnknownFrame(frame_id.to_string()))
        }
    }
}

fn box_grid() -> GridData {
    let width = 60;
    let height = 60;
    let mut values = vec![0i8; width * height];
    for i in 0..width {
        values[i] = 100;
        values[(height - 1) * width + i] = 100;
    }
    for j in 0..height {
        values[j * width] = 100;
        values[j * width + width - 1] = 100;
    }
    for j in 0..20 {
        values[j * width + 30] = 100;
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

fn scan_from(map: &OccupancyMap, pose: &Pose2D, timestamp_us: u64) -> ScanMessage {
    let n = 40;
    let angle_min = -std::f32::consts::PI;
    let increment = 2.0 * std::f32::consts::PI / (n - 1) as f32;
    let ranges = (0..n)
        .map(|i| {
            let bearing = pose.theta + angle_min + i as f32 * increment;
            calc_range(map, pose.x, pose.y, bearing, 8.0)
        })
        .collect();
    ScanMessage {
        frame_id: "laser".to_string(),
        timestamp_us,
        scan: LaserScan {
            angle_min,
            angle_max: -angle_min,
            angle_increment: increment,
            range_min: 0.1,
            range_max: 8.0,
            ranges,
        },
    }
}

fn localizer_at(truth: &Pose2D) -> (Localizer, OccupancyMap) {
    let config = LocalizerConfig {
        min_particles: 50,
        max_particles: 400,
        seed: 9,
        ..Default::default()
    };
    let map = OccupancyMap::from_grid(&box_grid(), "map").unwrap();
    let mut localizer = Localizer::new(config, &box_grid()).unwrap();
    localizer.activate();
    localizer.set_initial_pose("map", truth, &Covariance2D::diagonal(0.04, 0.04, 0.02));
    (localizer, map)
}

#[test]
fn test_scans_before_activation_do_nothing() {
    let map = OccupancyMap::from_grid(&box_grid(), "map").unwrap();
    let mut localizer = Localizer::new(
        LocalizerConfig {
            seed: 9,
            ..Default::default()
        },
        &box_grid(),
    )
    .unwrap();

    let truth = Pose2D::new(2.0, 2.0, 0.0);
    let tf = SimTf::at(truth);
    let outcome = localizer.handle_scan(&scan_from(&map, &truth, 0), &tf).unwrap();
    assert!(outcome.pose.is_none());
    assert!(outcome.correction.is_none());
    assert!(outcome.cloud.is_none());

    // After deactivation scans are ignored again.
    localizer.activate();
    localizer.deactivate();
    let outcome = localizer.handle_scan(&scan_from(&map, &truth, 1), &tf).unwrap();
    assert!(outcome.pose.is_none());
}

#[test]
fn test_unresolvable_laser_frame_is_an_error() {
    let truth = Pose2D::new(2.0, 2.0, 0.0);
    let (mut localizer, map) = localizer_at(&truth);

    let tf = SimTf {
        odom: truth,
        laser_known: false,
    };
    let result = localizer.handle_scan(&scan_from(&map, &truth, 0), &tf);
    assert!(matches!(
        result,
        Err(LocalizerError::LaserRegistration { .. })
    ));

    // Once the frame resolves, the same scan goes through.
    let tf = SimTf::at(truth);
    let outcome = localizer.handle_scan(&scan_from(&map, &truth, 1), &tf).unwrap();
    assert!(outcome.pose.is_some());
}

#[test]
fn test_motion_accumulates_across_gated_scans() {
    let truth = Pose2D::new(2.0, 2.0, 0.0);
    let (mut localizer, map) = localizer_at(&truth);

    // Anchor with the first scan.
    let tf = SimTf::at(truth);
    localizer.handle_scan(&scan_from(&map, &truth, 0), &tf).unwrap();

    // Three 0.1m steps: first two stay under the 0.25m threshold, the
    // third crosses it (0.3m accumulated from the last update).
    let mut published = Vec::new();
    for step in 1..=3 {
        let pose = Pose2D::new(2.0 + 0.1 * step as f32, 2.0, 0.0);
        let tf = SimTf::at(pose);
        let outcome = localizer
            .handle_scan(&scan_from(&map, &pose, step as u64 * 100_000), &tf)
            .unwrap();
        published.push(outcome.pose.is_some());
    }
    assert_eq!(published, vec![false, false, true]);
}

#[test]
fn test_laser_registered_exactly_once() {
    use std::cell::Cell;

    struct CountingTf {
        odom: Pose2D,
        lookups: Cell<usize>,
    }
    impl TransformProvider for CountingTf {
        fn odom_pose(&self, _timestamp_us: u64) -> Result<Pose2D, TransformError> {
            Ok(self.odom)
        }
        fn sensor_pose(&self, _frame_id: &str) -> Result<Pose2D, TransformError> {
            self.lookups.set(self.lookups.get() + 1);
            Ok(Pose2D::new(0.1, 0.0, 0.0))
        }
    }

    let truth = Pose2D::new(2.0, 2.0, 0.0);
    let (mut localizer, map) = localizer_at(&truth);
    let tf = CountingTf {
        odom: truth,
        lookups: Cell::new(0),
    };

    assert_eq!(localizer.laser_count(), 0);
    localizer.handle_scan(&scan_from(&map, &truth, 0), &tf).unwrap();
    assert_eq!(localizer.laser_count(), 1);
    assert_eq!(tf.lookups.get(), 1);

    // Same frame again: no new registration, no new lookup.
    localizer.handle_scan(&scan_from(&map, &truth, 100_000), &tf).unwrap();
    assert_eq!(localizer.laser_count(), 1);
    assert_eq!(tf.lookups.get(), 1);
}

#[test]
fn test_ten_subthreshold_scans_never_update() {
    let truth = Pose2D::new(2.0, 2.0, 0.0);
    let (mut localizer, map) = localizer_at(&truth);

    let tf = SimTf::at(truth);
    localizer.handle_scan(&scan_from(&map, &truth, 0), &tf).unwrap();

    // Ten scans at a fixed sub-threshold offset: nothing accumulates.
    let nudged = Pose2D::new(2.05, 2.0, 0.05);
    let tf = SimTf::at(nudged);
    for step in 1..=10 {
        let outcome = localizer
            .handle_scan(&scan_from(&map, &nudged, step as u64 * 100_000), &tf)
            .unwrap();
        assert!(outcome.pose.is_none(), "scan {} updated", step);
        assert!(!outcome.resampled, "scan {} resampled", step);
        assert!(outcome.cloud.is_none());
    }
}

#[test]
fn test_rotation_alone_opens_the_gate() {
    let truth = Pose2D::new(2.0, 2.0, 0.0);
    let (mut localizer, map) = localizer_at(&truth);

    let tf = SimTf::at(truth);
    localizer.handle_scan(&scan_from(&map, &truth, 0), &tf).unwrap();

    // 0.3 rad in place, above the 0.2 rad threshold.
    let turned = Pose2D::new(2.0, 2.0, 0.3);
    let tf = SimTf::at(turned);
    let outcome = localizer.handle_scan(&scan_from(&map, &turned, 100_000), &tf).unwrap();
    assert!(outcome.pose.is_some());
}

#[test]
fn test_stationary_rebroadcast_refreshes_expiration() {
    let truth = Pose2D::new(2.0, 2.0, 0.0);
    let (mut localizer, map) = localizer_at(&truth);

    let tf = SimTf::at(truth);
    let first = localizer.handle_scan(&scan_from(&map, &truth, 0), &tf).unwrap();
    let fresh = first.correction.expect("update must emit a correction");

    // No motion: identical transform, later horizon.
    let later = localizer.handle_scan(&scan_from(&map, &truth, 3_000_000), &tf).unwrap();
    assert!(later.pose.is_none());
    let rebroadcast = later.correction.expect("stationary cycles rebroadcast");
    assert_eq!(rebroadcast.transform, fresh.transform);
    assert!(rebroadcast.valid_until_us > fresh.valid_until_us);
    assert_eq!(rebroadcast.valid_until_us, 3_000_000 + 1_000_000);
}

#[test]
fn test_tf_broadcast_disabled_suppresses_corrections() {
    let config = LocalizerConfig {
        min_particles: 50,
        max_particles: 400,
        tf_broadcast: false,
        seed: 9,
        ..Default::default()
    };
    let map = OccupancyMap::from_grid(&box_grid(), "map").unwrap();
    let mut localizer = Localizer::new(config, &box_grid()).unwrap();
    localizer.activate();
    let truth = Pose2D::new(2.0, 2.0, 0.0);
    localizer.set_initial_pose("map", &truth, &Covariance2D::diagonal(0.04, 0.04, 0.02));

    let tf = SimTf::at(truth);
    let outcome = localizer.handle_scan(&scan_from(&map, &truth, 0), &tf).unwrap();
    assert!(outcome.pose.is_some());
    assert!(outcome.correction.is_none());
}

#[test]
fn test_cloud_withheld_until_first_pose() {
    let truth = Pose2D::new(2.0, 2.0, 0.0);
    let (mut localizer, map) = localizer_at(&truth);

    let tf = SimTf::at(truth);
    let outcome = localizer.handle_scan(&scan_from(&map, &truth, 0), &tf).unwrap();
    // First update publishes a pose, so the cloud ships with it.
    assert!(outcome.pose.is_some());
    let cloud = outcome.cloud.expect("cloud accompanies the first pose");
    assert!(!cloud.is_empty());

    // Gated cycles carry no cloud.
    let outcome = localizer.handle_scan(&scan_from(&map, &truth, 100_000), &tf).unwrap();
    assert!(outcome.cloud.is_none());
}

#[test]
fn test_resample_interval_spacing() {
    let config = LocalizerConfig {
        min_particles: 50,
        max_particles: 400,
        resample_interval: 2,
        seed: 9,
        ..Default::default()
    };
    let map = OccupancyMap::from_grid(&box_grid(), "map").unwrap();
    let mut localizer = Localizer::new(config, &box_grid()).unwrap();
    localizer.activate();
    let truth = Pose2D::new(2.0, 2.0, 0.0);
    localizer.set_initial_pose("map", &truth, &Covariance2D::diagonal(0.04, 0.04, 0.02));

    let tf = SimTf::at(truth);
    let mut resampled = Vec::new();
    for step in 0..4 {
        localizer.request_nomotion_update();
        let outcome = localizer
            .handle_scan(&scan_from(&map, &truth, step as u64 * 100_000), &tf)
            .unwrap();
        resampled.push(outcome.resampled);
    }
    // Every second update resamples.
    assert_eq!(resampled, vec![false, true, false, true]);
}
