//! Hypothesis extraction by pose-space clustering.
//!
//! Particles are dropped into fixed-size (x, y, theta) bins and adjacent
//! occupied bins are merged into clusters (26-neighborhood with angular
//! wraparound). Each cluster is summarized as a weight, a weighted mean
//! pose, and a planar + angular covariance. Extraction is deterministic
//! for a given sample set, so re-running it on unchanged particles yields
//! identical hypotheses.

use crate::core::math::angle_diff;
use crate::core::types::{Covariance2D, Pose2D};
use crate::filter::Particle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One clustered pose hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Total normalized weight of the cluster.
    pub weight: f64,
    /// Weighted mean pose (circular mean for theta).
    pub mean: Pose2D,
    /// 2x2 positional plus 1x1 angular covariance.
    pub covariance: Covariance2D,
}

/// Pose-space clustering parameters.
#[derive(Debug, Clone, Copy)]
pub struct ClusterParams {
    /// Bin size along x and y, in meters.
    pub bin_size_xy: f64,
    /// Bin size along theta, in radians.
    pub bin_size_theta: f64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            bin_size_xy: 0.5,
            bin_size_theta: 10.0f64.to_radians(),
        }
    }
}

/// Cluster the sample set and summarize each cluster.
///
/// Returns hypotheses sorted by descending weight; an empty slice of
/// particles yields an empty vec. The caller decides what a non-positive
/// maximum weight means (a diverged filter, per the update controller).
pub fn extract(particles: &[Particle], params: &ClusterParams) -> Vec<Hypothesis> {
    if particles.is_empty() {
        return Vec::new();
    }

    let theta_bins = ((2.0 * std::f64::consts::PI) / params.bin_size_theta).ceil() as i64;
    let key_of = |pose: &Pose2D| -> (i64, i64, i64) {
        let kt = (pose.theta as f64 / params.bin_size_theta).floor() as i64;
        (
            (pose.x as f64 / params.bin_size_xy).floor() as i64,
            (pose.y as f64 / params.bin_size_xy).floor() as i64,
            kt.rem_euclid(theta_bins),
        )
    };

    // BTreeMap keeps bin iteration order stable across runs.
    let mut bins: BTreeMap<(i64, i64, i64), Vec<usize>> = BTreeMap::new();
    for (idx, p) in particles.iter().enumerate() {
        bins.entry(key_of(&p.pose)).or_default().push(idx);
    }

    // Union adjacent bins into clusters.
    let keys: Vec<_> = bins.keys().copied().collect();
    let index_of: BTreeMap<_, _> = keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();
    let mut parent: Vec<usize> = (0..keys.len()).collect();

    fn find(parent: &mut Vec<usize>, i: usize) -> usize {
        let mut root = i;
        while parent[root] != root {
            root = parent[root];
        }
        let mut cur = i;
        while parent[cur] != root {
            let next = parent[cur];
            parent[cur] = root;
            cur = next;
        }
        root
    }

    for (i, &(kx, ky, kt)) in keys.iter().enumerate() {
        for dx in -1..=1i64 {
            for dy in -1..=1i64 {
                for dt in -1..=1i64 {
                    if dx == 0 && dy == 0 && dt == 0 {
                        continue;
                    }
                    let neighbor = (kx + dx, ky + dy, (kt + dt).rem_euclid(theta_bins));
                    if let Some(&j) = index_of.get(&neighbor) {
                        let ri = find(&mut parent, i);
                        let rj = find(&mut parent, j);
                        if ri != rj {
                            parent[ri.max(rj)] = ri.min(rj);
                        }
                    }
                }
            }
        }
    }

    // Accumulate weighted statistics per cluster root.
    #[derive(Default)]
    struct Acc {
        weight: f64,
        x: f64,
        y: f64,
        sin: f64,
        cos: f64,
        xx: f64,
        xy: f64,
        yy: f64,
        members: Vec<usize>,
    }

    let mut accs: BTreeMap<usize, Acc> = BTreeMap::new();
    for (i, key) in keys.iter().enumerate() {
        let root = find(&mut parent, i);
        let acc = accs.entry(root).or_default();
        for &pidx in &bins[key] {
            let p = &particles[pidx];
            let w = p.weight;
            acc.weight += w;
            acc.x += w * p.pose.x as f64;
            acc.y += w * p.pose.y as f64;
            acc.sin += w * (p.pose.theta as f64).sin();
            acc.cos += w * (p.pose.theta as f64).cos();
            acc.xx += w * (p.pose.x as f64) * (p.pose.x as f64);
            acc.xy += w * (p.pose.x as f64) * (p.pose.y as f64);
            acc.yy += w * (p.pose.y as f64) * (p.pose.y as f64);
            acc.members.push(pidx);
        }
    }

    let mut hypotheses: Vec<Hypothesis> = accs
        .values()
        .filter(|acc| acc.weight > 0.0)
        .map(|acc| {
            let w = acc.weight;
            let mean_x = acc.x / w;
            let mean_y = acc.y / w;
            let mean_theta = (acc.sin / w).atan2(acc.cos / w) as f32;
            let mean = Pose2D::new(mean_x as f32, mean_y as f32, mean_theta);

            let cov_xx = acc.xx / w - mean_x * mean_x;
            let cov_xy = acc.xy / w - mean_x * mean_y;
            let cov_yy = acc.yy / w - mean_y * mean_y;

            // Angular spread around the circular mean.
            let mut cov_tt = 0.0;
            for &pidx in &acc.members {
                let p = &particles[pidx];
                let d = angle_diff(mean_theta, p.pose.theta) as f64;
                cov_tt += (p.weight / w) * d * d;
            }

            Hypothesis {
                weight: w,
                mean,
                covariance: Covariance2D::from_array([
                    cov_xx, cov_xy, 0.0, cov_xy, cov_yy, 0.0, 0.0, 0.0, cov_tt,
                ]),
            }
        })
        .collect();

    hypotheses.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
    hypotheses
}

/// Weighted mean and covariance over the whole sample set.
///
/// The published covariance reports the full belief spread rather than
/// the spread of the winning cluster alone.
pub fn set_statistics(particles: &[Particle]) -> (Pose2D, Covariance2D) {
    let mut w_total = 0.0f64;
    let mut x = 0.0f64;
    let mut y = 0.0f64;
    let mut sin = 0.0f64;
    let mut cos = 0.0f64;

    for p in particles {
        w_total += p.weight;
        x += p.weight * p.pose.x as f64;
        y += p.weight * p.pose.y as f64;
        sin += p.weight * (p.pose.theta as f64).sin();
        cos += p.weight * (p.pose.theta as f64).cos();
    }

    if w_total <= 0.0 {
        return (Pose2D::identity(), Covariance2D::diagonal(1.0, 1.0, 0.5));
    }

    let mean_x = x / w_total;
    let mean_y = y / w_total;
    let mean_theta = (sin / w_total).atan2(cos / w_total) as f32;
    let mean = Pose2D::new(mean_x as f32, mean_y as f32, mean_theta);

    let mut cov_xx = 0.0f64;
    let mut cov_xy = 0.0f64;
    let mut cov_yy = 0.0f64;
    let mut cov_tt = 0.0f64;
    for p in particles {
        let w = p.weight / w_total;
        let dx = p.pose.x as f64 - mean_x;
        let dy = p.pose.y as f64 - mean_y;
        let dt = angle_diff(mean_theta, p.pose.theta) as f64;
        cov_xx += w * dx * dx;
        cov_xy += w * dx * dy;
        cov_yy += w * dy * dy;
        cov_tt += w * dt * dt;
    }

    (
        mean,
        Covariance2D::from_array([cov_xx, cov_xy, 0.0, cov_xy, cov_yy, 0.0, 0.0, 0.0, cov_tt]),
    )
}
