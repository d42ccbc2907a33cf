//! Precomputed distance-to-nearest-obstacle field.
//!
//! The likelihood-field sensor models score a beam by how close its
//! endpoint lands to any obstacle. Looking that up per beam per particle
//! must be O(1), so the field is computed once from the immutable map by
//! a multi-source BFS seeded at every occupied cell.

use crate::map::{CellState, OccupancyMap};
use std::collections::VecDeque;

/// Dense distance field over the map grid.
#[derive(Debug, Clone)]
pub struct DistanceField {
    width: usize,
    height: usize,
    resolution: f32,
    origin_x: f32,
    origin_y: f32,
    max_dist: f32,
    distances: Vec<f32>,
}

impl DistanceField {
    /// Compute the field from a map; distances are clamped to `max_dist`.
    pub fn compute(map: &OccupancyMap, max_dist: f32) -> Self {
        let (width, height) = map.dimensions();
        let resolution = map.resolution();
        let origin = map.origin();

        let mut distances = vec![max_dist; width * height];
        let mut queue: VecDeque<(usize, usize, f32)> = VecDeque::new();

        for j in 0..height {
            for i in 0..width {
                if map.state(i, j) == Some(CellState::Occupied) {
                    distances[j * width + i] = 0.0;
                    queue.push_back((i, j, 0.0));
                }
            }
        }

        let neighbors: [(i64, i64, f32); 8] = [
            (-1, 0, 1.0),
            (1, 0, 1.0),
            (0, -1, 1.0),
            (0, 1, 1.0),
            (-1, -1, std::f32::consts::SQRT_2),
            (1, -1, std::f32::consts::SQRT_2),
            (-1, 1, std::f32::consts::SQRT_2),
            (1, 1, std::f32::consts::SQRT_2),
        ];

        while let Some((cx, cy, dist)) = queue.pop_front() {
            // A shorter path may have been found since this was queued.
            if dist > distances[cy * width + cx] + 0.001 {
                continue;
            }

            for &(dx, dy, step) in &neighbors {
                let nx = cx as i64 + dx;
                let ny = cy as i64 + dy;
                if nx < 0 || ny < 0 || nx as usize >= width || ny as usize >= height {
                    continue;
                }
                let nx = nx as usize;
                let ny = ny as usize;
                let new_dist = dist + step * resolution;
                if new_dist < distances[ny * width + nx] && new_dist < max_dist {
                    distances[ny * width + nx] = new_dist;
                    queue.push_back((nx, ny, new_dist));
                }
            }
        }

        Self {
            width,
            height,
            resolution,
            origin_x: origin.x,
            origin_y: origin.y,
            max_dist,
            distances,
        }
    }

    /// Clamp distance used for endpoints outside the grid.
    #[inline]
    pub fn max_dist(&self) -> f32 {
        self.max_dist
    }

    /// Distance to the nearest obstacle from a world position.
    ///
    /// Positions outside the grid report the clamp distance.
    #[inline]
    pub fn distance_at(&self, x: f32, y: f32) -> f32 {
        let i = ((x - self.origin_x) / self.resolution).floor();
        let j = ((y - self.origin_y) / self.resolution).floor();
        if i >= 0.0 && j >= 0.0 {
            let i = i as usize;
            let j = j as usize;
            if i < self.width && j < self.height {
                return self.distances[j * self.width + i];
            }
        }
        self.max_dist
    }
}
