//! Immutable occupancy map store.
//!
//! The map is fetched once from an external map service as a [`GridData`]
//! payload and converted into an [`OccupancyMap`] at startup. After
//! conversion the map never changes; the sensor models, the uniform pose
//! generator, and the ray caster all read it through shared references.

mod raycast;

pub use raycast::calc_range;

use crate::core::types::{Point2D, Pose2D};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// State of a single map cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellState {
    /// Known free space.
    Free,
    /// Known obstacle.
    Occupied,
    /// No information.
    Unknown,
}

/// Occupancy grid payload as delivered by the map service.
///
/// Cell values follow the occupancy-grid message convention:
/// 0 is free, 100 is occupied, anything else is unknown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridData {
    /// Frame the map is expressed in.
    pub frame_id: String,
    /// Width in cells.
    pub width: usize,
    /// Height in cells.
    pub height: usize,
    /// Cell edge length in meters.
    pub resolution: f32,
    /// World position of the (0, 0) cell corner.
    pub origin_x: f32,
    /// World position of the (0, 0) cell corner.
    pub origin_y: f32,
    /// Row-major cell values.
    pub values: Vec<i8>,
}

/// Errors raised while converting a map payload.
#[derive(Debug, Error)]
pub enum MapError {
    /// The payload's value buffer does not match its declared dimensions.
    #[error("grid data has {got} values but declares {width}x{height} cells")]
    SizeMismatch {
        /// Declared width.
        width: usize,
        /// Declared height.
        height: usize,
        /// Actual value count.
        got: usize,
    },

    /// The map has zero area.
    #[error("grid data has zero width or height")]
    EmptyGrid,
}

/// Dense, immutable 2D occupancy map.
///
/// Built once from [`GridData`] and shared read-only afterwards. The
/// free-space cell index used by uniform pose generation is computed at
/// load time and owned by the map, not held in process-wide state.
#[derive(Debug, Clone)]
pub struct OccupancyMap {
    width: usize,
    height: usize,
    resolution: f32,
    origin: Point2D,
    cells: Vec<CellState>,
    free_cells: Vec<(usize, usize)>,
}

impl OccupancyMap {
    /// Convert a map-service payload into the internal representation.
    ///
    /// Value 0 becomes [`CellState::Free`], 100 becomes
    /// [`CellState::Occupied`], everything else [`CellState::Unknown`].
    /// A frame id differing from `expected_frame` is logged but not fatal;
    /// it only affects diagnostics downstream.
    pub fn from_grid(grid: &GridData, expected_frame: &str) -> Result<Self, MapError> {
        if grid.width == 0 || grid.height == 0 {
            return Err(MapError::EmptyGrid);
        }
        if grid.values.len() != grid.width * grid.height {
            return Err(MapError::SizeMismatch {
                width: grid.width,
                height: grid.height,
                got: grid.values.len(),
            });
        }

        if grid.frame_id != expected_frame {
            log::warn!(
                "frame_id of received map '{}' doesn't match the global frame '{}'; \
                 published estimates may be misinterpreted",
                grid.frame_id,
                expected_frame
            );
        }

        let cells: Vec<CellState> = grid
            .values
            .iter()
            .map(|&v| match v {
                0 => CellState::Free,
                100 => CellState::Occupied,
                _ => CellState::Unknown,
            })
            .collect();

        let mut free_cells = Vec::new();
        for j in 0..grid.height {
            for i in 0..grid.width {
                if cells[j * grid.width + i] == CellState::Free {
                    free_cells.push((i, j));
                }
            }
        }

        Ok(Self {
            width: grid.width,
            height: grid.height,
            resolution: grid.resolution,
            origin: Point2D::new(grid.origin_x, grid.origin_y),
            cells,
            free_cells,
        })
    }

    /// Map dimensions in cells (width, height).
    #[inline]
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Cell edge length in meters.
    #[inline]
    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    /// World position of the grid origin (corner of cell (0, 0)).
    #[inline]
    pub fn origin(&self) -> Point2D {
        self.origin
    }

    /// Number of free cells.
    #[inline]
    pub fn free_cell_count(&self) -> usize {
        self.free_cells.len()
    }

    /// State of the cell at (i, j), or `None` when out of bounds.
    #[inline]
    pub fn state(&self, i: usize, j: usize) -> Option<CellState> {
        if i < self.width && j < self.height {
            Some(self.cells[j * self.width + i])
        } else {
            None
        }
    }

    /// Convert world coordinates to cell indices.
    ///
    /// Returns `None` when the position falls outside the grid.
    #[inline]
    pub fn world_to_cell(&self, x: f32, y: f32) -> Option<(usize, usize)> {
        let i = ((x - self.origin.x) / self.resolution).floor();
        let j = ((y - self.origin.y) / self.resolution).floor();
        if i >= 0.0 && j >= 0.0 && (i as usize) < self.width && (j as usize) < self.height {
            Some((i as usize, j as usize))
        } else {
            None
        }
    }

    /// World coordinates of a cell's center.
    #[inline]
    pub fn cell_to_world(&self, i: usize, j: usize) -> (f32, f32) {
        (
            self.origin.x + (i as f32 + 0.5) * self.resolution,
            self.origin.y + (j as f32 + 0.5) * self.resolution,
        )
    }

    /// State of the cell containing a world position.
    #[inline]
    pub fn state_at_world(&self, x: f32, y: f32) -> Option<CellState> {
        self.world_to_cell(x, y)
            .and_then(|(i, j)| self.state(i, j))
    }

    /// Draw a uniformly random pose over known free space.
    ///
    /// Returns `None` when the map contains no free cells, which makes
    /// uniform initialization impossible.
    pub fn random_free_pose<R: Rng>(&self, rng: &mut R) -> Option<Pose2D> {
        if self.free_cells.is_empty() {
            return None;
        }
        let idx = rng.gen_range(0..self.free_cells.len());
        let (i, j) = self.free_cells[idx];
        let (x, y) = self.cell_to_world(i, j);
        let theta = rng.gen_range(-std::f32::consts::PI..std::f32::consts::PI);
        Some(Pose2D::new(x, y, theta))
    }
}
