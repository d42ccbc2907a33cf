//! Bresenham ray casting for expected-range computation.
//!
//! The beam sensor model needs the range a perfect sensor would report
//! from a hypothesized pose. This walks the grid with Bresenham's line
//! algorithm until it hits an occupied (or unknown) cell or runs past
//! the maximum range.

use super::{CellState, OccupancyMap};

/// Expected range along a ray.
///
/// Casts from `(x, y)` at world `bearing` and returns the distance to the
/// first non-free cell, or `max_range` when the ray stays in free space.
/// Rays leaving the grid also report `max_range`; unknown cells terminate
/// the ray since a real beam could not have passed through unmapped space.
pub fn calc_range(map: &OccupancyMap, x: f32, y: f32, bearing: f32, max_range: f32) -> f32 {
    let resolution = map.resolution();
    let end_x = x + max_range * bearing.cos();
    let end_y = y + max_range * bearing.sin();

    let origin = map.origin();
    let to_cell = |wx: f32, wy: f32| -> (i64, i64) {
        (
            ((wx - origin.x) / resolution).floor() as i64,
            ((wy - origin.y) / resolution).floor() as i64,
        )
    };

    let (x0, y0) = to_cell(x, y);
    let (x1, y1) = to_cell(end_x, end_y);

    let dx = (x1 - x0).abs();
    let dy = (y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };

    let mut cx = x0;
    let mut cy = y0;
    let mut err = dx - dy;

    loop {
        if cx >= 0 && cy >= 0 {
            match map.state(cx as usize, cy as usize) {
                Some(CellState::Free) => {}
                Some(_) if (cx, cy) != (x0, y0) => {
                    let (wx, wy) = map.cell_to_world(cx as usize, cy as usize);
                    let dist = ((wx - x) * (wx - x) + (wy - y) * (wy - y)).sqrt();
                    return dist.min(max_range);
                }
                Some(_) => {} // starting cell is never treated as a hit
                None => return max_range,
            }
        }

        if cx == x1 && cy == y1 {
            return max_range;
        }

        let e2 = 2 * err;
        if e2 > -dy {
            err -= dy;
            cx += sx;
        }
        if e2 < dx {
            err += dx;
            cy += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::GridData;

    /// 4m x 4m empty room with walls on all sides, 0.1m cells.
    fn walled_map() -> OccupancyMap {
        let width = 40;
        let height = 40;
        let mut values = vec![0i8; width * height];
        for i in 0..width {
            values[i] = 100;
            values[(height - 1) * width + i] = 100;
        }
        for j in 0..height {
            values[j * width] = 100;
            values[j * width + width - 1] = 100;
        }
        OccupancyMap::from_grid(
            &GridData {
                frame_id: "map".to_string(),
                width,
                height,
                resolution: 0.1,
                origin_x: -2.0,
                origin_y: -2.0,
                values,
            },
            "map",
        )
        .unwrap()
    }

    #[test]
    fn test_range_to_wall() {
        let map = walled_map();
        // From center toward +X the east wall is ~1.9m away.
        let r = calc_range(&map, 0.0, 0.0, 0.0, 8.0);
        assert!((r - 1.9).abs() < 0.2, "range to wall: {}", r);
    }

    #[test]
    fn test_range_clamped_to_max() {
        let map = walled_map();
        let r = calc_range(&map, 0.0, 0.0, 0.0, 1.0);
        assert_eq!(r, 1.0);
    }

    #[test]
    fn test_range_diagonal() {
        let map = walled_map();
        let r = calc_range(&map, 0.0, 0.0, std::f32::consts::FRAC_PI_4, 8.0);
        // Diagonal to the corner walls: ~1.9 * sqrt(2).
        assert!((r - 2.68).abs() < 0.3, "diagonal range: {}", r);
    }

    #[test]
    fn test_unknown_terminates_ray() {
        let mut values = vec![0i8; 10];
        values[5] = -1;
        let map = OccupancyMap::from_grid(
            &GridData {
                frame_id: "map".to_string(),
                width: 10,
                height: 1,
                resolution: 0.1,
                origin_x: 0.0,
                origin_y: 0.0,
                values,
            },
            "map",
        )
        .unwrap();
        let r = calc_range(&map, 0.05, 0.05, 0.0, 5.0);
        assert!(r < 0.6, "unknown cell should stop the ray: {}", r);
    }
}
