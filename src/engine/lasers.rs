//! Registry of laser scanners seen by the update cycle.
//!
//! Each distinct scan frame is registered once, on first sight, with its
//! static mounting pose. The per-laser `needs_update` flag implements the
//! "every laser integrates the next scan after motion" rule: gating fires
//! once per motion, but each registered laser gets its own correction.

use crate::core::types::{Point2D, Pose2D};
use std::collections::HashMap;

/// One registered laser.
#[derive(Debug, Clone)]
pub struct LaserEntry {
    /// Sensor position in the base frame.
    pub offset: Point2D,
    /// Sensor mounting yaw in the base frame.
    pub yaw: f32,
    /// Whether this laser still owes the filter an update.
    pub needs_update: bool,
}

/// Lasers keyed by scan frame id.
#[derive(Debug, Clone, Default)]
pub struct LaserRegistry {
    entries: HashMap<String, LaserEntry>,
}

impl LaserRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a frame has been registered.
    pub fn contains(&self, frame_id: &str) -> bool {
        self.entries.contains_key(frame_id)
    }

    /// Register a laser by its mounting pose; newly registered lasers owe
    /// an update immediately.
    pub fn register(&mut self, frame_id: &str, mount: &Pose2D) {
        log::info!(
            "registered laser '{}' at ({:.3}, {:.3}, yaw {:.3})",
            frame_id,
            mount.x,
            mount.y,
            mount.theta
        );
        self.entries.insert(
            frame_id.to_string(),
            LaserEntry {
                offset: Point2D::new(mount.x, mount.y),
                yaw: mount.theta,
                needs_update: true,
            },
        );
    }

    /// Mounting data for a frame.
    pub fn get(&self, frame_id: &str) -> Option<&LaserEntry> {
        self.entries.get(frame_id)
    }

    /// Flag every laser as owing an update.
    pub fn mark_all_stale(&mut self) {
        for entry in self.entries.values_mut() {
            entry.needs_update = true;
        }
    }

    /// Consume a laser's pending update; true when one was owed.
    pub fn take_update(&mut self, frame_id: &str) -> bool {
        match self.entries.get_mut(frame_id) {
            Some(entry) if entry.needs_update => {
                entry.needs_update = false;
                true
            }
            _ => false,
        }
    }

    /// Number of registered lasers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no laser has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
