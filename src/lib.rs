//! Ring Runner - A rail-guided endless runner core
//!
//! Core modules:
//! - `sim`: Deterministic simulation (course geometry, gate window, spawn rules, beat judging)
//! - `settings`: Data-driven course configuration
//! - `error`: Configuration error types

pub mod error;
pub mod settings;
pub mod sim;

pub use error::ConfigError;
pub use settings::{RuleRegistration, Settings};

use glam::Vec2;

/// Game configuration constants
pub mod consts {
    /// Fixed simulation timestep (60 Hz)
    pub const SIM_DT: f32 = 1.0 / 60.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;

    /// Gate layout defaults (world units)
    pub const RING_SPACING: f32 = 500.0;
    pub const RING_RADIUS: f32 = 500.0;
    pub const FADE_DISTANCE: f32 = 4000.0;
    pub const APPEAR_TOLERANCE: f32 = 1000.0;

    /// Ring rotation defaults (degrees per second)
    pub const ROTATE_SPEED_MIN: f32 = -25.0;
    pub const ROTATE_SPEED_MAX: f32 = 25.0;
    /// Speeds closer to zero than this are rerolled
    pub const ROTATE_SPEED_REROLL_ZONE: f32 = 5.0;

    /// Beat judging defaults
    pub const ACTION_TOLERANCE: f32 = 650.0;
    pub const IMMUNITY_DURATION: f32 = 1.0;
    pub const OBSTACLE_CHANCE: f32 = 0.5;
    /// Angular width of an injected obstacle (radians, ~60 degrees)
    pub const OBSTACLE_ARC_WIDTH: f32 = 1.05;

    /// Player defaults
    pub const PLAYER_SPEED: f32 = 1500.0;
    pub const LATERAL_SHRINK: f32 = 50.0;

    /// Reparameterization samples per course segment
    pub const REPARAM_STEPS_PER_SEGMENT: usize = 10;
}

/// Normalized angle to [-π, π)
#[inline]
pub fn normalize_angle(mut angle: f32) -> f32 {
    use std::f32::consts::PI;
    while angle >= PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Convert polar (r, theta) to cartesian (x, y)
#[inline]
pub fn polar_to_cartesian(r: f32, theta: f32) -> Vec2 {
    Vec2::new(r * theta.cos(), r * theta.sin())
}

/// Convert cartesian (x, y) to polar (r, theta)
#[inline]
pub fn cartesian_to_polar(pos: Vec2) -> (f32, f32) {
    (pos.length(), pos.y.atan2(pos.x))
}
