//! Arc sector geometry for gate obstacles
//!
//! Obstacles live in a gate's cross-section plane, expressed in polar space
//! around the course centerline:
//! - radius: distance from the centerline to the middle of the band
//! - thickness: radial extent (inner = radius - thickness/2, outer = radius + thickness/2)
//! - theta_start, theta_end: angular extent (measured from the gate's right axis toward up)

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::{cartesian_to_polar, normalize_angle, polar_to_cartesian};

/// A thickened arc segment in a gate's polar space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArcSegment {
    /// Centerline radius of the band
    pub radius: f32,
    /// Radial thickness (extends radius ± thickness/2)
    pub thickness: f32,
    /// Start angle (radians, normalized to [-π, π))
    pub theta_start: f32,
    /// End angle (radians, normalized to [-π, π))
    pub theta_end: f32,
}

impl ArcSegment {
    pub fn new(radius: f32, thickness: f32, theta_start: f32, theta_end: f32) -> Self {
        Self {
            radius,
            thickness,
            theta_start: normalize_angle(theta_start),
            theta_end: normalize_angle(theta_end),
        }
    }

    /// Wedge reaching from the centerline out to `outer`, centered on `theta`
    pub fn wedge(outer: f32, theta: f32, width: f32) -> Self {
        Self::new(outer / 2.0, outer, theta - width / 2.0, theta + width / 2.0)
    }

    /// Inner radius of the arc band
    #[inline]
    pub fn inner_radius(&self) -> f32 {
        self.radius - self.thickness / 2.0
    }

    /// Outer radius of the arc band
    #[inline]
    pub fn outer_radius(&self) -> f32 {
        self.radius + self.thickness / 2.0
    }

    /// Angular span of the arc (handles wraparound)
    pub fn angular_span(&self) -> f32 {
        let mut span = self.theta_end - self.theta_start;
        if span < 0.0 {
            span += std::f32::consts::TAU;
        }
        span
    }

    /// Check if an angle is within the arc's angular extent
    pub fn contains_angle(&self, theta: f32) -> bool {
        let theta = normalize_angle(theta);
        let start = self.theta_start;
        let end = self.theta_end;

        if start <= end {
            theta >= start && theta <= end
        } else {
            // Wraparound case (e.g., start=170°, end=-170°)
            theta >= start || theta <= end
        }
    }

    /// Check if a lateral offset lies inside the arc segment
    pub fn contains_point(&self, point: Vec2) -> bool {
        let (r, theta) = cartesian_to_polar(point);
        r >= self.inner_radius() && r <= self.outer_radius() && self.contains_angle(theta)
    }

    /// Get the center point of the arc (at centerline radius, mid-angle)
    pub fn center(&self) -> Vec2 {
        let mid_theta = self.theta_start + self.angular_span() / 2.0;
        polar_to_cartesian(self.radius, mid_theta)
    }

    /// Spin the arc around the centerline
    pub fn rotate(&mut self, delta: f32) {
        self.theta_start = normalize_angle(self.theta_start + delta);
        self.theta_end = normalize_angle(self.theta_end + delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_arc_contains_angle_no_wrap() {
        let arc = ArcSegment::new(100.0, 10.0, 0.0, PI / 2.0);
        assert!(arc.contains_angle(0.1));
        assert!(arc.contains_angle(PI / 4.0));
        assert!(!arc.contains_angle(PI));
        assert!(!arc.contains_angle(-PI / 4.0));
    }

    #[test]
    fn test_arc_contains_angle_wraparound() {
        let arc = ArcSegment::new(100.0, 10.0, 170.0_f32.to_radians(), -170.0_f32.to_radians());
        assert!(arc.contains_angle(PI));
        assert!(arc.contains_angle(-PI + 0.01));
        assert!(!arc.contains_angle(0.0));
    }

    #[test]
    fn test_wedge_covers_centerline_to_rim() {
        let wedge = ArcSegment::wedge(500.0, 0.0, 1.0);
        assert_eq!(wedge.inner_radius(), 0.0);
        assert_eq!(wedge.outer_radius(), 500.0);
        assert!(wedge.contains_point(Vec2::new(10.0, 0.0)));
        assert!(wedge.contains_point(Vec2::new(490.0, 0.0)));
        assert!(!wedge.contains_point(Vec2::new(510.0, 0.0)));
        assert!(!wedge.contains_point(Vec2::new(0.0, 200.0)));
        assert!((wedge.center() - Vec2::new(250.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn test_rotate_moves_coverage() {
        let mut wedge = ArcSegment::wedge(500.0, 0.0, 0.5);
        let up = Vec2::new(0.0, 300.0);
        assert!(!wedge.contains_point(up));
        wedge.rotate(PI / 2.0);
        assert!(wedge.contains_point(up));
        assert!((wedge.angular_span() - 0.5).abs() < 1e-4);
    }
}
