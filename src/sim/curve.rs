//! Course geometry: a Catmull-Rom path reparameterized by distance
//!
//! The course is an open cubic Hermite spline through its control points. Input
//! keys run from 0 at the first point to `points.len() - 1` at the last. Since
//! key speed is not uniform, a table of `(key, distance)` breakpoints is built
//! once and searched in both directions:
//! - distance → key for pose queries
//! - key → distance for nearest-point queries

use glam::{Mat3, Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::consts::REPARAM_STEPS_PER_SEGMENT;
use crate::error::ConfigError;

/// Chord subdivisions used when measuring arc length between breakpoints
const LENGTH_SUBSTEPS: usize = 8;
/// Ternary search iterations when refining a nearest-key query
const REFINE_ITERATIONS: usize = 32;
/// Keys this close to either end are ambiguous for points beyond that end
const END_KEY_EPSILON: f32 = 1e-4;

/// A world-space position and orientation along the course
///
/// Local axes: +X forward (along the course), +Y right, +Z up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    #[inline]
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    #[inline]
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }

    /// World position of a lateral (right, up) offset in this pose's cross-section
    pub fn offset(&self, lateral: Vec2) -> Vec3 {
        self.position + self.right() * lateral.x + self.up() * lateral.y
    }

    /// Project a world point into this pose's cross-section as a (right, up) offset
    pub fn lateral_of(&self, point: Vec3) -> Vec2 {
        let delta = point - self.position;
        Vec2::new(delta.dot(self.right()), delta.dot(self.up()))
    }
}

/// Build a roll-free orientation whose forward axis follows `tangent`
fn orientation_from_tangent(tangent: Vec3) -> Quat {
    let forward = tangent.normalize_or_zero();
    if forward == Vec3::ZERO {
        return Quat::IDENTITY;
    }
    let right = Vec3::Z.cross(forward);
    if right.length_squared() < 1e-8 {
        // Vertical tangent, world up is no reference
        return Quat::from_rotation_arc(Vec3::X, forward);
    }
    let right = right.normalize();
    let up = forward.cross(right);
    Quat::from_mat3(&Mat3::from_cols(forward, right, up)).normalize()
}

/// One breakpoint of the reparameterization table
#[derive(Debug, Clone, Copy, PartialEq)]
struct ReparamPoint {
    /// Spline input key
    key: f32,
    /// Arc length from the start of the course
    distance: f32,
    /// Cached location at `key` (used for the coarse nearest-point scan)
    position: Vec3,
}

/// The rail the player travels along
///
/// Serialized as its control points; deserializing rebuilds the table through
/// `Course::new`, so an invalid point list is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec3>", into = "Vec<Vec3>")]
pub struct Course {
    points: Vec<Vec3>,
    table: Vec<ReparamPoint>,
    length: f32,
}

impl Course {
    /// Build a course through the given control points
    pub fn new(points: Vec<Vec3>) -> Result<Self, ConfigError> {
        if points.len() < 2 {
            return Err(ConfigError::TooFewPoints(points.len()));
        }
        let mut course = Self {
            points,
            table: Vec::new(),
            length: 0.0,
        };
        course.build_table();
        if !(course.length > 0.0) {
            return Err(ConfigError::DegenerateCourse);
        }
        log::debug!(
            "Course built: {} points, {} breakpoints, length {:.1}",
            course.points.len(),
            course.table.len(),
            course.length
        );
        Ok(course)
    }

    /// A straight course of the given length
    pub fn straight(start: Vec3, direction: Vec3, length: f32) -> Result<Self, ConfigError> {
        let direction = direction.normalize_or_zero();
        Self::new(vec![start, start + direction * length])
    }

    /// Measured length of the course
    #[inline]
    pub fn length(&self) -> f32 {
        self.length
    }

    /// Largest valid input key
    #[inline]
    pub fn max_key(&self) -> f32 {
        (self.points.len() - 1) as f32
    }

    fn build_table(&mut self) {
        let segments = self.points.len() - 1;
        let samples = segments * REPARAM_STEPS_PER_SEGMENT;
        let step = 1.0 / REPARAM_STEPS_PER_SEGMENT as f32;

        let mut table = Vec::with_capacity(samples + 1);
        let mut distance = 0.0;
        let mut previous = self.points[0];
        table.push(ReparamPoint {
            key: 0.0,
            distance: 0.0,
            position: previous,
        });

        for sample in 1..=samples {
            let key_start = (sample - 1) as f32 * step;
            for sub in 1..=LENGTH_SUBSTEPS {
                let key = key_start + step * sub as f32 / LENGTH_SUBSTEPS as f32;
                let point = self.location_at_key(key);
                distance += point.distance(previous);
                previous = point;
            }
            let key = sample as f32 * step;
            table.push(ReparamPoint {
                key,
                distance,
                position: self.location_at_key(key),
            });
        }

        self.table = table;
        self.length = distance;
    }

    /// Segment index and local parameter for a key (clamped to the course)
    fn segment_at(&self, key: f32) -> (usize, f32) {
        let last = self.points.len() - 2;
        let key = key.clamp(0.0, self.max_key());
        let segment = (key.floor() as usize).min(last);
        (segment, key - segment as f32)
    }

    /// Catmull-Rom tangent at a control point (one-sided at the ends)
    fn point_tangent(&self, i: usize) -> Vec3 {
        let n = self.points.len();
        if i == 0 {
            self.points[1] - self.points[0]
        } else if i == n - 1 {
            self.points[n - 1] - self.points[n - 2]
        } else {
            (self.points[i + 1] - self.points[i - 1]) * 0.5
        }
    }

    /// Location at a spline input key
    pub fn location_at_key(&self, key: f32) -> Vec3 {
        let (i, t) = self.segment_at(key);
        let (p0, p1) = (self.points[i], self.points[i + 1]);
        let (m0, m1) = (self.point_tangent(i), self.point_tangent(i + 1));

        let t2 = t * t;
        let t3 = t2 * t;
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;

        p0 * h00 + m0 * h10 + p1 * h01 + m1 * h11
    }

    /// Derivative of location with respect to key
    pub fn tangent_at_key(&self, key: f32) -> Vec3 {
        let (i, t) = self.segment_at(key);
        let (p0, p1) = (self.points[i], self.points[i + 1]);
        let (m0, m1) = (self.point_tangent(i), self.point_tangent(i + 1));

        let t2 = t * t;
        let d00 = 6.0 * t2 - 6.0 * t;
        let d10 = 3.0 * t2 - 4.0 * t + 1.0;
        let d01 = -6.0 * t2 + 6.0 * t;
        let d11 = 3.0 * t2 - 2.0 * t;

        p0 * d00 + m0 * d10 + p1 * d01 + m1 * d11
    }

    /// Convert an input key to distance along the course
    ///
    /// Binary search over the key column, interpolating linearly between the
    /// two bracketing breakpoints. Keys outside the table clamp to its ends.
    pub fn distance_at_key(&self, key: f32) -> f32 {
        let table = &self.table;
        let upper = table.partition_point(|p| key >= p.key);
        if upper == 0 {
            return table[0].distance;
        }
        if upper == table.len() {
            return table[table.len() - 1].distance;
        }

        let (p0, p1) = (table[upper - 1], table[upper]);
        let span = p1.key - p0.key;
        if span <= 0.0 {
            return p0.distance;
        }
        p0.distance + (p1.distance - p0.distance) * (key - p0.key) / span
    }

    /// Convert a distance along the course to an input key
    pub fn key_at_distance(&self, distance: f32) -> f32 {
        let table = &self.table;
        let upper = table.partition_point(|p| distance >= p.distance);
        if upper == 0 {
            return table[0].key;
        }
        if upper == table.len() {
            return table[table.len() - 1].key;
        }

        let (p0, p1) = (table[upper - 1], table[upper]);
        let span = p1.distance - p0.distance;
        if span <= 0.0 {
            return p0.key;
        }
        p0.key + (p1.key - p0.key) * (distance - p0.distance) / span
    }

    fn pose_at_key(&self, key: f32) -> Pose {
        Pose {
            position: self.location_at_key(key),
            rotation: orientation_from_tangent(self.tangent_at_key(key)),
        }
    }

    pub fn start_pose(&self) -> Pose {
        self.pose_at_key(0.0)
    }

    pub fn end_pose(&self) -> Pose {
        self.pose_at_key(self.max_key())
    }

    /// Pose at a distance along the course
    ///
    /// Distances before the start or past the end extrapolate linearly along
    /// the start or end tangent.
    pub fn pose_at_distance(&self, distance: f32) -> Pose {
        if !distance.is_finite() {
            log::warn!("Non-finite course distance {}, using start pose", distance);
            return self.start_pose();
        }
        if distance < 0.0 {
            let start = self.start_pose();
            return Pose {
                position: start.position + start.forward() * distance,
                rotation: start.rotation,
            };
        }
        if distance > self.length {
            let end = self.end_pose();
            return Pose {
                position: end.position + end.forward() * (distance - self.length),
                rotation: end.rotation,
            };
        }
        self.pose_at_key(self.key_at_distance(distance))
    }

    /// Input key of the course location closest to `point`
    pub fn nearest_key(&self, point: Vec3) -> f32 {
        let table = &self.table;
        let mut best = 0;
        let mut best_dist_sq = f32::MAX;
        for (i, sample) in table.iter().enumerate() {
            let dist_sq = sample.position.distance_squared(point);
            if dist_sq < best_dist_sq {
                best_dist_sq = dist_sq;
                best = i;
            }
        }

        let mut lo = table[best.saturating_sub(1)].key;
        let mut hi = table[(best + 1).min(table.len() - 1)].key;
        for _ in 0..REFINE_ITERATIONS {
            let third = (hi - lo) / 3.0;
            let a = lo + third;
            let b = hi - third;
            if self.location_at_key(a).distance_squared(point)
                <= self.location_at_key(b).distance_squared(point)
            {
                hi = b;
            } else {
                lo = a;
            }
        }
        (lo + hi) * 0.5
    }

    /// Distance along the course closest to a world position
    ///
    /// Points beyond either end resolve to that end's key on the curve itself;
    /// those fall back to the signed distance along the end tangent, so points
    /// behind the start stay negative and points past the end exceed `length`.
    pub fn nearest_distance(&self, point: Vec3) -> f32 {
        let key = self.nearest_key(point);
        if key <= END_KEY_EPSILON {
            let start = self.start_pose();
            return (point - start.position).dot(start.forward());
        }
        if key >= self.max_key() - END_KEY_EPSILON {
            let end = self.end_pose();
            return self.length + (point - end.position).dot(end.forward());
        }
        self.distance_at_key(key)
    }
}

impl TryFrom<Vec<Vec3>> for Course {
    type Error = ConfigError;

    fn try_from(points: Vec<Vec3>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<Course> for Vec<Vec3> {
    fn from(course: Course) -> Self {
        course.points
    }
}
