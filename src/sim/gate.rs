//! Gate templates and live gate entities
//!
//! A `GateTemplate` is the running description the spawn rules mutate; each
//! spawned `Gate` keeps a snapshot of the template it was built from.

use glam::{Vec2, Vec4};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::arc::ArcSegment;
use super::curve::Pose;
use super::factory::VisualHandle;
use crate::consts::*;
use crate::normalize_angle;

/// Opaque handle to a mesh owned by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MeshId(pub u32);

/// Opaque handle to a material owned by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MaterialId(pub u32);

/// Linear RGBA color
pub type Color = Vec4;

/// How the ring mesh is laid out around the circumference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RingKind {
    /// One mesh instance per ring point
    #[default]
    MultipleMesh,
    /// A single mesh scaled to the ring
    SingleMesh,
}

/// How a gate's starting roll angle is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OffsetMode {
    /// Always `value`
    Fixed,
    /// Uniform in `[0, value)` (full circle when `value` is zero)
    #[default]
    Random,
    /// `value * counter`, counter advancing once per gate
    Incremental,
}

/// Starting roll angle of a gate (radians)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngularOffset {
    pub value: f32,
    pub mode: OffsetMode,
    #[serde(default)]
    pub counter: u32,
}

impl Default for AngularOffset {
    fn default() -> Self {
        Self {
            value: std::f32::consts::TAU,
            mode: OffsetMode::Random,
            counter: 0,
        }
    }
}

impl AngularOffset {
    /// Resolve the roll angle for one gate
    pub fn resolve<R: Rng>(&self, rng: &mut R) -> f32 {
        match self.mode {
            OffsetMode::Fixed => self.value,
            OffsetMode::Incremental => normalize_angle(self.value * self.counter as f32),
            OffsetMode::Random => {
                let span = if self.value > 0.0 {
                    self.value
                } else {
                    std::f32::consts::TAU
                };
                rng.random_range(0.0..span)
            }
        }
    }

    /// Step the incremental counter past the gate just materialized
    pub fn advance(&mut self) {
        if self.mode == OffsetMode::Incremental {
            self.counter += 1;
        }
    }
}

/// Obstacle descriptor carried by a template
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObstacleTemplate {
    pub mesh: MeshId,
    pub material: MaterialId,
    pub enabled: bool,
    /// Angular width of the blocked wedge (radians)
    #[serde(default = "default_obstacle_width")]
    pub arc_width: f32,
}

fn default_obstacle_width() -> f32 {
    OBSTACLE_ARC_WIDTH
}

impl Default for ObstacleTemplate {
    fn default() -> Self {
        Self {
            mesh: MeshId::default(),
            material: MaterialId::default(),
            enabled: false,
            arc_width: OBSTACLE_ARC_WIDTH,
        }
    }
}

/// The running description of the next gate to spawn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateTemplate {
    pub radius: f32,
    /// Mesh of the gate (rolled from `mesh_set` when the set is non-empty)
    pub mesh: MeshId,
    /// Meshes a gate picks from at random
    pub mesh_set: Vec<MeshId>,
    pub ring_kind: RingKind,
    pub color: Color,
    /// Rotation speed range (degrees per second)
    pub rotation_speed_range: (f32, f32),
    /// Rolled speeds with a magnitude below this are rerolled
    pub reroll_threshold: f32,
    pub angular_offset: AngularOffset,
    pub obstacle: ObstacleTemplate,
}

impl Default for GateTemplate {
    fn default() -> Self {
        Self {
            radius: RING_RADIUS,
            mesh: MeshId::default(),
            mesh_set: Vec::new(),
            ring_kind: RingKind::default(),
            color: Vec4::ONE,
            rotation_speed_range: (ROTATE_SPEED_MIN, ROTATE_SPEED_MAX),
            reroll_threshold: ROTATE_SPEED_REROLL_ZONE,
            angular_offset: AngularOffset::default(),
            obstacle: ObstacleTemplate::default(),
        }
    }
}

/// Attempts before giving up on escaping the reroll zone
const MAX_REROLLS: u32 = 32;

impl GateTemplate {
    /// Pick this gate's mesh from the mesh set
    pub fn roll_mesh<R: Rng>(&self, rng: &mut R) -> MeshId {
        match self.mesh_set.as_slice() {
            [] => self.mesh,
            [only] => *only,
            set => set[rng.random_range(0..set.len())],
        }
    }

    /// Roll a rotation speed, rerolling values inside the dead zone around zero
    pub fn roll_rotation_speed<R: Rng>(&self, rng: &mut R) -> f32 {
        let (min, max) = self.rotation_speed_range;
        let (min, max) = (min.min(max), min.max(max));
        let zone = self.reroll_threshold.abs();
        // Bound farthest from zero: the fallback when the zone can't be escaped
        let widest = if max.abs() >= min.abs() { max } else { min };

        if max - min <= f32::EPSILON {
            return min;
        }
        for _ in 0..MAX_REROLLS {
            let speed = rng.random_range(min..=max);
            if speed.abs() >= zone {
                return speed;
            }
        }
        widest
    }
}

/// An obstacle attached to a live gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    pub mesh: MeshId,
    pub material: MaterialId,
    /// Blocked wedge in the gate's (rotating) polar space
    pub arc: ArcSegment,
    /// Set once the player has run into it
    pub struck: bool,
}

/// A live gate instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gate {
    pub index: i64,
    /// Distance along the course
    pub distance: f32,
    pub pose: Pose,
    pub radius: f32,
    /// Degrees per second
    pub rotation_speed: f32,
    /// Current roll around the course tangent (radians)
    pub rotation: f32,
    pub opacity: f32,
    pub template: GateTemplate,
    pub obstacle: Option<Obstacle>,
    pub visual: VisualHandle,
}

impl Gate {
    pub fn new(
        index: i64,
        distance: f32,
        pose: Pose,
        prepared: &PreparedGate,
        visual: VisualHandle,
    ) -> Self {
        let template = prepared.template.clone();
        let obstacle = template.obstacle.enabled.then(|| Obstacle {
            mesh: template.obstacle.mesh,
            material: template.obstacle.material,
            arc: ArcSegment::wedge(
                template.radius,
                prepared.angular_offset,
                template.obstacle.arc_width,
            ),
            struck: false,
        });
        Self {
            index,
            distance,
            pose,
            radius: template.radius,
            rotation_speed: prepared.rotation_speed,
            rotation: prepared.angular_offset,
            opacity: 0.0,
            template,
            obstacle,
            visual,
        }
    }

    /// Spin the gate by its rotation speed * dt
    pub fn rotate(&mut self, dt: f32) {
        if self.rotation_speed == 0.0 {
            return;
        }
        let delta = self.rotation_speed.to_radians() * dt;
        self.rotation = normalize_angle(self.rotation + delta);
        if let Some(obstacle) = &mut self.obstacle {
            obstacle.arc.rotate(delta);
        }
    }

    /// Update opacity, returning true when the value actually changed
    pub fn set_opacity(&mut self, opacity: f32) -> bool {
        let opacity = opacity.clamp(0.0, 1.0);
        if (self.opacity - opacity).abs() <= 1e-4 {
            return false;
        }
        self.opacity = opacity;
        true
    }

    /// Test a player crossing this gate's plane at `lateral`
    ///
    /// Returns true the first time the crossing lands inside the obstacle.
    pub fn strike_obstacle(&mut self, lateral: Vec2) -> bool {
        match &mut self.obstacle {
            Some(obstacle) if !obstacle.struck && obstacle.arc.contains_point(lateral) => {
                obstacle.struck = true;
                true
            }
            _ => false,
        }
    }
}

/// A materialized template with its per-gate random rolls resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedGate {
    pub template: GateTemplate,
    pub angular_offset: f32,
    pub rotation_speed: f32,
}
