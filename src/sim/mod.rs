//! Deterministic simulation module
//!
//! All runner logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (gates sorted by index)
//! - No rendering or platform dependencies; visuals go through `GateFactory`

pub mod arc;
pub mod curve;
pub mod factory;
pub mod gate;
pub mod judge;
pub mod rules;
pub mod state;
pub mod tick;
pub mod window;

pub use arc::ArcSegment;
pub use curve::{Course, Pose};
pub use factory::{GateFactory, NullFactory, VisualHandle};
pub use gate::{
    AngularOffset, Color, Gate, GateTemplate, MaterialId, MeshId, Obstacle, ObstacleTemplate,
    OffsetMode, PreparedGate, RingKind,
};
pub use judge::{BeatEntry, BeatJudge, BeatSchedule, JudgeConfig, JudgeStats};
pub use rules::{ActiveRule, RuleEngine, SpawnRule};
pub use state::{PlayerState, RngState, RunEvent, RunPhase, RunState};
pub use tick::{TickInput, tick};
pub use window::{WindowConfig, WindowScheduler};
