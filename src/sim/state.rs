//! Run state and core simulation types
//!
//! Everything a run needs between ticks lives here: the player, the gate
//! window, the beat judge and the outbound event queue.

use glam::{Vec2, Vec3};
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::curve::{Course, Pose};
use super::factory::GateFactory;
use super::judge::{BeatJudge, BeatSchedule};
use super::rules::RuleEngine;
use super::window::WindowScheduler;
use crate::settings::Settings;

/// Notifications for the host, drained once per tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunEvent {
    /// Action landed on beat gate `i`
    BeatSuccess(i64),
    /// A fail got through immunity; `None` when no specific beat caused it
    BeatFail(Option<i64>),
    /// The player crossed gate `i` inside its obstacle
    ObstacleHit(i64),
    CourseCompleted,
    GateSpawned(i64),
    GateDestroyed(i64),
}

/// Current phase of the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunPhase {
    #[default]
    Running,
    Paused,
    /// The end of the course was reached
    Completed,
}

/// The player's progress along the course
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Distance along the course (negative before the start)
    pub distance: f32,
    /// Distance at the previous tick, for gate-plane crossings
    pub previous_distance: f32,
    /// Offset from the centerline in the course frame (x = right, y = up)
    pub lateral: Vec2,
    /// Forward speed (units per second)
    pub speed: f32,
}

impl PlayerState {
    pub fn new(speed: f32) -> Self {
        Self {
            distance: 0.0,
            previous_distance: 0.0,
            lateral: Vec2::ZERO,
            speed,
        }
    }

    /// Move to `distance`, remembering where the player was
    pub fn move_to(&mut self, distance: f32) {
        self.previous_distance = self.distance;
        self.distance = distance;
    }
}

/// RNG state wrapper for serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngState {
    pub seed: u64,
}

impl RngState {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn to_rng(&self) -> Pcg32 {
        Pcg32::seed_from_u64(self.seed)
    }
}

/// Complete run state
#[derive(Debug)]
pub struct RunState {
    pub settings: Settings,
    pub phase: RunPhase,
    pub player: PlayerState,
    /// Simulation tick counter
    pub time_ticks: u64,
    pub(crate) beats: BeatSchedule,
    pub(crate) scheduler: WindowScheduler,
    pub(crate) judge: BeatJudge,
    pub(crate) events: Vec<RunEvent>,
}

impl RunState {
    /// Build a run over `course`
    ///
    /// Invalid settings are logged and leave the run inert: the player can
    /// still move, but no gates spawn.
    pub fn new(settings: Settings, course: Course) -> Self {
        let validation = settings.validate();
        if let Err(err) = &validation {
            log::error!("Invalid run settings, gate spawning disabled: {}", err);
        }

        let beats = match BeatSchedule::new(settings.beats.clone()) {
            Ok(beats) => beats,
            Err(err) => {
                log::error!("Invalid beat schedule, beats ignored: {}", err);
                BeatSchedule::default()
            }
        };

        let mut scheduler = WindowScheduler::new(
            settings.window_config(),
            course,
            Self::build_rules(&settings),
            RngState::new(settings.seed),
        );
        if validation.is_err() {
            scheduler.disable();
        }

        log::info!(
            "Run created: seed {}, course length {:.0}, {} beats",
            settings.seed,
            scheduler.course().length(),
            beats.len()
        );

        Self {
            phase: RunPhase::Running,
            player: PlayerState::new(settings.player_speed),
            time_ticks: 0,
            judge: BeatJudge::new(settings.judge_config()),
            beats,
            scheduler,
            events: Vec::new(),
            settings,
        }
    }

    fn build_rules(settings: &Settings) -> RuleEngine {
        let mut rules = RuleEngine::new(settings.base_template());
        settings.register_rules(&mut rules);
        rules
    }

    pub fn course(&self) -> &Course {
        self.scheduler.course()
    }

    pub fn scheduler(&self) -> &WindowScheduler {
        &self.scheduler
    }

    pub fn judge(&self) -> &BeatJudge {
        &self.judge
    }

    pub fn beats(&self) -> &BeatSchedule {
        &self.beats
    }

    /// Events queued since the last drain
    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<RunEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn is_completed(&self) -> bool {
        self.scheduler.is_completed()
    }

    /// Project a raw world position onto the course and move the player there
    pub fn track_position(&mut self, position: Vec3) -> f32 {
        let distance = self.course().nearest_distance(position);
        self.player.move_to(distance);
        distance
    }

    /// Refresh the gate window around the player
    pub fn update_window(&mut self, factory: &mut dyn GateFactory) {
        self.scheduler
            .update(self.player.distance, &self.beats, factory, &mut self.events);
    }

    /// Judge a player action at the current distance
    pub fn register_action(&mut self) {
        self.judge
            .register_action(self.player.distance, &self.beats, &mut self.events);
    }

    /// Largest lateral offset allowed at the player's distance
    pub fn lateral_limit(&self) -> f32 {
        let radius = self.scheduler.interpolated_radius(self.player.distance);
        (radius - self.settings.lateral_shrink).max(0.0)
    }

    /// Set the lateral offset, clamped inside the surrounding gates
    pub fn set_lateral(&mut self, lateral: Vec2) {
        self.player.lateral = lateral.clamp_length_max(self.lateral_limit());
    }

    /// Course pose under the player
    pub fn player_pose(&self) -> Pose {
        self.course().pose_at_distance(self.player.distance)
    }

    /// Player position in world space
    pub fn player_world_position(&self) -> Vec3 {
        self.player_pose().offset(self.player.lateral)
    }

    /// Destroy and rebuild the gate window at the current distance
    pub fn regenerate(&mut self, factory: &mut dyn GateFactory) {
        self.scheduler
            .regenerate(self.player.distance, &self.beats, factory, &mut self.events);
    }

    /// Destroy every live gate
    pub fn clear_gates(&mut self, factory: &mut dyn GateFactory) {
        self.scheduler.clear(factory, &mut self.events);
    }

    /// Start the run over from the beginning of the course
    pub fn restart(&mut self, factory: &mut dyn GateFactory) {
        log::info!("Restarting run (seed {})", self.settings.seed);
        let rules = Self::build_rules(&self.settings);
        self.scheduler.reset(rules, factory, &mut self.events);
        self.judge = BeatJudge::new(self.settings.judge_config());
        self.player = PlayerState::new(self.settings.player_speed);
        self.phase = RunPhase::Running;
        self.time_ticks = 0;
    }
}
