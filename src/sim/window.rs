//! Sliding window of live gates around the player
//!
//! Each update recomputes the index range that should exist for the player's
//! distance, destroys gates that fell out of it, and spawns the missing ones
//! so the live set stays contiguous. Templates are materialized strictly in
//! index order and cached, so a gate spawned again (after `regenerate`, or
//! when the player moves back) looks exactly like the first time.

use rand::Rng;
use rand_pcg::Pcg32;

use super::curve::Course;
use super::factory::GateFactory;
use super::gate::{Gate, PreparedGate};
use super::judge::BeatSchedule;
use super::rules::RuleEngine;
use super::state::{RngState, RunEvent};

/// Window layout tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowConfig {
    pub ring_spacing: f32,
    /// How far ahead gates appear (and fade in over)
    pub fade_distance: f32,
    /// How far behind the player gates survive
    pub appear_tolerance: f32,
    /// Shifts the fade curve toward the player
    pub fade_tolerance: f32,
    pub obstacle_chance: f32,
    pub obstacles_disabled: bool,
}

/// Owns the course, the rule engine and every live gate
#[derive(Debug)]
pub struct WindowScheduler {
    config: WindowConfig,
    course: Course,
    rules: RuleEngine,
    rng: Pcg32,
    rng_state: RngState,
    /// Live gates sorted by index
    gates: Vec<Gate>,
    /// Materialized gates by index
    prepared: Vec<PreparedGate>,
    enabled: bool,
    completed: bool,
    current_pct: f32,
}

impl WindowScheduler {
    pub fn new(
        config: WindowConfig,
        course: Course,
        rules: RuleEngine,
        rng_state: RngState,
    ) -> Self {
        let mut scheduler = Self {
            config,
            course,
            rules,
            rng: rng_state.to_rng(),
            rng_state,
            gates: Vec::new(),
            prepared: Vec::new(),
            enabled: true,
            completed: false,
            current_pct: 0.0,
        };
        if !(config.ring_spacing > 0.0) {
            log::error!(
                "Ring spacing {} is not positive, gate spawning disabled",
                config.ring_spacing
            );
            scheduler.enabled = false;
        }
        if !(config.fade_distance >= 0.0) {
            log::error!(
                "Fade distance {} is negative, gate spawning disabled",
                config.fade_distance
            );
            scheduler.enabled = false;
        }
        scheduler
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn course(&self) -> &Course {
        &self.course
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut RuleEngine {
        &mut self.rules
    }

    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    pub fn gate(&self, index: i64) -> Option<&Gate> {
        self.position_of(index).ok().map(|i| &self.gates[i])
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Stop spawning (configuration error found after construction)
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Fraction of the course covered at the last update
    pub fn current_pct(&self) -> f32 {
        self.current_pct
    }

    /// Highest gate index that fits on the course
    pub fn max_rings(&self) -> i64 {
        (self.course.length() / self.config.ring_spacing).floor() as i64
    }

    /// Inclusive index range that should be live at `distance`
    pub fn window_range(&self, distance: f32) -> (i64, i64) {
        let spacing = self.config.ring_spacing;
        let max_rings = self.max_rings();
        let min_ring = ((distance - self.config.appear_tolerance) / spacing).floor() as i64;
        let max_ring = ((distance + self.config.fade_distance) / spacing).ceil() as i64 + 1;
        (min_ring.clamp(0, max_rings), max_ring.clamp(0, max_rings))
    }

    fn position_of(&self, index: i64) -> Result<usize, usize> {
        self.gates.binary_search_by_key(&index, |g| g.index)
    }

    /// Advance the window for the player at `distance`
    pub fn update(
        &mut self,
        distance: f32,
        beats: &BeatSchedule,
        factory: &mut dyn GateFactory,
        events: &mut Vec<RunEvent>,
    ) {
        if !self.enabled {
            return;
        }
        let length = self.course.length();
        if !(length > 0.0) || !distance.is_finite() {
            debug_assert!(length > 0.0, "course length must be positive");
            log::warn!("Skipping window update (length {}, distance {})", length, distance);
            return;
        }

        self.current_pct = distance / length;
        if self.current_pct >= 1.0 && !self.completed {
            self.completed = true;
            log::info!("Course completed at distance {:.0}", distance);
            events.push(RunEvent::CourseCompleted);
        }

        let (min_ring, max_ring) = self.window_range(distance);
        self.destroy_outside(min_ring, max_ring, factory, events);
        self.refresh_opacity(factory);

        if !self.completed {
            self.spawn_missing(min_ring, max_ring, beats, factory, events);
        }
    }

    fn destroy_outside(
        &mut self,
        min_ring: i64,
        max_ring: i64,
        factory: &mut dyn GateFactory,
        events: &mut Vec<RunEvent>,
    ) {
        self.gates.retain(|gate| {
            if (min_ring..=max_ring).contains(&gate.index) {
                return true;
            }
            log::debug!("Destroying gate {}", gate.index);
            factory.destroy(gate.visual);
            events.push(RunEvent::GateDestroyed(gate.index));
            false
        });
    }

    fn refresh_opacity(&mut self, factory: &mut dyn GateFactory) {
        let length = self.course.length();
        let fade_pct = self.config.fade_distance / length;
        for gate in &mut self.gates {
            let opacity = if fade_pct > 0.0 {
                let gate_distance = gate.index as f32 * self.config.ring_spacing;
                let gate_pct = (gate_distance - self.config.fade_tolerance) / length;
                1.0 - ((gate_pct - self.current_pct) / fade_pct).clamp(0.0, 1.0)
            } else {
                1.0
            };
            if gate.set_opacity(opacity) {
                factory.set_opacity(gate.visual, gate.opacity);
            }
        }
    }

    /// Spawn every missing index in range without leaving a gap in the live set
    fn spawn_missing(
        &mut self,
        min_ring: i64,
        max_ring: i64,
        beats: &BeatSchedule,
        factory: &mut dyn GateFactory,
        events: &mut Vec<RunEvent>,
    ) {
        let live = self.gates.first().map(|g| g.index).zip(self.gates.last().map(|g| g.index));
        match live {
            None => {
                for i in min_ring..=max_ring {
                    self.spawn_gate(i, beats, factory, events);
                }
            }
            Some((lo, hi)) => {
                for i in (min_ring..lo).rev() {
                    self.spawn_gate(i, beats, factory, events);
                }
                for i in (hi + 1)..=max_ring {
                    self.spawn_gate(i, beats, factory, events);
                }
            }
        }
    }

    fn spawn_gate(
        &mut self,
        index: i64,
        beats: &BeatSchedule,
        factory: &mut dyn GateFactory,
        events: &mut Vec<RunEvent>,
    ) {
        let Err(insert_at) = self.position_of(index) else {
            return;
        };
        let prepared = self.prepare(index, beats).clone();
        let distance = index as f32 * self.config.ring_spacing;
        let pose = self.course.pose_at_distance(distance);
        let visual = factory.spawn(index, &prepared.template, &pose);
        let gate = Gate::new(index, distance, pose, &prepared, visual);
        factory.set_roll(visual, gate.rotation);

        log::debug!(
            "Spawned gate {} (radius {:.0}, speed {:.1}, obstacle {})",
            index,
            gate.radius,
            gate.rotation_speed,
            gate.obstacle.is_some()
        );
        self.gates.insert(insert_at, gate);
        events.push(RunEvent::GateSpawned(index));
    }

    /// Materialize templates in order up to `index`
    fn prepare(&mut self, index: i64, beats: &BeatSchedule) -> &PreparedGate {
        while self.prepared.len() as i64 <= index {
            let next = self.prepared.len() as i64;
            if next == 0 {
                self.inject_beat_rules(0, beats);
            }
            self.inject_beat_rules(next + 1, beats);

            let mut template = self.rules.materialize_template(next - 1);
            template.mesh = template.roll_mesh(&mut self.rng);
            let angular_offset = template.angular_offset.resolve(&mut self.rng);
            let rotation_speed = template.roll_rotation_speed(&mut self.rng);
            self.prepared.push(PreparedGate {
                template,
                angular_offset,
                rotation_speed,
            });
        }
        &self.prepared[index as usize]
    }

    /// Queue the single-gate visuals of beat gate `index`, if it is one
    fn inject_beat_rules(&mut self, index: i64, beats: &BeatSchedule) {
        let Some(beat) = beats.entry(index) else {
            return;
        };
        if let Some(mesh) = beat.mesh {
            let kind = self.rules.template().ring_kind;
            self.rules.set_mesh(index, mesh, kind, true);
        }
        if let Some(color) = beat.color {
            self.rules.set_color(index, color, true);
        }
        if let Some(obstacle) = beat.obstacle {
            if self.config.obstacles_disabled {
                return;
            }
            let chance = f64::from(self.config.obstacle_chance.clamp(0.0, 1.0));
            if self.rng.random_bool(chance) {
                self.rules.add_obstacle(index, obstacle);
            }
        }
    }

    /// Spin every live gate by its rotation speed
    pub fn rotate_gates(&mut self, dt: f32, factory: &mut dyn GateFactory) {
        for gate in &mut self.gates {
            if gate.rotation_speed != 0.0 {
                gate.rotate(dt);
                factory.set_roll(gate.visual, gate.rotation);
            }
        }
    }

    /// Gates whose plane the player crossed between two distances, hitting an obstacle
    ///
    /// `include_from` also counts a gate sitting exactly at `from`, for the first
    /// step of a run where the player starts on gate 0.
    pub fn check_obstacles(
        &mut self,
        from: f32,
        to: f32,
        lateral: glam::Vec2,
        include_from: bool,
    ) -> Vec<i64> {
        let mut hits = Vec::new();
        for gate in &mut self.gates {
            let past_from = gate.distance > from || (include_from && gate.distance == from);
            if past_from && gate.distance <= to && gate.strike_obstacle(lateral) {
                log::debug!("Obstacle struck on gate {}", gate.index);
                hits.push(gate.index);
            }
        }
        hits
    }

    /// Gate radius at `distance`, interpolated between the bracketing live gates
    pub fn interpolated_radius(&self, distance: f32) -> f32 {
        let spacing = self.config.ring_spacing;
        let fallback = self.rules.template().radius;
        if !(spacing > 0.0) {
            return fallback;
        }
        let below = (distance / spacing).floor() as i64;
        let t = (distance / spacing - below as f32).clamp(0.0, 1.0);
        match (self.gate(below), self.gate(below + 1)) {
            (Some(a), Some(b)) => a.radius + (b.radius - a.radius) * t,
            (Some(a), None) => a.radius,
            (None, Some(b)) => b.radius,
            (None, None) => fallback,
        }
    }

    /// Destroy every live gate
    pub fn clear(&mut self, factory: &mut dyn GateFactory, events: &mut Vec<RunEvent>) {
        for gate in self.gates.drain(..) {
            factory.destroy(gate.visual);
            events.push(RunEvent::GateDestroyed(gate.index));
        }
        log::info!("Gates cleared");
    }

    /// Destroy and rebuild the window for `distance`
    pub fn regenerate(
        &mut self,
        distance: f32,
        beats: &BeatSchedule,
        factory: &mut dyn GateFactory,
        events: &mut Vec<RunEvent>,
    ) {
        self.clear(factory, events);
        self.update(distance, beats, factory, events);
    }

    /// Forget every materialized template and reseed (rules must be registered again)
    pub fn reset(
        &mut self,
        rules: RuleEngine,
        factory: &mut dyn GateFactory,
        events: &mut Vec<RunEvent>,
    ) {
        self.clear(factory, events);
        self.rules = rules;
        self.prepared.clear();
        self.rng = self.rng_state.to_rng();
        self.completed = false;
        self.current_pct = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::factory::{NullFactory, VisualHandle};
    use crate::sim::gate::{GateTemplate, MeshId, ObstacleTemplate};
    use crate::sim::judge::BeatEntry;
    use crate::sim::curve::Pose;
    use glam::{Vec2, Vec3};
    use proptest::prelude::*;

    fn config() -> WindowConfig {
        WindowConfig {
            ring_spacing: 500.0,
            fade_distance: 2000.0,
            appear_tolerance: 1000.0,
            fade_tolerance: 0.0,
            obstacle_chance: 1.0,
            obstacles_disabled: false,
        }
    }

    fn scheduler(config: WindowConfig) -> WindowScheduler {
        let course = Course::straight(Vec3::ZERO, Vec3::X, 20_000.0).unwrap();
        let rules = RuleEngine::new(GateTemplate::default());
        WindowScheduler::new(config, course, rules, RngState::new(42))
    }

    fn live(s: &WindowScheduler) -> Vec<i64> {
        s.gates().iter().map(|g| g.index).collect()
    }

    /// Factory that records every call
    #[derive(Default)]
    struct RecordingFactory {
        spawned: Vec<i64>,
        destroyed: Vec<VisualHandle>,
        next: u64,
    }

    impl GateFactory for RecordingFactory {
        fn spawn(&mut self, index: i64, _template: &GateTemplate, _pose: &Pose) -> VisualHandle {
            self.spawned.push(index);
            self.next += 1;
            VisualHandle(self.next)
        }

        fn destroy(&mut self, handle: VisualHandle) {
            self.destroyed.push(handle);
        }
    }

    #[test]
    fn test_initial_window() {
        let mut s = scheduler(config());
        let mut factory = RecordingFactory::default();
        let mut events = Vec::new();
        s.update(0.0, &BeatSchedule::default(), &mut factory, &mut events);

        // min = floor(-1000/500) -> 0, max = ceil(2000/500) + 1 = 5
        assert_eq!(live(&s), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(factory.spawned, vec![0, 1, 2, 3, 4, 5]);
        assert!(events.contains(&RunEvent::GateSpawned(5)));
    }

    #[test]
    fn test_window_slides_forward() {
        let mut s = scheduler(config());
        let mut factory = RecordingFactory::default();
        let mut events = Vec::new();
        let beats = BeatSchedule::default();
        s.update(0.0, &beats, &mut factory, &mut events);
        s.update(2600.0, &beats, &mut factory, &mut events);

        // min = floor(1600/500) = 3, max = ceil(4600/500) + 1 = 11
        assert_eq!(live(&s), (3..=11).collect::<Vec<_>>());
        assert_eq!(factory.destroyed.len(), 3);
        assert!(events.contains(&RunEvent::GateDestroyed(0)));
    }

    #[test]
    fn test_opacity_fades_in_ahead() {
        let mut s = scheduler(config());
        let mut factory = NullFactory::default();
        let mut events = Vec::new();
        s.update(1000.0, &BeatSchedule::default(), &mut factory, &mut events);
        // Spawned this update; opacity settles on the next one
        s.update(1000.0, &BeatSchedule::default(), &mut factory, &mut events);

        assert_eq!(s.gate(1).unwrap().opacity, 1.0);
        assert_eq!(s.gate(2).unwrap().opacity, 1.0);
        let mid = s.gate(4).unwrap().opacity;
        assert!((mid - 0.5).abs() < 1e-4, "got {}", mid);
        assert_eq!(s.gate(6).unwrap().opacity, 0.0);
    }

    #[test]
    fn test_completion_fires_once_and_stops_spawning() {
        let mut s = scheduler(config());
        let mut factory = NullFactory::default();
        let mut events = Vec::new();
        let beats = BeatSchedule::default();

        for step in 0..500 {
            s.update(step as f32 * 100.0, &beats, &mut factory, &mut events);
        }
        let completions = events.iter().filter(|e| **e == RunEvent::CourseCompleted).count();
        assert_eq!(completions, 1);
        assert!(s.is_completed());
        assert!(live(&s).iter().all(|&i| i <= s.max_rings()));
    }

    #[test]
    fn test_disabled_on_bad_spacing() {
        let mut s = scheduler(WindowConfig {
            ring_spacing: 0.0,
            ..config()
        });
        let mut factory = NullFactory::default();
        let mut events = Vec::new();
        s.update(0.0, &BeatSchedule::default(), &mut factory, &mut events);
        assert!(!s.is_enabled());
        assert!(s.gates().is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn test_beat_gate_gets_single_gate_visuals() {
        let mut s = scheduler(config());
        let mut factory = NullFactory::default();
        let mut events = Vec::new();
        let beats = BeatSchedule::new(vec![BeatEntry {
            index: 3,
            mesh: Some(MeshId(7)),
            color: None,
            obstacle: Some(ObstacleTemplate::default()),
        }])
        .unwrap();
        s.update(0.0, &beats, &mut factory, &mut events);

        assert_eq!(s.gate(3).unwrap().template.mesh, MeshId(7));
        assert!(s.gate(3).unwrap().obstacle.is_some());
        for i in [2, 4] {
            assert_eq!(s.gate(i).unwrap().template.mesh, MeshId(0));
            assert!(s.gate(i).unwrap().obstacle.is_none());
        }
    }

    #[test]
    fn test_obstacles_disabled() {
        let mut s = scheduler(WindowConfig {
            obstacles_disabled: true,
            ..config()
        });
        let mut factory = NullFactory::default();
        let mut events = Vec::new();
        let beats = BeatSchedule::new(vec![BeatEntry {
            index: 2,
            mesh: None,
            color: None,
            obstacle: Some(ObstacleTemplate::default()),
        }])
        .unwrap();
        s.update(0.0, &beats, &mut factory, &mut events);
        assert!(s.gate(2).unwrap().obstacle.is_none());
    }

    #[test]
    fn test_rule_on_first_beat_gate() {
        let mut s = scheduler(config());
        let mut factory = NullFactory::default();
        let mut events = Vec::new();
        let beats = BeatSchedule::new(vec![BeatEntry {
            index: 0,
            mesh: Some(MeshId(5)),
            color: None,
            obstacle: None,
        }])
        .unwrap();
        s.update(0.0, &beats, &mut factory, &mut events);
        assert_eq!(s.gate(0).unwrap().template.mesh, MeshId(5));
        assert_eq!(s.gate(1).unwrap().template.mesh, MeshId(0));
    }

    #[test]
    fn test_regenerate_rebuilds_identical_window() {
        let mut s = scheduler(config());
        let mut factory = NullFactory::default();
        let mut events = Vec::new();
        let beats = BeatSchedule::default();
        s.update(3000.0, &beats, &mut factory, &mut events);
        let snapshot = |s: &WindowScheduler| -> Vec<_> {
            s.gates()
                .iter()
                .map(|g| (g.index, g.template.mesh, g.rotation_speed, g.rotation))
                .collect()
        };
        let before = snapshot(&s);

        s.regenerate(3000.0, &beats, &mut factory, &mut events);
        let after = snapshot(&s);
        assert_eq!(before, after);
        assert_eq!(factory.live(), s.gates().len());
    }

    #[test]
    fn test_moving_back_respawns_behind() {
        let mut s = scheduler(config());
        let mut factory = NullFactory::default();
        let mut events = Vec::new();
        let beats = BeatSchedule::default();
        s.update(5000.0, &beats, &mut factory, &mut events);
        s.update(4000.0, &beats, &mut factory, &mut events);
        assert_eq!(live(&s), (6..=13).collect::<Vec<_>>());
    }

    #[test]
    fn test_interpolated_radius() {
        let mut s = scheduler(config());
        s.rules_mut().set_radius(3, 1000.0, 0);
        let mut factory = NullFactory::default();
        let mut events = Vec::new();
        s.update(0.0, &BeatSchedule::default(), &mut factory, &mut events);

        assert_eq!(s.interpolated_radius(500.0), 500.0);
        assert!((s.interpolated_radius(1250.0) - 750.0).abs() < 1e-3);
        assert_eq!(s.interpolated_radius(1500.0), 1000.0);
    }

    #[test]
    fn test_crossing_obstacle_reports_hit() {
        let mut s = scheduler(config());
        s.rules_mut().add_obstacle(2, ObstacleTemplate::default());
        s.rules_mut().set_offset(0, 0.0, crate::sim::gate::OffsetMode::Fixed);
        let mut factory = NullFactory::default();
        let mut events = Vec::new();
        s.update(0.0, &BeatSchedule::default(), &mut factory, &mut events);

        let lateral = Vec2::new(100.0, 0.0);
        assert!(s.check_obstacles(900.0, 990.0, lateral, false).is_empty());
        assert_eq!(s.check_obstacles(990.0, 1010.0, lateral, false), vec![2]);
        assert!(s.check_obstacles(990.0, 1010.0, lateral, false).is_empty());
    }

    #[test]
    fn test_obstacle_at_start_needs_inclusive_bound() {
        let mut s = scheduler(config());
        s.rules_mut().add_obstacle(0, ObstacleTemplate::default());
        s.rules_mut().set_offset(0, 0.0, crate::sim::gate::OffsetMode::Fixed);
        let mut factory = NullFactory::default();
        let mut events = Vec::new();
        s.update(0.0, &BeatSchedule::default(), &mut factory, &mut events);

        let lateral = Vec2::new(100.0, 0.0);
        assert!(s.check_obstacles(0.0, 25.0, lateral, false).is_empty());
        assert_eq!(s.check_obstacles(0.0, 25.0, lateral, true), vec![0]);
    }

    #[test]
    fn test_gates_roll_meshes_from_set() {
        let set = vec![MeshId(1), MeshId(2), MeshId(3)];
        let course = Course::straight(Vec3::ZERO, Vec3::X, 20_000.0).unwrap();
        let rules = RuleEngine::new(GateTemplate {
            mesh: MeshId(1),
            mesh_set: set.clone(),
            ..Default::default()
        });
        let mut s = WindowScheduler::new(config(), course, rules, RngState::new(42));
        let mut factory = NullFactory::default();
        let mut events = Vec::new();
        let beats = BeatSchedule::default();

        let mut seen = Vec::new();
        let mut distance = 0.0;
        while distance < 15_000.0 {
            s.update(distance, &beats, &mut factory, &mut events);
            seen.extend(s.gates().iter().map(|g| g.template.mesh));
            distance += 500.0;
        }
        assert!(seen.iter().all(|m| set.contains(m)));
        assert!(set.iter().filter(|m| seen.contains(m)).count() > 1);
    }

    proptest! {
        #[test]
        fn prop_live_set_matches_window(steps in proptest::collection::vec(0.0f32..1500.0, 1..40)) {
            let mut s = scheduler(config());
            let mut factory = NullFactory::default();
            let mut events = Vec::new();
            let beats = BeatSchedule::default();
            let mut distance = 0.0;
            for step in steps {
                distance += step;
                s.update(distance, &beats, &mut factory, &mut events);
                if s.is_completed() {
                    break;
                }
                let (min_ring, max_ring) = s.window_range(distance);
                prop_assert_eq!(live(&s), (min_ring..=max_ring).collect::<Vec<_>>());
                prop_assert_eq!(factory.live(), s.gates().len());
            }
        }
    }
}
