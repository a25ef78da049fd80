//! Spawn rules: ordered, self-retiring mutations of the gate template
//!
//! Rules are registered against the gate they should first affect and stored
//! one slot early. Materializing a slot activates every pending rule keyed at
//! or before it, then runs all active rules in registration order against the
//! shared running template. A rule that reports completion is retired after
//! it runs on that same call.

use std::collections::BTreeMap;
use std::f32::consts::FRAC_PI_2;

use serde::{Deserialize, Serialize};

use super::gate::{Color, GateTemplate, MeshId, ObstacleTemplate, OffsetMode, RingKind};

/// A single template mutation with its own persistent state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpawnRule {
    /// Ease the radius to `radius` over `transition_rings` gates
    RadiusTransition {
        radius: f32,
        transition_rings: u32,
        #[serde(skip)]
        from: Option<f32>,
    },
    /// Replace the ring mesh (and the set it is rolled from), for one gate or from here on
    MeshSwap {
        mesh: MeshId,
        kind: RingKind,
        single_gate: bool,
        #[serde(skip)]
        previous: Option<(MeshId, Vec<MeshId>, RingKind)>,
    },
    /// Replace the ring color, for one gate or from here on
    ColorSwap {
        color: Color,
        single_gate: bool,
        #[serde(skip)]
        previous: Option<Color>,
    },
    /// Change how each gate's starting roll is chosen
    OffsetPattern { value: f32, mode: OffsetMode },
    /// Change the rotation speed profile
    RotationProfile {
        min: f32,
        max: f32,
        reroll_threshold: f32,
    },
    /// Put an obstacle on exactly one gate
    ObstacleInject {
        obstacle: ObstacleTemplate,
        #[serde(skip)]
        previous: Option<ObstacleTemplate>,
    },
}

impl SpawnRule {
    /// Apply the rule for its `invocations`-th time; true when it is done
    pub fn apply(&mut self, template: &mut GateTemplate, invocations: u32) -> bool {
        let first = invocations <= 1;
        match self {
            SpawnRule::RadiusTransition {
                radius,
                transition_rings,
                from,
            } => {
                if first || from.is_none() {
                    *from = Some(template.radius);
                }
                let start = from.unwrap_or(template.radius);
                let p = (invocations as f32 / (*transition_rings + 1) as f32).clamp(0.0, 1.0);
                template.radius = if p >= 1.0 {
                    *radius
                } else {
                    start + (*radius - start) * (p * FRAC_PI_2).sin()
                };
                invocations > *transition_rings
            }
            SpawnRule::MeshSwap {
                mesh,
                kind,
                single_gate,
                previous,
            } => {
                if first && *single_gate {
                    let old_set = std::mem::take(&mut template.mesh_set);
                    *previous = Some((template.mesh, old_set, template.ring_kind));
                }
                if first {
                    template.mesh = *mesh;
                    template.mesh_set = vec![*mesh];
                    template.ring_kind = *kind;
                    return !*single_gate;
                }
                if let Some((old_mesh, old_set, old_kind)) = previous.take() {
                    template.mesh = old_mesh;
                    template.mesh_set = old_set;
                    template.ring_kind = old_kind;
                }
                true
            }
            SpawnRule::ColorSwap {
                color,
                single_gate,
                previous,
            } => {
                if !*single_gate {
                    template.color = *color;
                    return true;
                }
                if first {
                    *previous = Some(template.color);
                    template.color = *color;
                    return false;
                }
                if let Some(old) = previous.take() {
                    template.color = old;
                }
                true
            }
            SpawnRule::OffsetPattern { value, mode } => {
                template.angular_offset.value = *value;
                template.angular_offset.mode = *mode;
                template.angular_offset.counter = 0;
                true
            }
            SpawnRule::RotationProfile {
                min,
                max,
                reroll_threshold,
            } => {
                template.rotation_speed_range = (*min, *max);
                template.reroll_threshold = *reroll_threshold;
                true
            }
            SpawnRule::ObstacleInject { obstacle, previous } => {
                if first {
                    *previous = Some(template.obstacle);
                    template.obstacle = ObstacleTemplate {
                        enabled: true,
                        ..*obstacle
                    };
                    return false;
                }
                if let Some(old) = previous.take() {
                    template.obstacle = old;
                }
                true
            }
        }
    }
}

/// A rule that has been activated and is being replayed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveRule {
    /// Slot the rule was stored under (target gate - 1)
    pub slot: i64,
    pub invocations: u32,
    pub rule: SpawnRule,
}

/// Ordered store of pending and active spawn rules
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleEngine {
    initial: GateTemplate,
    base: GateTemplate,
    pending: BTreeMap<i64, Vec<SpawnRule>>,
    active: Vec<ActiveRule>,
}

impl RuleEngine {
    pub fn new(base: GateTemplate) -> Self {
        Self {
            initial: base.clone(),
            base,
            pending: BTreeMap::new(),
            active: Vec::new(),
        }
    }

    /// Register a rule so its effect first shows on gate `target`
    pub fn add_rule(&mut self, target: i64, rule: SpawnRule) {
        log::debug!("Rule registered for gate {}: {:?}", target, rule);
        self.pending.entry(target - 1).or_default().push(rule);
    }

    /// Ease to `radius` so that gate `on_ring` is the last transitional gate
    ///
    /// The new radius holds exactly from `on_ring + 1`. With no transition
    /// gates the change is immediate on `on_ring`.
    pub fn set_radius(&mut self, on_ring: i64, radius: f32, transition_rings: u32) {
        let first = on_ring + 1 - i64::from(transition_rings.max(1));
        self.add_rule(
            first,
            SpawnRule::RadiusTransition {
                radius,
                transition_rings,
                from: None,
            },
        );
    }

    pub fn set_mesh(&mut self, on_ring: i64, mesh: MeshId, kind: RingKind, single_gate: bool) {
        self.add_rule(
            on_ring,
            SpawnRule::MeshSwap {
                mesh,
                kind,
                single_gate,
                previous: None,
            },
        );
    }

    pub fn set_color(&mut self, on_ring: i64, color: Color, single_gate: bool) {
        self.add_rule(
            on_ring,
            SpawnRule::ColorSwap {
                color,
                single_gate,
                previous: None,
            },
        );
    }

    pub fn set_offset(&mut self, on_ring: i64, value: f32, mode: OffsetMode) {
        self.add_rule(on_ring, SpawnRule::OffsetPattern { value, mode });
    }

    pub fn set_rotation(&mut self, on_ring: i64, min: f32, max: f32, reroll_threshold: f32) {
        self.add_rule(
            on_ring,
            SpawnRule::RotationProfile {
                min,
                max,
                reroll_threshold,
            },
        );
    }

    pub fn add_obstacle(&mut self, on_ring: i64, obstacle: ObstacleTemplate) {
        self.add_rule(
            on_ring,
            SpawnRule::ObstacleInject {
                obstacle,
                previous: None,
            },
        );
    }

    /// Produce the template for `slot`, replaying every due rule
    pub fn materialize_template(&mut self, slot: i64) -> GateTemplate {
        let later = self.pending.split_off(&(slot + 1));
        let due = std::mem::replace(&mut self.pending, later);
        for (key, rules) in due {
            self.active.extend(rules.into_iter().map(|rule| ActiveRule {
                slot: key,
                invocations: 0,
                rule,
            }));
        }

        let base = &mut self.base;
        self.active.retain_mut(|active| {
            active.invocations += 1;
            let done = active.rule.apply(base, active.invocations);
            if done {
                log::trace!("Rule from slot {} retired at slot {}", active.slot, slot);
            }
            !done
        });

        let snapshot = self.base.clone();
        self.base.angular_offset.advance();
        snapshot
    }

    /// The running template as it stands
    pub fn template(&self) -> &GateTemplate {
        &self.base
    }

    pub fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    pub fn active(&self) -> &[ActiveRule] {
        &self.active
    }

    /// Drop every rule and restore the starting template
    pub fn clear(&mut self) {
        self.pending.clear();
        self.active.clear();
        self.base = self.initial.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    /// Templates for gates 0..count, each materialized through the previous slot
    fn run(engine: &mut RuleEngine, count: i64) -> Vec<GateTemplate> {
        (0..count).map(|i| engine.materialize_template(i - 1)).collect()
    }

    #[test]
    fn test_add_rule_stores_one_slot_early() {
        let mut engine = RuleEngine::default();
        engine.set_mesh(5, MeshId(9), RingKind::SingleMesh, false);
        let gates = run(&mut engine, 8);
        assert_eq!(gates[4].mesh, MeshId(0));
        assert_eq!(gates[5].mesh, MeshId(9));
        assert_eq!(gates[7].mesh, MeshId(9));
        assert_eq!(gates[5].ring_kind, RingKind::SingleMesh);
    }

    #[test]
    fn test_radius_transition_reaches_target() {
        let mut engine = RuleEngine::new(GateTemplate::default());
        engine.set_radius(10, 800.0, 4);
        let gates = run(&mut engine, 16);
        let base = GateTemplate::default().radius;

        for gate in &gates[..7] {
            assert_eq!(gate.radius, base);
        }
        for i in 7..11 {
            assert!(gates[i].radius > gates[i - 1].radius, "gate {} not increasing", i);
            assert!(gates[i].radius < 800.0);
        }
        for gate in &gates[11..] {
            assert_eq!(gate.radius, 800.0);
        }
        assert!(engine.active().is_empty());
    }

    #[test]
    fn test_radius_transition_eases_with_sine() {
        let mut engine = RuleEngine::default();
        engine.set_radius(1, 1500.0, 1);
        let gates = run(&mut engine, 3);
        // p = 1/2 on gate 1
        let expected = 500.0 + 1000.0 * (0.5 * FRAC_PI_2).sin();
        assert!((gates[1].radius - expected).abs() < 1e-3);
        assert_eq!(gates[2].radius, 1500.0);
    }

    #[test]
    fn test_instant_radius_change() {
        let mut engine = RuleEngine::default();
        engine.set_radius(4, 200.0, 0);
        let gates = run(&mut engine, 6);
        assert_eq!(gates[3].radius, 500.0);
        assert_eq!(gates[4].radius, 200.0);
        assert_eq!(gates[5].radius, 200.0);
    }

    #[test]
    fn test_single_gate_swaps_restore() {
        let mut engine = RuleEngine::default();
        let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
        engine.set_mesh(3, MeshId(4), RingKind::SingleMesh, true);
        engine.set_color(3, red, true);
        let gates = run(&mut engine, 6);

        assert_eq!(gates[3].mesh, MeshId(4));
        assert_eq!(gates[3].color, red);
        for i in [2, 4, 5] {
            assert_eq!(gates[i].mesh, MeshId(0));
            assert_eq!(gates[i].color, Vec4::ONE);
            assert_eq!(gates[i].ring_kind, RingKind::MultipleMesh);
        }
        assert!(engine.active().is_empty());
    }

    #[test]
    fn test_single_gate_mesh_restores_mesh_set() {
        let mut engine = RuleEngine::new(GateTemplate {
            mesh_set: vec![MeshId(1), MeshId(2)],
            ..Default::default()
        });
        engine.set_mesh(2, MeshId(8), RingKind::SingleMesh, true);
        let gates = run(&mut engine, 4);
        assert_eq!(gates[2].mesh_set, vec![MeshId(8)]);
        assert_eq!(gates[3].mesh_set, vec![MeshId(1), MeshId(2)]);
        assert_eq!(gates[3].ring_kind, RingKind::MultipleMesh);
    }

    #[test]
    fn test_effects_compose_on_same_gate() {
        let mut engine = RuleEngine::default();
        engine.set_radius(2, 300.0, 0);
        engine.set_mesh(2, MeshId(2), RingKind::MultipleMesh, true);
        engine.add_obstacle(2, ObstacleTemplate::default());
        let gates = run(&mut engine, 4);

        assert_eq!(gates[2].radius, 300.0);
        assert_eq!(gates[2].mesh, MeshId(2));
        assert!(gates[2].obstacle.enabled);
        assert!(!gates[3].obstacle.enabled);
        assert_eq!(gates[3].radius, 300.0);
    }

    #[test]
    fn test_rules_on_same_target_run_in_registration_order() {
        let mut engine = RuleEngine::default();
        engine.set_mesh(1, MeshId(1), RingKind::MultipleMesh, false);
        engine.set_mesh(1, MeshId(2), RingKind::MultipleMesh, false);
        let gates = run(&mut engine, 2);
        assert_eq!(gates[1].mesh, MeshId(2));
    }

    #[test]
    fn test_incremental_offset_counts_gates() {
        let mut engine = RuleEngine::default();
        engine.set_offset(2, 0.1, OffsetMode::Incremental);
        let gates = run(&mut engine, 5);
        assert_eq!(gates[1].angular_offset.mode, OffsetMode::Random);
        assert_eq!(gates[2].angular_offset.counter, 0);
        assert_eq!(gates[3].angular_offset.counter, 1);
        assert_eq!(gates[4].angular_offset.counter, 2);
    }

    #[test]
    fn test_rotation_profile_persists() {
        let mut engine = RuleEngine::default();
        engine.set_rotation(1, 40.0, 60.0, 45.0);
        let gates = run(&mut engine, 3);
        assert_eq!(gates[0].rotation_speed_range, (-25.0, 25.0));
        assert_eq!(gates[1].rotation_speed_range, (40.0, 60.0));
        assert_eq!(gates[2].reroll_threshold, 45.0);
    }

    #[test]
    fn test_rule_for_first_gate() {
        let mut engine = RuleEngine::default();
        engine.set_color(0, Vec4::ZERO, false);
        let gates = run(&mut engine, 1);
        assert_eq!(gates[0].color, Vec4::ZERO);
    }

    #[test]
    fn test_clear_restores_template() {
        let mut engine = RuleEngine::default();
        engine.set_radius(0, 100.0, 0);
        engine.set_mesh(9, MeshId(3), RingKind::MultipleMesh, false);
        run(&mut engine, 2);
        assert_eq!(engine.template().radius, 100.0);
        assert_eq!(engine.pending_count(), 1);

        engine.clear();
        assert_eq!(engine.template().radius, 500.0);
        assert_eq!(engine.pending_count(), 0);
    }
}
