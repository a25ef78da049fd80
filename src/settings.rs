//! Run settings
//!
//! Data-driven course configuration: window layout, judging windows, the
//! beat schedule and the ordered list of spawn rules. Loaded from JSON files
//! by the host; every field falls back to its default when omitted.

use std::path::Path;

use glam::Vec4;
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::ConfigError;
use crate::sim::gate::{
    Color, GateTemplate, MaterialId, MeshId, ObstacleTemplate, OffsetMode, RingKind,
};
use crate::sim::judge::{BeatEntry, BeatSchedule, JudgeConfig};
use crate::sim::rules::RuleEngine;
use crate::sim::window::WindowConfig;

/// A spawn rule as written in a settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RuleRegistration {
    /// Ease the radius so it holds exactly from `on_ring + 1`
    Radius {
        on_ring: i64,
        radius: f32,
        #[serde(default)]
        transition_rings: u32,
    },
    Mesh {
        on_ring: i64,
        mesh: MeshId,
        #[serde(default)]
        kind: RingKind,
        #[serde(default)]
        single_gate: bool,
    },
    Color {
        on_ring: i64,
        color: Color,
        #[serde(default)]
        single_gate: bool,
    },
    Offset {
        on_ring: i64,
        value: f32,
        #[serde(default)]
        mode: OffsetMode,
    },
    Rotation {
        on_ring: i64,
        min: f32,
        max: f32,
        #[serde(default)]
        reroll_threshold: f32,
    },
    Obstacle {
        on_ring: i64,
        #[serde(default)]
        obstacle: ObstacleTemplate,
    },
}

impl RuleRegistration {
    /// First gate the rule affects
    pub fn on_ring(&self) -> i64 {
        match *self {
            RuleRegistration::Radius { on_ring, .. }
            | RuleRegistration::Mesh { on_ring, .. }
            | RuleRegistration::Color { on_ring, .. }
            | RuleRegistration::Offset { on_ring, .. }
            | RuleRegistration::Rotation { on_ring, .. }
            | RuleRegistration::Obstacle { on_ring, .. } => on_ring,
        }
    }

    pub fn register(&self, engine: &mut RuleEngine) {
        match *self {
            RuleRegistration::Radius {
                on_ring,
                radius,
                transition_rings,
            } => engine.set_radius(on_ring, radius, transition_rings),
            RuleRegistration::Mesh {
                on_ring,
                mesh,
                kind,
                single_gate,
            } => engine.set_mesh(on_ring, mesh, kind, single_gate),
            RuleRegistration::Color {
                on_ring,
                color,
                single_gate,
            } => engine.set_color(on_ring, color, single_gate),
            RuleRegistration::Offset {
                on_ring,
                value,
                mode,
            } => engine.set_offset(on_ring, value, mode),
            RuleRegistration::Rotation {
                on_ring,
                min,
                max,
                reroll_threshold,
            } => engine.set_rotation(on_ring, min, max, reroll_threshold),
            RuleRegistration::Obstacle { on_ring, obstacle } => {
                engine.add_obstacle(on_ring, obstacle)
            }
        }
    }
}

/// Run settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Seed for every random roll of the run
    pub seed: u64,

    // === Gate window ===
    /// Distance between consecutive gates
    pub ring_spacing: f32,
    /// Base gate radius
    pub radius: f32,
    /// Meshes each gate picks from at random; must not be empty
    pub mesh_set: Vec<MeshId>,
    /// How far ahead gates appear
    pub fade_distance: f32,
    /// How far behind the player gates survive
    pub appear_tolerance: f32,
    /// Shifts the fade-in toward the player
    pub fade_tolerance: f32,
    /// Everything else about the starting gate template
    pub template: GateTemplate,

    // === Judging ===
    /// Max distance between an action and its beat gate
    pub action_tolerance: f32,
    /// Seconds after a fail during which further fails are suppressed
    pub immunity_duration: f32,
    /// Probability that a beat's obstacle is actually placed
    pub obstacle_chance: f32,
    pub obstacles_disabled: bool,

    // === Player ===
    pub player_speed: f32,
    /// Margin kept between the player and the gate rim
    pub lateral_shrink: f32,

    // === Content ===
    pub beats: Vec<BeatEntry>,
    /// Applied in order; rules for the same gate run in this order
    pub rules: Vec<RuleRegistration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            seed: 0,

            ring_spacing: RING_SPACING,
            radius: RING_RADIUS,
            mesh_set: vec![MeshId(0)],
            fade_distance: FADE_DISTANCE,
            appear_tolerance: APPEAR_TOLERANCE,
            fade_tolerance: 0.0,
            template: GateTemplate::default(),

            action_tolerance: ACTION_TOLERANCE,
            immunity_duration: IMMUNITY_DURATION,
            obstacle_chance: OBSTACLE_CHANCE,
            obstacles_disabled: false,

            player_speed: PLAYER_SPEED,
            lateral_shrink: LATERAL_SHRINK,

            beats: Vec::new(),
            rules: Vec::new(),
        }
    }
}

impl Settings {
    /// Check every numeric field and the beat schedule
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ring_spacing > 0.0) {
            return Err(ConfigError::InvalidSpacing(self.ring_spacing));
        }
        if !(self.radius > 0.0) {
            return Err(ConfigError::InvalidRadius(self.radius));
        }
        if self.mesh_set.is_empty() {
            return Err(ConfigError::EmptyMeshSet);
        }
        if !(self.fade_distance >= 0.0) {
            return Err(ConfigError::InvalidFadeDistance(self.fade_distance));
        }
        if !(self.appear_tolerance >= 0.0) {
            return Err(ConfigError::NegativeTolerance {
                name: "appear_tolerance",
                value: self.appear_tolerance,
            });
        }
        if !(self.lateral_shrink >= 0.0) {
            return Err(ConfigError::NegativeTolerance {
                name: "lateral_shrink",
                value: self.lateral_shrink,
            });
        }
        if !(self.action_tolerance > 0.0) {
            return Err(ConfigError::InvalidTolerance(self.action_tolerance));
        }
        if !(self.immunity_duration >= 0.0) {
            return Err(ConfigError::InvalidImmunity(self.immunity_duration));
        }
        if !(0.0..=1.0).contains(&self.obstacle_chance) {
            return Err(ConfigError::InvalidObstacleChance(self.obstacle_chance));
        }
        if let Some(rule) = self.rules.iter().find(|r| r.on_ring() < 0) {
            return Err(ConfigError::NegativeRuleRing(rule.on_ring()));
        }
        BeatSchedule::new(self.beats.clone())?;
        Ok(())
    }

    /// Parse settings from JSON
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load and validate settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let settings = Self::from_json(&json)?;
        settings.validate()?;
        log::info!("Loaded settings from {}", path.as_ref().display());
        Ok(settings)
    }

    /// Write settings as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        log::info!("Settings saved to {}", path.as_ref().display());
        Ok(())
    }

    /// Starting gate template (`radius` and `mesh_set` win over the template's)
    pub fn base_template(&self) -> GateTemplate {
        GateTemplate {
            radius: self.radius,
            mesh: self.mesh_set.first().copied().unwrap_or(self.template.mesh),
            mesh_set: self.mesh_set.clone(),
            ..self.template.clone()
        }
    }

    pub fn window_config(&self) -> WindowConfig {
        WindowConfig {
            ring_spacing: self.ring_spacing,
            fade_distance: self.fade_distance,
            appear_tolerance: self.appear_tolerance,
            fade_tolerance: self.fade_tolerance,
            obstacle_chance: self.obstacle_chance,
            obstacles_disabled: self.obstacles_disabled,
        }
    }

    pub fn judge_config(&self) -> JudgeConfig {
        JudgeConfig {
            ring_spacing: self.ring_spacing,
            action_tolerance: self.action_tolerance,
            immunity_duration: self.immunity_duration,
        }
    }

    /// Register every configured rule, in order
    pub fn register_rules(&self, engine: &mut RuleEngine) {
        for rule in &self.rules {
            rule.register(engine);
        }
    }

    /// A short showcase course: beats every four gates, a radius swell and a pattern change
    pub fn demo() -> Self {
        let accent = MeshId(1);
        let hazard = ObstacleTemplate {
            mesh: MeshId(2),
            material: MaterialId(1),
            enabled: true,
            arc_width: OBSTACLE_ARC_WIDTH,
        };
        let beats = (1..=12)
            .map(|k| BeatEntry {
                index: k * 4,
                mesh: Some(accent),
                color: Some(Vec4::new(1.0, 0.8, 0.2, 1.0)),
                obstacle: (k % 3 == 0).then_some(hazard),
            })
            .collect();

        Self {
            seed: 0x5eed,
            mesh_set: vec![MeshId(0), MeshId(3), MeshId(4)],
            beats,
            rules: vec![
                RuleRegistration::Radius {
                    on_ring: 16,
                    radius: 800.0,
                    transition_rings: 4,
                },
                RuleRegistration::Offset {
                    on_ring: 24,
                    value: 0.35,
                    mode: OffsetMode::Incremental,
                },
                RuleRegistration::Rotation {
                    on_ring: 30,
                    min: -60.0,
                    max: 60.0,
                    reroll_threshold: 15.0,
                },
                RuleRegistration::Color {
                    on_ring: 36,
                    color: Vec4::new(0.3, 0.6, 1.0, 1.0),
                    single_gate: false,
                },
                RuleRegistration::Radius {
                    on_ring: 40,
                    radius: RING_RADIUS,
                    transition_rings: 6,
                },
            ],
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(Settings::default().validate().is_ok());
        assert!(Settings::demo().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_spacing = Settings {
            ring_spacing: 0.0,
            ..Default::default()
        };
        assert!(matches!(bad_spacing.validate(), Err(ConfigError::InvalidSpacing(_))));

        let bad_chance = Settings {
            obstacle_chance: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            bad_chance.validate(),
            Err(ConfigError::InvalidObstacleChance(_))
        ));

        let bad_appear = Settings {
            appear_tolerance: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            bad_appear.validate(),
            Err(ConfigError::NegativeTolerance {
                name: "appear_tolerance",
                ..
            })
        ));

        let nan_radius = Settings {
            radius: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(nan_radius.validate(), Err(ConfigError::InvalidRadius(_))));

        let no_meshes = Settings {
            mesh_set: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(no_meshes.validate(), Err(ConfigError::EmptyMeshSet)));

        let early_rule = Settings {
            rules: vec![RuleRegistration::Color {
                on_ring: -2,
                color: Vec4::ONE,
                single_gate: false,
            }],
            ..Default::default()
        };
        assert!(matches!(
            early_rule.validate(),
            Err(ConfigError::NegativeRuleRing(-2))
        ));

        let bad_beats = Settings {
            beats: vec![BeatEntry::new(4), BeatEntry::new(4)],
            ..Default::default()
        };
        assert!(matches!(
            bad_beats.validate(),
            Err(ConfigError::UnorderedBeats { .. })
        ));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let json = r#"{
            "seed": 7,
            "ring_spacing": 400.0,
            "beats": [{ "index": 3 }, { "index": 7, "mesh": 2 }],
            "rules": [
                { "rule": "radius", "on_ring": 10, "radius": 800.0, "transition_rings": 4 },
                { "rule": "offset", "on_ring": 2, "value": 0.5, "mode": "Incremental" },
                {
                    "rule": "color",
                    "on_ring": 5,
                    "color": [1.0, 0.0, 0.0, 1.0],
                    "single_gate": true
                }
            ],
            "mesh_set": [2, 5]
        }"#;
        let settings = Settings::from_json(json).unwrap();

        assert_eq!(settings.seed, 7);
        assert_eq!(settings.ring_spacing, 400.0);
        assert_eq!(settings.radius, RING_RADIUS);
        assert_eq!(settings.action_tolerance, ACTION_TOLERANCE);
        assert_eq!(settings.beats[1].mesh, Some(MeshId(2)));
        assert_eq!(settings.rules.len(), 3);
        assert_eq!(settings.rules[0].on_ring(), 10);
        assert_eq!(settings.mesh_set, vec![MeshId(2), MeshId(5)]);
        assert_eq!(settings.base_template().mesh, MeshId(2));
        assert_eq!(
            settings.rules[2],
            RuleRegistration::Color {
                on_ring: 5,
                color: Vec4::new(1.0, 0.0, 0.0, 1.0),
                single_gate: true,
            }
        );
    }

    #[test]
    fn test_from_json_reports_parse_errors() {
        assert!(matches!(
            Settings::from_json("{ \"ring_spacing\": \"wide\" }"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        assert!(matches!(
            Settings::load("/nonexistent/ring-runner/settings.json"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_save_then_load() {
        let name = format!("ring-runner-settings-{}.json", std::process::id());
        let path = std::env::temp_dir().join(name);
        let settings = Settings::demo();
        settings.save(&path).unwrap();
        let loaded = Settings::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_register_rules_in_order() {
        let settings = Settings {
            rules: vec![
                RuleRegistration::Mesh {
                    on_ring: 1,
                    mesh: MeshId(3),
                    kind: RingKind::SingleMesh,
                    single_gate: false,
                },
                RuleRegistration::Mesh {
                    on_ring: 1,
                    mesh: MeshId(4),
                    kind: RingKind::MultipleMesh,
                    single_gate: false,
                },
            ],
            ..Default::default()
        };
        let mut engine = RuleEngine::new(settings.base_template());
        settings.register_rules(&mut engine);
        assert_eq!(engine.pending_count(), 2);

        engine.materialize_template(-1);
        let gate_one = engine.materialize_template(0);
        assert_eq!(gate_one.mesh, MeshId(4));
    }

    #[test]
    fn test_base_template_uses_radius() {
        let settings = Settings {
            radius: 750.0,
            ..Default::default()
        };
        assert_eq!(settings.base_template().radius, 750.0);
    }
}
