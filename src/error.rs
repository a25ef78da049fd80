//! Error types for course setup

use thiserror::Error;

/// Errors detected while validating settings or building a course
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Ring spacing must be positive, got {0}")]
    InvalidSpacing(f32),

    #[error("Ring radius must be positive, got {0}")]
    InvalidRadius(f32),

    #[error("Fade distance must be non-negative, got {0}")]
    InvalidFadeDistance(f32),

    #[error("Action tolerance must be positive, got {0}")]
    InvalidTolerance(f32),

    #[error("{name} must be non-negative, got {value}")]
    NegativeTolerance { name: &'static str, value: f32 },

    #[error("Immunity duration must be non-negative, got {0}")]
    InvalidImmunity(f32),

    #[error("Obstacle chance must be between 0 and 1, got {0}")]
    InvalidObstacleChance(f32),

    #[error("Mesh set must contain at least one mesh")]
    EmptyMeshSet,

    #[error("Spawn rule targets gate {0}, before the first gate")]
    NegativeRuleRing(i64),

    #[error("Beat index must be non-negative, got {0}")]
    NegativeBeat(i64),

    #[error("Beat schedule must be strictly increasing: {previous} followed by {next}")]
    UnorderedBeats { previous: i64, next: i64 },

    #[error("Course needs at least two control points, got {0}")]
    TooFewPoints(usize),

    #[error("Course has zero length")]
    DegenerateCourse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}
