//! Beat judging: timed player actions against designated beat gates
//!
//! The judge walks the beat schedule in order. A beat is pending until it is
//! either hit (an action within `action_tolerance` of its distance) or missed
//! (the player passes it by more than the tolerance). Fails from every source
//! go through one gate with an immunity cooldown so overlapping causes (an
//! obstacle collision and a missed beat) broadcast a single fail.

use serde::{Deserialize, Serialize};

use super::gate::{Color, MeshId, ObstacleTemplate};
use super::state::RunEvent;
use crate::error::ConfigError;

/// One rhythm checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatEntry {
    /// Gate index of the beat
    pub index: i64,
    /// Mesh shown on the beat gate only
    #[serde(default)]
    pub mesh: Option<MeshId>,
    /// Color shown on the beat gate only
    #[serde(default)]
    pub color: Option<Color>,
    /// Obstacle that may be placed on the beat gate
    #[serde(default)]
    pub obstacle: Option<ObstacleTemplate>,
}

impl BeatEntry {
    pub fn new(index: i64) -> Self {
        Self {
            index,
            mesh: None,
            color: None,
            obstacle: None,
        }
    }
}

/// Strictly increasing list of beat gates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatSchedule {
    entries: Vec<BeatEntry>,
}

impl BeatSchedule {
    pub fn new(entries: Vec<BeatEntry>) -> Result<Self, ConfigError> {
        for pair in entries.windows(2) {
            if pair[1].index <= pair[0].index {
                return Err(ConfigError::UnorderedBeats {
                    previous: pair[0].index,
                    next: pair[1].index,
                });
            }
        }
        if let Some(first) = entries.first().filter(|e| e.index < 0) {
            return Err(ConfigError::NegativeBeat(first.index));
        }
        Ok(Self { entries })
    }

    /// Schedule of bare beats at the given gate indices
    pub fn from_indices(indices: &[i64]) -> Result<Self, ConfigError> {
        Self::new(indices.iter().copied().map(BeatEntry::new).collect())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<&BeatEntry> {
        self.entries.get(slot)
    }

    /// Beat entry for a gate index, if that gate is a beat
    pub fn entry(&self, index: i64) -> Option<&BeatEntry> {
        self.entries
            .binary_search_by_key(&index, |e| e.index)
            .ok()
            .map(|slot| &self.entries[slot])
    }

    /// Slot of the beat whose distance is closest to `distance`
    pub fn nearest_slot(&self, distance: f32, spacing: f32) -> Option<usize> {
        let upper = self
            .entries
            .partition_point(|e| (e.index as f32 * spacing) < distance);
        let below = upper.checked_sub(1);
        let above = (upper < self.entries.len()).then_some(upper);
        match (below, above) {
            (Some(b), Some(a)) => {
                let db = distance - self.entries[b].index as f32 * spacing;
                let da = self.entries[a].index as f32 * spacing - distance;
                Some(if db <= da { b } else { a })
            }
            (b, a) => b.or(a),
        }
    }
}

/// Judge tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JudgeConfig {
    pub ring_spacing: f32,
    pub action_tolerance: f32,
    pub immunity_duration: f32,
}

/// Running hit/miss tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeStats {
    pub successes: u32,
    pub fails: u32,
    pub streak: u32,
    pub best_streak: u32,
}

/// Timing-judgment state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatJudge {
    config: JudgeConfig,
    /// First schedule slot not yet resolved
    next_slot: usize,
    /// Slot currently awaiting an action
    pending: Option<usize>,
    last_failed: Option<i64>,
    last_succeeded: Option<i64>,
    /// Seconds since the last broadcast fail
    immunity_elapsed: f32,
    stats: JudgeStats,
}

impl BeatJudge {
    pub fn new(config: JudgeConfig) -> Self {
        Self {
            config,
            next_slot: 0,
            pending: None,
            last_failed: None,
            last_succeeded: None,
            // Start outside the cooldown so the first fail always counts
            immunity_elapsed: config.immunity_duration,
            stats: JudgeStats::default(),
        }
    }

    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    pub fn stats(&self) -> JudgeStats {
        self.stats
    }

    /// Gate index of the beat awaiting an action
    pub fn pending_index(&self, beats: &BeatSchedule) -> Option<i64> {
        self.pending.and_then(|slot| beats.get(slot)).map(|e| e.index)
    }

    pub fn last_failed(&self) -> Option<i64> {
        self.last_failed
    }

    pub fn last_succeeded(&self) -> Option<i64> {
        self.last_succeeded
    }

    pub fn immunity_elapsed(&self) -> f32 {
        self.immunity_elapsed
    }

    /// True while a new fail would be suppressed
    pub fn is_immune(&self) -> bool {
        self.immunity_elapsed < self.config.immunity_duration
    }

    fn beat_distance(&self, index: i64) -> f32 {
        index as f32 * self.config.ring_spacing
    }

    fn refresh_pending(&mut self, beats: &BeatSchedule) {
        if self.pending.is_none() && self.next_slot < beats.len() {
            self.pending = Some(self.next_slot);
        }
    }

    fn advance(&mut self, slot: usize, beats: &BeatSchedule) {
        self.next_slot = slot + 1;
        self.pending = (self.next_slot < beats.len()).then_some(self.next_slot);
    }

    /// Per-frame update: accumulate immunity and resolve missed beats
    pub fn update(
        &mut self,
        distance: f32,
        dt: f32,
        beats: &BeatSchedule,
        events: &mut Vec<RunEvent>,
    ) {
        self.immunity_elapsed += dt;
        self.refresh_pending(beats);

        while let Some(slot) = self.pending {
            let Some(beat) = beats.get(slot) else {
                self.pending = None;
                break;
            };
            let index = beat.index;
            if distance <= self.beat_distance(index) + self.config.action_tolerance {
                break;
            }
            log::debug!("Beat {} missed at distance {:.0}", index, distance);
            self.signal_fail(Some(index), events);
            self.advance(slot, beats);
        }
    }

    /// Judge a player action fired at `distance`
    pub fn register_action(
        &mut self,
        distance: f32,
        beats: &BeatSchedule,
        events: &mut Vec<RunEvent>,
    ) {
        self.refresh_pending(beats);
        let tolerance = self.config.action_tolerance;

        let pending = self
            .pending
            .and_then(|slot| beats.get(slot).map(|e| (slot, e.index)));
        if let Some((slot, index)) = pending {
            if (distance - self.beat_distance(index)).abs() <= tolerance {
                self.signal_success(index, events);
                self.advance(slot, beats);
                return;
            }
        }

        let nearest = beats
            .nearest_slot(distance, self.config.ring_spacing)
            .and_then(|slot| beats.get(slot).map(|e| (slot, e.index)));
        let Some((slot, index)) = nearest else {
            self.signal_fail(None, events);
            return;
        };

        if (distance - self.beat_distance(index)).abs() > 3.0 * tolerance {
            self.signal_fail(None, events);
        } else if self.pending == Some(slot) {
            self.signal_fail(Some(index), events);
        } else if self.last_succeeded == Some(index) {
            self.signal_fail(None, events);
        } else {
            log::trace!("Ambiguous action at {:.0} near beat {}, ignored", distance, index);
        }
    }

    /// Route an obstacle collision on gate `index` through the fail gate
    pub fn obstacle_hit(&mut self, index: i64, events: &mut Vec<RunEvent>) -> bool {
        events.push(RunEvent::ObstacleHit(index));
        self.signal_fail(None, events)
    }

    fn signal_success(&mut self, index: i64, events: &mut Vec<RunEvent>) {
        log::debug!("Beat {} hit", index);
        self.last_succeeded = Some(index);
        self.stats.successes += 1;
        self.stats.streak += 1;
        self.stats.best_streak = self.stats.best_streak.max(self.stats.streak);
        events.push(RunEvent::BeatSuccess(index));
    }

    /// Broadcast a fail unless immune or a repeat for the same beat
    ///
    /// `None` is the "no specific beat" sentinel and is never deduplicated.
    fn signal_fail(&mut self, index: Option<i64>, events: &mut Vec<RunEvent>) -> bool {
        if self.is_immune() {
            log::trace!("Fail {:?} suppressed by immunity", index);
            return false;
        }
        if let Some(i) = index {
            if self.last_failed == Some(i) {
                log::trace!("Duplicate fail for beat {} suppressed", i);
                return false;
            }
            self.last_failed = Some(i);
        }
        self.immunity_elapsed = 0.0;
        self.stats.fails += 1;
        self.stats.streak = 0;
        events.push(RunEvent::BeatFail(index));
        true
    }
}
