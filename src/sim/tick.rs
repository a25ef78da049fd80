//! Fixed timestep simulation tick
//!
//! One call advances the player, spins the gates, resolves obstacle crossings,
//! slides the gate window and judges beats, in that order.

use glam::{Vec2, Vec3};

use super::factory::GateFactory;
use super::state::{RunPhase, RunState};
use crate::polar_to_cartesian;

/// Input commands for a single tick
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Timed action (tap/click/space)
    pub action: bool,
    /// Pause toggle
    pub pause: bool,
    /// Desired offset from the centerline in the course frame
    pub lateral: Option<Vec2>,
    /// Raw world position from the host; replaces forward motion by speed
    pub position: Option<Vec3>,
    /// Autoplay/demo mode - AI fires the beats and dodges obstacles
    pub autoplay: bool,
}

/// Advance the run by one fixed timestep
pub fn tick(state: &mut RunState, input: &TickInput, factory: &mut dyn GateFactory, dt: f32) {
    // Handle pause toggle
    if input.pause {
        match state.phase {
            RunPhase::Running => {
                state.phase = RunPhase::Paused;
                log::info!("Run paused at distance {:.0}", state.player.distance);
                return;
            }
            RunPhase::Paused => {
                state.phase = if state.is_completed() {
                    RunPhase::Completed
                } else {
                    RunPhase::Running
                };
            }
            RunPhase::Completed => {}
        }
    }

    if state.phase == RunPhase::Paused {
        return;
    }
    if !dt.is_finite() || dt < 0.0 {
        log::warn!("Ignoring tick with dt {}", dt);
        return;
    }

    // The player starts on gate 0, so the first step must see it live and count it
    let first = state.time_ticks == 0;
    if first {
        state.update_window(factory);
    }
    state.time_ticks += 1;

    // Move the player
    match input.position {
        Some(position) => {
            state.track_position(position);
        }
        None => {
            let next = state.player.distance + state.player.speed * dt;
            state.player.move_to(next);
        }
    }

    let mut input = input.clone();
    if input.autoplay {
        autoplay(state, &mut input);
    }

    if let Some(lateral) = input.lateral {
        state.set_lateral(lateral);
    } else {
        // Re-clamp: the gates around the player may have shrunk
        let lateral = state.player.lateral;
        state.set_lateral(lateral);
    }

    state.scheduler.rotate_gates(dt, factory);

    // Obstacles first, so a collision and a miss on the same frame fail once
    let (from, to) = (state.player.previous_distance, state.player.distance);
    let lateral = state.player.lateral;
    for index in state.scheduler.check_obstacles(from, to, lateral, first) {
        state.judge.obstacle_hit(index, &mut state.events);
    }

    state.update_window(factory);
    state
        .judge
        .update(state.player.distance, dt, &state.beats, &mut state.events);

    if input.action {
        state.register_action();
    }

    if state.is_completed() && state.phase != RunPhase::Completed {
        state.phase = RunPhase::Completed;
    }
}

/// Fill in actions and steering for demo runs
fn autoplay(state: &RunState, input: &mut TickInput) {
    let (from, to) = (state.player.previous_distance, state.player.distance);
    let spacing = state.settings.ring_spacing;

    // Fire exactly when the beat gate is crossed
    if let Some(index) = state.judge.pending_index(&state.beats) {
        let beat_distance = index as f32 * spacing;
        if from < beat_distance && beat_distance <= to {
            input.action = true;
        }
    }

    // Steer to the far side of the next obstacle, predicting its spin
    let speed = state.player.speed.max(1.0);
    let threat = state
        .scheduler
        .gates()
        .iter()
        .filter(|g| g.distance > to && g.distance <= to + 2.0 * spacing)
        .find_map(|g| {
            let obstacle = g.obstacle.as_ref().filter(|o| !o.struck)?;
            let time_to_gate = (g.distance - to) / speed;
            let center = obstacle.arc.center();
            let angle = center.y.atan2(center.x) + g.rotation_speed.to_radians() * time_to_gate;
            Some(angle)
        });
    if let Some(angle) = threat {
        let reach = state.lateral_limit() * 0.6;
        input.lateral = Some(polar_to_cartesian(reach, angle + std::f32::consts::PI));
    }
}
