//! Visual gate factory interface
//!
//! The simulation never touches meshes or materials. Whenever a gate is
//! created, destroyed or restyled it calls the host through this trait with
//! an opaque handle.

use serde::{Deserialize, Serialize};

use super::curve::Pose;
use super::gate::GateTemplate;

/// Opaque handle to a host-side gate visual
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct VisualHandle(pub u64);

/// Host capability that instantiates and tears down gate visuals
pub trait GateFactory {
    /// Create the visual for gate `index` at `pose`
    fn spawn(&mut self, index: i64, template: &GateTemplate, pose: &Pose) -> VisualHandle;

    /// Release a visual and every sub-resource it owns
    fn destroy(&mut self, handle: VisualHandle);

    /// Push a new opacity (0 = invisible, 1 = opaque)
    fn set_opacity(&mut self, _handle: VisualHandle, _opacity: f32) {}

    /// Push a new roll angle (radians around the course tangent)
    fn set_roll(&mut self, _handle: VisualHandle, _roll: f32) {}
}

/// Headless factory: hands out handles and tracks how many are alive
#[derive(Debug, Default)]
pub struct NullFactory {
    next: u64,
    live: usize,
}

impl NullFactory {
    pub fn live(&self) -> usize {
        self.live
    }
}

impl GateFactory for NullFactory {
    fn spawn(&mut self, _index: i64, _template: &GateTemplate, _pose: &Pose) -> VisualHandle {
        self.next += 1;
        self.live += 1;
        VisualHandle(self.next)
    }

    fn destroy(&mut self, _handle: VisualHandle) {
        self.live = self.live.saturating_sub(1);
    }
}
