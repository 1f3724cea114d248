//! Billboard indicators showing a component's state as one of a set of
//! frames.

use crate::{tracker::TrackerState, walker::WalkerState};
use common::{
    observer::{ComponentId, Observer},
    scene::{NodeId, Scene},
};
use tracing::warn;
use vek::*;

/// States that map onto indicator frames.
pub trait StateIndex: Copy {
    fn index(self) -> usize;
}

impl StateIndex for WalkerState {
    fn index(self) -> usize { self as usize }
}

impl StateIndex for TrackerState {
    fn index(self) -> usize { self as usize }
}

#[derive(Clone, Debug)]
pub struct StateIndicator {
    frames: Vec<String>,
    current: usize,
    /// Node the indicator is drawn at, turned towards the camera.
    pub node: Option<NodeId>,
}

impl StateIndicator {
    pub fn new(frames: Vec<String>, node: Option<NodeId>) -> Self {
        Self {
            frames,
            current: 0,
            node,
        }
    }

    pub fn current(&self) -> usize { self.current }

    pub fn frame(&self) -> Option<&str> { self.frames.get(self.current).map(String::as_str) }

    /// Shows frame `index`. Indices past the last frame are ignored.
    pub fn change(&mut self, index: usize) -> bool {
        if index < self.frames.len() {
            self.current = index;
            true
        } else {
            warn!(index, frames = self.frames.len(), "No indicator frame for state");
            false
        }
    }

    pub fn next(&mut self) {
        if !self.frames.is_empty() {
            self.current = (self.current + 1) % self.frames.len();
        }
    }

    /// Turns the indicator to face `camera`, keeping it upright.
    pub fn billboard(&self, scene: &mut Scene, camera: Vec3<f32>) {
        let Some(node) = self.node else { return };
        let Some(pos) = scene.position(node) else { return };
        let to_camera = camera - pos;
        if to_camera.magnitude_squared() < 1e-12 {
            return;
        }
        let flat = Vec2::from(to_camera);
        let yaw = (-to_camera.x).atan2(to_camera.y);
        let pitch = to_camera.z.atan2(flat.magnitude());
        scene.set_rotation(node, Quaternion::rotation_z(yaw) * Quaternion::rotation_x(pitch));
    }
}

impl<T: StateIndex> Observer<T> for StateIndicator {
    fn on_state_changed(&mut self, _source: ComponentId, state: T) {
        let index = state.index();
        if index != self.current {
            self.change(index);
        }
    }
}
