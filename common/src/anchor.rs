use crate::scene::{NodeId, Scene, Transform};

/// Pins a node to the pose it had when anchoring was switched on.
///
/// The pose is reapplied every late update so whatever else moved the node
/// during the tick is overridden.
#[derive(Clone, Debug)]
pub struct PositionAnchor {
    node: NodeId,
    pinned: Option<Transform>,
}

impl PositionAnchor {
    pub fn new(node: NodeId) -> Self { Self { node, pinned: None } }

    pub fn node(&self) -> NodeId { self.node }

    pub fn is_anchored(&self) -> bool { self.pinned.is_some() }

    /// Switching on captures the current global pose, switching off releases
    /// it. Switching on while already anchored keeps the old pose.
    pub fn set_anchored(&mut self, scene: &Scene, anchored: bool) {
        match (anchored, self.pinned) {
            (true, None) => self.pinned = scene.world(self.node),
            (false, Some(_)) => self.pinned = None,
            _ => {},
        }
    }

    pub fn late_update(&self, scene: &mut Scene) {
        if let Some(pose) = self.pinned {
            scene.set_position(self.node, pose.position);
            scene.set_rotation(self.node, pose.orientation);
        }
    }
}
