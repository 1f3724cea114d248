//! Scene graph of transform nodes (bones, anchors, targets).
//!
//! The animation code never owns nodes, it only refers to them by [`NodeId`]
//! and reads/writes their transforms through the [`Scene`] table. An id that
//! has been despawned simply stops resolving.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;
use vek::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "#{}", self.0) }
}

/// Collision/detection category of a node.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Layer(pub u8);

impl Layer {
    pub const DEFAULT: Layer = Layer(0);
}

/// Named layers that fit in a [`LayerMask`] next to [`Layer::DEFAULT`].
pub const MAX_LAYERS: usize = 31;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const ALL: LayerMask = LayerMask(u32::MAX);
    pub const NONE: LayerMask = LayerMask(0);

    pub fn of(layer: Layer) -> Self { Self(1 << (layer.0 % 32)) }

    pub fn contains(self, layer: Layer) -> bool { self.0 & Self::of(layer).0 != 0 }

    pub fn with(self, layer: Layer) -> Self { Self(self.0 | Self::of(layer).0) }

    pub fn without(self, layer: Layer) -> Self { Self(self.0 & !Self::of(layer).0) }

    #[must_use]
    pub fn inverted(self) -> Self { Self(!self.0) }
}

impl Default for LayerMask {
    fn default() -> Self { Self::ALL }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3<f32>,
    pub orientation: Quaternion<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zero(),
            orientation: Quaternion::identity(),
        }
    }
}

impl Transform {
    pub fn new(position: Vec3<f32>, orientation: Quaternion<f32>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn from_position(position: Vec3<f32>) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Applies `self` on top of the `parent` frame.
    pub fn in_frame(self, parent: Transform) -> Transform {
        Transform {
            position: parent.position + parent.orientation * self.position,
            orientation: (parent.orientation * self.orientation).normalized(),
        }
    }

    /// Expresses the global point `point` in this frame.
    pub fn inverse_transform_point(&self, point: Vec3<f32>) -> Vec3<f32> {
        self.orientation.normalized().inverse() * (point - self.position)
    }
}

#[derive(Clone, Debug)]
struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    local: Transform,
    layer: Layer,
}

#[derive(Default)]
pub struct Scene {
    next_id: u64,
    nodes: HashMap<NodeId, Node>,
    layer_names: HashMap<String, Layer>,
}

impl Scene {
    pub fn new() -> Self { Self::default() }

    /// Registers a named layer, returning the existing one if the name is
    /// already known. `None` once all [`MAX_LAYERS`] are taken.
    pub fn define_layer(&mut self, name: &str) -> Option<Layer> {
        if let Some(layer) = self.layer_names.get(name) {
            return Some(*layer);
        }
        if self.layer_names.len() >= MAX_LAYERS {
            warn!(name, "Out of layers");
            return None;
        }
        let layer = Layer(self.layer_names.len() as u8 + 1);
        self.layer_names.insert(name.to_owned(), layer);
        Some(layer)
    }

    pub fn layer_named(&self, name: &str) -> Option<Layer> { self.layer_names.get(name).copied() }

    pub fn spawn(&mut self, name: impl Into<String>, local: Transform) -> NodeId {
        self.insert(name.into(), None, local)
    }

    /// Spawns a node under `parent`; `None` if the parent does not exist.
    pub fn spawn_child(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        local: Transform,
    ) -> Option<NodeId> {
        if !self.nodes.contains_key(&parent) {
            return None;
        }
        let id = self.insert(name.into(), Some(parent), local);
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.push(id);
        }
        Some(id)
    }

    fn insert(&mut self, name: String, parent: Option<NodeId>, local: Transform) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node {
            name,
            parent,
            children: Vec::new(),
            local,
            layer: Layer::DEFAULT,
        });
        id
    }

    /// Removes a node and its whole subtree.
    pub fn despawn(&mut self, id: NodeId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|c| *c != id);
        }
        for child in node.children {
            self.despawn(child);
        }
    }

    pub fn contains(&self, id: NodeId) -> bool { self.nodes.contains_key(&id) }

    pub fn len(&self) -> usize { self.nodes.len() }

    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    pub fn name(&self, id: NodeId) -> Option<&str> { self.nodes.get(&id).map(|n| n.name.as_str()) }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> { self.nodes.get(&id).and_then(|n| n.parent) }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(&id).map_or(&[], |n| n.children.as_slice())
    }

    /// `id` followed by all of its descendants, depth first.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.get(&next) {
                out.push(next);
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }

    pub fn layer(&self, id: NodeId) -> Option<Layer> { self.nodes.get(&id).map(|n| n.layer) }

    pub fn set_layer(&mut self, id: NodeId, layer: Layer) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.layer = layer;
        }
    }

    pub fn local(&self, id: NodeId) -> Option<Transform> { self.nodes.get(&id).map(|n| n.local) }

    pub fn local_position(&self, id: NodeId) -> Option<Vec3<f32>> {
        self.local(id).map(|t| t.position)
    }

    pub fn local_rotation(&self, id: NodeId) -> Option<Quaternion<f32>> {
        self.local(id).map(|t| t.orientation)
    }

    /// Returns whether the node exists.
    pub fn set_local_position(&mut self, id: NodeId, position: Vec3<f32>) -> bool {
        self.nodes
            .get_mut(&id)
            .map(|n| n.local.position = position)
            .is_some()
    }

    pub fn set_local_rotation(&mut self, id: NodeId, orientation: Quaternion<f32>) -> bool {
        self.nodes
            .get_mut(&id)
            .map(|n| n.local.orientation = orientation)
            .is_some()
    }

    /// Global transform, composed through all ancestors.
    pub fn world(&self, id: NodeId) -> Option<Transform> {
        let node = self.nodes.get(&id)?;
        Some(match node.parent.and_then(|p| self.world(p)) {
            Some(parent) => node.local.in_frame(parent),
            None => node.local,
        })
    }

    fn parent_world(&self, id: NodeId) -> Transform {
        self.parent(id)
            .and_then(|p| self.world(p))
            .unwrap_or_default()
    }

    pub fn position(&self, id: NodeId) -> Option<Vec3<f32>> { self.world(id).map(|t| t.position) }

    pub fn rotation(&self, id: NodeId) -> Option<Quaternion<f32>> {
        self.world(id).map(|t| t.orientation)
    }

    pub fn set_position(&mut self, id: NodeId, position: Vec3<f32>) -> bool {
        let local = self.parent_world(id).inverse_transform_point(position);
        self.set_local_position(id, local)
    }

    pub fn set_rotation(&mut self, id: NodeId, orientation: Quaternion<f32>) -> bool {
        let parent = self.parent_world(id).orientation.normalized();
        self.set_local_rotation(id, (parent.inverse() * orientation).normalized())
    }

    /// Expresses the global `point` in the local frame of `id`.
    pub fn inverse_transform_point(&self, id: NodeId, point: Vec3<f32>) -> Option<Vec3<f32>> {
        self.world(id).map(|t| t.inverse_transform_point(point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn world_transform_composes_parents() {
        let mut scene = Scene::new();
        let root = scene.spawn(
            "root",
            Transform::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::rotation_z(FRAC_PI_2)),
        );
        let child = scene
            .spawn_child(root, "child", Transform::from_position(Vec3::unit_y()))
            .unwrap();

        // +y rotated a quarter turn about z points along -x
        approx::assert_relative_eq!(
            scene.position(child).unwrap(),
            Vec3::new(0.0, 0.0, 0.0),
            epsilon = 1e-5
        );
        approx::assert_relative_eq!(
            scene.inverse_transform_point(child, Vec3::new(0.0, 1.0, 0.0)).unwrap(),
            Vec3::new(1.0, 0.0, 0.0),
            epsilon = 1e-5
        );
    }

    #[test]
    fn set_global_position_under_parent() {
        let mut scene = Scene::new();
        let root = scene.spawn("root", Transform::from_position(Vec3::new(0.0, 0.0, 2.0)));
        let child = scene.spawn_child(root, "child", Transform::default()).unwrap();
        assert!(scene.set_position(child, Vec3::new(3.0, 0.0, 0.0)));
        approx::assert_relative_eq!(scene.local_position(child).unwrap(), Vec3::new(3.0, 0.0, -2.0));
    }

    #[test]
    fn despawn_removes_subtree() {
        let mut scene = Scene::new();
        let root = scene.spawn("root", Transform::default());
        let a = scene.spawn_child(root, "a", Transform::default()).unwrap();
        let b = scene.spawn_child(a, "b", Transform::default()).unwrap();
        assert_eq!(scene.descendants(root), vec![root, a, b]);
        scene.despawn(a);
        assert!(!scene.contains(b));
        assert!(scene.children(root).is_empty());
        assert!(!scene.set_position(b, Vec3::zero()));
    }

    #[test]
    fn layers_by_name() {
        let mut scene = Scene::new();
        let detectable = scene.define_layer("Detectable").unwrap();
        assert_eq!(scene.define_layer("Detectable"), Some(detectable));
        assert_eq!(scene.layer_named("Detectable"), Some(detectable));
        assert!(LayerMask::of(detectable).contains(detectable));
        assert!(!LayerMask::of(detectable).inverted().contains(detectable));
    }

    #[test]
    fn layers_run_out_instead_of_aliasing() {
        let mut scene = Scene::new();
        let layers: Vec<_> = (0..MAX_LAYERS)
            .map(|i| scene.define_layer(&format!("layer{i}")).unwrap())
            .collect();
        assert_eq!(layers.last(), Some(&Layer(31)));
        assert_eq!(scene.define_layer("one too many"), None);
        assert_eq!(scene.define_layer("layer3"), Some(Layer(4)));
        let mask = layers.iter().fold(LayerMask::NONE, |mask, l| mask.with(*l));
        assert!(!mask.contains(Layer::DEFAULT));
    }
}
