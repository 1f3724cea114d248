//! Raycast queries. The animation code never simulates physics, it only asks
//! the host where rays land through [`RayCast`].

use crate::{
    scene::{Layer, LayerMask, NodeId, Scene},
    util::{Dir, Plane},
};
use hashbrown::HashSet;
use vek::*;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Hit {
    pub point: Vec3<f32>,
    pub normal: Dir,
    /// Scene node owning the collider, if any.
    pub node: Option<NodeId>,
    pub distance: f32,
}

pub trait RayCast {
    /// Nearest hit along `dir` from `origin` within `max_dist`, only
    /// considering colliders on layers in `mask`.
    fn cast(
        &self,
        scene: &Scene,
        origin: Vec3<f32>,
        dir: Dir,
        max_dist: f32,
        mask: LayerMask,
    ) -> Option<Hit>;

    /// Whether a ray from `origin` towards `node` reaches that node first.
    fn reaches(
        &self,
        scene: &Scene,
        origin: Vec3<f32>,
        node: NodeId,
        max_dist: f32,
        mask: LayerMask,
    ) -> bool {
        scene
            .position(node)
            .and_then(|target| Dir::from_unnormalized(target - origin))
            .and_then(|dir| self.cast(scene, origin, dir, max_dist, mask))
            .is_some_and(|hit| hit.node == Some(node))
    }
}

/// Casts straight down from `point` raised by `probe_height` and returns the
/// point moved vertically onto whatever was hit.
pub fn project_to_ground(
    physics: &dyn RayCast,
    scene: &Scene,
    point: Vec3<f32>,
    probe_height: f32,
    mask: LayerMask,
) -> Option<Vec3<f32>> {
    let start = point + Vec3::unit_z() * probe_height;
    physics
        .cast(scene, start, Dir::down(), f32::INFINITY, mask)
        .map(|hit| point.with_z(hit.point.z))
}

#[derive(Clone, Debug, PartialEq)]
pub enum Collider {
    /// Sphere following a scene node, on the node's layer.
    Sphere { node: NodeId, radius: f32 },
    /// Axis aligned box following a scene node, on the node's layer.
    Cuboid {
        node: NodeId,
        half_extents: Vec3<f32>,
    },
    /// Static one-sided plane, hit only from the side its normal faces.
    Plane {
        plane: Plane,
        layer: Layer,
        node: Option<NodeId>,
    },
}

/// Minimal collision world for headless runs and tests.
#[derive(Clone, Debug, Default)]
pub struct Colliders {
    colliders: Vec<Collider>,
}

impl Colliders {
    pub fn new() -> Self { Self::default() }

    pub fn add(&mut self, collider: Collider) { self.colliders.push(collider); }

    /// Flat ground at height `z`.
    pub fn with_ground(mut self, z: f32, layer: Layer) -> Self {
        self.add(Collider::Plane {
            plane: Plane {
                normal: Dir::up(),
                d: z,
            },
            layer,
            node: None,
        });
        self
    }

    pub fn remove_node(&mut self, node: NodeId) {
        self.colliders.retain(|c| match c {
            Collider::Sphere { node: n, .. } | Collider::Cuboid { node: n, .. } => *n != node,
            Collider::Plane { node: n, .. } => *n != Some(node),
        });
    }

    fn intersect(
        collider: &Collider,
        scene: &Scene,
        origin: Vec3<f32>,
        dir: Dir,
        mask: LayerMask,
    ) -> Option<Hit> {
        match collider {
            Collider::Sphere { node, radius } => {
                if !mask.contains(scene.layer(*node)?) {
                    return None;
                }
                let center = scene.position(*node)?;
                let oc = origin - center;
                // Rays starting inside a collider don't report it
                if oc.magnitude_squared() <= radius * radius {
                    return None;
                }
                let b = oc.dot(*dir);
                let disc = b * b - (oc.magnitude_squared() - radius * radius);
                if disc < 0.0 {
                    return None;
                }
                let t = -b - disc.sqrt();
                (t >= 0.0).then(|| {
                    let point = origin + *dir * t;
                    Hit {
                        point,
                        normal: Dir::from_unnormalized(point - center).unwrap_or_else(Dir::up),
                        node: Some(*node),
                        distance: t,
                    }
                })
            },
            Collider::Cuboid { node, half_extents } => {
                if !mask.contains(scene.layer(*node)?) {
                    return None;
                }
                let center = scene.position(*node)?;
                let (min, max) = (center - *half_extents, center + *half_extents);
                if origin.partial_cmpge(&min).reduce_and() && origin.partial_cmple(&max).reduce_and()
                {
                    return None;
                }
                let (mut t_near, mut t_far) = (f32::NEG_INFINITY, f32::INFINITY);
                let mut normal = Vec3::zero();
                for axis in 0..3 {
                    if dir[axis].abs() < 1e-8 {
                        if origin[axis] < min[axis] || origin[axis] > max[axis] {
                            return None;
                        }
                        continue;
                    }
                    let t1 = (min[axis] - origin[axis]) / dir[axis];
                    let t2 = (max[axis] - origin[axis]) / dir[axis];
                    let (t1, t2) = if t1 > t2 { (t2, t1) } else { (t1, t2) };
                    if t1 > t_near {
                        t_near = t1;
                        normal = Vec3::zero();
                        normal[axis] = -dir[axis].signum();
                    }
                    t_far = t_far.min(t2);
                }
                (t_near <= t_far && t_near >= 0.0).then(|| Hit {
                    point: origin + *dir * t_near,
                    normal: Dir::from_unnormalized(normal).unwrap_or_else(Dir::up),
                    node: Some(*node),
                    distance: t_near,
                })
            },
            Collider::Plane { plane, layer, node } => {
                if !mask.contains(*layer) {
                    return None;
                }
                let denom = plane.normal.dot(*dir);
                if denom >= -1e-6 {
                    return None;
                }
                let t = -plane.distance(origin) / denom;
                (t >= 0.0).then(|| Hit {
                    point: origin + *dir * t,
                    normal: plane.normal,
                    node: *node,
                    distance: t,
                })
            },
        }
    }
}

impl RayCast for Colliders {
    fn cast(
        &self,
        scene: &Scene,
        origin: Vec3<f32>,
        dir: Dir,
        max_dist: f32,
        mask: LayerMask,
    ) -> Option<Hit> {
        self.colliders
            .iter()
            .filter_map(|c| Self::intersect(c, scene, origin, dir, mask))
            .filter(|hit| hit.distance <= max_dist)
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TriggerEvent {
    Enter(NodeId),
    Exit(NodeId),
}

/// Spherical trigger volume attached to a node, reporting candidates as they
/// cross its boundary.
#[derive(Clone, Debug)]
pub struct TriggerSphere {
    pub node: NodeId,
    pub radius: f32,
    inside: HashSet<NodeId>,
}

impl TriggerSphere {
    pub fn new(node: NodeId, radius: f32) -> Self {
        Self {
            node,
            radius,
            inside: HashSet::new(),
        }
    }

    pub fn contains(&self, node: NodeId) -> bool { self.inside.contains(&node) }

    /// Re-evaluates membership of `candidates`. Members that are no longer
    /// candidates or no longer exist leave the volume.
    pub fn update(&mut self, scene: &Scene, candidates: &[NodeId]) -> Vec<TriggerEvent> {
        let Some(center) = scene.position(self.node) else {
            return self.inside.drain().map(TriggerEvent::Exit).collect();
        };
        let now: HashSet<NodeId> = candidates
            .iter()
            .copied()
            .filter(|c| {
                scene
                    .position(*c)
                    .is_some_and(|p| p.distance_squared(center) <= self.radius * self.radius)
            })
            .collect();

        let mut events: Vec<_> = self
            .inside
            .difference(&now)
            .copied()
            .map(TriggerEvent::Exit)
            .collect();
        events.extend(now.difference(&self.inside).copied().map(TriggerEvent::Enter));
        self.inside = now;
        events
    }
}
