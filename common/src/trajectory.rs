//! Time parameterized trajectories for scene nodes.
//!
//! The `sample_*` functions are pure; the task types wrap them and write one
//! sample per poll, measuring elapsed time from the step of each poll.

use crate::{
    scene::{NodeId, Scene},
    task::{Task, TaskContext, TaskStatus},
    util::smoothstep,
};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use tracing::debug;
use vek::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Curve {
    /// Straight line.
    Linear,
    /// Quadratic Bezier through a control point raised above the midpoint by
    /// the segment length, like a stepping foot.
    Bow,
    /// Circular arc around a center half a segment length below the midpoint.
    Arc,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Space {
    Local,
    Global,
}

pub fn sample_linear(from: Vec3<f32>, to: Vec3<f32>, t: f32) -> Vec3<f32> {
    Vec3::lerp(from, to, t)
}

pub fn sample_bow(from: Vec3<f32>, to: Vec3<f32>, t: f32) -> Vec3<f32> {
    let control = (from + to) * 0.5 + Vec3::unit_z() * from.distance(to);
    let u = 1.0 - t;
    from * (u * u) + control * (2.0 * u * t) + to * (t * t)
}

pub fn sample_arc(from: Vec3<f32>, to: Vec3<f32>, t: f32) -> Vec3<f32> {
    let len = from.distance(to);
    if len < 1e-6 {
        return to;
    }
    let center = (from + to) * 0.5 - Vec3::unit_z() * (len * 0.5);
    center + Vec3::slerp(from - center, to - center, t)
}

/// Samples `curve` at `t`; `t >= 1` yields exactly `to`.
pub fn sample(curve: Curve, from: Vec3<f32>, to: Vec3<f32>, t: f32) -> Vec3<f32> {
    if t >= 1.0 {
        return to;
    }
    let t = t.max(0.0);
    match curve {
        Curve::Linear => sample_linear(from, to, t),
        Curve::Bow => sample_bow(from, to, t),
        Curve::Arc => sample_arc(from, to, t),
    }
}

pub fn sample_rotation(from: Quaternion<f32>, to: Quaternion<f32>, t: f32) -> Quaternion<f32> {
    if t >= 1.0 {
        to
    } else {
        Quaternion::slerp(from, to, t.max(0.0)).normalized()
    }
}

/// Offset of the idle float along its axis at `time` seconds.
pub fn float_offset(amplitude: f32, frequency: f32, time: f64) -> f32 {
    amplitude * (TAU * frequency as f64 * time).sin() as f32
}

/// Fraction of a `duration` long motion done after `elapsed`, optionally eased.
fn progress(elapsed: f32, duration: f32, ease: bool) -> f32 {
    let t = if duration > 0.0 {
        (elapsed / duration).min(1.0)
    } else {
        1.0
    };
    if ease && t < 1.0 { smoothstep(t) } else { t }
}

fn read_position(scene: &Scene, node: NodeId, space: Space) -> Option<Vec3<f32>> {
    match space {
        Space::Local => scene.local_position(node),
        Space::Global => scene.position(node),
    }
}

fn write_position(scene: &mut Scene, node: NodeId, space: Space, pos: Vec3<f32>) -> bool {
    match space {
        Space::Local => scene.set_local_position(node, pos),
        Space::Global => scene.set_position(node, pos),
    }
}

/// Moves a node to a position over a fixed duration.
#[derive(Clone, Debug)]
pub struct MoveOverTime {
    node: NodeId,
    from: Option<Vec3<f32>>,
    to: Vec3<f32>,
    duration: f32,
    curve: Curve,
    space: Space,
    ease: bool,
    elapsed: f32,
}

impl MoveOverTime {
    /// Linear, in local space, starting wherever the node is when first
    /// polled.
    pub fn new(node: NodeId, to: Vec3<f32>, duration: f32) -> Self {
        Self {
            node,
            from: None,
            to,
            duration,
            curve: Curve::Linear,
            space: Space::Local,
            ease: false,
            elapsed: 0.0,
        }
    }

    #[must_use]
    pub fn starting_at(mut self, from: Vec3<f32>) -> Self {
        self.from = Some(from);
        self
    }

    #[must_use]
    pub fn curve(mut self, curve: Curve) -> Self {
        self.curve = curve;
        self
    }

    #[must_use]
    pub fn space(mut self, space: Space) -> Self {
        self.space = space;
        self
    }

    #[must_use]
    pub fn eased(mut self, ease: bool) -> Self {
        self.ease = ease;
        self
    }
}

impl<S> Task<S> for MoveOverTime {
    fn poll(&mut self, cx: &mut TaskContext<'_, S>) -> TaskStatus {
        let from = match self
            .from
            .or_else(|| read_position(cx.scene, self.node, self.space))
        {
            Some(from) => *self.from.insert(from),
            None => {
                debug!(node = %self.node, "Node to move is gone");
                return TaskStatus::Done;
            },
        };

        self.elapsed += cx.dt();
        let t = progress(self.elapsed, self.duration, self.ease);
        let pos = sample(self.curve, from, self.to, t);
        if !write_position(cx.scene, self.node, self.space, pos) || t >= 1.0 {
            TaskStatus::Done
        } else {
            TaskStatus::Pending
        }
    }
}

/// Rotates a node's local orientation to `to` over a fixed duration.
#[derive(Clone, Debug)]
pub struct RotateOverTime {
    node: NodeId,
    from: Option<Quaternion<f32>>,
    to: Quaternion<f32>,
    duration: f32,
    ease: bool,
    elapsed: f32,
}

impl RotateOverTime {
    pub fn new(node: NodeId, to: Quaternion<f32>, duration: f32) -> Self {
        Self {
            node,
            from: None,
            to,
            duration,
            ease: false,
            elapsed: 0.0,
        }
    }

    #[must_use]
    pub fn eased(mut self, ease: bool) -> Self {
        self.ease = ease;
        self
    }
}

impl<S> Task<S> for RotateOverTime {
    fn poll(&mut self, cx: &mut TaskContext<'_, S>) -> TaskStatus {
        let from = match self.from.or_else(|| cx.scene.local_rotation(self.node)) {
            Some(from) => *self.from.insert(from),
            None => {
                debug!(node = %self.node, "Node to rotate is gone");
                return TaskStatus::Done;
            },
        };

        self.elapsed += cx.dt();
        let t = progress(self.elapsed, self.duration, self.ease);
        let rot = sample_rotation(from, self.to, t);
        if !cx.scene.set_local_rotation(self.node, rot) || t >= 1.0 {
            TaskStatus::Done
        } else {
            TaskStatus::Pending
        }
    }
}

/// Bobs a node along an axis around the local position it had when first
/// polled. Never finishes.
#[derive(Clone, Debug)]
pub struct IdleFloat {
    node: NodeId,
    axis: Vec3<f32>,
    amplitude: f32,
    frequency: f32,
    rest: Option<Vec3<f32>>,
}

impl IdleFloat {
    pub fn new(node: NodeId, axis: Vec3<f32>, amplitude: f32, frequency: f32) -> Self {
        Self {
            node,
            axis: axis.try_normalized().unwrap_or_else(Vec3::unit_z),
            amplitude,
            frequency,
            rest: None,
        }
    }
}

impl<S> Task<S> for IdleFloat {
    fn poll(&mut self, cx: &mut TaskContext<'_, S>) -> TaskStatus {
        let Some(rest) = self.rest.or_else(|| cx.scene.local_position(self.node)) else {
            return TaskStatus::Done;
        };
        self.rest = Some(rest);
        let offset = float_offset(self.amplitude, self.frequency, cx.time().0);
        cx.scene
            .set_local_position(self.node, rest + self.axis * offset);
        TaskStatus::Pending
    }
}
