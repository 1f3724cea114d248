//! Head and neck look-at tracking.
//!
//! The tracker is a state machine over [`TrackerState`]. Every state owns a
//! set of tasks that are started when the state is entered and all cancelled
//! when it is left; tasks request the next state through the board, and the
//! switch happens on the following fixed tick.

mod follow;
mod search;

pub use follow::{bearing, clamp_to_bound};

use crate::{
    error::{require, RigError},
    settings::{SearchStrategy, TrackerMode, TrackerSettings},
};
use common::{
    observer::{ComponentId, Observer, ObserverId, Observers},
    phys::RayCast,
    scene::{Layer, NodeId, Scene},
    task::{Lane, Scheduler, Tick},
};
use follow::{Follow, LossCheck, Reset};
use hashbrown::HashSet;
use search::{Acquire, ScanSweep};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vek::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackerState {
    Off = 0,
    Standby,
    Search,
    Detected,
    Lost,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerRig {
    pub neck: NodeId,
    pub head: NodeId,
    /// Tip of the head, where vision rays start.
    pub head_end: NodeId,
    /// Points the vision fan aims through. When empty, `head_end` and all of
    /// its descendants are used.
    pub ray_points: Vec<NodeId>,
}

/// An animated bone with its captured rest pose.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Bone {
    pub node: NodeId,
    pub rest: Quaternion<f32>,
    pub axis: Vec3<f32>,
    /// Radians either side of rest.
    pub bound: f32,
}

impl Bone {
    fn new(
        scene: &Scene,
        role: &'static str,
        node: NodeId,
        axis: Vec3<f32>,
        bound: f32,
    ) -> Result<Self, RigError> {
        let node = require(scene, role, node)?;
        let axis = axis.try_normalized().unwrap_or_else(|| {
            warn!(?axis, role, "Degenerate rotation axis, turning about z instead");
            Vec3::unit_z()
        });
        Ok(Self {
            node,
            rest: scene.local_rotation(node).unwrap_or_default(),
            axis,
            bound: bound.to_radians(),
        })
    }

    /// Rest pose turned by `angle` about the bone axis.
    pub fn turned_from_rest(&self, angle: f32) -> Quaternion<f32> {
        self.rest * Quaternion::rotation_3d(angle, self.axis)
    }
}

/// State shared between the tracker and its running tasks.
pub struct TrackerBoard {
    pub(crate) settings: TrackerSettings,
    pub(crate) neck: Bone,
    pub(crate) head: Bone,
    pub(crate) head_end: NodeId,
    pub(crate) ray_points: Vec<NodeId>,
    pub(crate) detection_layer: Layer,
    pub(crate) aim: Vec3<f32>,
    /// Weak reference, only ever looked up in the scene.
    pub(crate) focused: Option<NodeId>,
    /// Set by the follow task when the last look-at had to be clamped.
    pub(crate) out_of_bounds: bool,
    /// Detection layer nodes inside the trigger volume.
    pub(crate) in_area: HashSet<NodeId>,
    /// State requested by a task, applied on the next fixed tick.
    pub(crate) next_state: Option<TrackerState>,
}

impl TrackerBoard {
    /// State the tracker waits in without a target.
    fn idle_state(&self) -> TrackerState {
        match self.settings.mode {
            TrackerMode::Scan => TrackerState::Search,
            TrackerMode::Focus => TrackerState::Standby,
        }
    }
}

pub struct Tracker {
    id: ComponentId,
    state: TrackerState,
    pending: Option<TrackerState>,
    active: bool,
    board: TrackerBoard,
    tasks: Scheduler<TrackerBoard>,
    observers: Observers<TrackerState>,
}

impl Tracker {
    pub fn new(
        id: ComponentId,
        scene: &Scene,
        rig: TrackerRig,
        settings: TrackerSettings,
    ) -> Result<Self, RigError> {
        let neck = Bone::new(scene, "neck", rig.neck, settings.neck_axis, settings.neck_bound)?;
        let head = Bone::new(scene, "head", rig.head, settings.head_axis, settings.head_bound)?;
        let head_end = require(scene, "head end", rig.head_end)?;
        let ray_points = if rig.ray_points.is_empty() {
            scene.descendants(head_end)
        } else {
            rig.ray_points
                .iter()
                .map(|p| require(scene, "ray point", *p))
                .collect::<Result<_, _>>()?
        };
        let detection_layer = scene
            .layer_named(&settings.detection_layer)
            .ok_or_else(|| RigError::UnknownLayer(settings.detection_layer.clone()))?;
        let aim = settings.aim.try_normalized().unwrap_or_else(Vec3::unit_y);

        let board = TrackerBoard {
            neck,
            head,
            head_end,
            ray_points,
            detection_layer,
            aim,
            focused: None,
            out_of_bounds: false,
            in_area: HashSet::new(),
            next_state: None,
            settings,
        };
        let active = board.settings.active;
        Ok(Self {
            id,
            state: TrackerState::Off,
            pending: Some(if active {
                board.idle_state()
            } else {
                TrackerState::Off
            }),
            active,
            board,
            tasks: Scheduler::new(),
            observers: Observers::new(),
        })
    }

    pub fn id(&self) -> ComponentId { self.id }

    pub fn state(&self) -> TrackerState { self.state }

    pub fn is_active(&self) -> bool { self.active }

    pub fn settings(&self) -> &TrackerSettings { &self.board.settings }

    pub fn focused(&self) -> Option<NodeId> { self.board.focused }

    pub fn is_out_of_bounds(&self) -> bool { self.board.out_of_bounds }

    pub fn neck_rest(&self) -> Quaternion<f32> { self.board.neck.rest }

    pub fn head_rest(&self) -> Quaternion<f32> { self.board.head.rest }

    pub fn running_tasks(&self) -> usize { self.tasks.len() }

    pub fn set_active(&mut self, active: bool) {
        if active != self.active {
            self.active = active;
            self.pending = Some(if active {
                self.board.idle_state()
            } else {
                TrackerState::Off
            });
        }
    }

    /// Drops the current target and goes back to rest. A switched off
    /// tracker stays off.
    pub fn reset_state(&mut self) {
        if !self.active {
            debug!("Ignoring reset while inactive");
            return;
        }
        self.pending = Some(TrackerState::Lost);
    }

    pub fn add_observer<O: Observer<TrackerState> + 'static>(&mut self, observer: O) -> ObserverId {
        self.observers.add(observer)
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> bool { self.observers.remove(id) }

    pub fn on_trigger_enter(&mut self, scene: &Scene, node: NodeId) {
        if scene.layer(node) == Some(self.board.detection_layer) {
            self.board.in_area.insert(node);
        }
    }

    pub fn on_trigger_exit(&mut self, node: NodeId) { self.board.in_area.remove(&node); }

    /// Rays the tracker currently looks along, as start and end points.
    pub fn debug_rays(&self, scene: &Scene) -> Vec<(Vec3<f32>, Vec3<f32>)> {
        let range = self.board.settings.detection_range;
        match self.board.settings.search {
            SearchStrategy::RaycastFan => search::fan_rays(scene, &self.board)
                .into_iter()
                .map(|(origin, dir)| (origin, origin + *dir * range))
                .collect(),
            SearchStrategy::NearestInVolume => self
                .board
                .focused
                .and_then(|focused| {
                    Some((
                        scene.position(self.board.head.node)?,
                        scene.position(focused)?,
                    ))
                })
                .into_iter()
                .collect(),
        }
    }

    fn enter(&mut self, state: TrackerState) {
        self.tasks.cancel_all();
        self.state = state;
        let board = &mut self.board;
        board.out_of_bounds = false;
        board.next_state = None;

        match state {
            TrackerState::Off => {
                board.focused = None;
                if board.settings.rest_when_off {
                    self.tasks.spawn(Lane::Fixed, Reset::new(None, None));
                }
            },
            TrackerState::Standby => {
                self.tasks.spawn(Lane::Fixed, Acquire::new());
            },
            TrackerState::Search => {
                self.tasks.spawn(Lane::Fixed, ScanSweep::new());
                self.tasks.spawn(Lane::Fixed, Acquire::new());
            },
            TrackerState::Detected => {
                self.tasks.spawn(Lane::Fixed, Follow::new());
                self.tasks.spawn(Lane::Fixed, LossCheck::new());
            },
            TrackerState::Lost => {
                board.focused = None;
                let grace = Some(board.settings.lost_grace);
                self.tasks
                    .spawn(Lane::Fixed, Reset::new(grace, Some(board.idle_state())));
                self.tasks.spawn(Lane::Fixed, Acquire::new());
            },
        }

        info!(id = %self.id, ?state, focused = ?self.board.focused, "Tracker state changed");
        self.observers.notify(self.id, state);
    }

    pub fn fixed_update(&mut self, scene: &mut Scene, physics: &dyn RayCast, tick: Tick) {
        // Outside requests win over whatever the tasks asked for
        let requested = self.board.next_state.take();
        if let Some(state) = self.pending.take().or(requested) {
            self.enter(state);
        }
        self.tasks
            .advance(Lane::Fixed, scene, physics, &mut self.board, tick);
    }

    pub fn frame_update(&mut self, scene: &mut Scene, physics: &dyn RayCast, tick: Tick) {
        self.tasks
            .advance(Lane::Frame, scene, physics, &mut self.board, tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::scene::Transform;

    fn rig(scene: &mut Scene) -> TrackerRig {
        let neck = scene.spawn("neck", Transform::default());
        let head = scene
            .spawn_child(neck, "head", Transform::from_position(Vec3::unit_z()))
            .unwrap();
        let head_end = scene
            .spawn_child(head, "head_end", Transform::from_position(Vec3::unit_y() * 0.2))
            .unwrap();
        TrackerRig {
            neck,
            head,
            head_end,
            ray_points: Vec::new(),
        }
    }

    #[test]
    fn unknown_detection_layer_is_rejected() {
        let mut scene = Scene::new();
        let rig = rig(&mut scene);
        assert!(matches!(
            Tracker::new(ComponentId(1), &scene, rig, TrackerSettings::default()),
            Err(RigError::UnknownLayer(_))
        ));
    }

    #[test]
    fn ray_points_default_to_head_end_subtree() {
        let mut scene = Scene::new();
        scene.define_layer("Detectable");
        let rig = rig(&mut scene);
        let tip = scene
            .spawn_child(rig.head_end, "tip", Transform::default())
            .unwrap();
        let tracker = Tracker::new(ComponentId(1), &scene, rig.clone(), TrackerSettings::default())
            .unwrap();
        assert_eq!(tracker.board.ray_points, vec![rig.head_end, tip]);
    }

    #[test]
    fn trigger_membership_filters_by_layer() {
        let mut scene = Scene::new();
        let detectable = scene.define_layer("Detectable").unwrap();
        let rig = rig(&mut scene);
        let mut tracker =
            Tracker::new(ComponentId(1), &scene, rig, TrackerSettings::default()).unwrap();
        let target = scene.spawn("target", Transform::default());
        let rock = scene.spawn("rock", Transform::default());
        scene.set_layer(target, detectable);

        tracker.on_trigger_enter(&scene, target);
        tracker.on_trigger_enter(&scene, rock);
        assert_eq!(tracker.board.in_area.len(), 1);
        tracker.on_trigger_exit(target);
        assert!(tracker.board.in_area.is_empty());
    }
}
