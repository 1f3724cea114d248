//! Procedural gait for multi-legged walkers.
//!
//! Legs are split into two groups that take turns stepping. Within a turn
//! every admitted leg decides for itself whether it strayed far enough from
//! its home anchor to step; the turn passes once all of them reported back.
//! The body is kept centered over the feet every fixed tick.

pub mod leg;

pub use leg::{LegBone, LegRig};

use crate::{
    error::{require, RigError},
    settings::{BodyTilt, WalkerSettings},
};
use common::{
    observer::{ComponentId, Observer, ObserverId, Observers},
    phys::RayCast,
    scene::{NodeId, Scene},
    task::{Delay, Lane, Scheduler, Task, TaskContext, TaskStatus, Tick},
    trajectory::IdleFloat,
    util::{average_position, rotate_towards, Dir},
};
use leg::{partition, LegWatcher};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vek::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalkerState {
    Off = 0,
    Idle,
    Move,
    MoveFast,
}

impl WalkerState {
    pub fn is_moving(self) -> bool { matches!(self, Self::Move | Self::MoveFast) }
}

/// Scene nodes a walker animates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkerRig {
    pub body: NodeId,
    /// Where the body sits at rest; the body is pulled halfway towards it.
    pub body_rest: NodeId,
    /// Front to back. Must pair up with `legs_right`.
    pub legs_left: Vec<LegRig>,
    pub legs_right: Vec<LegRig>,
}

/// State shared between the walker and its running tasks.
pub struct WalkerBoard {
    pub(crate) settings: WalkerSettings,
    pub(crate) body: NodeId,
    pub(crate) body_rest: NodeId,
    pub(crate) legs: Vec<LegBone>,
    pub(crate) groups: [Vec<usize>; 2],
    pub(crate) group_of: Vec<usize>,
    /// Legs of each group that reported back this turn.
    pub(crate) completed: [usize; 2],
    pub(crate) step_duration: f32,
}

impl WalkerBoard {
    fn pairs(&self) -> usize { self.legs.len() / 2 }

    fn admit(&mut self, group: usize) {
        for &leg in &self.groups[group] {
            self.legs[leg].can_move = true;
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum GaitStage {
    Settle(Delay),
    /// Waiting for every leg of the group to report back.
    Turn(usize),
}

/// Alternates the two leg groups forever.
struct GaitLoop {
    stage: GaitStage,
}

impl GaitLoop {
    /// Splits the legs, admits the first group and starts a watcher per leg.
    fn start(cx: &mut TaskContext<'_, WalkerBoard>) -> GaitStage {
        let board = &mut *cx.board;
        board.groups = partition(board.pairs());
        for (group, legs) in board.groups.iter().enumerate() {
            for &leg in legs {
                board.group_of[leg] = group;
            }
        }
        board.completed = [0, 0];
        board.admit(0);
        for leg in 0..board.legs.len() {
            cx.spawn(Lane::Fixed, LegWatcher::new(leg));
        }
        debug!(groups = ?cx.board.groups, "Gait started");
        GaitStage::Turn(0)
    }
}

impl Task<WalkerBoard> for GaitLoop {
    fn poll(&mut self, cx: &mut TaskContext<'_, WalkerBoard>) -> TaskStatus {
        self.stage = match self.stage {
            GaitStage::Settle(mut delay) => {
                if delay.elapsed(cx.time()) {
                    Self::start(cx)
                } else {
                    GaitStage::Settle(delay)
                }
            },
            GaitStage::Turn(group) => {
                let board = &mut *cx.board;
                if board.completed[group] >= board.groups[group].len() {
                    board.completed[group] = 0;
                    board.admit(1 - group);
                    GaitStage::Turn(1 - group)
                } else {
                    GaitStage::Turn(group)
                }
            },
        };
        TaskStatus::Pending
    }
}

/// Keeps the body above the feet, optionally leaning it into the ground.
struct BodyPlacement;

impl Task<WalkerBoard> for BodyPlacement {
    fn poll(&mut self, cx: &mut TaskContext<'_, WalkerBoard>) -> TaskStatus {
        let board = &*cx.board;
        if board.legs.is_empty() {
            return TaskStatus::Pending;
        }
        let feet: Vec<_> = board
            .legs
            .iter()
            .filter_map(|leg| cx.scene.position(leg.target))
            .collect();
        let above_feet = average_position(&feet) + Vec3::unit_z() * board.settings.body_offset;
        let target = match cx.scene.position(board.body_rest) {
            Some(rest) => (above_feet + rest) * 0.5,
            None => above_feet,
        };
        cx.scene.set_position(board.body, target);

        if board.settings.body_tilt != BodyTilt::Off {
            tilt_to_ground(cx.scene, cx.physics, board, cx.tick.dt.0);
        }
        TaskStatus::Pending
    }
}

fn tilt_to_ground(scene: &mut Scene, physics: &dyn RayCast, board: &WalkerBoard, dt: f32) {
    let settings = &board.settings;
    let (Some(pos), Some(rot)) = (scene.position(board.body), scene.rotation(board.body)) else {
        return;
    };
    let Some(hit) = physics.cast(
        scene,
        pos,
        Dir::down(),
        f32::INFINITY,
        settings.ground_mask,
    ) else {
        return;
    };
    let up = rot * Vec3::unit_z();
    let upright = Quaternion::<f32>::rotation_from_to_3d(up, *hit.normal) * rot;
    let rot = match settings.body_tilt {
        BodyTilt::Smooth { max_speed } => rotate_towards(rot, upright, max_speed * dt),
        BodyTilt::Instant | BodyTilt::Off => upright,
    };
    scene.set_rotation(board.body, rot);
}

pub struct Walker {
    id: ComponentId,
    state: WalkerState,
    /// Set when the next fixed tick has to switch states.
    pending: Option<WalkerState>,
    active: bool,
    board: WalkerBoard,
    tasks: Scheduler<WalkerBoard>,
    observers: Observers<WalkerState>,
}

impl Walker {
    pub fn new(
        id: ComponentId,
        scene: &Scene,
        rig: WalkerRig,
        settings: WalkerSettings,
    ) -> Result<Self, RigError> {
        if rig.legs_left.len() != rig.legs_right.len() {
            return Err(RigError::LegCountMismatch {
                left: rig.legs_left.len(),
                right: rig.legs_right.len(),
            });
        }
        let body = require(scene, "body", rig.body)?;
        let body_rest = require(scene, "body rest", rig.body_rest)?;
        let legs = rig
            .legs_left
            .iter()
            .chain(rig.legs_right.iter())
            .map(|leg| -> Result<LegBone, RigError> {
                require(scene, "leg target", leg.target)?;
                require(scene, "leg home", leg.home)?;
                let mut bone = LegBone::new(*leg, settings.anchor_legs);
                if let Some(anchor) = &mut bone.anchor {
                    anchor.set_anchored(scene, true);
                }
                Ok(bone)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let active = settings.active;
        Ok(Self {
            id,
            state: WalkerState::Off,
            pending: Some(if active {
                WalkerState::Idle
            } else {
                WalkerState::Off
            }),
            active,
            board: WalkerBoard {
                group_of: vec![0; legs.len()],
                groups: partition(legs.len() / 2),
                legs,
                body,
                body_rest,
                completed: [0, 0],
                step_duration: settings.step_duration,
                settings,
            },
            tasks: Scheduler::new(),
            observers: Observers::new(),
        })
    }

    pub fn id(&self) -> ComponentId { self.id }

    pub fn state(&self) -> WalkerState { self.state }

    pub fn is_active(&self) -> bool { self.active }

    pub fn settings(&self) -> &WalkerSettings { &self.board.settings }

    pub fn legs(&self) -> &[LegBone] { &self.board.legs }

    /// The two step groups of the current or most recent gait, as leg
    /// indices into [`Walker::legs`].
    pub fn groups(&self) -> &[Vec<usize>; 2] { &self.board.groups }

    pub fn running_tasks(&self) -> usize { self.tasks.len() }

    /// Switching on idles, switching off stops everything.
    pub fn set_active(&mut self, active: bool) {
        if active != self.active {
            self.active = active;
            self.pending = Some(if active {
                WalkerState::Idle
            } else {
                WalkerState::Off
            });
        }
    }

    /// Requests a state from outside, e.g. from a controller.
    pub fn push_state(&mut self, state: WalkerState) {
        if !self.active {
            debug!(?state, "Ignoring state push while inactive");
            return;
        }
        if self.pending.unwrap_or(self.state) != state {
            self.pending = Some(state);
        }
    }

    pub fn add_observer<O: Observer<WalkerState> + 'static>(&mut self, observer: O) -> ObserverId {
        self.observers.add(observer)
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> bool { self.observers.remove(id) }

    fn enter(&mut self, state: WalkerState, scene: &Scene) {
        self.tasks.cancel_all();
        self.state = state;

        let board = &mut self.board;
        board.completed = [0, 0];
        board.step_duration = match state {
            WalkerState::MoveFast => {
                board.settings.step_duration / board.settings.sprint_multiplier.max(1.0)
            },
            _ => board.settings.step_duration,
        };
        for leg in board.legs.iter_mut() {
            leg.can_move = false;
            // A step cut short by the switch leaves its anchor released
            if let Some(anchor) = &mut leg.anchor {
                anchor.set_anchored(scene, true);
            }
        }

        match state {
            WalkerState::Idle => {
                let settings = &board.settings;
                self.tasks.spawn(
                    Lane::Frame,
                    IdleFloat::new(
                        board.body,
                        settings.idle_axis,
                        settings.idle_amplitude,
                        settings.idle_frequency,
                    ),
                );
            },
            WalkerState::Move | WalkerState::MoveFast => {
                self.tasks.spawn(Lane::Fixed, GaitLoop {
                    stage: GaitStage::Settle(Delay::new(board.settings.settle_delay)),
                });
                self.tasks.spawn(Lane::Fixed, BodyPlacement);
            },
            WalkerState::Off => {},
        }

        info!(id = %self.id, ?state, "Walker state changed");
        self.observers.notify(self.id, state);
    }

    pub fn fixed_update(&mut self, scene: &mut Scene, physics: &dyn RayCast, tick: Tick) {
        if let Some(state) = self.pending.take() {
            self.enter(state, scene);
        }
        self.tasks
            .advance(Lane::Fixed, scene, physics, &mut self.board, tick);
    }

    pub fn frame_update(&mut self, scene: &mut Scene, physics: &dyn RayCast, tick: Tick) {
        self.tasks
            .advance(Lane::Frame, scene, physics, &mut self.board, tick);
    }

    /// Pins anchored leg targets back in place.
    pub fn late_update(&self, scene: &mut Scene) {
        for anchor in self.board.legs.iter().filter_map(|leg| leg.anchor.as_ref()) {
            anchor.late_update(scene);
        }
    }
}

impl Observer<WalkerState> for Walker {
    fn on_state_changed(&mut self, _source: ComponentId, state: WalkerState) {
        self.push_state(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::scene::Transform;

    fn rig(scene: &mut Scene, left: usize, right: usize) -> WalkerRig {
        let body = scene.spawn("body", Transform::default());
        let body_rest = scene.spawn("body_rest", Transform::default());
        let mut leg = |name: &str| LegRig {
            target: scene.spawn(format!("{name}_target"), Transform::default()),
            home: scene.spawn(format!("{name}_home"), Transform::default()),
        };
        WalkerRig {
            body,
            body_rest,
            legs_left: (0..left).map(|_| leg("left")).collect(),
            legs_right: (0..right).map(|_| leg("right")).collect(),
        }
    }

    #[test]
    fn mismatched_leg_lists_are_rejected() {
        let mut scene = Scene::new();
        let rig = rig(&mut scene, 3, 2);
        assert!(matches!(
            Walker::new(ComponentId(0), &scene, rig, WalkerSettings::default()),
            Err(RigError::LegCountMismatch { left: 3, right: 2 })
        ));
    }

    #[test]
    fn missing_nodes_are_rejected() {
        let mut scene = Scene::new();
        let rig = rig(&mut scene, 1, 1);
        scene.despawn(rig.legs_right[0].home);
        assert!(matches!(
            Walker::new(ComponentId(0), &scene, rig, WalkerSettings::default()),
            Err(RigError::MissingNode {
                role: "leg home",
                ..
            })
        ));
    }

    #[test]
    fn pushed_state_is_ignored_while_inactive() {
        let mut scene = Scene::new();
        let rig = rig(&mut scene, 2, 2);
        let settings = WalkerSettings {
            active: false,
            ..Default::default()
        };
        let mut walker = Walker::new(ComponentId(0), &scene, rig, settings).unwrap();
        walker.push_state(WalkerState::Move);
        let physics = common::phys::Colliders::new();
        walker.fixed_update(&mut scene, &physics, Tick::default());
        assert_eq!(walker.state(), WalkerState::Off);
        assert_eq!(walker.running_tasks(), 0);
    }
}
