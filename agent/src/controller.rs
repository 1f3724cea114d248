//! Moves a walker's root from player style input and tells the walker which
//! gait to use.

use crate::{
    error::{require, RigError},
    settings::ControllerSettings,
    walker::WalkerState,
};
use common::{
    observer::{ComponentId, Observer, ObserverId, Observers},
    phys::RayCast,
    scene::{NodeId, Scene},
    util::Dir,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use vek::*;

/// Movement input for one fixed tick. Axes are in `[-1, 1]`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveInput {
    pub forward: f32,
    pub strafe: f32,
    /// Positive turns clockwise seen from above.
    pub turn: f32,
    pub sprint: bool,
}

impl MoveInput {
    pub fn is_turning(&self) -> bool { self.turn != 0.0 }

    pub fn any(&self) -> bool { self.forward != 0.0 || self.strafe != 0.0 || self.is_turning() }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerRig {
    /// Node that is moved and turned.
    pub root: NodeId,
    pub body: NodeId,
    /// Ground probes are cast down from here.
    pub raycast_point: NodeId,
}

pub struct WalkerController {
    id: ComponentId,
    rig: ControllerRig,
    state: WalkerState,
    active: bool,
    /// Activation last announced to observers.
    announced: bool,
    settings: ControllerSettings,
    observers: Observers<WalkerState>,
}

impl WalkerController {
    pub fn new(
        id: ComponentId,
        scene: &mut Scene,
        rig: ControllerRig,
        settings: ControllerSettings,
    ) -> Result<Self, RigError> {
        require(scene, "root", rig.root)?;
        require(scene, "body", rig.body)?;
        require(scene, "raycast point", rig.raycast_point)?;
        scene.set_local_position(rig.body, Vec3::unit_z() * settings.body_offset);

        Ok(Self {
            id,
            rig,
            state: WalkerState::Off,
            active: settings.active,
            announced: false,
            settings,
            observers: Observers::new(),
        })
    }

    pub fn id(&self) -> ComponentId { self.id }

    pub fn state(&self) -> WalkerState { self.state }

    pub fn is_active(&self) -> bool { self.active }

    pub fn settings(&self) -> &ControllerSettings { &self.settings }

    /// Takes effect on the next fixed tick.
    pub fn set_active(&mut self, active: bool) { self.active = active; }

    pub fn add_observer<O: Observer<WalkerState> + 'static>(&mut self, observer: O) -> ObserverId {
        self.observers.add(observer)
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> bool { self.observers.remove(id) }

    fn set_state(&mut self, state: WalkerState) {
        if state != self.state {
            debug!(id = %self.id, ?state, "Controller state changed");
            self.state = state;
            self.observers.notify(self.id, state);
        }
    }

    /// Announces a change of activation as `Idle` or `Off`.
    fn activate(&mut self) {
        if self.active != self.announced {
            self.announced = self.active;
            let state = if self.active {
                WalkerState::Idle
            } else {
                WalkerState::Off
            };
            self.state = state;
            self.observers.notify(self.id, state);
        }
    }

    fn speed(&self) -> f32 {
        match self.state {
            WalkerState::MoveFast => {
                self.settings.movement_speed * self.settings.sprint_multiplier
            },
            _ => self.settings.movement_speed,
        }
    }

    pub fn fixed_update(&mut self, scene: &mut Scene, input: MoveInput, dt: f32) {
        self.activate();
        if self.state == WalkerState::Off {
            return;
        }

        let root = self.rig.root;
        let rot = scene.local_rotation(root).unwrap_or_default();
        let turn = input.turn.clamp(-1.0, 1.0) * self.settings.rotation_speed * dt;
        let rot = (rot * Quaternion::rotation_z(-turn)).normalized();
        scene.set_local_rotation(root, rot);

        let step = Vec3::new(input.strafe.clamp(-1.0, 1.0), input.forward.clamp(-1.0, 1.0), 0.0)
            * self.speed()
            * dt;
        if let Some(pos) = scene.local_position(root) {
            scene.set_local_position(root, pos + rot * step);
        }

        let next = if !input.any() {
            if self.state.is_moving() {
                WalkerState::Idle
            } else {
                self.state
            }
        } else if input.sprint && !input.is_turning() && self.state.is_moving() {
            WalkerState::MoveFast
        } else {
            WalkerState::Move
        };
        self.set_state(next);
    }

    /// Snaps the root onto the ground below the raycast point, optionally
    /// leaning the body into the ground normal.
    pub fn late_update(&self, scene: &mut Scene, physics: &dyn RayCast) {
        let Some(probe) = scene.position(self.rig.raycast_point) else {
            return;
        };
        let Some(hit) = physics.cast(
            scene,
            probe,
            Dir::down(),
            f32::INFINITY,
            self.settings.ground_mask,
        ) else {
            return;
        };
        if let Some(pos) = scene.position(self.rig.root) {
            scene.set_position(self.rig.root, pos.with_z(hit.point.z));
        }
        if self.settings.rotate_to_plane_normal {
            if let Some(rot) = scene.rotation(self.rig.body) {
                let up = rot * Vec3::unit_z();
                let aligned = Quaternion::<f32>::rotation_from_to_3d(up, *hit.normal) * rot;
                scene.set_rotation(self.rig.body, aligned);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use common::{
        phys::Colliders,
        scene::{Layer, LayerMask, Transform},
    };
    use std::{cell::RefCell, rc::Rc};

    type Log = Rc<RefCell<Vec<(ComponentId, WalkerState)>>>;

    fn setup() -> (Scene, WalkerController) {
        let mut scene = Scene::new();
        let root = scene.spawn("root", Transform::default());
        let body = scene.spawn_child(root, "body", Transform::default()).unwrap();
        let raycast_point = scene
            .spawn_child(root, "probe", Transform::from_position(Vec3::unit_z()))
            .unwrap();
        let rig = ControllerRig {
            root,
            body,
            raycast_point,
        };
        let controller =
            WalkerController::new(ComponentId(7), &mut scene, rig, ControllerSettings::default())
                .unwrap();
        (scene, controller)
    }

    fn record(controller: &mut WalkerController) -> Log {
        let log = Log::default();
        controller.add_observer(log.clone());
        log
    }

    #[test]
    fn body_starts_at_offset() {
        let (scene, controller) = setup();
        assert_relative_eq!(
            scene.local_position(controller.rig.body).unwrap(),
            Vec3::new(0.0, 0.0, 0.5)
        );
    }

    #[test]
    fn states_follow_input() {
        let (mut scene, mut controller) = setup();
        let log = record(&mut controller);
        let forward = MoveInput {
            forward: 1.0,
            ..Default::default()
        };
        let sprint = MoveInput {
            sprint: true,
            ..forward
        };

        controller.fixed_update(&mut scene, MoveInput::default(), 0.1);
        controller.fixed_update(&mut scene, forward, 0.1);
        controller.fixed_update(&mut scene, sprint, 0.1);
        controller.fixed_update(&mut scene, sprint, 0.1);
        controller.fixed_update(&mut scene, MoveInput { turn: 1.0, ..sprint }, 0.1);
        controller.fixed_update(&mut scene, MoveInput::default(), 0.1);

        let states: Vec<_> = log.borrow().iter().map(|(_, s)| *s).collect();
        assert_eq!(states, vec![
            WalkerState::Idle,
            WalkerState::Move,
            WalkerState::MoveFast,
            WalkerState::Move,
            WalkerState::Idle,
        ]);
        assert!(log.borrow().iter().all(|(id, _)| *id == ComponentId(7)));
    }

    #[test]
    fn sprint_from_standstill_walks_first() {
        let (mut scene, mut controller) = setup();
        controller.fixed_update(&mut scene, MoveInput::default(), 0.1);
        controller.fixed_update(
            &mut scene,
            MoveInput {
                forward: 1.0,
                sprint: true,
                ..Default::default()
            },
            0.1,
        );
        assert_eq!(controller.state(), WalkerState::Move);
    }

    #[test]
    fn moves_along_facing() {
        let (mut scene, mut controller) = setup();
        let root = controller.rig.root;
        scene.set_local_rotation(root, Quaternion::rotation_z(-std::f32::consts::FRAC_PI_2));
        controller.fixed_update(
            &mut scene,
            MoveInput {
                forward: 1.0,
                ..Default::default()
            },
            0.5,
        );
        // Facing +x after a quarter turn clockwise, moving 2 units/s
        assert_relative_eq!(
            scene.position(root).unwrap(),
            Vec3::new(1.0, 0.0, 0.0),
            epsilon = 1e-5
        );
    }

    #[test]
    fn inactive_controller_stays_put() {
        let (mut scene, mut controller) = setup();
        let log = record(&mut controller);
        controller.set_active(false);
        controller.fixed_update(
            &mut scene,
            MoveInput {
                forward: 1.0,
                ..Default::default()
            },
            0.5,
        );
        assert!(log.borrow().is_empty());
        assert_eq!(scene.position(controller.rig.root), Some(Vec3::zero()));
    }

    #[test]
    fn root_snaps_to_ground() {
        let (mut scene, controller) = setup();
        let physics = Colliders::new().with_ground(-0.4, Layer::DEFAULT);
        controller.late_update(&mut scene, &physics);
        assert_relative_eq!(scene.position(controller.rig.root).unwrap().z, -0.4, epsilon = 1e-5);

        let mut controller = controller;
        controller.settings.ground_mask = LayerMask::NONE;
        scene.set_position(controller.rig.root, Vec3::zero());
        controller.late_update(&mut scene, &physics);
        assert_eq!(scene.position(controller.rig.root), Some(Vec3::zero()));
    }
}
