use skitter_agent::{
    settings::{ControllerSettings, WalkerSettings},
    walker::LegRig,
    ControllerRig, MoveInput, Walker, WalkerController, WalkerRig, WalkerState,
};
use approx::assert_relative_eq;
use common::{
    observer::ComponentId,
    phys::Colliders,
    resources::Time,
    scene::{Layer, Scene, Transform},
    task::Tick,
};
use std::{cell::RefCell, rc::Rc};
use vek::*;

const DT: f32 = 0.02;

struct Sim {
    scene: Scene,
    physics: Colliders,
    time: f64,
}

impl Sim {
    fn new() -> Self {
        Self {
            scene: Scene::new(),
            physics: Colliders::new().with_ground(0.0, Layer::DEFAULT),
            time: 0.0,
        }
    }

    fn tick(&mut self, walker: &mut Walker) {
        self.time += DT as f64;
        let tick = Tick::new(Time(self.time), DT);
        walker.fixed_update(&mut self.scene, &self.physics, tick);
        walker.frame_update(&mut self.scene, &self.physics, tick);
        walker.late_update(&mut self.scene);
    }

    /// Legs `pairs` per side, every foot displaced from its home by
    /// `displacement`.
    fn rig(&mut self, pairs: usize, displacement: Vec3<f32>) -> WalkerRig {
        let scene = &mut self.scene;
        let body = scene.spawn("body", Transform::from_position(Vec3::unit_z() * 0.5));
        let body_rest = scene.spawn("body_rest", Transform::from_position(Vec3::unit_z() * 0.5));
        let mut leg = |x: f32, i: usize| {
            let home = Vec3::new(x, 0.6 * i as f32, 0.0);
            LegRig {
                home: scene.spawn("home", Transform::from_position(home)),
                target: scene.spawn("foot", Transform::from_position(home + displacement)),
            }
        };
        let legs_left = (0..pairs).map(|i| leg(-0.8, i)).collect();
        let legs_right = (0..pairs).map(|i| leg(0.8, i)).collect();
        WalkerRig {
            body,
            body_rest,
            legs_left,
            legs_right,
        }
    }
}

fn settings() -> WalkerSettings {
    WalkerSettings {
        settle_delay: 0.0,
        step_duration: 0.1,
        ..Default::default()
    }
}

#[test]
fn groups_take_turns() {
    let mut sim = Sim::new();
    let rig = sim.rig(2, Vec3::new(0.0, -1.0, 0.0));
    let mut walker = Walker::new(ComponentId(0), &sim.scene, rig, settings()).unwrap();
    walker.push_state(WalkerState::Move);

    let mut first_step = [None; 4];
    for tick in 0..60 {
        sim.tick(&mut walker);
        let groups = walker.groups().clone();
        let movable = |group: &[usize]| group.iter().any(|leg| walker.legs()[*leg].can_move);
        assert!(
            !(movable(&groups[0]) && movable(&groups[1])),
            "both groups movable on tick {tick}"
        );
        for (leg, bone) in walker.legs().iter().enumerate() {
            if bone.steps > 0 && first_step[leg].is_none() {
                first_step[leg] = Some(tick);
            }
        }
    }

    let groups = walker.groups().clone();
    assert_eq!(groups, [vec![0, 3], vec![2, 1]]);
    let first_of = |group: &[usize]| -> Vec<i32> {
        group.iter().map(|leg| first_step[*leg].unwrap()).collect()
    };
    let (first, second) = (first_of(&groups[0]), first_of(&groups[1]));
    assert!(first.iter().max() < second.iter().min());

    // Every foot stepped once, then stayed within reach of home
    assert!(walker.legs().iter().all(|leg| leg.steps == 1));
    let completions = |group: &[usize]| -> Vec<u32> {
        group.iter().map(|leg| walker.legs()[*leg].completions).collect()
    };
    let (first, second) = (completions(&groups[0]), completions(&groups[1]));
    assert!(first.iter().all(|c| *c == first[0]));
    assert!(second.iter().all(|c| *c == second[0]));
    assert!(first[0] > 1);
    assert!(first[0] == second[0] || first[0] == second[0] + 1);
}

#[test]
fn stray_foot_lands_past_home() {
    let mut sim = Sim::new();
    let rig = sim.rig(1, Vec3::new(0.0, -1.0, 0.25));
    let homes: Vec<_> = rig
        .legs_left
        .iter()
        .chain(&rig.legs_right)
        .map(|leg| sim.scene.position(leg.home).unwrap())
        .collect();
    let mut walker = Walker::new(ComponentId(0), &sim.scene, rig, settings()).unwrap();
    walker.push_state(WalkerState::Move);

    for _ in 0..40 {
        sim.tick(&mut walker);
    }

    for (leg, home) in walker.legs().iter().zip(homes) {
        assert_eq!(leg.steps, 1);
        // Overshoot of half the distance, dropped onto the ground at z = 0
        assert_relative_eq!(
            sim.scene.position(leg.target).unwrap(),
            home + Vec3::new(0.0, 0.5, 0.0),
            epsilon = 1e-4
        );
    }
}

#[test]
fn close_feet_do_not_step() {
    let mut sim = Sim::new();
    let rig = sim.rig(3, Vec3::new(0.3, 0.0, 0.0));
    let mut walker = Walker::new(ComponentId(0), &sim.scene, rig, settings()).unwrap();
    walker.push_state(WalkerState::Move);
    for _ in 0..20 {
        sim.tick(&mut walker);
    }
    assert!(walker.legs().iter().all(|leg| leg.steps == 0));
    assert!(walker.legs().iter().all(|leg| leg.completions > 0));
}

#[test]
fn deactivation_stops_everything_and_restart_repartitions() {
    let mut sim = Sim::new();
    let rig = sim.rig(3, Vec3::new(0.0, -1.0, 0.0));
    let feet: Vec<_> = rig
        .legs_left
        .iter()
        .chain(&rig.legs_right)
        .map(|leg| leg.target)
        .collect();
    let body = rig.body;
    let mut walker = Walker::new(
        ComponentId(0),
        &sim.scene,
        rig,
        WalkerSettings {
            settle_delay: 0.1,
            ..settings()
        },
    )
    .unwrap();
    walker.push_state(WalkerState::Move);
    for _ in 0..10 {
        sim.tick(&mut walker);
    }
    let groups = walker.groups().clone();
    assert!(walker.running_tasks() > 2);

    walker.set_active(false);
    sim.tick(&mut walker);
    assert_eq!(walker.state(), WalkerState::Off);
    assert_eq!(walker.running_tasks(), 0);

    let positions = |scene: &Scene| -> Vec<Vec3<f32>> {
        feet.iter()
            .chain([&body])
            .map(|node| scene.position(*node).unwrap())
            .collect()
    };
    let frozen = positions(&sim.scene);
    for _ in 0..10 {
        sim.tick(&mut walker);
    }
    for (now, before) in positions(&sim.scene).into_iter().zip(frozen) {
        assert_relative_eq!(now, before, epsilon = 1e-6);
    }

    walker.set_active(true);
    walker.push_state(WalkerState::Move);
    let steps: Vec<_> = walker.legs().iter().map(|leg| leg.steps).collect();
    for _ in 0..3 {
        sim.tick(&mut walker);
    }
    assert_eq!(walker.state(), WalkerState::Move);
    // Still settling
    let now: Vec<_> = walker.legs().iter().map(|leg| leg.steps).collect();
    assert_eq!(now, steps);
    for _ in 0..10 {
        sim.tick(&mut walker);
    }
    assert_eq!(walker.groups(), &groups);
}

#[test]
fn legless_walker_keeps_turning_over() {
    let mut sim = Sim::new();
    let rig = sim.rig(0, Vec3::zero());
    let body = rig.body;
    let mut walker = Walker::new(ComponentId(0), &sim.scene, rig, settings()).unwrap();
    walker.push_state(WalkerState::Move);
    for _ in 0..10 {
        sim.tick(&mut walker);
    }
    assert_eq!(walker.state(), WalkerState::Move);
    assert_eq!(walker.groups(), &[Vec::new(), Vec::new()]);
    // Only the gait loop and body placement, the body left where it was
    assert_eq!(walker.running_tasks(), 2);
    assert_eq!(sim.scene.position(body), Some(Vec3::unit_z() * 0.5));
}

#[test]
fn each_transition_notifies_once_after_cancelling() {
    let mut sim = Sim::new();
    let rig = sim.rig(2, Vec3::zero());
    let mut walker = Walker::new(ComponentId(4), &sim.scene, rig, settings()).unwrap();
    let log = Rc::new(RefCell::new(Vec::<(ComponentId, WalkerState)>::new()));
    walker.add_observer(Rc::clone(&log));

    sim.tick(&mut walker);
    assert_eq!(walker.running_tasks(), 1);
    walker.push_state(WalkerState::Move);
    sim.tick(&mut walker);
    sim.tick(&mut walker);
    assert!(walker.running_tasks() > 2);
    walker.push_state(WalkerState::Idle);
    sim.tick(&mut walker);
    // Only the idle float is left
    assert_eq!(walker.running_tasks(), 1);
    walker.push_state(WalkerState::Idle);
    sim.tick(&mut walker);

    assert_eq!(*log.borrow(), vec![
        (ComponentId(4), WalkerState::Idle),
        (ComponentId(4), WalkerState::Move),
        (ComponentId(4), WalkerState::Idle),
    ]);
}

#[test]
fn controller_drives_walker() {
    let mut sim = Sim::new();
    let rig = sim.rig(3, Vec3::zero());
    let root = sim.scene.spawn("root", Transform::default());
    let probe = sim
        .scene
        .spawn_child(root, "probe", Transform::from_position(Vec3::unit_z()))
        .unwrap();
    let body = rig.body;
    let walker = Rc::new(RefCell::new(
        Walker::new(ComponentId(0), &sim.scene, rig, settings()).unwrap(),
    ));
    let mut controller = WalkerController::new(
        ComponentId(1),
        &mut sim.scene,
        ControllerRig {
            root,
            body,
            raycast_point: probe,
        },
        ControllerSettings::default(),
    )
    .unwrap();
    controller.add_observer(Rc::clone(&walker));

    let forward = MoveInput {
        forward: 1.0,
        ..Default::default()
    };
    for input in [forward, MoveInput { sprint: true, ..forward }] {
        controller.fixed_update(&mut sim.scene, input, DT);
        sim.tick(&mut walker.borrow_mut());
    }
    assert_eq!(walker.borrow().state(), WalkerState::MoveFast);

    controller.fixed_update(&mut sim.scene, MoveInput::default(), DT);
    sim.tick(&mut walker.borrow_mut());
    assert_eq!(walker.borrow().state(), WalkerState::Idle);
}
