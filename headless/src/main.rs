#![deny(clippy::clone_on_ref_ptr)]

mod platform;
mod wander;

use agent::{
    walker::LegRig, ControllerRig, RigError, Settings, StateIndicator, Tracker, TrackerRig, Walker,
    WalkerController, WalkerRig,
};
use clap::Parser;
use common::{
    clock::Clock,
    observer::{ComponentId, Observer},
    phys::{Collider, Colliders, TriggerEvent, TriggerSphere},
    resources::Time,
    scene::{Layer, NodeId, Scene, Transform},
    task::Tick,
};
use platform::{Headless, Platform};
use std::{cell::RefCell, fmt, path::PathBuf, rc::Rc, time::Duration};
use tracing::{error, info};
use vek::*;
use wander::{Pilot, Wander};

#[derive(Parser)]
struct Args {
    /// Simulated seconds to run for.
    #[clap(short, long, default_value_t = 30.0)]
    seconds: f64,

    /// Fixed ticks per second.
    #[clap(long, default_value_t = 50)]
    tps: u32,

    /// Frames per second.
    #[clap(long, default_value_t = 60)]
    fps: u32,

    /// Settings file, created with defaults if missing.
    #[clap(long, default_value = "skitter.ron")]
    settings: PathBuf,

    /// Directory to additionally write daily rolling logs to.
    #[clap(long)]
    log_dir: Option<PathBuf>,

    #[clap(long, default_value_t = 0)]
    seed: u64,

    /// Sleep between frames instead of running as fast as possible.
    #[clap(long)]
    realtime: bool,
}

/// Logs every state change it is told about.
struct StateLog;

impl<T: fmt::Debug> Observer<T> for StateLog {
    fn on_state_changed(&mut self, source: ComponentId, state: T) {
        info!(%source, ?state, "State changed");
    }
}

const WALKER: ComponentId = ComponentId(1);
const CONTROLLER: ComponentId = ComponentId(2);
const TRACKER: ComponentId = ComponentId(3);

struct Demo {
    scene: Scene,
    physics: Colliders,
    controller: WalkerController,
    walker: Rc<RefCell<Walker>>,
    tracker: Tracker,
    indicators: [Rc<RefCell<StateIndicator>>; 2],
    trigger: TriggerSphere,
    root: NodeId,
    target: NodeId,
    wander: Wander,
    pilot: Pilot,
    camera: Vec3<f32>,
}

impl Demo {
    fn new(mut settings: Settings, seed: u64) -> Result<Self, RigError> {
        let mut scene = Scene::new();
        let detectable = scene
            .define_layer(&settings.tracker.detection_layer)
            .ok_or_else(|| RigError::UnknownLayer(settings.tracker.detection_layer.clone()))?;
        settings.walker.ground_mask = settings.walker.ground_mask.without(detectable);
        settings.controller.ground_mask = settings.controller.ground_mask.without(detectable);

        let mut physics = Colliders::new().with_ground(0.0, Layer::DEFAULT);

        // Hexapod: the controller moves `root`, homes ride along with it while
        // the feet stay behind in the world until they step.
        let root = scene.spawn("root", Transform::default());
        let body = scene.spawn_child(root, "body", Transform::default());
        let rest = Transform::from_position(Vec3::unit_z() * 0.5);
        let body_rest = scene.spawn_child(root, "body_rest", rest);
        let probe = scene.spawn_child(root, "probe", Transform::from_position(Vec3::unit_z()));
        let (Some(body), Some(body_rest), Some(probe)) = (body, body_rest, probe) else {
            return Err(RigError::MissingNode { role: "root", node: root });
        };

        let mut leg = |side: &str, x: f32, y: f32| -> Result<LegRig, RigError> {
            let at = Transform::from_position(Vec3::new(x, y, 0.0));
            let home = scene
                .spawn_child(root, format!("{side}_home"), at)
                .ok_or(RigError::MissingNode { role: "root", node: root })?;
            let target = scene.spawn(format!("{side}_foot"), at);
            Ok(LegRig { target, home })
        };
        let rows = [0.6, 0.0, -0.6];
        let legs_left = rows
            .iter()
            .map(|y| leg("left", -0.8, *y))
            .collect::<Result<Vec<_>, _>>()?;
        let legs_right = rows
            .iter()
            .map(|y| leg("right", 0.8, *y))
            .collect::<Result<Vec<_>, _>>()?;

        // Neck on the front of the body, vision fan spread out in front of
        // the head end.
        let missing = |node| RigError::MissingNode { role: "body", node };
        let neck = scene
            .spawn_child(body, "neck", Transform::from_position(Vec3::new(0.0, 0.5, 0.2)))
            .ok_or(missing(body))?;
        let head = scene
            .spawn_child(neck, "head", Transform::from_position(Vec3::unit_z() * 0.2))
            .ok_or(missing(neck))?;
        let head_end = scene
            .spawn_child(head, "head_end", Transform::from_position(Vec3::unit_y() * 0.2))
            .ok_or(missing(head))?;
        for x in [-0.3, -0.15, 0.0, 0.15, 0.3] {
            for z in [-0.1, 0.1] {
                scene
                    .spawn_child(head_end, "ray", Transform::from_position(Vec3::new(x, 0.5, z)))
                    .ok_or(missing(head_end))?;
            }
        }

        let target = scene.spawn("target", Transform::from_position(Vec3::new(0.0, 5.0, 0.6)));
        scene.set_layer(target, detectable);
        physics.add(Collider::Sphere {
            node: target,
            radius: 0.3,
        });
        let pillar = scene.spawn("pillar", Transform::from_position(Vec3::new(2.5, 2.5, 1.0)));
        physics.add(Collider::Cuboid {
            node: pillar,
            half_extents: Vec3::new(0.3, 0.3, 1.0),
        });

        let mut controller = WalkerController::new(
            CONTROLLER,
            &mut scene,
            ControllerRig {
                root,
                body,
                raycast_point: probe,
            },
            settings.controller.clone(),
        )?;
        let mut walker = Walker::new(
            WALKER,
            &scene,
            WalkerRig {
                body,
                body_rest,
                legs_left,
                legs_right,
            },
            settings.walker.clone(),
        )?;
        let mut tracker = Tracker::new(
            TRACKER,
            &scene,
            TrackerRig {
                neck,
                head,
                head_end,
                ray_points: Vec::new(),
            },
            settings.tracker.clone(),
        )?;

        let frames =
            |names: &[&str]| -> Vec<String> { names.iter().map(|n| n.to_string()).collect() };
        let above = |height: f32| Transform::from_position(Vec3::unit_z() * height);
        let walker_indicator = Rc::new(RefCell::new(StateIndicator::new(
            frames(&["off", "idle", "move", "move_fast"]),
            scene.spawn_child(body, "walker_indicator", above(0.6)),
        )));
        let tracker_indicator = Rc::new(RefCell::new(StateIndicator::new(
            frames(&["off", "standby", "search", "detected", "lost"]),
            scene.spawn_child(head, "tracker_indicator", above(0.3)),
        )));
        walker.add_observer(Rc::clone(&walker_indicator));
        walker.add_observer(StateLog);
        tracker.add_observer(Rc::clone(&tracker_indicator));
        tracker.add_observer(StateLog);

        let walker = Rc::new(RefCell::new(walker));
        controller.add_observer(Rc::clone(&walker));

        Ok(Self {
            trigger: TriggerSphere::new(head_end, settings.tracker.detection_range),
            wander: Wander::new(target, seed, Vec3::new(0.0, 3.0, 0.6), 6.0, 1.0),
            pilot: Pilot::new(seed.wrapping_add(1)),
            camera: Vec3::new(0.0, -8.0, 4.0),
            indicators: [walker_indicator, tracker_indicator],
            scene,
            physics,
            controller,
            walker,
            tracker,
            root,
            target,
        })
    }

    fn fixed_tick(&mut self, tick: Tick) {
        let dt = tick.dt.0;
        self.wander.tick(&mut self.scene, dt);
        let input = self.pilot.input(tick.time.0);
        self.controller.fixed_update(&mut self.scene, input, dt);
        self.walker
            .borrow_mut()
            .fixed_update(&mut self.scene, &self.physics, tick);

        for event in self.trigger.update(&self.scene, &[self.target]) {
            match event {
                TriggerEvent::Enter(node) => self.tracker.on_trigger_enter(&self.scene, node),
                TriggerEvent::Exit(node) => self.tracker.on_trigger_exit(node),
            }
        }
        self.tracker
            .fixed_update(&mut self.scene, &self.physics, tick);
    }

    fn frame(&mut self, tick: Tick) {
        self.walker
            .borrow_mut()
            .frame_update(&mut self.scene, &self.physics, tick);
        self.tracker
            .frame_update(&mut self.scene, &self.physics, tick);

        self.controller.late_update(&mut self.scene, &self.physics);
        self.walker.borrow().late_update(&mut self.scene);
        for indicator in &self.indicators {
            indicator.borrow().billboard(&mut self.scene, self.camera);
        }
    }

    fn report(&self) {
        let walker = self.walker.borrow();
        let steps: Vec<u32> = walker.legs().iter().map(|leg| leg.steps).collect();
        info!(
            walker = ?walker.state(),
            controller = ?self.controller.state(),
            tracker = ?self.tracker.state(),
            focused = ?self.tracker.focused().and_then(|n| self.scene.name(n)),
            ?steps,
            root = ?self.scene.position(self.root),
            "Run finished"
        );
    }
}

fn main() {
    let args = Args::parse();
    let _guards = common_frontend::init_stdout(
        args.log_dir
            .as_deref()
            .map(|path| (path, "skitter-headless.log")),
    );

    let settings = Settings::load(&args.settings);
    let mut demo = match Demo::new(settings, args.seed) {
        Ok(demo) => demo,
        Err(e) => {
            error!(%e, "Failed to set up the demo scene");
            return;
        },
    };
    let mut platform = Headless::default();
    platform.hide_cursor();

    info!(seconds = args.seconds, tps = args.tps, fps = args.fps, "Starting headless run");
    let mut clock = Clock::new(Duration::from_secs_f64(1.0 / args.tps.max(1) as f64));
    let frame = Duration::from_secs_f64(1.0 / args.fps.max(1) as f64);
    let mut fixed_time = Time::default();

    while clock.time().0 < args.seconds {
        let ticks = clock.advance(frame);
        for _ in 0..ticks {
            fixed_time = fixed_time.add_seconds(clock.fixed_dt().0 as f64);
            demo.fixed_tick(Tick::new(fixed_time, clock.fixed_dt().0));
        }
        demo.frame(Tick::new(clock.time(), clock.last_dt().0));

        if args.realtime {
            clock.pace(frame);
        }
    }

    platform.show_cursor();
    demo.report();
    info!(locked = platform.is_cursor_locked(), fps = clock.get_fps(), "Shut down");
}
