use agent::MoveInput;
use common::scene::{NodeId, Scene};
use rand::{rngs::StdRng, Rng, SeedableRng};
use vek::*;

/// Moves a node between random points on a disc at constant speed.
pub struct Wander {
    node: NodeId,
    rng: StdRng,
    center: Vec3<f32>,
    radius: f32,
    speed: f32,
    goal: Option<Vec3<f32>>,
}

impl Wander {
    pub fn new(node: NodeId, seed: u64, center: Vec3<f32>, radius: f32, speed: f32) -> Self {
        Self {
            node,
            rng: StdRng::seed_from_u64(seed),
            center,
            radius,
            speed,
            goal: None,
        }
    }

    fn pick_goal(&mut self) -> Vec3<f32> {
        let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
        let dist = self.radius * self.rng.gen::<f32>().sqrt();
        self.center + Vec3::new(angle.cos(), angle.sin(), 0.0) * dist
    }

    pub fn tick(&mut self, scene: &mut Scene, dt: f32) {
        let Some(pos) = scene.position(self.node) else {
            return;
        };
        let goal = match self.goal {
            Some(goal) => goal,
            None => {
                let goal = self.pick_goal();
                self.goal = Some(goal);
                goal
            },
        };
        let to_goal = goal - pos;
        let step = self.speed * dt;
        if to_goal.magnitude() <= step {
            scene.set_position(self.node, goal);
            self.goal = None;
        } else {
            scene.set_position(self.node, pos + to_goal.normalized() * step);
        }
    }
}

/// Stands in for a player, changing its mind every few seconds.
pub struct Pilot {
    rng: StdRng,
    input: MoveInput,
    until: f64,
}

impl Pilot {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            input: MoveInput::default(),
            until: 0.0,
        }
    }

    pub fn input(&mut self, time: f64) -> MoveInput {
        if time >= self.until {
            self.until = time + self.rng.gen_range(2.0..5.0);
            self.input = match self.rng.gen_range(0..5) {
                0 => MoveInput::default(),
                1 => MoveInput {
                    turn: if self.rng.gen() { 1.0 } else { -1.0 },
                    ..Default::default()
                },
                2 => MoveInput {
                    forward: 1.0,
                    sprint: true,
                    ..Default::default()
                },
                _ => MoveInput {
                    forward: 1.0,
                    turn: self.rng.gen_range(-0.3..0.3),
                    ..Default::default()
                },
            };
        }
        self.input
    }
}
