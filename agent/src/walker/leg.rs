use super::WalkerBoard;
use common::{
    anchor::PositionAnchor,
    phys::{project_to_ground, RayCast},
    scene::{LayerMask, NodeId, Scene},
    task::{Lane, Task, TaskContext, TaskId, TaskStatus},
    trajectory::{Curve, MoveOverTime, Space},
    util::{planar_distance, Dir, Plane, Projection},
};
use serde::{Deserialize, Serialize};
use tracing::trace;
use vek::*;

/// Node pair making up one leg as configured.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegRig {
    /// IK end effector the leg solver follows.
    pub target: NodeId,
    /// Point on the walker the foot is drawn back towards.
    pub home: NodeId,
}

#[derive(Clone, Debug)]
pub struct LegBone {
    pub target: NodeId,
    pub home: NodeId,
    /// Set by the gait loop to admit the leg into the active step group.
    pub can_move: bool,
    pub anchor: Option<PositionAnchor>,
    /// Completion reports so far, stepped or not.
    pub completions: u32,
    /// Steps actually taken.
    pub steps: u32,
}

impl LegBone {
    pub fn new(rig: LegRig, anchored: bool) -> Self {
        Self {
            target: rig.target,
            home: rig.home,
            can_move: false,
            anchor: anchored.then(|| PositionAnchor::new(rig.target)),
            completions: 0,
            steps: 0,
        }
    }

    pub fn home_distance(&self, scene: &Scene) -> Option<f32> {
        Some(planar_distance(
            scene.position(self.home)?,
            scene.position(self.target)?,
        ))
    }

    fn set_anchored(&mut self, scene: &Scene, anchored: bool) {
        if let Some(anchor) = &mut self.anchor {
            anchor.set_anchored(scene, anchored);
        }
    }
}

/// Splits legs into the two alternating groups so that diagonally opposed
/// legs step together. Legs are indexed left side first, then right side.
///
/// Left leg `i` goes to group `i % 2`, right leg `i` to group `(i + 1) % 2`.
pub fn partition(pairs: usize) -> [Vec<usize>; 2] {
    let mut groups = [Vec::with_capacity(pairs), Vec::with_capacity(pairs)];
    for i in 0..pairs {
        groups[i % 2].push(i);
        groups[(i + 1) % 2].push(pairs + i);
    }
    groups
}

/// Where a foot at `current` should land when stepping back to `home`:
/// past home by `overshoot` of the planar distance, in the direction of
/// travel, snapped onto the ground.
pub fn step_target(
    physics: &dyn RayCast,
    scene: &Scene,
    current: Vec3<f32>,
    home: Vec3<f32>,
    overshoot: f32,
    probe_height: f32,
    mask: LayerMask,
) -> Vec3<f32> {
    let travel = (home - current).projected(&Plane::xy());
    let distance = travel.magnitude();
    let target = match Dir::from_unnormalized(travel) {
        Some(dir) => home + *dir * (overshoot * distance),
        None => home,
    };
    project_to_ground(physics, scene, target, probe_height, mask).unwrap_or(target)
}

#[derive(Copy, Clone, Debug)]
enum Stage {
    /// Waiting to be admitted by the gait loop.
    Gate,
    /// Was close enough to home, give it one more tick.
    Recheck,
    Stepping(TaskId),
}

/// Watches one leg for the lifetime of a moving state, stepping it whenever
/// it is admitted and has strayed too far from home.
pub struct LegWatcher {
    leg: usize,
    stage: Stage,
}

impl LegWatcher {
    pub fn new(leg: usize) -> Self {
        Self {
            leg,
            stage: Stage::Gate,
        }
    }

    fn needs_step(&self, cx: &TaskContext<'_, WalkerBoard>) -> bool {
        let max = cx.board.settings.max_home_distance;
        cx.board.legs[self.leg]
            .home_distance(cx.scene)
            .is_some_and(|d| d > max)
    }

    fn start_step(&mut self, cx: &mut TaskContext<'_, WalkerBoard>) -> Stage {
        let board = &mut *cx.board;
        let leg = &mut board.legs[self.leg];
        let (Some(current), Some(home)) = (cx.scene.position(leg.target), cx.scene.position(leg.home))
        else {
            return Stage::Gate;
        };
        let settings = &board.settings;
        let to = step_target(
            cx.physics,
            cx.scene,
            current,
            home,
            settings.overshoot,
            settings.ground_probe_height,
            settings.ground_mask,
        );
        trace!(leg = self.leg, ?current, ?to, "Stepping");

        leg.set_anchored(cx.scene, false);
        leg.steps += 1;
        let step = MoveOverTime::new(leg.target, to, board.step_duration)
            .curve(Curve::Bow)
            .space(Space::Global)
            .eased(settings.step_ease);
        Stage::Stepping(cx.spawn(Lane::Frame, step))
    }

    fn complete(&self, cx: &mut TaskContext<'_, WalkerBoard>) -> Stage {
        let board = &mut *cx.board;
        let leg = &mut board.legs[self.leg];
        leg.can_move = false;
        leg.completions += 1;
        leg.set_anchored(cx.scene, true);
        let group = board.group_of[self.leg];
        board.completed[group] += 1;
        Stage::Gate
    }
}

impl Task<WalkerBoard> for LegWatcher {
    fn poll(&mut self, cx: &mut TaskContext<'_, WalkerBoard>) -> TaskStatus {
        let stage = self.stage;
        self.stage = match stage {
            Stage::Gate if !cx.board.legs[self.leg].can_move => Stage::Gate,
            Stage::Gate if self.needs_step(cx) => self.start_step(cx),
            Stage::Gate => Stage::Recheck,
            Stage::Recheck if self.needs_step(cx) => self.start_step(cx),
            Stage::Recheck => self.complete(cx),
            Stage::Stepping(id) if cx.is_live(id) => Stage::Stepping(id),
            Stage::Stepping(_) => self.complete(cx),
        };
        TaskStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{phys::Colliders, scene::Layer};

    #[test]
    fn diagonal_legs_share_a_group() {
        // 0..3 left, 3..6 right
        let [first, second] = partition(3);
        assert_eq!(first, vec![0, 4, 2]);
        assert_eq!(second, vec![3, 1, 5]);
        assert_eq!(partition(3), partition(3));
    }

    #[test]
    fn step_overshoots_home_and_lands_on_ground() {
        let scene = Scene::new();
        let physics = Colliders::new().with_ground(0.2, Layer::DEFAULT);
        let current = Vec3::new(0.0, -1.0, 0.7);
        let home = Vec3::new(0.0, 0.0, 0.0);
        let to = step_target(&physics, &scene, current, home, 0.5, 2.0, LayerMask::ALL);
        approx::assert_relative_eq!(to, Vec3::new(0.0, 0.5, 0.2), epsilon = 1e-5);
    }

    #[test]
    fn step_without_ground_keeps_height() {
        let scene = Scene::new();
        let to = step_target(
            &Colliders::new(),
            &scene,
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 0.3),
            0.25,
            2.0,
            LayerMask::ALL,
        );
        approx::assert_relative_eq!(to, Vec3::new(-0.25, 0.0, 0.3), epsilon = 1e-5);
    }
}
