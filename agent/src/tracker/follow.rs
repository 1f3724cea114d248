use super::{search, Bone, TrackerBoard, TrackerState};
use crate::settings::SearchStrategy;
use common::{
    resources::Time,
    scene::{LayerMask, NodeId},
    task::{Delay, Lane, Task, TaskContext, TaskId, TaskStatus},
    trajectory::RotateOverTime,
    util::{signed_angle, Dir, Plane, Projection},
};
use tracing::debug;
use vek::*;

/// Pause between the bones reaching rest and the tracker searching again.
const SETTLE_GAP: f32 = 0.3;

/// Angle about `axis` that turns `aim` towards `local_target`, both given in
/// the bone's own frame. Components along `axis` are ignored.
pub fn bearing(local_target: Vec3<f32>, axis: Vec3<f32>, aim: Vec3<f32>) -> f32 {
    let Some(normal) = Dir::from_unnormalized(axis) else {
        return 0.0;
    };
    let plane = Plane::from(normal);
    let target = local_target.projected(&plane);
    let aim = aim.projected(&plane);
    if target.magnitude_squared() < 1e-12 || aim.magnitude_squared() < 1e-12 {
        return 0.0;
    }
    normal.dot(aim.cross(target)).atan2(aim.dot(target))
}

/// Limits `candidate` to at most `bound` radians of signed deviation about
/// `axis` from `rest`. Also returns whether clamping was needed.
pub fn clamp_to_bound(
    candidate: Quaternion<f32>,
    rest: Quaternion<f32>,
    axis: Vec3<f32>,
    bound: f32,
) -> (Quaternion<f32>, bool) {
    let angle = signed_angle(candidate, rest, axis);
    if angle.abs() > bound {
        let clamped = rest * Quaternion::rotation_3d(bound.copysign(angle), axis);
        (clamped.normalized(), true)
    } else {
        (candidate, false)
    }
}

/// Local rotation that turns `bone` about its axis to face `target`.
fn look_rotation(
    cx: &TaskContext<'_, TrackerBoard>,
    bone: Bone,
    target: Vec3<f32>,
) -> Quaternion<f32> {
    let current = cx.scene.local_rotation(bone.node).unwrap_or(bone.rest);
    match cx.scene.inverse_transform_point(bone.node, target) {
        Some(local) => {
            let angle = bearing(local, bone.axis, cx.board.aim);
            (current * Quaternion::rotation_3d(angle, bone.axis)).normalized()
        },
        None => current,
    }
}

fn focused_target(cx: &TaskContext<'_, TrackerBoard>) -> Option<NodeId> {
    cx.board.focused.filter(|target| cx.scene.contains(*target))
}

fn declare_lost(cx: &mut TaskContext<'_, TrackerBoard>, reason: &'static str) -> TaskStatus {
    debug!(focused = ?cx.board.focused, reason, "Target lost");
    cx.board.focused = None;
    cx.board.next_state = Some(TrackerState::Lost);
    TaskStatus::Done
}

#[derive(Copy, Clone, Debug)]
enum Aim {
    Start,
    /// Neck and head turning towards the last aim.
    Turning(TaskId, TaskId),
}

/// Turns neck and head towards the focused target, one refresh interval at a
/// time.
pub(super) struct Follow {
    aim: Aim,
}

impl Follow {
    pub fn new() -> Self { Self { aim: Aim::Start } }

    fn turn(cx: &mut TaskContext<'_, TrackerBoard>, bone: Bone, target: Vec3<f32>) -> TaskId {
        let candidate = look_rotation(cx, bone, target);
        let (to, clamped) = clamp_to_bound(candidate, bone.rest, bone.axis, bone.bound);
        cx.board.out_of_bounds |= clamped;
        let duration = cx.board.settings.refresh_interval;
        let ease = cx.board.settings.ease;
        cx.spawn(Lane::Frame, RotateOverTime::new(bone.node, to, duration).eased(ease))
    }
}

impl Task<TrackerBoard> for Follow {
    fn poll(&mut self, cx: &mut TaskContext<'_, TrackerBoard>) -> TaskStatus {
        if let Aim::Turning(neck, head) = self.aim {
            if cx.is_live(neck) || cx.is_live(head) {
                return TaskStatus::Pending;
            }
        }

        let Some(target) = focused_target(cx).and_then(|t| cx.scene.position(t)) else {
            return declare_lost(cx, "gone");
        };
        cx.board.out_of_bounds = false;
        let (neck, head) = (cx.board.neck, cx.board.head);
        let neck = Self::turn(cx, neck, target);
        let head = Self::turn(cx, head, target);
        self.aim = Aim::Turning(neck, head);
        TaskStatus::Pending
    }
}

/// Checks every bounds check interval whether the focused target is still
/// trackable.
pub(super) struct LossCheck {
    next: Option<Time>,
}

impl LossCheck {
    pub fn new() -> Self { Self { next: None } }
}

impl Task<TrackerBoard> for LossCheck {
    fn poll(&mut self, cx: &mut TaskContext<'_, TrackerBoard>) -> TaskStatus {
        let now = cx.time();
        if self.next.is_some_and(|next| now < next) {
            return TaskStatus::Pending;
        }
        self.next = Some(now.add_seconds(cx.board.settings.bounds_check_interval as f64));

        let Some(target) = focused_target(cx) else {
            return declare_lost(cx, "gone");
        };
        match cx.board.settings.search {
            SearchStrategy::RaycastFan => {
                if search::in_vision(cx.scene, cx.physics, cx.board, target) {
                    return TaskStatus::Pending;
                }
                if cx.board.out_of_bounds {
                    return declare_lost(cx, "out of bounds");
                }
                let reachable = cx.scene.position(cx.board.head_end).is_some_and(|eye| {
                    let range = cx.board.settings.detection_range;
                    cx.physics.reaches(cx.scene, eye, target, range, LayerMask::ALL)
                });
                if reachable {
                    TaskStatus::Pending
                } else {
                    declare_lost(cx, "occluded")
                }
            },
            SearchStrategy::NearestInVolume => {
                match search::nearest_reachable(cx.scene, cx.physics, cx.board) {
                    Some(nearest) => {
                        cx.board.focused = Some(nearest);
                        TaskStatus::Pending
                    },
                    None => declare_lost(cx, "no reachable candidate"),
                }
            },
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum Stage {
    Grace(Delay),
    Start,
    Turning(TaskId, TaskId),
    Settle(Delay),
}

/// Turns neck and head back to rest, then requests `then` if given.
pub(super) struct Reset {
    stage: Stage,
    then: Option<TrackerState>,
}

impl Reset {
    pub fn new(grace: Option<f32>, then: Option<TrackerState>) -> Self {
        Self {
            stage: grace.map_or(Stage::Start, |grace| Stage::Grace(Delay::new(grace))),
            then,
        }
    }

    fn to_rest(cx: &mut TaskContext<'_, TrackerBoard>, bone: Bone) -> TaskId {
        let duration = cx.board.settings.reset_duration;
        let ease = cx.board.settings.ease;
        cx.spawn(
            Lane::Frame,
            RotateOverTime::new(bone.node, bone.rest, duration).eased(ease),
        )
    }
}

impl Task<TrackerBoard> for Reset {
    fn poll(&mut self, cx: &mut TaskContext<'_, TrackerBoard>) -> TaskStatus {
        let now = cx.time();
        loop {
            self.stage = match self.stage {
                Stage::Grace(mut delay) => {
                    if !delay.elapsed(now) {
                        self.stage = Stage::Grace(delay);
                        return TaskStatus::Pending;
                    }
                    Stage::Start
                },
                Stage::Start => {
                    let (neck, head) = (cx.board.neck, cx.board.head);
                    let neck = Self::to_rest(cx, neck);
                    let head = Self::to_rest(cx, head);
                    self.stage = Stage::Turning(neck, head);
                    return TaskStatus::Pending;
                },
                Stage::Turning(neck, head) => {
                    if cx.is_live(neck) || cx.is_live(head) {
                        return TaskStatus::Pending;
                    }
                    Stage::Settle(Delay::new(SETTLE_GAP))
                },
                Stage::Settle(mut delay) => {
                    if !delay.elapsed(now) {
                        self.stage = Stage::Settle(delay);
                        return TaskStatus::Pending;
                    }
                    if let Some(then) = self.then {
                        cx.board.next_state = Some(then);
                    }
                    return TaskStatus::Done;
                },
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use common::util::angle_between;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, FRAC_PI_6};

    #[test]
    fn bearing_is_signed_about_axis() {
        let aim = Vec3::unit_y();
        assert_relative_eq!(bearing(Vec3::new(1.0, 0.0, 0.0), Vec3::unit_z(), aim), -FRAC_PI_2);
        assert_relative_eq!(bearing(Vec3::new(-1.0, 1.0, 5.0), Vec3::unit_z(), aim), FRAC_PI_4);
        // Head tilts up about x towards a target above
        assert_relative_eq!(bearing(Vec3::new(3.0, 1.0, 1.0), Vec3::unit_x(), aim), FRAC_PI_4);
        assert_eq!(bearing(Vec3::unit_z(), Vec3::unit_z(), aim), 0.0);
    }

    #[test]
    fn bearing_rotation_faces_target() {
        let target = Vec3::new(2.0, -1.0, 0.0);
        let angle = bearing(target, Vec3::unit_z(), Vec3::unit_y());
        let facing = Quaternion::rotation_3d(angle, Vec3::unit_z()) * Vec3::unit_y();
        assert_relative_eq!(facing, target.normalized(), epsilon = 1e-5);
    }

    #[test]
    fn within_bound_is_untouched() {
        let rest = Quaternion::rotation_x(0.2);
        let candidate = rest * Quaternion::rotation_z(FRAC_PI_6);
        let (rot, clamped) = clamp_to_bound(candidate, rest, Vec3::unit_z(), FRAC_PI_4);
        assert!(!clamped);
        assert_eq!(rot, candidate);
    }

    #[test]
    fn clamps_to_exactly_the_bound() {
        let rest = Quaternion::rotation_x(0.2);
        for angle in [1.2, -1.2, 2.5, -3.0] {
            let candidate = rest * Quaternion::rotation_z(angle);
            let (rot, clamped) = clamp_to_bound(candidate, rest, Vec3::unit_z(), FRAC_PI_4);
            assert!(clamped);
            assert_relative_eq!(angle_between(rot, rest), FRAC_PI_4, epsilon = 1e-4);
            assert_relative_eq!(
                signed_angle(rot, rest, Vec3::unit_z()),
                FRAC_PI_4.copysign(angle),
                epsilon = 1e-4
            );
        }
    }
}
