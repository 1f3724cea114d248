use super::{TrackerBoard, TrackerState};
use crate::settings::SearchStrategy;
use common::{
    phys::RayCast,
    resources::Time,
    scene::{LayerMask, NodeId, Scene},
    task::{Lane, Task, TaskContext, TaskId, TaskStatus},
    trajectory::RotateOverTime,
    util::Dir,
};
use tracing::debug;
use vek::*;

/// Vision fan: rays start at the head end and point from the head through
/// every ray point.
pub(super) fn fan_rays(scene: &Scene, board: &TrackerBoard) -> Vec<(Vec3<f32>, Dir)> {
    let (Some(origin), Some(head)) = (
        scene.position(board.head_end),
        scene.position(board.head.node),
    ) else {
        return Vec::new();
    };
    board
        .ray_points
        .iter()
        .filter_map(|p| Dir::from_unnormalized(scene.position(*p)? - head))
        .map(|dir| (origin, dir))
        .collect()
}

/// First detection layer node hit along the fan.
pub(super) fn search_fan(
    scene: &Scene,
    physics: &dyn RayCast,
    board: &TrackerBoard,
) -> Option<NodeId> {
    let range = board.settings.detection_range;
    fan_rays(scene, board).into_iter().find_map(|(origin, dir)| {
        physics
            .cast(scene, origin, dir, range, LayerMask::ALL)
            .and_then(|hit| hit.node)
            .filter(|node| scene.layer(*node) == Some(board.detection_layer))
    })
}

/// Whether any fan ray currently hits `target`.
pub(super) fn in_vision(
    scene: &Scene,
    physics: &dyn RayCast,
    board: &TrackerBoard,
    target: NodeId,
) -> bool {
    let range = board.settings.detection_range;
    fan_rays(scene, board).into_iter().any(|(origin, dir)| {
        physics
            .cast(scene, origin, dir, range, LayerMask::ALL)
            .is_some_and(|hit| hit.node == Some(target))
    })
}

/// Closest trigger volume member, measured from the head end, that the head
/// has a clear line of sight to.
pub(super) fn nearest_reachable(
    scene: &Scene,
    physics: &dyn RayCast,
    board: &TrackerBoard,
) -> Option<NodeId> {
    let eye = scene.position(board.head_end)?;
    let head = scene.position(board.head.node)?;
    let range = board.settings.detection_range;
    board
        .in_area
        .iter()
        .filter_map(|node| Some((*node, scene.position(*node)?.distance(eye))))
        .filter(|(node, _)| physics.reaches(scene, head, *node, range, LayerMask::ALL))
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(node, _)| node)
}

pub(super) fn acquire(
    scene: &Scene,
    physics: &dyn RayCast,
    board: &TrackerBoard,
) -> Option<NodeId> {
    match board.settings.search {
        SearchStrategy::RaycastFan => search_fan(scene, physics, board),
        SearchStrategy::NearestInVolume => nearest_reachable(scene, physics, board),
    }
}

/// Looks for a target every refresh interval, starting right away, and asks
/// for `Detected` once one is found.
pub(super) struct Acquire {
    next_search: Option<Time>,
}

impl Acquire {
    pub fn new() -> Self { Self { next_search: None } }
}

impl Task<TrackerBoard> for Acquire {
    fn poll(&mut self, cx: &mut TaskContext<'_, TrackerBoard>) -> TaskStatus {
        let now = cx.time();
        if self.next_search.is_some_and(|next| now < next) {
            return TaskStatus::Pending;
        }
        self.next_search = Some(now.add_seconds(cx.board.settings.refresh_interval as f64));

        match acquire(cx.scene, cx.physics, cx.board) {
            Some(target) => {
                debug!(%target, name = ?cx.scene.name(target), "Target detected");
                cx.board.focused = Some(target);
                cx.board.next_state = Some(TrackerState::Detected);
                TaskStatus::Done
            },
            None => TaskStatus::Pending,
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum Sweep {
    Start,
    /// Turning from rest out to one side.
    Opening(TaskId),
    /// Turning across to the side given by the sign.
    Crossing(TaskId, f32),
}

/// Sweeps the neck from side to side for as long as the tracker searches.
pub(super) struct ScanSweep {
    sweep: Sweep,
}

impl ScanSweep {
    pub fn new() -> Self { Self { sweep: Sweep::Start } }

    fn turn_to(cx: &mut TaskContext<'_, TrackerBoard>, side: f32, duration: f32) -> TaskId {
        let neck = cx.board.neck;
        let to = neck.turned_from_rest(side * neck.bound);
        let turn = RotateOverTime::new(neck.node, to, duration).eased(cx.board.settings.ease);
        cx.spawn(Lane::Frame, turn)
    }
}

impl Task<TrackerBoard> for ScanSweep {
    fn poll(&mut self, cx: &mut TaskContext<'_, TrackerBoard>) -> TaskStatus {
        let side_duration = cx.board.settings.side_search_duration;
        self.sweep = match self.sweep {
            Sweep::Start => Sweep::Opening(Self::turn_to(cx, 1.0, side_duration * 0.5)),
            Sweep::Opening(id) | Sweep::Crossing(id, _) if cx.is_live(id) => self.sweep,
            Sweep::Opening(_) => Sweep::Crossing(Self::turn_to(cx, -1.0, side_duration), -1.0),
            Sweep::Crossing(_, side) => {
                Sweep::Crossing(Self::turn_to(cx, -side, side_duration), -side)
            },
        };
        TaskStatus::Pending
    }
}
