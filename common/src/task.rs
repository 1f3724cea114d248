//! Cooperative task scheduling.
//!
//! Every suspendable operation (a trajectory, a gait loop, a search sweep) is
//! a [`Task`]: a small state machine that is polled once per advance of the
//! [`Lane`] it was spawned on, and reports whether it is still running.
//! Nothing is preempted; cancellation simply drops the task, leaving whatever
//! it wrote last in place.
//!
//! Components own a [`Scheduler`] each, so cancelling all of a component's
//! operations on a state change is [`Scheduler::cancel_all`].

use crate::{
    phys::RayCast,
    resources::{DeltaTime, Time},
    scene::Scene,
};
use std::{collections::BTreeMap, fmt, ops::Bound};
use tracing::trace;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "task{}", self.0) }
}

/// Which clock drives a task.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Lane {
    /// Fixed rate simulation tick.
    Fixed,
    /// Variable rate frame tick.
    Frame,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Done,
}

/// Time at which a lane is being advanced and the length of the step.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Tick {
    pub time: Time,
    pub dt: DeltaTime,
}

impl Tick {
    pub fn new(time: Time, dt: f32) -> Self {
        Self {
            time,
            dt: DeltaTime(dt),
        }
    }
}

pub trait Task<S> {
    fn poll(&mut self, cx: &mut TaskContext<'_, S>) -> TaskStatus;
}

impl<S, F> Task<S> for F
where
    F: FnMut(&mut TaskContext<'_, S>) -> TaskStatus,
{
    fn poll(&mut self, cx: &mut TaskContext<'_, S>) -> TaskStatus { self(cx) }
}

/// Everything a task may touch while it is being polled.
///
/// `board` is the owning component's shared state (gates, counters, flags)
/// that tasks use to talk to each other and to the component.
pub struct TaskContext<'a, S> {
    pub scene: &'a mut Scene,
    pub physics: &'a dyn RayCast,
    pub board: &'a mut S,
    pub tick: Tick,
    lane: Lane,
    tasks: &'a mut Scheduler<S>,
}

impl<S> TaskContext<'_, S> {
    pub fn time(&self) -> Time { self.tick.time }

    pub fn dt(&self) -> f32 { self.tick.dt.0 }

    pub fn lane(&self) -> Lane { self.lane }

    /// Spawned tasks on the current lane get their first poll during the
    /// current advance.
    pub fn spawn<T: Task<S> + 'static>(&mut self, lane: Lane, task: T) -> TaskId {
        self.tasks.spawn(lane, task)
    }

    /// A task that is no longer live has finished or was cancelled; waiting
    /// for it is polling this until it returns false.
    pub fn is_live(&self, id: TaskId) -> bool { self.tasks.is_live(id) }

    pub fn cancel(&mut self, id: TaskId) { self.tasks.cancel(id) }
}

struct Slot<S> {
    lane: Lane,
    // Taken out while the task is being polled.
    task: Option<Box<dyn Task<S>>>,
}

pub struct Scheduler<S> {
    next_id: u64,
    slots: BTreeMap<TaskId, Slot<S>>,
}

impl<S> Default for Scheduler<S> {
    fn default() -> Self {
        Self {
            next_id: 0,
            slots: BTreeMap::new(),
        }
    }
}

impl<S> Scheduler<S> {
    pub fn new() -> Self { Self::default() }

    pub fn spawn<T: Task<S> + 'static>(&mut self, lane: Lane, task: T) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.slots.insert(id, Slot {
            lane,
            task: Some(Box::new(task)),
        });
        trace!(%id, ?lane, "Spawned task");
        id
    }

    pub fn is_live(&self, id: TaskId) -> bool { self.slots.contains_key(&id) }

    pub fn cancel(&mut self, id: TaskId) {
        if self.slots.remove(&id).is_some() {
            trace!(%id, "Cancelled task");
        }
    }

    /// Drops every task, running or not.
    pub fn cancel_all(&mut self) {
        if !self.slots.is_empty() {
            trace!(count = self.slots.len(), "Cancelling all tasks");
        }
        self.slots.clear();
    }

    pub fn len(&self) -> usize { self.slots.len() }

    pub fn is_empty(&self) -> bool { self.slots.is_empty() }

    pub fn len_in(&self, lane: Lane) -> usize {
        self.slots.values().filter(|s| s.lane == lane).count()
    }

    fn next_in(&self, lane: Lane, after: Option<TaskId>) -> Option<TaskId> {
        let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
        self.slots
            .range((lower, Bound::Unbounded))
            .find(|(_, slot)| slot.lane == lane)
            .map(|(id, _)| *id)
    }

    /// Polls every task on `lane` once, in spawn order.
    pub fn advance(
        &mut self,
        lane: Lane,
        scene: &mut Scene,
        physics: &dyn RayCast,
        board: &mut S,
        tick: Tick,
    ) {
        let mut cursor = None;
        while let Some(id) = self.next_in(lane, cursor) {
            cursor = Some(id);
            let Some(mut task) = self.slots.get_mut(&id).and_then(|slot| slot.task.take()) else {
                continue;
            };

            let status = task.poll(&mut TaskContext {
                scene: &mut *scene,
                physics,
                board: &mut *board,
                tick,
                lane,
                tasks: &mut *self,
            });

            // A task cancelled during its own poll no longer has a slot
            match (status, self.slots.get_mut(&id)) {
                (TaskStatus::Pending, Some(slot)) => slot.task = Some(task),
                (TaskStatus::Done, Some(_)) => {
                    self.slots.remove(&id);
                    trace!(%id, "Task finished");
                },
                (_, None) => {},
            }
        }
    }
}

/// Timed wait measured from the first time it is checked.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Delay {
    seconds: f64,
    deadline: Option<Time>,
}

impl Delay {
    pub fn new(seconds: f32) -> Self {
        Self {
            seconds: seconds.max(0.0) as f64,
            deadline: None,
        }
    }

    pub fn elapsed(&mut self, now: Time) -> bool {
        let seconds = self.seconds;
        let deadline = *self.deadline.get_or_insert_with(|| now.add_seconds(seconds));
        now >= deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phys::Colliders;

    #[derive(Default)]
    struct Board {
        polls: Vec<&'static str>,
        counter: u32,
    }

    fn advance(tasks: &mut Scheduler<Board>, lane: Lane, board: &mut Board, time: f64) {
        let mut scene = Scene::new();
        tasks.advance(lane, &mut scene, &Colliders::new(), board, Tick::new(Time(time), 0.1));
    }

    struct CountTo(u32);

    impl Task<Board> for CountTo {
        fn poll(&mut self, cx: &mut TaskContext<'_, Board>) -> TaskStatus {
            cx.board.counter += 1;
            if cx.board.counter >= self.0 {
                TaskStatus::Done
            } else {
                TaskStatus::Pending
            }
        }
    }

    #[test]
    fn lanes_are_advanced_separately() {
        let mut tasks = Scheduler::new();
        let mut board = Board::default();
        tasks.spawn(Lane::Fixed, |cx: &mut TaskContext<'_, Board>| {
            cx.board.polls.push("fixed");
            TaskStatus::Pending
        });
        tasks.spawn(Lane::Frame, |cx: &mut TaskContext<'_, Board>| {
            cx.board.polls.push("frame");
            TaskStatus::Pending
        });

        advance(&mut tasks, Lane::Frame, &mut board, 0.0);
        advance(&mut tasks, Lane::Frame, &mut board, 0.1);
        advance(&mut tasks, Lane::Fixed, &mut board, 0.1);
        assert_eq!(board.polls, vec!["frame", "frame", "fixed"]);
        assert_eq!(tasks.len_in(Lane::Fixed), 1);
    }

    #[test]
    fn finished_tasks_are_no_longer_live() {
        let mut tasks = Scheduler::new();
        let mut board = Board::default();
        let id = tasks.spawn(Lane::Frame, CountTo(2));
        advance(&mut tasks, Lane::Frame, &mut board, 0.0);
        assert!(tasks.is_live(id));
        advance(&mut tasks, Lane::Frame, &mut board, 0.1);
        assert!(!tasks.is_live(id));
        assert!(tasks.is_empty());
    }

    #[test]
    fn spawned_children_run_in_the_same_pass() {
        let mut tasks = Scheduler::new();
        let mut board = Board::default();
        let mut child = None;
        tasks.spawn(Lane::Frame, move |cx: &mut TaskContext<'_, Board>| {
            match child {
                None => {
                    cx.board.polls.push("parent");
                    child = Some(cx.spawn(Lane::Frame, CountTo(1)));
                    TaskStatus::Pending
                },
                // Join
                Some(id) if cx.is_live(id) => TaskStatus::Pending,
                Some(_) => {
                    cx.board.polls.push("joined");
                    TaskStatus::Done
                },
            }
        });

        advance(&mut tasks, Lane::Frame, &mut board, 0.0);
        assert_eq!(board.counter, 1);
        advance(&mut tasks, Lane::Frame, &mut board, 0.1);
        assert_eq!(board.polls, vec!["parent", "joined"]);
        assert!(tasks.is_empty());
    }

    #[test]
    fn cancel_all_drops_everything() {
        let mut tasks = Scheduler::new();
        let mut board = Board::default();
        tasks.spawn(Lane::Frame, CountTo(10));
        tasks.spawn(Lane::Fixed, CountTo(10));
        tasks.cancel_all();
        advance(&mut tasks, Lane::Frame, &mut board, 0.0);
        advance(&mut tasks, Lane::Fixed, &mut board, 0.0);
        assert_eq!(board.counter, 0);
    }

    #[test]
    fn delay_counts_from_first_check() {
        let mut delay = Delay::new(0.5);
        assert!(!delay.elapsed(Time(2.0)));
        assert!(!delay.elapsed(Time(2.4)));
        assert!(delay.elapsed(Time(2.5)));
    }
}
