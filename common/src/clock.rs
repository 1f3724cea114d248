use crate::resources::{DeltaTime, Time};
use std::{
    thread,
    time::{Duration, Instant},
};

const CLOCK_SMOOTHING: f64 = 0.9;

/// Drives the two simulation clocks: a variable frame step and a fixed
/// physics tick that is accumulated out of the frames.
pub struct Clock {
    fixed_step: Duration,
    accumulator: Duration,
    time: Time,
    last_delta: Option<Duration>,
    last_sys_time: Instant,
    running_fps_average: f64,
}

impl Clock {
    pub fn new(fixed_step: Duration) -> Self {
        Self {
            fixed_step,
            accumulator: Duration::ZERO,
            time: Time::default(),
            last_delta: None,
            last_sys_time: Instant::now(),
            running_fps_average: 0.0,
        }
    }

    pub fn time(&self) -> Time { self.time }

    pub fn fixed_dt(&self) -> DeltaTime { DeltaTime(self.fixed_step.as_secs_f32()) }

    pub fn last_dt(&self) -> DeltaTime {
        DeltaTime(self.last_delta.unwrap_or(Duration::ZERO).as_secs_f32())
    }

    pub fn get_fps(&self) -> f64 {
        if self.running_fps_average > 0.0 {
            1.0 / self.running_fps_average
        } else {
            0.0
        }
    }

    /// Advances simulation time by one frame of `delta` and returns how many
    /// fixed ticks became due during it.
    pub fn advance(&mut self, delta: Duration) -> u32 {
        self.time = self.time.add_seconds(delta.as_secs_f64());
        self.last_delta = Some(delta);
        self.running_fps_average = CLOCK_SMOOTHING * self.running_fps_average
            + (1.0 - CLOCK_SMOOTHING) * delta.as_secs_f64();

        self.accumulator += delta;
        let mut ticks = 0;
        while !self.fixed_step.is_zero() && self.accumulator >= self.fixed_step {
            self.accumulator -= self.fixed_step;
            ticks += 1;
        }
        ticks
    }

    /// Sleeps to fill the gap until `tgt` has passed since the previous call,
    /// then returns the real time elapsed.
    pub fn pace(&mut self, tgt: Duration) -> Duration {
        let delta = self.last_sys_time.elapsed();

        // Attempt to sleep to fill the gap
        if let Some(sleep_dur) = tgt.checked_sub(delta) {
            thread::sleep(sleep_dur);
        }

        let delta = self.last_sys_time.elapsed();
        self.last_sys_time = Instant::now();
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_ticks_accumulate_across_frames() {
        let mut clock = Clock::new(Duration::from_millis(20));
        assert_eq!(clock.advance(Duration::from_millis(15)), 0);
        assert_eq!(clock.advance(Duration::from_millis(15)), 1);
        assert_eq!(clock.advance(Duration::from_millis(50)), 3);
        approx::assert_relative_eq!(clock.time().0, 0.08, epsilon = 1e-9);
    }
}
