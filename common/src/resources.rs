use serde::{Deserialize, Serialize};

/// Simulation time in seconds since the clock started.
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize, PartialEq, PartialOrd)]
pub struct Time(pub f64);

impl Time {
    pub fn add_seconds(self, seconds: f64) -> Self { Self(self.0 + seconds) }

    pub fn seconds_since(self, earlier: Time) -> f64 { self.0 - earlier.0 }
}

/// Length of the step being advanced, in seconds.
#[derive(Copy, Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DeltaTime(pub f32);
