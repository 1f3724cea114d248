//! Procedural walkers, look-at trackers and the glue between them.
//!
//! Every component is advanced by its host from two clocks:
//! `fixed_update` on the simulation tick and `frame_update` on the render
//! frame. State changes are reported to registered observers.

pub mod controller;
pub mod error;
pub mod indicator;
pub mod settings;
pub mod tracker;
pub mod walker;

pub use controller::{ControllerRig, MoveInput, WalkerController};
pub use error::{RigError, SettingsError};
pub use indicator::{StateIndex, StateIndicator};
pub use settings::Settings;
pub use tracker::{Tracker, TrackerRig, TrackerState};
pub use walker::{Walker, WalkerRig, WalkerState};
