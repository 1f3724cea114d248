//! Scene, timing and animation primitives shared by the skitter agents.

pub mod anchor;
pub mod clock;
pub mod observer;
pub mod phys;
pub mod resources;
pub mod scene;
pub mod task;
pub mod trajectory;
pub mod util;

// Reexports
pub use clock::Clock;
