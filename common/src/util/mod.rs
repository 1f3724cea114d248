pub mod angle;
pub mod dir;
pub mod plane;
pub mod projection;

pub use angle::{
    angle_axis, angle_between, average_position, masked_euler_angle, rotate_towards, signed_angle,
    smoothstep,
};
pub use dir::*;
pub use plane::{planar_distance, Plane};
pub use projection::Projection;
