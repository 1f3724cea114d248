//! Rotation and point-set helpers shared by the animation primitives, the gait
//! coordinator and the look-at tracker.
//!
//! All angles are radians. Euler triples are `(pitch about x, roll about y,
//! yaw about z)`, composed as `yaw * pitch * roll`.

use tracing::error;
use vek::*;

/// Smoothstep ease-in/ease-out on `[0, 1]`.
#[inline]
pub fn smoothstep(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Angle/axis decomposition with the angle in `[0, π]`.
///
/// A near-identity rotation reports a zero angle around `x`.
pub fn angle_axis(q: Quaternion<f32>) -> (f32, Vec3<f32>) {
    let q = q.normalized();
    // q and -q encode the same rotation, take the short way around
    let q = if q.w < 0.0 { -q } else { q };
    let w = q.w.clamp(-1.0, 1.0);
    let angle = 2.0 * w.acos();
    let s = (1.0 - w * w).sqrt();
    let axis = if s < 1e-6 {
        Vec3::unit_x()
    } else {
        Vec3::new(q.x, q.y, q.z) / s
    };
    (angle, axis)
}

/// Unsigned angle between two orientations.
pub fn angle_between(a: Quaternion<f32>, b: Quaternion<f32>) -> f32 {
    let dot = a.normalized().dot(b.normalized()).abs().min(1.0);
    2.0 * dot.acos()
}

/// Deviation of `current` from `base`, signed by the direction of the
/// deviation relative to `axis`.
///
/// The magnitude always equals [`angle_between`]; the sign is negative when
/// the rotation axis of `base⁻¹ * current` points against `axis`.
pub fn signed_angle(current: Quaternion<f32>, base: Quaternion<f32>, axis: Vec3<f32>) -> f32 {
    let delta = base.normalized().inverse() * current.normalized();
    let (angle, rotation_axis) = angle_axis(delta);
    if rotation_axis.dot(axis) < 0.0 {
        -angle
    } else {
        angle
    }
}

/// Angle between `base` and `current` after masking `current`'s euler angles
/// component-wise with `axis`.
///
/// This is not a true axis-restricted deviation (euler components interact);
/// prefer [`signed_angle`] for bound checks.
pub fn masked_euler_angle(current: Quaternion<f32>, base: Quaternion<f32>, axis: Vec3<f32>) -> f32 {
    let masked = from_euler(to_euler(current) * axis);
    angle_between(base, masked)
}

/// Inverse of [`from_euler`].
pub fn to_euler(q: Quaternion<f32>) -> Vec3<f32> {
    let Quaternion { x, y, z, w } = q.normalized();
    let m01 = 2.0 * (x * y - w * z);
    let m11 = 1.0 - 2.0 * (x * x + z * z);
    let m21 = 2.0 * (y * z + w * x);
    let m20 = 2.0 * (x * z - w * y);
    let m22 = 1.0 - 2.0 * (x * x + y * y);

    let pitch = m21.clamp(-1.0, 1.0).asin();
    let yaw = (-m01).atan2(m11);
    let roll = (-m20).atan2(m22);
    Vec3::new(pitch, roll, yaw)
}

pub fn from_euler(euler: Vec3<f32>) -> Quaternion<f32> {
    Quaternion::rotation_z(euler.z) * Quaternion::rotation_x(euler.x) * Quaternion::rotation_y(euler.y)
}

/// Rotates `from` towards `to` by at most `max_angle`.
pub fn rotate_towards(from: Quaternion<f32>, to: Quaternion<f32>, max_angle: f32) -> Quaternion<f32> {
    let angle = angle_between(from, to);
    if angle <= max_angle || angle < 1e-6 {
        to
    } else {
        Quaternion::slerp(from, to, max_angle / angle).normalized()
    }
}

/// Mean of a point set. An empty set is logged and yields the origin.
pub fn average_position(points: &[Vec3<f32>]) -> Vec3<f32> {
    if points.is_empty() {
        error!("Cannot average an empty point set, falling back to origin");
        return Vec3::zero();
    }

    points.iter().copied().sum::<Vec3<f32>>() / points.len() as f32
}
