// Re-export glam for convenience
pub use glam::*;

// Ember math types
mod aabb;
mod ray;
mod transform;

pub use aabb::BoundingBox;
pub use ray::Ray;
pub use transform::Mat4Ext;

/// Component of a vector along axis `n` (0=X, 1=Y, 2=Z).
#[inline]
pub fn axis_component(v: Vec3, n: usize) -> f32 {
    match n {
        0 => v.x,
        1 => v.y,
        _ => v.z,
    }
}
