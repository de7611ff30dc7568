//! Nearest-hit record shared by every intersection routine.

use ember_bvh::HitDistance;
use ember_math::{Vec2, Vec3};

/// Closest intersection found so far along a ray.
///
/// `distance` starts at the search limit and only ever decreases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitRecord {
    /// Ray parameter of the hit
    pub distance: f32,
    /// Hit position (world space once an instance has resolved it)
    pub point: Vec3,
    /// Unit normal facing against the ray
    pub normal: Vec3,
    /// Texture coordinates, `(-1, -1)` when the surface has none
    pub uv: Vec2,
    /// Triangle index within the mesh, `None` for analytic shapes
    pub polygon: Option<usize>,
    /// Index of the instance that was hit
    pub instance: Option<usize>,
}

impl HitRecord {
    /// An empty record that accepts hits closer than `max_distance`.
    pub fn new(max_distance: f32) -> Self {
        Self {
            distance: max_distance,
            point: Vec3::ZERO,
            normal: Vec3::ZERO,
            uv: Vec2::splat(-1.0),
            polygon: None,
            instance: None,
        }
    }
}

impl Default for HitRecord {
    fn default() -> Self {
        Self::new(f32::INFINITY)
    }
}

impl HitDistance for HitRecord {
    #[inline]
    fn distance(&self) -> f32 {
        self.distance
    }
}
