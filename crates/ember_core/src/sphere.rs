//! Analytic spheres, centred at the object-space origin.

use std::f32::consts::PI;

use ember_math::{BoundingBox, Ray, Vec2, Vec3};

use crate::HitRecord;

/// Hits closer than this are treated as self-intersections and ignored.
pub const SPHERE_NEAR_CUTOFF: f32 = 1e-5;

/// A sphere of `radius` around the origin. Instances place it in the world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub radius: f32,
}

impl Sphere {
    pub fn new(radius: f32) -> Self {
        Self { radius }
    }

    /// Object-space bounds, `[-r, r]` on every axis.
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::new(Vec3::splat(-self.radius), Vec3::splat(self.radius))
    }

    /// Intersect in object space, updating `hit` if closer.
    ///
    /// The ray direction does not need to be normalized, so distances stay
    /// comparable with the world-space ray it was transformed from.
    pub fn intersect(&self, ray: &Ray, hit: &mut HitRecord) -> bool {
        let a = ray.direction.dot(ray.direction);
        let b = 2.0 * ray.direction.dot(ray.origin);
        let c = ray.origin.dot(ray.origin) - self.radius * self.radius;

        let discriminant = b * b - 4.0 * a * c;
        if discriminant < 0.0 {
            return false;
        }

        let sqrt_d = discriminant.sqrt();
        let far = (-b + sqrt_d) / (2.0 * a);
        let near = (-b - sqrt_d) / (2.0 * a);

        // Nearest root in front of the origin; from inside only the far one is
        let t = if far > near && near > 0.0 { near } else { far };
        if !(t >= SPHERE_NEAR_CUTOFF && t <= hit.distance) {
            return false;
        }

        hit.distance = t;
        hit.point = ray.at(t);
        hit.normal = hit.point.normalize_or_zero();
        hit.polygon = None;
        true
    }

    /// Spherical texture mapping of an object-space unit normal.
    pub fn texture_coords(normal: Vec3) -> Vec2 {
        let phi = normal.z.atan2(normal.x);
        let theta = normal.y.clamp(-1.0, 1.0).asin();
        let u = 1.0 - (phi + PI) / (2.0 * PI);
        let v = (theta + PI / 2.0) / PI;
        Vec2::new(u, v).clamp(Vec2::ZERO, Vec2::ONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_from_outside() {
        let sphere = Sphere::new(1.0);
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        let mut hit = HitRecord::default();

        assert!(sphere.intersect(&ray, &mut hit));
        assert!((hit.distance - 4.0).abs() < 1e-5);
        assert!((hit.normal - -Vec3::Z).length() < 1e-5);
        assert!(hit.polygon.is_none());
    }

    #[test]
    fn test_hit_from_inside() {
        let sphere = Sphere::new(2.0);
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        let mut hit = HitRecord::default();

        assert!(sphere.intersect(&ray, &mut hit));
        assert!((hit.distance - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_unnormalized_direction() {
        let sphere = Sphere::new(1.0);
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z * 2.0);
        let mut hit = HitRecord::default();

        assert!(sphere.intersect(&ray, &mut hit));
        // Parametric distance, not euclidean
        assert!((hit.distance - 2.0).abs() < 1e-5);
        assert!((hit.point - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
    }

    #[test]
    fn test_misses() {
        let sphere = Sphere::new(1.0);
        let mut hit = HitRecord::default();

        let beside = Ray::new(Vec3::new(2.0, 0.0, -5.0), Vec3::Z);
        assert!(!sphere.intersect(&beside, &mut hit));

        let away = Ray::new(Vec3::new(0.0, 0.0, -5.0), -Vec3::Z);
        assert!(!sphere.intersect(&away, &mut hit));

        let mut near = HitRecord::new(3.0);
        let toward = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        assert!(!sphere.intersect(&toward, &mut near));
        assert_eq!(near.distance, 3.0);
    }

    #[test]
    fn test_bounding_box() {
        let bbox = Sphere::new(0.5).bounding_box();
        assert_eq!(bbox.min, Vec3::splat(-0.5));
        assert_eq!(bbox.max, Vec3::splat(0.5));
    }

    #[test]
    fn test_texture_coords_in_range() {
        for normal in [Vec3::X, -Vec3::X, Vec3::Y, -Vec3::Y, Vec3::Z, -Vec3::Z] {
            let uv = Sphere::texture_coords(normal);
            assert!((0.0..=1.0).contains(&uv.x));
            assert!((0.0..=1.0).contains(&uv.y));
        }
        assert!((Sphere::texture_coords(Vec3::Y).y - 1.0).abs() < 1e-6);
        assert!(Sphere::texture_coords(-Vec3::Y).y.abs() < 1e-6);
    }
}
