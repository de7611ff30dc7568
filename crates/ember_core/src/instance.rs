//! Placed copies of meshes and spheres.

use ember_math::{BoundingBox, Mat4Ext, Ray, Vec2, Vec3};
use rand::RngCore;

use crate::{Geometry, HitRecord, Sphere, Transform};

/// What an instance points at, by index into the world's geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceKind {
    Mesh(usize),
    Sphere(usize),
}

/// A piece of geometry placed in the world by a transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Instance {
    pub kind: InstanceKind,
    pub transform: Transform,
}

impl Instance {
    pub fn mesh(index: usize) -> Self {
        Self {
            kind: InstanceKind::Mesh(index),
            transform: Transform::IDENTITY,
        }
    }

    pub fn sphere(index: usize) -> Self {
        Self {
            kind: InstanceKind::Sphere(index),
            transform: Transform::IDENTITY,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// World-space bounds and center, as consumed by the top-level builder.
    ///
    /// A mesh whose tree has not been built yet gets a degenerate box at the
    /// origin, so it is never hit until the top level is rebuilt.
    pub fn bbox_and_center(&self, geometry: &Geometry) -> (BoundingBox, Vec3) {
        let matrix = &self.transform.matrix;
        let bbox = match self.kind {
            InstanceKind::Mesh(index) => match geometry.meshes.get(index).and_then(|m| m.bvh()) {
                Some(bvh) if !bvh.is_empty() => bvh.transformed_root_bounding_box(matrix),
                _ => BoundingBox::new(Vec3::ZERO, Vec3::ZERO),
            },
            InstanceKind::Sphere(index) => match geometry.spheres.get(index) {
                Some(sphere) => matrix.transform_bbox(&sphere.bounding_box()),
                None => BoundingBox::new(Vec3::ZERO, Vec3::ZERO),
            },
        };
        (bbox, bbox.center())
    }

    /// Intersect in object space and resolve the hit back to world space.
    ///
    /// The ray is transformed but not renormalized, so `hit.distance` stays
    /// in world-ray units and is comparable across instances. `sampler` is
    /// reserved for participating media and unused by surfaces.
    pub fn intersect(
        &self,
        geometry: &Geometry,
        ray: &Ray,
        hit: &mut HitRecord,
        _sampler: &mut dyn RngCore,
    ) -> bool {
        let local = self.transform.inverse.transform_ray(ray);

        match self.kind {
            InstanceKind::Mesh(index) => {
                let Some(mesh) = geometry.meshes.get(index) else {
                    return false;
                };
                if !mesh.traverse_bottom_level(&local, hit) {
                    return false;
                }
                hit.uv = hit
                    .polygon
                    .and_then(|tri| mesh.texture_coords(tri, hit.uv))
                    .unwrap_or(Vec2::splat(-1.0));
            }
            InstanceKind::Sphere(index) => {
                let Some(sphere) = geometry.spheres.get(index) else {
                    return false;
                };
                if !sphere.intersect(&local, hit) {
                    return false;
                }
                hit.uv = Sphere::texture_coords(hit.normal);
            }
        }

        hit.point = self.transform.matrix.transform_point3(hit.point);
        hit.normal = self
            .transform
            .inverse
            .transform_normal(hit.normal)
            .normalize_or_zero();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::test_quad;
    use ember_math::{Mat4, Quat};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn geometry() -> Geometry {
        let mut quad = test_quad(1.0);
        quad.build_bvh();
        Geometry {
            meshes: vec![quad],
            spheres: vec![Sphere::new(1.0)],
        }
    }

    #[test]
    fn test_translated_sphere() {
        let geometry = geometry();
        let instance = Instance::sphere(0)
            .with_transform(Transform::from_translation(Vec3::new(0.0, 0.0, 10.0)));
        let mut rng = StdRng::seed_from_u64(42);
        let mut hit = HitRecord::default();

        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        assert!(instance.intersect(&geometry, &ray, &mut hit, &mut rng));
        assert!((hit.distance - 9.0).abs() < 1e-5);
        assert!((hit.point - Vec3::new(0.0, 0.0, 9.0)).length() < 1e-5);
        assert!((hit.normal + Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn test_scaled_distance_is_world_space() {
        let geometry = geometry();
        let instance = Instance::sphere(0).with_transform(Transform::from_scale_rotation_translation(
            Vec3::splat(3.0),
            Quat::IDENTITY,
            Vec3::new(0.0, 0.0, 10.0),
        ));
        let mut rng = StdRng::seed_from_u64(42);
        let mut hit = HitRecord::default();

        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        assert!(instance.intersect(&geometry, &ray, &mut hit, &mut rng));
        assert!((hit.distance - 7.0).abs() < 1e-4);
        assert!((hit.point - Vec3::new(0.0, 0.0, 7.0)).length() < 1e-4);
    }

    #[test]
    fn test_rotated_mesh_normal() {
        let geometry = geometry();
        // Quad rotated to face +X, placed at x = 5
        let instance = Instance::mesh(0).with_transform(Transform::from_scale_rotation_translation(
            Vec3::ONE,
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            Vec3::new(5.0, 0.0, 0.0),
        ));
        let mut rng = StdRng::seed_from_u64(42);
        let mut hit = HitRecord::default();

        let ray = Ray::new(Vec3::new(0.0, 0.2, 0.3), Vec3::X);
        assert!(instance.intersect(&geometry, &ray, &mut hit, &mut rng));
        assert!((hit.distance - 5.0).abs() < 1e-4);
        assert!((hit.normal + Vec3::X).length() < 1e-4);
        assert!(hit.polygon.is_some());
        assert!((0.0..=1.0).contains(&hit.uv.x));
    }

    #[test]
    fn test_bbox_and_center() {
        let geometry = geometry();
        let instance = Instance::sphere(0)
            .with_transform(Transform::from_translation(Vec3::new(1.0, 2.0, 3.0)));
        let (bbox, center) = instance.bbox_and_center(&geometry);
        assert!((bbox.min - Vec3::new(0.0, 1.0, 2.0)).length() < 1e-6);
        assert!((bbox.max - Vec3::new(2.0, 3.0, 4.0)).length() < 1e-6);
        assert!((center - Vec3::new(1.0, 2.0, 3.0)).length() < 1e-6);

        let mesh = Instance::mesh(0).with_transform(Transform::from_matrix(Mat4::from_scale(Vec3::splat(2.0))));
        let (bbox, _) = mesh.bbox_and_center(&geometry);
        assert!((bbox.max - Vec3::new(2.0, 2.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_mesh_without_bvh() {
        let geometry = Geometry {
            meshes: vec![test_quad(1.0)],
            spheres: Vec::new(),
        };
        let instance = Instance::mesh(0);
        let (bbox, _) = instance.bbox_and_center(&geometry);
        assert_eq!(bbox.min, Vec3::ZERO);
        assert_eq!(bbox.max, Vec3::ZERO);

        let mut rng = StdRng::seed_from_u64(42);
        let mut hit = HitRecord::default();
        let ray = Ray::new(Vec3::new(0.0, 0.0, -1.0), Vec3::Z);
        assert!(!instance.intersect(&geometry, &ray, &mut hit, &mut rng));
    }

    #[test]
    fn test_dangling_index_never_hits() {
        let geometry = geometry();
        let mut rng = StdRng::seed_from_u64(42);
        let mut hit = HitRecord::default();
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);
        assert!(!Instance::sphere(7).intersect(&geometry, &ray, &mut hit, &mut rng));
        assert!(!Instance::mesh(7).intersect(&geometry, &ray, &mut hit, &mut rng));
    }
}
