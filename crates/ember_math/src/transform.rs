// Transform utilities for Mat4
//
// Extends glam::Mat4 with the pieces instancing needs: moving rays into
// object space and bounding transformed boxes.
// Note: glam::Mat4 already provides transform_point3() and transform_vector3() (w=0)

use glam::{Mat4, Vec3};
use crate::{BoundingBox, Ray};

/// Extension trait for Mat4 to provide additional transform utilities
pub trait Mat4Ext {
    /// Transform a surface normal given the *inverse* of the object-to-world matrix.
    ///
    /// Multiplies by the transpose of `self`, so calling this on the inverse
    /// matrix applies the inverse-transpose that keeps normals perpendicular
    /// under non-uniform scale. The result is not normalized.
    fn transform_normal(&self, normal: Vec3) -> Vec3;

    /// Transform a bounding box.
    /// Computes the bounding box of all 8 transformed corners. The empty box stays empty.
    fn transform_bbox(&self, bbox: &BoundingBox) -> BoundingBox;

    /// Transform a ray: origin as a point, direction as a vector.
    ///
    /// The direction is left unnormalized so distances along the transformed
    /// ray equal distances along the original one.
    fn transform_ray(&self, ray: &Ray) -> Ray;
}

impl Mat4Ext for Mat4 {
    fn transform_normal(&self, normal: Vec3) -> Vec3 {
        self.transpose().transform_vector3(normal)
    }

    fn transform_bbox(&self, bbox: &BoundingBox) -> BoundingBox {
        if bbox.is_empty() {
            return BoundingBox::EMPTY;
        }

        let mut result = BoundingBox::EMPTY;
        for corner in bbox.corners() {
            result.extend(self.transform_point3(corner));
        }
        result
    }

    fn transform_ray(&self, ray: &Ray) -> Ray {
        Ray::new(
            self.transform_point3(ray.origin),
            self.transform_vector3(ray.direction),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_vector3_no_translation() {
        let mat = Mat4::from_translation(Vec3::new(10.0, 20.0, 30.0));
        let vector = Vec3::new(1.0, 0.0, 0.0);
        let transformed = mat.transform_vector3(vector);

        // Translation should NOT affect vectors (w=0)
        assert_eq!(transformed, vector);
    }

    #[test]
    fn test_transform_vector3_rotation() {
        use std::f32::consts::PI;

        // 90 degree rotation around Z axis
        let mat = Mat4::from_rotation_z(PI / 2.0);
        let transformed = mat.transform_vector3(Vec3::X);

        // X vector should rotate to Y vector
        assert!((transformed - Vec3::Y).length() < 0.001);
    }

    #[test]
    fn test_transform_bbox_translation() {
        let mat = Mat4::from_translation(Vec3::splat(5.0));
        let bbox = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
        let transformed = mat.transform_bbox(&bbox);

        assert!((transformed.min - Vec3::splat(5.0)).length() < 0.001);
        assert!((transformed.max - Vec3::splat(6.0)).length() < 0.001);
    }

    #[test]
    fn test_transform_bbox_rotation_grows() {
        let mat = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4);
        let bbox = BoundingBox::new(Vec3::splat(-1.0), Vec3::ONE);
        let transformed = mat.transform_bbox(&bbox);

        let sqrt2 = std::f32::consts::SQRT_2;
        assert!((transformed.max.x - sqrt2).abs() < 0.001);
        assert!((transformed.max.z - sqrt2).abs() < 0.001);
        assert!((transformed.max.y - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_transform_empty_bbox() {
        let mat = Mat4::from_translation(Vec3::ONE);
        assert!(mat.transform_bbox(&BoundingBox::EMPTY).is_empty());
    }

    #[test]
    fn test_transform_ray_keeps_distance() {
        let mat = Mat4::from_scale(Vec3::splat(0.5));
        let ray = Ray::new(Vec3::new(0.0, 0.0, -4.0), Vec3::Z);
        let local = mat.transform_ray(&ray);

        // World point at t=2 maps to the local point at t=2
        let world_hit = ray.at(2.0);
        assert!((mat.transform_point3(world_hit) - local.at(2.0)).length() < 0.001);
    }

    #[test]
    fn test_transform_normal_non_uniform_scale() {
        // Plane x + y = 0 has normal (1, 1, 0); scale x by 2
        let mat = Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let inv = mat.inverse();
        let n = inv.transform_normal(Vec3::new(1.0, 1.0, 0.0)).normalize();

        // Tangent (1, -1, 0) becomes (2, -1, 0); normal must stay perpendicular
        let tangent = mat.transform_vector3(Vec3::new(1.0, -1.0, 0.0));
        assert!(n.dot(tangent).abs() < 0.001);
    }

    #[test]
    fn test_mat4_rotation_inverse() {
        use std::f32::consts::PI;

        let mat = Mat4::from_rotation_y(PI / 4.0); // 45 degrees
        let inv = mat.inverse();

        let point = Vec3::new(5.0, 3.0, 2.0);
        let back = inv.transform_point3(mat.transform_point3(point));

        assert!((back - point).length() < 0.001);
    }
}
