//! Instance transforms.

use ember_math::{Mat4, Quat, Vec3};

/// An object-to-world matrix paired with its inverse.
///
/// Both are stored so intersection never has to invert per ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    /// Object space to world space
    pub matrix: Mat4,
    /// World space to object space
    pub inverse: Mat4,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        matrix: Mat4::IDENTITY,
        inverse: Mat4::IDENTITY,
    };

    /// Wrap a matrix. A singular matrix yields a non-finite inverse,
    /// so instances using it are never hit.
    pub fn from_matrix(matrix: Mat4) -> Self {
        Self {
            matrix,
            inverse: matrix.inverse(),
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            matrix: Mat4::from_translation(translation),
            inverse: Mat4::from_translation(-translation),
        }
    }

    pub fn from_scale(scale: Vec3) -> Self {
        Self::from_matrix(Mat4::from_scale(scale))
    }

    /// Scale, then rotate, then translate.
    pub fn from_scale_rotation_translation(scale: Vec3, rotation: Quat, translation: Vec3) -> Self {
        Self::from_matrix(Mat4::from_scale_rotation_translation(
            scale,
            rotation,
            translation,
        ))
    }

    /// Apply `self` after `first`.
    pub fn then(&self, first: &Transform) -> Self {
        Self {
            matrix: self.matrix * first.matrix,
            inverse: first.inverse * self.inverse,
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}
