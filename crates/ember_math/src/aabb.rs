use crate::{axis_component, Vec3};

/// Axis-aligned bounding box used by the BVH builder and traversal.
///
/// An empty box has `min = +inf` and `max = -inf`, which makes it the
/// identity for [`BoundingBox::union`] and [`BoundingBox::extend`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// Box containing nothing.
    pub const EMPTY: BoundingBox = BoundingBox {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Create a box from its corners. No reordering is done.
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create the smallest box containing both points.
    pub fn from_points(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Grow the box to contain `point`.
    ///
    /// `f32::min`/`f32::max` return the non-NaN operand, so a NaN coordinate
    /// never replaces a valid bound.
    #[inline]
    pub fn extend(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Grow the box to contain `other`.
    #[inline]
    pub fn extend_box(&mut self, other: &BoundingBox) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Smallest box containing both boxes.
    #[inline]
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let mut out = *self;
        out.extend_box(other);
        out
    }

    /// `max - min`. Negative (infinite) for the empty box.
    #[inline]
    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Half of the surface area: `x(y+z) + yz`.
    ///
    /// Only ratios of areas matter to the SAH, so the factor of two is dropped.
    /// Evaluates to `+inf` for the empty box.
    #[inline]
    pub fn half_area(&self) -> f32 {
        let e = self.extent();
        e.x * (e.y + e.z) + e.y * e.z
    }

    /// Center point of the box.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Index (0=X, 1=Y, 2=Z) of the axis with the largest extent.
    ///
    /// Ties prefer Y, then Z, then X.
    pub fn largest_axis(&self) -> usize {
        let e = self.extent();
        if e.y >= e.z && e.y >= e.x {
            1
        } else if e.z >= e.y && e.z >= e.x {
            2
        } else {
            0
        }
    }

    /// Lower bound along axis `n`.
    #[inline]
    pub fn min_on(&self, n: usize) -> f32 {
        axis_component(self.min, n)
    }

    /// True if no point is contained (any `min > max`).
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// True if `other` lies entirely inside this box. The empty box is inside everything.
    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        if other.is_empty() {
            return true;
        }
        self.min.cmple(other.min).all() && self.max.cmpge(other.max).all()
    }

    /// The 8 corners of the box.
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}
