//! Flat node layout.

use ember_math::BoundingBox;

/// What a node points at.
///
/// Inner nodes store the index of their left child; the right child is
/// always `first_child + 1`. Leaves store a range into the tree's
/// primitive permutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeIndex {
    Inner { first_child: usize },
    Leaf { first_prim: usize, prim_count: usize },
}

/// Placeholder for pre-sized node arrays and traversal stacks.
///
/// Not a leaf, so an unwritten slot can never pass for an empty leaf.
impl Default for NodeIndex {
    fn default() -> Self {
        NodeIndex::Inner { first_child: 0 }
    }
}

/// A BVH node: bounds stored as `[min x, max x, min y, max y, min z, max z]`.
///
/// Interleaving min and max per axis lets traversal pick the near and far
/// plane with `axis * 2 + octant` instead of a branch.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BvhNode {
    pub bounds: [f32; 6],
    pub index: NodeIndex,
}

impl BvhNode {
    pub(crate) fn set_bounding_box(&mut self, bbox: &BoundingBox) {
        self.bounds = [
            bbox.min.x, bbox.max.x, bbox.min.y, bbox.max.y, bbox.min.z, bbox.max.z,
        ];
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let b = &self.bounds;
        BoundingBox::new(
            ember_math::Vec3::new(b[0], b[2], b[4]),
            ember_math::Vec3::new(b[1], b[3], b[5]),
        )
    }

    #[inline]
    pub fn half_area(&self) -> f32 {
        self.bounding_box().half_area()
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self.index, NodeIndex::Leaf { .. })
    }
}
