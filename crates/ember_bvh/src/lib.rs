//! Ember BVH - bounding volume hierarchy for CPU ray tracing.
//!
//! The builder follows Wald's binned SAH approach ("On fast Construction of
//! SAH-based Bounding Volume Hierarchies"): primitive centers are scattered
//! into a fixed number of bins per axis and the split is chosen by sweeping
//! the bins. It only needs a bounding box and a center per primitive, so the
//! same code builds trees over triangles (bottom level) and over instances
//! (top level).
//!
//! The tree is a flat array of [`BvhNode`]s with siblings stored next to each
//! other, plus a permutation of primitive indices that leaves refer to by range.
//! Traversal is iterative with a fixed-size stack.

mod build;
mod node;
mod traverse;

use ember_math::{BoundingBox, Mat4, Mat4Ext};

pub use node::{BvhNode, NodeIndex};
pub use traverse::{HitDistance, TraversalMode};

/// Number of bits the original packed node layout reserved for a leaf's primitive count.
pub const PRIM_COUNT_BITS: u32 = 4;

/// Largest number of primitives a leaf may hold.
pub const MAX_LEAF_SIZE: usize = (1 << PRIM_COUNT_BITS) - 1;

/// Maximum tree depth. Also bounds the traversal stack.
pub const MAX_BVH_DEPTH: usize = 64;

/// Number of bins per axis used to approximate the SAH.
pub const BIN_COUNT: usize = 32;

/// Cost of traversing a node relative to intersecting one primitive.
pub const TRAVERSAL_COST: f32 = 1.5;

/// Fraction of the root's area below which `transformed_root_bounding_box` stops descending.
pub const TRANSFORMED_BBOX_AREA_FRACTION: f32 = 0.1;

/// An immutable bounding volume hierarchy.
///
/// Node 0 is the root. `prim_indices` is a permutation of `0..N`; leaves
/// store ranges into it.
#[derive(Debug, Clone, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    prim_indices: Vec<usize>,
}

impl Bvh {
    /// A tree over zero primitives. Traversing it never hits.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a tree over `count` primitives.
    ///
    /// `get_bbox_and_center` is called exactly once per primitive index in
    /// `0..count`, in order, and must return the primitive's bounding box and
    /// the point used to bin it.
    pub fn build<F>(count: usize, get_bbox_and_center: F) -> Self
    where
        F: FnMut(usize) -> (BoundingBox, ember_math::Vec3),
    {
        build::build(count, get_bbox_and_center)
    }

    /// All nodes, root first.
    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    /// Primitive permutation referenced by leaf ranges.
    pub fn prim_indices(&self) -> &[usize] {
        &self.prim_indices
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of primitives the tree was built over.
    pub fn prim_count(&self) -> usize {
        self.prim_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Bounding box of the root node, or the empty box for an empty tree.
    pub fn root_bounding_box(&self) -> BoundingBox {
        self.nodes
            .first()
            .map(BvhNode::bounding_box)
            .unwrap_or(BoundingBox::EMPTY)
    }

    /// Approximate bounding box of the tree's contents after applying `matrix`.
    ///
    /// Transforming only the root box overestimates badly under rotation. This
    /// descends while a node's half area is at least
    /// [`TRANSFORMED_BBOX_AREA_FRACTION`] of the root's, then unions the
    /// transformed boxes of the nodes where descent stopped. A smaller fraction
    /// gives a tighter box at the cost of visiting more nodes.
    pub fn transformed_root_bounding_box(&self, matrix: &Mat4) -> BoundingBox {
        if self.nodes.is_empty() {
            return BoundingBox::EMPTY;
        }

        let area_threshold = TRANSFORMED_BBOX_AREA_FRACTION * self.nodes[0].half_area();

        let mut stack = [0usize; MAX_BVH_DEPTH + 1];
        let mut stack_size = 0;
        let mut top = 0;
        let mut bbox = BoundingBox::EMPTY;

        loop {
            let node = &self.nodes[top];
            match node.index {
                NodeIndex::Inner { first_child }
                    if stack_size < stack.len() && node.half_area() >= area_threshold =>
                {
                    stack[stack_size] = first_child;
                    stack_size += 1;
                    top = first_child + 1;
                }
                _ => {
                    bbox.extend_box(&matrix.transform_bbox(&node.bounding_box()));
                    if stack_size == 0 {
                        break;
                    }
                    stack_size -= 1;
                    top = stack[stack_size];
                }
            }
        }

        bbox
    }

    /// Depth of the deepest leaf (the root alone has depth 0).
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            match self.nodes[id].index {
                NodeIndex::Inner { first_child } => {
                    stack.push((first_child, depth + 1));
                    stack.push((first_child + 1, depth + 1));
                }
                NodeIndex::Leaf { .. } => max_depth = max_depth.max(depth),
            }
        }
        max_depth
    }

    /// Number of leaf nodes.
    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }
}
