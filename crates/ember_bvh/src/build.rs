//! Binned SAH construction.

use std::cmp::Ordering;

use ember_math::{axis_component, BoundingBox, Vec3};

use crate::{
    Bvh, BvhNode, NodeIndex, BIN_COUNT, MAX_BVH_DEPTH, MAX_LEAF_SIZE, TRAVERSAL_COST,
};

/// Per-axis histogram bucket, only alive during construction.
#[derive(Debug, Clone, Copy)]
struct Bin {
    bbox: BoundingBox,
    count: usize,
}

impl Bin {
    const EMPTY: Bin = Bin {
        bbox: BoundingBox::EMPTY,
        count: 0,
    };

    #[inline]
    fn extend(&mut self, bbox: &BoundingBox) {
        self.bbox.extend_box(bbox);
        self.count += 1;
    }

    #[inline]
    fn merge(&mut self, other: &Bin) {
        self.bbox.extend_box(&other.bbox);
        self.count += other.count;
    }

    /// `N * half_area`. An empty bin evaluates to NaN (0 * inf) and never wins a comparison.
    #[inline]
    fn partial_cost(&self) -> f32 {
        self.count as f32 * self.bbox.half_area()
    }
}

#[derive(Debug, Clone, Copy)]
struct Split {
    axis: usize,
    /// Index of the first bin on the right side.
    pos: usize,
    cost: f32,
}

// `x > y ? x : y` style comparisons: if `a` is NaN the result is `b`.
#[inline]
pub(crate) fn robust_min(a: f32, b: f32) -> f32 {
    if a < b {
        a
    } else {
        b
    }
}

#[inline]
pub(crate) fn robust_max(a: f32, b: f32) -> f32 {
    if a > b {
        a
    } else {
        b
    }
}

/// Smallest number of balanced splits that brings `count` down to leaf size.
fn levels_to_leaf_size(count: usize) -> usize {
    let mut capacity = MAX_LEAF_SIZE;
    let mut levels = 0;
    while capacity < count {
        capacity = capacity.saturating_mul(2);
        levels += 1;
    }
    levels
}

pub(crate) fn build<F>(count: usize, mut get_bbox_and_center: F) -> Bvh
where
    F: FnMut(usize) -> (BoundingBox, Vec3),
{
    if count == 0 {
        log::debug!("BVH build over zero primitives, returning empty tree");
        return Bvh::empty();
    }

    let mut bboxes = Vec::with_capacity(count);
    let mut centers = Vec::with_capacity(count);
    for i in 0..count {
        let (bbox, center) = get_bbox_and_center(i);
        bboxes.push(bbox);
        centers.push(center);
    }

    // A binary tree with N leaves has 2N - 1 nodes; leaves hold at least one primitive.
    let max_nodes = 2 * count - 1;
    let mut builder = Builder {
        bboxes: &bboxes,
        centers: &centers,
        nodes: vec![BvhNode::default(); max_nodes],
        node_count: 1,
        prim_indices: (0..count).collect(),
    };

    let root_bbox = builder.compute_bbox(0, count);
    builder.nodes[0].set_bounding_box(&root_bbox);
    builder.build_recursive(0, 0, count, 0);

    let Builder {
        mut nodes,
        node_count,
        prim_indices,
        ..
    } = builder;

    // Leaves holding several primitives leave the tail of the array unused.
    nodes.truncate(node_count);
    nodes.shrink_to_fit();

    log::trace!(
        "Built BVH: {} primitives, {} nodes (capacity {})",
        count,
        node_count,
        max_nodes
    );

    Bvh {
        nodes,
        prim_indices,
    }
}

struct Builder<'a> {
    bboxes: &'a [BoundingBox],
    centers: &'a [Vec3],
    nodes: Vec<BvhNode>,
    node_count: usize,
    prim_indices: Vec<usize>,
}

impl Builder<'_> {
    fn build_recursive(&mut self, node_id: usize, begin: usize, end: usize, depth: usize) {
        let prim_count = end - begin;

        if depth >= MAX_BVH_DEPTH || prim_count < 2 {
            self.make_leaf(node_id, begin, prim_count);
            return;
        }

        let node_bbox = self.nodes[node_id].bounding_box();
        let node_extents = node_bbox.extent();

        let right_begin = if depth + levels_to_leaf_size(prim_count) >= MAX_BVH_DEPTH {
            // Out of depth budget for anything but balanced splits
            self.fallback_split(&node_bbox, begin, end)
        } else {
            let bin_scale = Vec3::splat(BIN_COUNT as f32) / node_extents;
            let bin_offset = -node_bbox.min * bin_scale;
            let split = self.find_best_split(bin_scale, bin_offset, begin, end);

            let leaf_cost = node_bbox.half_area() * (prim_count as f32 - TRAVERSAL_COST);
            let split = split.filter(|s| s.cost.partial_cmp(&leaf_cost) != Some(Ordering::Greater));

            match split {
                Some(split) => {
                    // 1 / bin_scale is the bin width
                    let split_pos = node_bbox.min_on(split.axis)
                        + split.pos as f32 / axis_component(bin_scale, split.axis);
                    let right_begin = self.partition(split.axis, split_pos, begin, end);
                    if right_begin == begin || right_begin == end {
                        self.fallback_split(&node_bbox, begin, end)
                    } else {
                        right_begin
                    }
                }
                None if prim_count <= MAX_LEAF_SIZE => {
                    self.make_leaf(node_id, begin, prim_count);
                    return;
                }
                None => self.fallback_split(&node_bbox, begin, end),
            }
        };

        let first_child = self.node_count;
        self.node_count += 2;

        let left_bbox = self.compute_bbox(begin, right_begin);
        let right_bbox = self.compute_bbox(right_begin, end);
        self.nodes[first_child].set_bounding_box(&left_bbox);
        self.nodes[first_child + 1].set_bounding_box(&right_bbox);
        self.nodes[node_id].index = NodeIndex::Inner { first_child };

        self.build_recursive(first_child, begin, right_begin, depth + 1);
        self.build_recursive(first_child + 1, right_begin, end, depth + 1);
    }

    fn make_leaf(&mut self, node_id: usize, first_prim: usize, prim_count: usize) {
        debug_assert!((1..=MAX_LEAF_SIZE).contains(&prim_count));
        self.nodes[node_id].index = NodeIndex::Leaf {
            first_prim,
            prim_count,
        };
    }

    fn compute_bbox(&self, begin: usize, end: usize) -> BoundingBox {
        self.prim_indices[begin..end]
            .iter()
            .fold(BoundingBox::EMPTY, |acc, &i| acc.union(&self.bboxes[i]))
    }

    fn find_best_split(
        &self,
        bin_scale: Vec3,
        bin_offset: Vec3,
        begin: usize,
        end: usize,
    ) -> Option<Split> {
        let mut bins = [[Bin::EMPTY; BIN_COUNT]; 3];

        for &prim in &self.prim_indices[begin..end] {
            let center = self.centers[prim];
            for (axis, axis_bins) in bins.iter_mut().enumerate() {
                let bin_pos = robust_max(
                    axis_component(center, axis) * axis_component(bin_scale, axis)
                        + axis_component(bin_offset, axis),
                    0.0,
                );
                // Float-to-int casts saturate, and the centers of primitives on
                // the node's max plane land exactly on BIN_COUNT.
                let bin_index = (bin_pos as usize).min(BIN_COUNT - 1);
                axis_bins[bin_index].extend(&self.bboxes[prim]);
            }
        }

        let mut best: Option<Split> = None;
        let mut right_cost = [0.0f32; BIN_COUNT];

        for (axis, axis_bins) in bins.iter().enumerate() {
            // Right to left: SA(right) * N(right) for every boundary
            let mut accum = Bin::EMPTY;
            for i in (1..BIN_COUNT).rev() {
                accum.merge(&axis_bins[i]);
                right_cost[i] = accum.partial_cost();
            }

            // Left to right: add SA(left) * N(left) and keep the cheapest boundary
            let mut accum = Bin::EMPTY;
            for i in 0..BIN_COUNT - 1 {
                accum.merge(&axis_bins[i]);
                let cost = accum.partial_cost() + right_cost[i + 1];
                if cost < best.map_or(f32::MAX, |b| b.cost) {
                    best = Some(Split {
                        axis,
                        pos: i + 1,
                        cost,
                    });
                }
            }
        }

        best
    }

    /// Hoare-style in-place partition. Returns the first index of the right side.
    fn partition(&mut self, axis: usize, split_pos: f32, begin: usize, end: usize) -> usize {
        let centers = self.centers;
        let is_left = |prim: usize| axis_component(centers[prim], axis) < split_pos;

        let indices = &mut self.prim_indices;
        let (mut i, mut j) = (begin, end);
        while i < j {
            while i < j && is_left(indices[i]) {
                i += 1;
            }
            while i < j && !is_left(indices[j - 1]) {
                j -= 1;
            }
            if i >= j {
                break;
            }
            indices.swap(i, j - 1);
            i += 1;
            j -= 1;
        }
        i
    }

    /// Median split along the node's largest axis. Always makes progress.
    fn fallback_split(&mut self, node_bbox: &BoundingBox, begin: usize, end: usize) -> usize {
        let axis = node_bbox.largest_axis();
        let centers = self.centers;
        self.prim_indices[begin..end].sort_unstable_by(|&a, &b| {
            axis_component(centers[a], axis).total_cmp(&axis_component(centers[b], axis))
        });
        (begin + end) / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_boxes(count: usize, seed: u64) -> Vec<(BoundingBox, Vec3)> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                let c = Vec3::new(rng.gen(), rng.gen(), rng.gen()) * 100.0;
                let half = Vec3::new(rng.gen(), rng.gen(), rng.gen()) * 2.0;
                (BoundingBox::new(c - half, c + half), c)
            })
            .collect()
    }

    fn build_from(prims: &[(BoundingBox, Vec3)]) -> Bvh {
        Bvh::build(prims.len(), |i| prims[i])
    }

    /// Walks the tree checking structure; returns the primitives reached.
    fn check_subtree(bvh: &Bvh, prims: &[(BoundingBox, Vec3)], id: usize, seen: &mut Vec<usize>) {
        let node = &bvh.nodes()[id];
        let node_bbox = node.bounding_box();
        match node.index {
            NodeIndex::Inner { first_child } => {
                assert!(first_child > id, "children must come after their parent");
                assert!(first_child + 1 < bvh.node_count());
                for child in [first_child, first_child + 1] {
                    assert!(node_bbox.contains_box(&bvh.nodes()[child].bounding_box()));
                    check_subtree(bvh, prims, child, seen);
                }
            }
            NodeIndex::Leaf { first_prim, prim_count } => {
                assert!((1..=MAX_LEAF_SIZE).contains(&prim_count));
                for &p in &bvh.prim_indices()[first_prim..first_prim + prim_count] {
                    assert!(node_bbox.contains_box(&prims[p].0));
                    seen.push(p);
                }
            }
        }
    }

    fn check_invariants(bvh: &Bvh, prims: &[(BoundingBox, Vec3)]) {
        let n = prims.len();
        assert!(bvh.node_count() <= 2 * n - 1);

        let mut seen = Vec::new();
        check_subtree(bvh, prims, 0, &mut seen);
        seen.sort_unstable();
        assert_eq!(seen, (0..n).collect::<Vec<_>>(), "leaves must cover every primitive once");

        // Every slot kept after truncation was written by the builder
        for node in bvh.nodes() {
            assert_ne!(node.index, NodeIndex::default());
        }

        let mut perm = bvh.prim_indices().to_vec();
        perm.sort_unstable();
        assert_eq!(perm, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_build() {
        let mut calls = 0;
        let bvh = Bvh::build(0, |_| {
            calls += 1;
            (BoundingBox::EMPTY, Vec3::ZERO)
        });
        assert_eq!(calls, 0);
        assert_eq!(bvh.node_count(), 0);
        assert!(bvh.prim_indices().is_empty());
    }

    #[test]
    fn test_single_primitive_is_leaf_root() {
        let prims = random_boxes(1, 1);
        let bvh = build_from(&prims);

        assert_eq!(bvh.node_count(), 1);
        assert_eq!(
            bvh.nodes()[0].index,
            NodeIndex::Leaf { first_prim: 0, prim_count: 1 }
        );
        assert_eq!(bvh.root_bounding_box(), prims[0].0);
    }

    #[test]
    fn test_callback_called_once_per_primitive() {
        let prims = random_boxes(300, 2);
        let mut calls = vec![0usize; prims.len()];
        let _ = Bvh::build(prims.len(), |i| {
            calls[i] += 1;
            prims[i]
        });
        assert!(calls.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_invariants_random_sizes() {
        for (seed, count) in [(3, 2), (4, 3), (5, 16), (6, 17), (7, 100), (8, 1000), (9, 5000)] {
            let prims = random_boxes(count, seed);
            let bvh = build_from(&prims);
            check_invariants(&bvh, &prims);

            // Root contains every primitive box
            let root = bvh.root_bounding_box();
            for (bbox, _) in &prims {
                assert!(root.contains_box(bbox));
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let prims = random_boxes(2000, 10);
        let a = build_from(&prims);
        let b = build_from(&prims);
        assert_eq!(a.nodes(), b.nodes());
        assert_eq!(a.prim_indices(), b.prim_indices());
    }

    #[test]
    fn test_identical_centers_terminate() {
        // Every primitive at the same spot forces fallback splits all the way down
        let bbox = BoundingBox::new(Vec3::splat(-1.0), Vec3::ONE);
        let prims = vec![(bbox, Vec3::ZERO); 10_000];
        let bvh = build_from(&prims);

        check_invariants(&bvh, &prims);
        assert!(bvh.depth() <= MAX_BVH_DEPTH);
    }

    #[test]
    fn test_pathological_distribution_respects_depth_and_leaf_size() {
        // Exponentially spaced centers make SAH peel off one primitive at a time
        let prims: Vec<(BoundingBox, Vec3)> = (0..400)
            .map(|i| {
                let x = 1.05f32.powi(i);
                let c = Vec3::new(x, 0.0, 0.0);
                (BoundingBox::new(c - Vec3::splat(0.01), c + Vec3::splat(0.01)), c)
            })
            .collect();
        let bvh = build_from(&prims);

        check_invariants(&bvh, &prims);
        assert!(bvh.depth() <= MAX_BVH_DEPTH);
    }

    #[test]
    fn test_nan_primitive_does_not_corrupt_tree() {
        let mut prims = random_boxes(200, 11);
        let nan = Vec3::splat(f32::NAN);
        prims[37] = (BoundingBox::new(nan, nan), nan);
        let bvh = build_from(&prims);

        let mut perm = bvh.prim_indices().to_vec();
        perm.sort_unstable();
        assert_eq!(perm, (0..200).collect::<Vec<_>>());

        // The root box ignores the NaN primitive and still covers the rest
        let root = bvh.root_bounding_box();
        assert!(root.min.is_finite() && root.max.is_finite());
        for (i, (bbox, _)) in prims.iter().enumerate() {
            if i != 37 {
                assert!(root.contains_box(bbox));
            }
        }
    }

    #[test]
    fn test_flat_geometry() {
        // All centers on a plane: one axis has zero extent
        let prims: Vec<(BoundingBox, Vec3)> = (0..500)
            .map(|i| {
                let c = Vec3::new((i % 25) as f32, (i / 25) as f32, 0.0);
                (BoundingBox::new(c - Vec3::new(0.4, 0.4, 0.0), c + Vec3::new(0.4, 0.4, 0.0)), c)
            })
            .collect();
        let bvh = build_from(&prims);
        check_invariants(&bvh, &prims);
    }

    #[test]
    fn test_levels_to_leaf_size() {
        assert_eq!(levels_to_leaf_size(1), 0);
        assert_eq!(levels_to_leaf_size(MAX_LEAF_SIZE), 0);
        assert_eq!(levels_to_leaf_size(MAX_LEAF_SIZE + 1), 1);
        assert_eq!(levels_to_leaf_size(2 * MAX_LEAF_SIZE), 1);
        assert_eq!(levels_to_leaf_size(2 * MAX_LEAF_SIZE + 1), 2);
        assert!(levels_to_leaf_size(usize::MAX) < MAX_BVH_DEPTH);
    }

    #[test]
    fn test_robust_min_max_ignore_nan_lhs() {
        assert_eq!(robust_min(f32::NAN, 1.0), 1.0);
        assert_eq!(robust_max(f32::NAN, 1.0), 1.0);
        assert_eq!(robust_min(0.5, 1.0), 0.5);
        assert_eq!(robust_max(2.0, 1.0), 2.0);
    }
}
