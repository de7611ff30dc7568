//! Stack-based nearest-hit traversal.

use ember_math::{Ray, Vec3};

use crate::build::{robust_max, robust_min};
use crate::{Bvh, BvhNode, NodeIndex, MAX_BVH_DEPTH};

/// Read access to the current closest-hit distance of a caller's hit record.
///
/// Traversal prunes every subtree whose entry distance exceeds this value, so
/// leaf tests must only ever shrink it.
pub trait HitDistance {
    fn distance(&self) -> f32;
}

/// How node slab tests handle division by near-zero direction components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalMode {
    /// Clamp tiny direction components and fold the origin into one multiply-add per plane.
    #[default]
    Fast,
    /// Exact reciprocals plus a tiny widening of the exit distance
    /// (T. Ize, "Robust BVH Ray Traversal"). Never misses a box due to rounding.
    Robust,
}

/// Ray data precomputed once per traversal.
struct NodeRay {
    /// 1 if the direction is negative on that axis. Selects the near plane.
    octant: [usize; 3],
    inv_dir: Vec3,
    /// `-origin * inv_dir` in fast mode, the raw origin in robust mode.
    start: Vec3,
    mode: TraversalMode,
}

#[inline]
fn safe_inverse(x: f32) -> f32 {
    if x.abs() <= f32::EPSILON {
        (1.0 / f32::EPSILON).copysign(x)
    } else {
        1.0 / x
    }
}

impl NodeRay {
    fn new(ray: &Ray, mode: TraversalMode) -> Self {
        let d = ray.direction;
        let octant = [
            d.x.is_sign_negative() as usize,
            d.y.is_sign_negative() as usize,
            d.z.is_sign_negative() as usize,
        ];

        match mode {
            TraversalMode::Fast => {
                let inv_dir = Vec3::new(safe_inverse(d.x), safe_inverse(d.y), safe_inverse(d.z));
                Self {
                    octant,
                    inv_dir,
                    start: -(ray.origin * inv_dir),
                    mode,
                }
            }
            TraversalMode::Robust => Self {
                octant,
                inv_dir: Vec3::ONE / d,
                start: ray.origin,
                mode,
            },
        }
    }

    /// Slab test. Returns the entry distance if the box overlaps `[0, max_dist]`.
    #[inline]
    fn intersect(&self, node: &BvhNode, max_dist: f32) -> Option<f32> {
        let b = &node.bounds;
        let [ox, oy, oz] = self.octant;

        let (tmin_x, tmax_x, tmin_y, tmax_y, tmin_z, tmax_z) = match self.mode {
            TraversalMode::Fast => (
                b[ox] * self.inv_dir.x + self.start.x,
                b[1 - ox] * self.inv_dir.x + self.start.x,
                b[2 + oy] * self.inv_dir.y + self.start.y,
                b[3 - oy] * self.inv_dir.y + self.start.y,
                b[4 + oz] * self.inv_dir.z + self.start.z,
                b[5 - oz] * self.inv_dir.z + self.start.z,
            ),
            TraversalMode::Robust => (
                (b[ox] - self.start.x) * self.inv_dir.x,
                (b[1 - ox] - self.start.x) * self.inv_dir.x,
                (b[2 + oy] - self.start.y) * self.inv_dir.y,
                (b[3 - oy] - self.start.y) * self.inv_dir.y,
                (b[4 + oz] - self.start.z) * self.inv_dir.z,
                (b[5 - oz] - self.start.z) * self.inv_dir.z,
            ),
        };

        // NaN slab distances lose every comparison, so they never shrink the interval
        let tmin = robust_max(tmin_x, robust_max(tmin_y, robust_max(tmin_z, 0.0)));
        let mut tmax = robust_min(tmax_x, robust_min(tmax_y, robust_min(tmax_z, max_dist)));
        if self.mode == TraversalMode::Robust {
            tmax *= 1.000_000_24;
        }

        (tmin <= tmax).then_some(tmin)
    }
}

impl Bvh {
    /// Find the nearest hit along `ray` using fast slab tests.
    ///
    /// See [`Bvh::traverse_with_mode`].
    pub fn traverse<H, F>(&self, ray: &Ray, hit: &mut H, leaf_test: F) -> bool
    where
        H: HitDistance,
        F: FnMut(&[usize], &Ray, &mut H) -> bool,
    {
        self.traverse_with_mode(ray, hit, TraversalMode::Fast, leaf_test)
    }

    /// Find the nearest hit along `ray`.
    ///
    /// `leaf_test` receives the primitive indices of each leaf whose box the ray
    /// enters closer than the current best hit. It must test all of them, only
    /// ever shrink `hit.distance()`, and return true if it improved the hit.
    /// The initial `hit.distance()` is the search limit.
    ///
    /// Returns true if any leaf test improved the hit. Never allocates or recurses.
    pub fn traverse_with_mode<H, F>(
        &self,
        ray: &Ray,
        hit: &mut H,
        mode: TraversalMode,
        mut leaf_test: F,
    ) -> bool
    where
        H: HitDistance,
        F: FnMut(&[usize], &Ray, &mut H) -> bool,
    {
        let Some(root) = self.nodes.first() else {
            return false;
        };

        let node_ray = NodeRay::new(ray, mode);
        let mut stack = [NodeIndex::default(); MAX_BVH_DEPTH + 1];
        let mut stack_size = 0;
        let mut top = root.index;
        let mut max_dist = hit.distance();
        let mut was_hit = false;

        loop {
            match top {
                NodeIndex::Inner { first_child } => {
                    let left = &self.nodes[first_child];
                    let right = &self.nodes[first_child + 1];

                    match (
                        node_ray.intersect(left, max_dist),
                        node_ray.intersect(right, max_dist),
                    ) {
                        (Some(t_left), Some(t_right)) => {
                            // Visit the nearer child first, come back for the other
                            let (first, second) = if t_left > t_right {
                                (right.index, left.index)
                            } else {
                                (left.index, right.index)
                            };
                            stack[stack_size] = second;
                            stack_size += 1;
                            top = first;
                            continue;
                        }
                        (Some(_), None) => {
                            top = left.index;
                            continue;
                        }
                        (None, Some(_)) => {
                            top = right.index;
                            continue;
                        }
                        (None, None) => {}
                    }
                }
                NodeIndex::Leaf {
                    first_prim,
                    prim_count,
                } => {
                    let prims = &self.prim_indices[first_prim..first_prim + prim_count];
                    if leaf_test(prims, ray, hit) {
                        max_dist = hit.distance();
                        was_hit = true;
                    }
                }
            }

            if stack_size == 0 {
                break;
            }
            stack_size -= 1;
            top = stack[stack_size];
        }

        was_hit
    }
}
