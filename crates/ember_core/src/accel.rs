//! Parallel construction of bottom-level trees.

use std::time::Instant;

use rayon::prelude::*;
use thiserror::Error;

use crate::Mesh;

#[derive(Debug, Error)]
pub enum AccelError {
    #[error("failed to start BVH build threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Build the tree of every mesh that does not have one yet.
///
/// Builds run on a dedicated pool of `threads` workers, or one per core
/// when `threads` is 0. Each mesh is built by exactly one worker, so no
/// locking is involved. Returns the number of trees built.
pub fn compute_accels(meshes: &mut [Mesh], threads: usize) -> Result<usize, AccelError> {
    let pending = meshes.iter().filter(|m| !m.has_bvh()).count();
    if pending == 0 {
        return Ok(0);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("ember-bvh-{}", i))
        .build()?;

    let start = Instant::now();
    let built = pool.install(|| {
        meshes
            .par_iter_mut()
            .filter(|mesh| !mesh.has_bvh())
            .map(|mesh| {
                let mesh_start = Instant::now();
                mesh.build_bvh();
                let nodes = mesh.bvh().map_or(0, |b| b.node_count());
                if nodes == 0 {
                    log::warn!("Mesh '{}' has no triangles, BVH is empty", mesh.name);
                }
                log::debug!(
                    "Built BVH for '{}': {} triangles, {} nodes in {:.2?}",
                    mesh.name,
                    mesh.triangle_count(),
                    nodes,
                    mesh_start.elapsed()
                );
                1
            })
            .sum::<usize>()
    });

    log::info!(
        "Built {} mesh BVHs on {} threads in {:.2?}",
        built,
        pool.current_num_threads(),
        start.elapsed()
    );
    Ok(built)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::test_quad;

    #[test]
    fn test_builds_only_missing() {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut meshes: Vec<Mesh> = (0..8).map(|_| test_quad(1.0)).collect();
        meshes[3].build_bvh();

        assert_eq!(compute_accels(&mut meshes, 2).unwrap(), 7);
        assert!(meshes.iter().all(|m| m.has_bvh()));
        assert_eq!(compute_accels(&mut meshes, 2).unwrap(), 0);
    }

    #[test]
    fn test_default_thread_count() {
        let mut meshes = vec![test_quad(2.0)];
        assert_eq!(compute_accels(&mut meshes, 0).unwrap(), 1);
        let bbox = meshes[0].bvh().unwrap().root_bounding_box();
        assert_eq!(bbox, meshes[0].bounds());
    }

    #[test]
    fn test_empty_mesh_still_counts() {
        let mut meshes = vec![Mesh::new("empty", Vec::new(), Vec::new()).unwrap()];
        assert_eq!(compute_accels(&mut meshes, 1).unwrap(), 1);
        assert!(meshes[0].bvh().unwrap().is_empty());
    }
}
