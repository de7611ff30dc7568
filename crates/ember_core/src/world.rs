//! The scene: geometry, instances and the shared top-level tree.
//!
//! Render threads call [`World::intersect`] concurrently. Each call holds the
//! read lock on the top-level handle for exactly one traversal. Rebuilds run
//! without the lock and only take the write lock to swap the handle, so a
//! reader always traverses the tree it started with, and the superseded tree
//! is freed only after the swap lock is released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ember_bvh::Bvh;
use ember_math::Ray;
use parking_lot::{Mutex, RwLock};
use rand::RngCore;
use thiserror::Error;

use crate::{accel, AccelError, HitRecord, Instance, InstanceKind, Mesh, Sphere, Transform};

/// Errors raised when editing the instance list.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorldError {
    #[error("instance refers to mesh {0}, which does not exist")]
    UnknownMesh(usize),

    #[error("instance refers to sphere {0}, which does not exist")]
    UnknownSphere(usize),

    #[error("no instance with index {0}")]
    UnknownInstance(usize),
}

/// Geometry that instances refer to by index.
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    pub meshes: Vec<Mesh>,
    pub spheres: Vec<Sphere>,
}

/// A top-level tree together with the instances it was built over.
#[derive(Debug)]
pub struct TopLevel {
    bvh: Bvh,
    instances: Vec<Instance>,
}

impl TopLevel {
    pub fn bvh(&self) -> &Bvh {
        &self.bvh
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn intersect(
        &self,
        geometry: &Geometry,
        ray: &Ray,
        hit: &mut HitRecord,
        sampler: &mut dyn RngCore,
    ) -> bool {
        traverse_top_level(geometry, &self.instances, &self.bvh, ray, hit, sampler)
    }
}

/// Build a tree over instance bounds.
pub fn build_top_level(geometry: &Geometry, instances: &[Instance]) -> Bvh {
    Bvh::build(instances.len(), |i| instances[i].bbox_and_center(geometry))
}

/// Find the nearest instance hit. Records the winning instance in `hit.instance`.
pub fn traverse_top_level(
    geometry: &Geometry,
    instances: &[Instance],
    bvh: &Bvh,
    ray: &Ray,
    hit: &mut HitRecord,
    sampler: &mut dyn RngCore,
) -> bool {
    bvh.traverse(ray, hit, |prims, ray, hit| {
        let mut found = false;
        for &i in prims {
            if instances[i].intersect(geometry, ray, hit, sampler) {
                hit.instance = Some(i);
                found = true;
            }
        }
        found
    })
}

/// A renderable scene.
///
/// Geometry is added up front through `&mut self`. Instances may be added
/// and moved through `&self` while other threads are rendering; the changes
/// become visible at the next [`World::update_toplevel_bvh`].
#[derive(Debug, Default)]
pub struct World {
    geometry: Geometry,
    instances: RwLock<Vec<Instance>>,
    top_level: RwLock<Option<Arc<TopLevel>>>,
    dirty: AtomicBool,
    /// Held for a whole rebuild so swaps land in snapshot order
    rebuild: Mutex<()>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Add a mesh and return its index.
    pub fn add_mesh(&mut self, mesh: Mesh) -> usize {
        self.geometry.meshes.push(mesh);
        self.geometry.meshes.len() - 1
    }

    /// Add a sphere and return its index.
    pub fn add_sphere(&mut self, sphere: Sphere) -> usize {
        self.geometry.spheres.push(sphere);
        self.geometry.spheres.len() - 1
    }

    /// Add an instance and return its index.
    pub fn add_instance(&self, instance: Instance) -> Result<usize, WorldError> {
        match instance.kind {
            InstanceKind::Mesh(i) if i >= self.geometry.meshes.len() => {
                return Err(WorldError::UnknownMesh(i));
            }
            InstanceKind::Sphere(i) if i >= self.geometry.spheres.len() => {
                return Err(WorldError::UnknownSphere(i));
            }
            _ => {}
        }

        let index = {
            let mut instances = self.instances.write();
            instances.push(instance);
            instances.len() - 1
        };
        self.dirty.store(true, Ordering::Release);
        Ok(index)
    }

    /// Move an instance. Takes effect at the next top-level update.
    pub fn set_instance_transform(&self, index: usize, transform: Transform) -> Result<(), WorldError> {
        {
            let mut instances = self.instances.write();
            let instance = instances
                .get_mut(index)
                .ok_or(WorldError::UnknownInstance(index))?;
            instance.transform = transform;
        }
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Copy of the live instance, including edits not yet in the top-level tree.
    pub fn instance(&self, index: usize) -> Option<Instance> {
        self.instances.read().get(index).copied()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.read().len()
    }

    /// Whether instances changed since the last top-level update.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Build every missing mesh tree on `threads` workers (0 = all cores).
    pub fn compute_accels(&mut self, threads: usize) -> Result<usize, AccelError> {
        let built = accel::compute_accels(&mut self.geometry.meshes, threads)?;
        if built > 0 {
            // Instance bounds depend on the mesh trees
            self.dirty.store(true, Ordering::Release);
        }
        Ok(built)
    }

    /// Rebuild the top-level tree if instances changed. Returns true if it was rebuilt.
    ///
    /// Concurrent callers are serialized, so the last tree swapped in is
    /// always built from the newest snapshot. The build runs without holding
    /// the top-level lock. The write lock is held only for the swap, and the
    /// old tree is dropped after it is released.
    pub fn update_toplevel_bvh(&self) -> bool {
        let _rebuild = self.rebuild.lock();
        let has_tree = self.top_level.read().is_some();
        // Cleared before the snapshot so an edit racing with the build marks it dirty again
        if !self.dirty.swap(false, Ordering::AcqRel) && has_tree {
            return false;
        }

        let instances = self.instances.read().clone();
        let start = Instant::now();
        let bvh = build_top_level(&self.geometry, &instances);
        log::debug!(
            "Built top-level BVH over {} instances ({} nodes) in {:.2?}",
            instances.len(),
            bvh.node_count(),
            start.elapsed()
        );

        let fresh = Arc::new(TopLevel { bvh, instances });
        let old = self.top_level.write().replace(fresh);
        drop(old);
        true
    }

    /// Snapshot of the current top-level tree.
    pub fn top_level(&self) -> Option<Arc<TopLevel>> {
        self.top_level.read().clone()
    }

    /// Run `f` while holding the read lock on the current top-level tree.
    ///
    /// Rebuilds can proceed concurrently but cannot swap until `f` returns.
    pub fn with_top_level<R>(&self, f: impl FnOnce(Option<&TopLevel>) -> R) -> R {
        let guard = self.top_level.read();
        f(guard.as_deref())
    }

    /// Find the nearest hit in the world. Never hits before the first top-level update.
    pub fn intersect(&self, ray: &Ray, hit: &mut HitRecord, sampler: &mut dyn RngCore) -> bool {
        self.with_top_level(|top| match top {
            Some(top) => top.intersect(&self.geometry, ray, hit, sampler),
            None => false,
        })
    }
}
