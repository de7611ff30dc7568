//! Ember Core - scene geometry and two-level ray acceleration.
//!
//! Meshes own an immutable bottom-level [`Bvh`] over their triangles.
//! Instances place meshes or analytic spheres in the world with a
//! [`Transform`], and the [`World`] keeps a top-level [`Bvh`] over the
//! instances that render threads traverse concurrently with rebuilds.

pub mod accel;
pub mod hit;
pub mod instance;
pub mod mesh;
pub mod sphere;
pub mod transform;
pub mod world;

pub use accel::{compute_accels, AccelError};
pub use hit::HitRecord;
pub use instance::{Instance, InstanceKind};
pub use mesh::{Mesh, MeshError};
pub use sphere::Sphere;
pub use transform::Transform;
pub use world::{build_top_level, traverse_top_level, Geometry, TopLevel, World, WorldError};

pub use ember_bvh::{Bvh, TraversalMode};
