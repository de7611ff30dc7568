//! Triangle meshes and their bottom-level acceleration structure.
//!
//! A mesh is validated once at construction so intersection code can index
//! vertex attributes without bounds failures. Its [`Bvh`] is built once
//! (usually by [`compute_accels`](crate::compute_accels)) and never changes
//! afterwards.

use ember_bvh::Bvh;
use ember_math::{BoundingBox, Ray, Vec2, Vec3};
use thiserror::Error;

use crate::HitRecord;

/// Errors raised when mesh data is inconsistent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshError {
    #[error("index count {0} is not a multiple of 3")]
    IndexCount(usize),

    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },

    #[error("{attribute} count {count} does not match vertex count {vertex_count}")]
    AttributeCount {
        attribute: &'static str,
        count: usize,
        vertex_count: usize,
    },
}

/// An indexed triangle mesh.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub name: String,
    positions: Vec<Vec3>,
    normals: Option<Vec<Vec3>>,
    uvs: Option<Vec<Vec2>>,
    /// Every 3 indices form a triangle
    indices: Vec<u32>,
    bounds: BoundingBox,
    bvh: Option<Bvh>,
}

impl Mesh {
    /// Create a mesh from positions and triangle indices.
    pub fn new(
        name: impl Into<String>,
        positions: Vec<Vec3>,
        indices: Vec<u32>,
    ) -> Result<Self, MeshError> {
        if indices.len() % 3 != 0 {
            return Err(MeshError::IndexCount(indices.len()));
        }
        if let Some(&index) = indices.iter().find(|&&i| i as usize >= positions.len()) {
            return Err(MeshError::IndexOutOfRange {
                index,
                vertex_count: positions.len(),
            });
        }

        let bounds = positions.iter().fold(BoundingBox::EMPTY, |mut b, &p| {
            b.extend(p);
            b
        });

        Ok(Self {
            name: name.into(),
            positions,
            normals: None,
            uvs: None,
            indices,
            bounds,
            bvh: None,
        })
    }

    /// Attach per-vertex normals, interpolated across each triangle.
    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Result<Self, MeshError> {
        self.check_attribute("normal", normals.len())?;
        self.normals = Some(normals);
        Ok(self)
    }

    /// Attach per-vertex texture coordinates.
    pub fn with_uvs(mut self, uvs: Vec<Vec2>) -> Result<Self, MeshError> {
        self.check_attribute("uv", uvs.len())?;
        self.uvs = Some(uvs);
        Ok(self)
    }

    fn check_attribute(&self, attribute: &'static str, count: usize) -> Result<(), MeshError> {
        if count != self.positions.len() {
            return Err(MeshError::AttributeCount {
                attribute,
                count,
                vertex_count: self.positions.len(),
            });
        }
        Ok(())
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn normals(&self) -> Option<&[Vec3]> {
        self.normals.as_deref()
    }

    pub fn uvs(&self) -> Option<&[Vec2]> {
        self.uvs.as_deref()
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Object-space bounds of all vertices.
    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Vertex indices of triangle `tri`.
    #[inline]
    pub fn triangle_indices(&self, tri: usize) -> [usize; 3] {
        let i = &self.indices[tri * 3..tri * 3 + 3];
        [i[0] as usize, i[1] as usize, i[2] as usize]
    }

    /// Vertex positions of triangle `tri`.
    #[inline]
    pub fn triangle(&self, tri: usize) -> [Vec3; 3] {
        let [a, b, c] = self.triangle_indices(tri);
        [self.positions[a], self.positions[b], self.positions[c]]
    }

    /// Bounding box and centroid of triangle `tri`, as consumed by the builder.
    pub fn triangle_bbox_and_center(&self, tri: usize) -> (BoundingBox, Vec3) {
        let [v0, v1, v2] = self.triangle(tri);
        let mut bbox = BoundingBox::EMPTY;
        bbox.extend(v0);
        bbox.extend(v1);
        bbox.extend(v2);
        (bbox, (v0 + v1 + v2) / 3.0)
    }

    /// Build a tree over this mesh's triangles without storing it.
    pub fn build_bottom_level(&self) -> Bvh {
        Bvh::build(self.triangle_count(), |tri| self.triangle_bbox_and_center(tri))
    }

    /// Build and store the bottom-level tree. Does nothing if one exists.
    pub fn build_bvh(&mut self) {
        if self.bvh.is_none() {
            self.bvh = Some(self.build_bottom_level());
        }
    }

    pub fn bvh(&self) -> Option<&Bvh> {
        self.bvh.as_ref()
    }

    pub fn has_bvh(&self) -> bool {
        self.bvh.is_some()
    }

    /// Intersect triangle `tri`, updating `hit` if it is closer.
    ///
    /// On success `hit.uv` holds the barycentric coordinates of the hit
    /// (weights of the second and third vertex); see [`Mesh::texture_coords`].
    pub fn intersect_triangle(&self, tri: usize, ray: &Ray, hit: &mut HitRecord) -> bool {
        let [i0, i1, i2] = self.triangle_indices(tri);
        let (v0, v1, v2) = (self.positions[i0], self.positions[i1], self.positions[i2]);

        // Möller-Trumbore
        let e1 = v0 - v1;
        let e2 = v2 - v0;
        let n = e1.cross(e2);
        let c = v0 - ray.origin;
        let r = ray.direction.cross(c);
        let inv_det = 1.0 / n.dot(ray.direction);

        let u = r.dot(e2) * inv_det;
        let v = r.dot(e1) * inv_det;

        // Written so that NaN (parallel ray, degenerate triangle) fails every test
        if !(u >= 0.0 && v >= 0.0 && u + v <= 1.0) {
            return false;
        }
        let t = n.dot(c) * inv_det;
        if !(t >= 0.0 && t < hit.distance) {
            return false;
        }

        let w = 1.0 - u - v;
        let mut normal = match &self.normals {
            Some(normals) => (w * normals[i0] + u * normals[i1] + v * normals[i2]).normalize_or_zero(),
            None => n.normalize_or_zero(),
        };
        if normal.dot(ray.direction) >= 0.0 {
            normal = -normal;
        }

        hit.distance = t;
        hit.point = ray.at(t);
        hit.normal = normal;
        hit.uv = Vec2::new(u, v);
        hit.polygon = Some(tri);
        true
    }

    /// Interpolated texture coordinates at barycentric `bary` on triangle `tri`.
    pub fn texture_coords(&self, tri: usize, bary: Vec2) -> Option<Vec2> {
        let uvs = self.uvs.as_ref()?;
        let [i0, i1, i2] = self.triangle_indices(tri);
        let w = 1.0 - bary.x - bary.y;
        Some(w * uvs[i0] + bary.x * uvs[i1] + bary.y * uvs[i2])
    }

    /// Find the nearest triangle hit. Never hits before the tree is built.
    pub fn traverse_bottom_level(&self, ray: &Ray, hit: &mut HitRecord) -> bool {
        let Some(bvh) = &self.bvh else {
            return false;
        };
        bvh.traverse(ray, hit, |tris, ray, hit| {
            let mut found = false;
            for &tri in tris {
                found |= self.intersect_triangle(tri, ray, hit);
            }
            found
        })
    }
}

/// Axis-aligned quad in the XY plane, two triangles, normals facing +Z.
#[cfg(test)]
pub(crate) fn test_quad(half: f32) -> Mesh {
    let positions = vec![
        Vec3::new(-half, -half, 0.0),
        Vec3::new(half, -half, 0.0),
        Vec3::new(half, half, 0.0),
        Vec3::new(-half, half, 0.0),
    ];
    let uvs = vec![
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(0.0, 1.0),
    ];
    Mesh::new("quad", positions, vec![0, 1, 2, 0, 2, 3])
        .and_then(|m| m.with_normals(vec![Vec3::Z; 4]))
        .and_then(|m| m.with_uvs(uvs))
        .unwrap()
}
