// Copyright © 2018 Cormac O'Brien
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in
// all copies or substantial portions of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
// FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
// AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
// LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
// OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
// SOFTWARE.

//! Collision shapes.

use cgmath::{InnerSpace, Vector3};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ColliderError {
    #[error("Index count {0} is not a multiple of 3")]
    IndexCount(usize),
    #[error("Index {index} exceeds vertex count {vertex_count}")]
    IndexOutOfRange { index: u32, vertex_count: usize },
    #[error("Invalid bounds: min {min:?} exceeds max {max:?}")]
    InvalidBounds { min: [f32; 3], max: [f32; 3] },
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sphere {
    pub center: Vector3<f32>,
    pub radius: f32,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    min: Vector3<f32>,
    max: Vector3<f32>,
}

impl Aabb {
    pub fn new(min: Vector3<f32>, max: Vector3<f32>) -> Result<Aabb, ColliderError> {
        if min.x > max.x || min.y > max.y || min.z > max.z {
            return Err(ColliderError::InvalidBounds {
                min: min.into(),
                max: max.into(),
            });
        }

        Ok(Aabb { min, max })
    }

    pub fn min(&self) -> Vector3<f32> {
        self.min
    }

    pub fn max(&self) -> Vector3<f32> {
        self.max
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.min + self.max) / 2.0
    }

    pub fn half_size(&self) -> Vector3<f32> {
        (self.max - self.min) / 2.0
    }

    /// Returns the point inside the box nearest to `p`.
    pub fn closest_point(&self, p: Vector3<f32>) -> Vector3<f32> {
        Vector3::new(
            p.x.max(self.min.x).min(self.max.x),
            p.y.max(self.min.y).min(self.max.y),
            p.z.max(self.min.z).min(self.max.z),
        )
    }
}

/// A triangle mesh. Every 3 indices form one triangle.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshCollider {
    vertices: Vec<Vector3<f32>>,
    indices: Vec<u32>,
}

impl MeshCollider {
    pub fn new(
        vertices: Vec<Vector3<f32>>,
        indices: Vec<u32>,
    ) -> Result<MeshCollider, ColliderError> {
        if indices.len() % 3 != 0 {
            return Err(ColliderError::IndexCount(indices.len()));
        }

        if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(ColliderError::IndexOutOfRange {
                index,
                vertex_count: vertices.len(),
            });
        }

        Ok(MeshCollider { vertices, indices })
    }

    pub fn vertices(&self) -> &[Vector3<f32>] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Iterates over the triangles of the mesh as vertex positions.
    pub fn triangles<'a>(&'a self) -> impl Iterator<Item = [Vector3<f32>; 3]> + 'a {
        self.indices.chunks_exact(3).map(move |t| {
            [
                self.vertices[t[0] as usize],
                self.vertices[t[1] as usize],
                self.vertices[t[2] as usize],
            ]
        })
    }

    /// Returns the smallest box containing every vertex, or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<Aabb> {
        let first = *self.vertices.first()?;
        let (min, max) = self.vertices.iter().fold((first, first), |(min, max), v| {
            (
                Vector3::new(min.x.min(v.x), min.y.min(v.y), min.z.min(v.z)),
                Vector3::new(max.x.max(v.x), max.y.max(v.y), max.z.max(v.z)),
            )
        });
        Some(Aabb { min, max })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Collider {
    Sphere(Sphere),
    Aabb(Aabb),
    Mesh(MeshCollider),
}

impl Collider {
    /// Tests two colliders for overlap. Touching shapes overlap.
    ///
    /// Returns `None` for pairings involving a mesh, which have no intersection test.
    pub fn intersects(&self, other: &Collider) -> Option<bool> {
        match (self, other) {
            (Collider::Sphere(a), Collider::Sphere(b)) => {
                let reach = a.radius + b.radius;
                Some((a.center - b.center).magnitude2() <= reach * reach)
            }

            (Collider::Sphere(s), Collider::Aabb(b)) | (Collider::Aabb(b), Collider::Sphere(s)) => {
                let closest = b.closest_point(s.center);
                Some((closest - s.center).magnitude2() <= s.radius * s.radius)
            }

            (Collider::Aabb(a), Collider::Aabb(b)) => Some(
                a.min.x <= b.max.x
                    && b.min.x <= a.max.x
                    && a.min.y <= b.max.y
                    && b.min.y <= a.max.y
                    && a.min.z <= b.max.z
                    && b.min.z <= a.max.z,
            ),

            (Collider::Mesh(_), _) | (_, Collider::Mesh(_)) => None,
        }
    }
}
