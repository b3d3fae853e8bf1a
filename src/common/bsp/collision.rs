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

//! Clip hull collision meshes.
//!
//! Every leaf reachable as a negative child of a clip node contributes one polygon, walked through
//! its mark surfaces. Mark surfaces here are read as signed edge references, so each one resolves
//! to the starting vertex of an edge. The polygons are fan-triangulated into a single mesh whose
//! vertices are shared across the whole map. Face records are never consulted.

use std::collections::{HashMap, HashSet};

use crate::common::{
    bsp::{
        visual::{triangulate_fan, vector3_key},
        BspClipNode, BspEdge, BspEdgeIndex, BspError, BspLeaf, BspNodeChild,
    },
    collider::MeshCollider,
};

use cgmath::Vector3;

/// The records a collision mesh is built from.
pub struct ClipGeometry<'a> {
    pub vertices: &'a [Vector3<f32>],
    pub edges: &'a [BspEdge],
    pub marksurfaces: &'a [BspEdgeIndex],
    pub leaves: &'a [BspLeaf],
    pub clip_nodes: &'a [BspClipNode],
}

/// Returns the distinct leaf indices referenced by any clip node, in the order they are first
/// referenced.
pub fn collidable_leaves(clip_nodes: &[BspClipNode]) -> Vec<usize> {
    let mut seen = HashSet::new();
    let mut leaves = Vec::new();

    for node in clip_nodes {
        for child in node.children.iter() {
            if let BspNodeChild::Leaf(leaf_id) = *child {
                if seen.insert(leaf_id) {
                    leaves.push(leaf_id);
                }
            }
        }
    }

    leaves
}

fn leaf_polygon(
    geom: &ClipGeometry,
    leaf_id: usize,
    lookup: &mut HashMap<[u32; 3], u32>,
    vertices: &mut Vec<Vector3<f32>>,
) -> Result<Vec<u32>, BspError> {
    let leaf = geom.leaves.get(leaf_id).ok_or_else(|| {
        BspError::out_of_range(format!(
            "leaf index {} exceeds leaf count {}",
            leaf_id,
            geom.leaves.len()
        ))
    })?;

    let end = leaf.marksurface_id + leaf.marksurface_count;
    let marksurfaces = geom.marksurfaces.get(leaf.marksurface_id..end).ok_or_else(|| {
        BspError::out_of_range(format!(
            "leaf {} mark surfaces {}..{} exceed mark surface count {}",
            leaf_id,
            leaf.marksurface_id,
            end,
            geom.marksurfaces.len()
        ))
    })?;

    let mut polygon = Vec::with_capacity(marksurfaces.len());
    for marksurface in marksurfaces {
        let vertex_id = marksurface.resolve(geom.edges)?;
        let position = *geom.vertices.get(vertex_id).ok_or_else(|| {
            BspError::out_of_range(format!(
                "vertex index {} exceeds vertex count {}",
                vertex_id,
                geom.vertices.len()
            ))
        })?;

        let index = *lookup.entry(vector3_key(position)).or_insert_with(|| {
            vertices.push(position);
            (vertices.len() - 1) as u32
        });
        polygon.push(index);
    }

    Ok(polygon)
}

/// Builds the clip hull collision mesh of a map.
pub fn build_collider(geom: &ClipGeometry) -> Result<MeshCollider, BspError> {
    let leaves = collidable_leaves(geom.clip_nodes);

    let mut lookup = HashMap::new();
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for &leaf_id in leaves.iter() {
        let polygon = leaf_polygon(geom, leaf_id, &mut lookup, &mut vertices)?;
        triangulate_fan(&polygon, &mut indices);
    }

    debug!(
        "Clip hull: {} leaves, {} vertices, {} triangles",
        leaves.len(),
        vertices.len(),
        indices.len() / 3
    );

    Ok(MeshCollider::new(vertices, indices)?)
}
