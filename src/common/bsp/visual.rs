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

//! Renderable meshes built from face records.
//!
//! Each face is a closed loop of surface edges. The loop is converted to a polygon of points
//! (position plus texture coordinate), points are shared across the whole model, and each polygon
//! is split into a fan of triangles around its first vertex. Fans are only correct for convex
//! polygons; faces produced by the map compiler always are.

use std::collections::HashMap;

use crate::common::{
    bsp::{BspEdge, BspEdgeIndex, BspError, BspFace, BspModel, BspTexInfo},
    wad::texture::MipTextureHeader,
};

use cgmath::{InnerSpace, Vector2, Vector3};

/// The records a visual mesh is built from.
pub struct FaceGeometry<'a> {
    pub vertices: &'a [Vector3<f32>],
    pub edges: &'a [BspEdge],
    pub surfedges: &'a [BspEdgeIndex],
    pub faces: &'a [BspFace],
    pub texinfo: &'a [BspTexInfo],
    pub textures: &'a [MipTextureHeader],
    pub models: &'a [BspModel],
}

/// Triangles sharing one texture.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureGroup {
    texture: String,
    indices: Vec<u32>,
}

impl TextureGroup {
    pub fn texture(&self) -> &str {
        &self.texture
    }

    /// Returns the point indices, three per triangle.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Iterates over triangles in the order they were emitted.
    pub fn triangles<'a>(&'a self) -> impl Iterator<Item = [u32; 3]> + 'a {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    /// Iterates over triangles with their winding reversed, for formats of opposite handedness.
    pub fn reversed_triangles<'a>(&'a self) -> impl Iterator<Item = [u32; 3]> + 'a {
        self.triangles().map(|[a, b, c]| [c, b, a])
    }
}

/// A triangle mesh with one group of triangles per texture.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderModel {
    positions: Vec<Vector3<f32>>,
    uvs: Vec<Vector2<f32>>,
    groups: Vec<TextureGroup>,
}

impl RenderModel {
    pub fn positions(&self) -> &[Vector3<f32>] {
        &self.positions
    }

    /// Returns the texture coordinates, parallel to `positions`.
    pub fn uvs(&self) -> &[Vector2<f32>] {
        &self.uvs
    }

    /// Returns the texture groups in the order their textures were first used.
    pub fn groups(&self) -> &[TextureGroup] {
        &self.groups
    }

    pub fn group<S>(&self, texture: S) -> Option<&TextureGroup>
    where
        S: AsRef<str>,
    {
        self.groups.iter().find(|g| g.texture == texture.as_ref())
    }

    pub fn point_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.groups.iter().map(|g| g.triangle_count()).sum()
    }
}

// exact bit pattern, except that both zeroes compare equal
pub(crate) fn float_key(f: f32) -> u32 {
    (f + 0.0).to_bits()
}

pub(crate) fn vector3_key(v: Vector3<f32>) -> [u32; 3] {
    [float_key(v.x), float_key(v.y), float_key(v.z)]
}

/// Appends the fan triangulation of `polygon` to `indices`: `(v0, v[i - 1], v[i])` for each `i`
/// from 2. Polygons with fewer than 3 vertices produce nothing.
pub(crate) fn triangulate_fan(polygon: &[u32], indices: &mut Vec<u32>) {
    for i in 2..polygon.len() {
        indices.extend_from_slice(&[polygon[0], polygon[i - 1], polygon[i]]);
    }
}

#[derive(Default)]
struct PointSet {
    lookup: HashMap<[u32; 5], u32>,
    positions: Vec<Vector3<f32>>,
    uvs: Vec<Vector2<f32>>,
}

impl PointSet {
    // returns the index of the first identical point, adding the point if there is none
    fn insert(&mut self, position: Vector3<f32>, uv: Vector2<f32>) -> u32 {
        let [x, y, z] = vector3_key(position);
        let key = [x, y, z, float_key(uv.x), float_key(uv.y)];

        let positions = &mut self.positions;
        let uvs = &mut self.uvs;
        *self.lookup.entry(key).or_insert_with(|| {
            positions.push(position);
            uvs.push(uv);
            (positions.len() - 1) as u32
        })
    }
}

fn face_polygon(
    geom: &FaceGeometry,
    face: &BspFace,
    texinfo: &BspTexInfo,
    texture: &MipTextureHeader,
    points: &mut PointSet,
) -> Result<Vec<u32>, BspError> {
    let surfedges = match geom
        .surfedges
        .get(face.edge_id..face.edge_id.saturating_add(face.edge_count))
    {
        Some(s) => s,
        None => {
            return Err(BspError::out_of_range(format!(
                "face edges {}..{} exceed surface edge count {}",
                face.edge_id,
                face.edge_id.saturating_add(face.edge_count),
                geom.surfedges.len()
            )))
        }
    };

    let (width, height) = (texture.width as f32, texture.height as f32);
    let mut polygon = Vec::with_capacity(surfedges.len());
    for surfedge in surfedges {
        let vertex_id = surfedge.resolve(geom.edges)?;
        let position = match geom.vertices.get(vertex_id) {
            Some(&p) => p,
            None => {
                return Err(BspError::out_of_range(format!(
                    "vertex index {} exceeds vertex count {}",
                    vertex_id,
                    geom.vertices.len()
                )))
            }
        };

        let uv = Vector2::new(
            (texinfo.s_vector.dot(position) + texinfo.s_offset) / width,
            (texinfo.t_vector.dot(position) + texinfo.t_offset) / height,
        );

        polygon.push(points.insert(position, uv));
    }

    Ok(polygon)
}

/// Builds the mesh of a single model.
pub fn build_model(geom: &FaceGeometry, model: &BspModel) -> Result<RenderModel, BspError> {
    let face_end = model.face_id.saturating_add(model.face_count);
    let faces = match geom.faces.get(model.face_id..face_end) {
        Some(f) => f,
        None => {
            return Err(BspError::out_of_range(format!(
                "model faces {}..{} exceed face count {}",
                model.face_id,
                face_end,
                geom.faces.len()
            )))
        }
    };

    let mut points = PointSet::default();
    let mut groups: Vec<TextureGroup> = Vec::new();
    let mut group_ids: HashMap<&str, usize> = HashMap::new();

    for face in faces {
        let texinfo = geom.texinfo.get(face.texinfo_id).ok_or_else(|| {
            BspError::out_of_range(format!(
                "texinfo index {} exceeds texinfo count {}",
                face.texinfo_id,
                geom.texinfo.len()
            ))
        })?;

        let texture = geom.textures.get(texinfo.tex_id).ok_or_else(|| {
            BspError::out_of_range(format!(
                "texture index {} exceeds texture count {}",
                texinfo.tex_id,
                geom.textures.len()
            ))
        })?;

        if texture.width == 0 || texture.height == 0 {
            return Err(BspError::malformed(format!(
                "face uses texture {} \"{}\" with empty dimensions",
                texinfo.tex_id, texture.name
            )));
        }

        let polygon = face_polygon(geom, face, texinfo, texture, &mut points)?;

        let group_id = *group_ids.entry(texture.name.as_str()).or_insert_with(|| {
            groups.push(TextureGroup {
                texture: texture.name.clone(),
                indices: Vec::new(),
            });
            groups.len() - 1
        });

        triangulate_fan(&polygon, &mut groups[group_id].indices);
    }

    Ok(RenderModel {
        positions: points.positions,
        uvs: points.uvs,
        groups,
    })
}

/// Builds one mesh per model descriptor. A map without models is rejected.
pub fn build_models(geom: &FaceGeometry) -> Result<Vec<RenderModel>, BspError> {
    if geom.models.is_empty() {
        return Err(BspError::malformed("map has no models"));
    }

    let mut models = Vec::with_capacity(geom.models.len());
    for (i, model) in geom.models.iter().enumerate() {
        let built = build_model(geom, model)?;
        debug!(
            "Model {}: {} points, {} triangles in {} groups",
            i,
            built.point_count(),
            built.triangle_count(),
            built.groups.len()
        );
        models.push(built);
    }

    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::common::bsp::{BspFaceSide, BspTexInfoFlags, MAX_HULLS};

    fn header(name: &str, width: u32, height: u32) -> MipTextureHeader {
        MipTextureHeader {
            name: name.to_owned(),
            width,
            height,
            offsets: [0; 4],
        }
    }

    fn face(edge_id: usize, edge_count: usize, texinfo_id: usize) -> BspFace {
        BspFace {
            plane_id: 0,
            side: BspFaceSide::Front,
            edge_id,
            edge_count,
            texinfo_id,
            light_styles: [0; 4],
            lightmap_offset: None,
        }
    }

    // projects x onto s and y onto t
    fn texinfo(tex_id: usize) -> BspTexInfo {
        BspTexInfo {
            s_vector: Vector3::new(1.0, 0.0, 0.0),
            s_offset: 0.0,
            t_vector: Vector3::new(0.0, 1.0, 0.0),
            t_offset: 0.0,
            tex_id,
            flags: BspTexInfoFlags::empty(),
        }
    }

    fn model(face_id: usize, face_count: usize) -> BspModel {
        BspModel {
            min: Vector3::new(0.0, 0.0, 0.0),
            max: Vector3::new(0.0, 0.0, 0.0),
            origin: Vector3::new(0.0, 0.0, 0.0),
            head_nodes: [0; MAX_HULLS],
            vis_leaf_count: 0,
            face_id,
            face_count,
        }
    }

    fn edge(a: u16, b: u16) -> BspEdge {
        BspEdge {
            vertex_ids: [a, b],
        }
    }

    fn surfedges(values: &[i32]) -> Vec<BspEdgeIndex> {
        values.iter().map(|&v| BspEdgeIndex::from_signed(v)).collect()
    }

    // two unit squares side by side sharing the edge from (1, 0) to (1, 1)
    fn squares() -> (Vec<Vector3<f32>>, Vec<BspEdge>, Vec<BspEdgeIndex>) {
        let vertices = vec![
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(2.0, 1.0, 0.0),
        ];
        let edges = vec![
            edge(0, 0),
            edge(0, 1),
            edge(1, 2),
            edge(2, 3),
            edge(3, 0),
            edge(1, 4),
            edge(4, 5),
            edge(5, 2),
        ];
        // second square walks the shared edge backwards
        let surfedges = surfedges(&[1, 2, 3, 4, 5, 6, 7, -2]);
        (vertices, edges, surfedges)
    }

    #[test]
    fn test_single_square() {
        let (vertices, edges, surfedges) = squares();
        let faces = [face(0, 4, 0)];
        let texinfo = [texinfo(0)];
        let textures = [header("brick", 64, 32)];
        let models = [model(0, 1)];

        let built = build_models(&FaceGeometry {
            vertices: &vertices,
            edges: &edges,
            surfedges: &surfedges,
            faces: &faces,
            texinfo: &texinfo,
            textures: &textures,
            models: &models,
        })
        .unwrap();

        assert_eq!(built.len(), 1);
        let m = &built[0];
        assert_eq!(m.point_count(), 4);
        assert_eq!(m.groups().len(), 1);

        let group = m.group("brick").unwrap();
        assert_eq!(group.indices(), &[0, 1, 2, 0, 2, 3]);
        assert_eq!(group.reversed_triangles().next(), Some([2, 1, 0]));

        assert_eq!(m.uvs()[2], Vector2::new(1.0 / 64.0, 1.0 / 32.0));
    }

    #[test]
    fn test_shared_points_and_groups() {
        let (vertices, edges, surfedges) = squares();
        let faces = [face(0, 4, 0), face(4, 4, 1), face(0, 4, 2)];
        let texinfo = [texinfo(0), texinfo(0), texinfo(1)];
        let textures = [header("brick", 64, 64), header("metal", 32, 32)];
        let models = [model(0, 3)];

        let built = build_models(&FaceGeometry {
            vertices: &vertices,
            edges: &edges,
            surfedges: &surfedges,
            faces: &faces,
            texinfo: &texinfo,
            textures: &textures,
            models: &models,
        })
        .unwrap();

        let m = &built[0];
        // 6 distinct brick points, plus 3 for the first square at metal's scale; its corner at
        // the origin maps to uv (0, 0) under both textures and stays shared
        assert_eq!(m.point_count(), 9);
        assert_eq!(m.triangle_count(), 6);

        let names: Vec<_> = m.groups().iter().map(|g| g.texture()).collect();
        assert_eq!(names, vec!["brick", "metal"]);

        // second square starts at (1, 0), shared with the first
        let brick = m.group("brick").unwrap();
        assert_eq!(brick.indices(), &[0, 1, 2, 0, 2, 3, 1, 4, 5, 1, 5, 2]);

        let metal = m.group("metal").unwrap();
        assert_eq!(metal.indices(), &[0, 6, 7, 0, 7, 8]);

        for g in m.groups() {
            assert!(g.indices().iter().all(|&i| (i as usize) < m.point_count()));
        }
    }

    #[test]
    fn test_surfedge_sign() {
        let vertices = [Vector3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 0.0)];
        let edges = [edge(0, 1)];

        let back = BspEdgeIndex::from_signed(-1);
        assert_eq!(back.index, 1);

        // edge 0 walked backwards starts at its second vertex
        let back_zero = BspEdgeIndex {
            direction: crate::common::bsp::BspEdgeDirection::Backward,
            index: 0,
        };
        let v = back_zero.resolve(&edges).unwrap();
        assert_eq!(v, 1);
        assert_eq!(vertices[v], Vector3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_fan() {
        let mut indices = Vec::new();
        triangulate_fan(&[7, 8], &mut indices);
        assert!(indices.is_empty());

        triangulate_fan(&[0, 1, 2, 3, 4], &mut indices);
        assert_eq!(indices, vec![0, 1, 2, 0, 2, 3, 0, 3, 4]);
    }

    #[test]
    fn test_degenerate_face() {
        let (vertices, edges, surfedges) = squares();
        let faces = [face(0, 2, 0)];
        let texinfo = [texinfo(0)];
        let textures = [header("brick", 64, 64)];
        let models = [model(0, 1)];

        let built = build_models(&FaceGeometry {
            vertices: &vertices,
            edges: &edges,
            surfedges: &surfedges,
            faces: &faces,
            texinfo: &texinfo,
            textures: &textures,
            models: &models,
        })
        .unwrap();
        assert_eq!(built[0].triangle_count(), 0);
    }

    #[test]
    fn test_zero_models() {
        let geom = FaceGeometry {
            vertices: &[],
            edges: &[],
            surfedges: &[],
            faces: &[],
            texinfo: &[],
            textures: &[],
            models: &[],
        };
        match build_models(&geom) {
            Err(BspError::Malformed(_)) => (),
            x => panic!("expected malformed, got {:?}", x),
        }
    }

    #[test]
    fn test_out_of_range_references() {
        let (vertices, edges, surfedges) = squares();
        let texinfo = [texinfo(0), texinfo(5)];
        let textures = [header("brick", 64, 64), header("", 0, 0)];

        let cases = vec![
            (vec![face(0, 4, 9)], vec![model(0, 1)]),
            (vec![face(0, 4, 1)], vec![model(0, 1)]),
            (vec![face(6, 4, 0)], vec![model(0, 1)]),
            (vec![face(0, 4, 0)], vec![model(0, 2)]),
        ];

        for (faces, models) in cases {
            let geom = FaceGeometry {
                vertices: &vertices,
                edges: &edges,
                surfedges: &surfedges,
                faces: &faces,
                texinfo: &texinfo,
                textures: &textures,
                models: &models,
            };
            match build_models(&geom) {
                Err(BspError::OutOfRange(_)) => (),
                x => panic!("expected out of range, got {:?}", x),
            }
        }
    }

    #[test]
    fn test_empty_texture() {
        let (vertices, edges, surfedges) = squares();
        let faces = [face(0, 4, 0)];
        let texinfo = [texinfo(0)];
        let textures = [header("", 0, 0)];
        let models = [model(0, 1)];

        let geom = FaceGeometry {
            vertices: &vertices,
            edges: &edges,
            surfedges: &surfedges,
            faces: &faces,
            texinfo: &texinfo,
            textures: &textures,
            models: &models,
        };
        match build_models(&geom) {
            Err(BspError::Malformed(_)) => (),
            x => panic!("expected malformed, got {:?}", x),
        }
    }

    #[test]
    fn test_signed_zero_shares_point() {
        let mut points = PointSet::default();
        let a = points.insert(Vector3::new(0.0, 1.0, 2.0), Vector2::new(0.0, 0.5));
        let b = points.insert(Vector3::new(-0.0, 1.0, 2.0), Vector2::new(-0.0, 0.5));
        let c = points.insert(Vector3::new(0.0, 1.0, 2.0), Vector2::new(0.25, 0.5));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(points.positions.len(), 2);
    }
}
