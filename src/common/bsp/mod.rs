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

//! GoldSource BSP file and data structure handling.
//!
//! # Data Structure
//!
//! The binary space partitioning tree, or BSP, is the central data structure used by the
//! GoldSource engine (and the Quake engine it descends from) for collision detection and rendering
//! level geometry. At its core, the BSP tree is a binary search tree with each node representing a
//! subspace of the map. The tree is navigated using the planes stored in each node; each child
//! represents one side of the plane.
//!
//! # File Format
//!
//! The BSP file header consists only of the file format version number, stored as a `u32`. The
//! only version handled here is 30. Other known versions (29 for Quake, the `VBSP` and `rBSP`
//! magic numbers of later engines) are recognized by name and rejected.
//!
//! This is followed by a series of "lumps", which act as a directory into the BSP file data. There
//! are 15 of these lumps, each consisting of a 32-bit offset (into the file data) and a 32-bit size
//! (in bytes). All integers are little-endian.
//!
//! ## Entities
//!
//! Lump 0 points to the level entity data, which is stored in a JSON-like dictionary format.
//! Entities are anonymous; they do not have names, only attributes. They are stored as follows:
//!
//! ```text
//! {
//! "attribute0" "value0"
//! "attribute1" "value1"
//! }
//! {
//! "attribute0" "value0"
//! }
//! ```
//!
//! The entity data is stored as a null-terminated string.
//!
//! ## Planes
//!
//! Lump 1 points to the planes used to partition the map, stored as a normal vector, a distance
//! from the origin and a 32-bit plane type (0 to 2 for planes along an axis, 3 to 5 for planes
//! closest to an axis).
//!
//! ## Textures
//!
//! The textures are preceded by a 32-bit integer count and a list of 32-bit integer offsets. The
//! offsets are given in bytes from the beginning of the texture section. An offset of -1 marks a
//! missing texture.
//!
//! Each texture is stored in the same layout as a WAD3 texture: a 16-byte name, a 32-bit width
//! and height, 4 mipmap offsets relative to the start of the texture, the mipmaps themselves, 2
//! bytes of padding and a 256-entry RGB palette. Unlike Quake, every texture carries its own
//! palette. Textures stored in an external WAD only carry the header, with all mipmap offsets set
//! to 0.
//!
//! ## Vertex positions
//!
//! The vertex positions are stored as 3-component vectors of `float`.
//!
//! ## Visibility lists
//!
//! The visibility lists are stored as a series of run-length encoded bit strings. They are kept as
//! raw bytes.
//!
//! ## Nodes
//!
//! Nodes are stored with a 32-bit integer plane ID denoting which plane splits the node. This is
//! followed by two 16-bit integers which point to the children in front and back of the plane. If
//! the value is negative, its bitwise complement is the index of a leaf; if not, it points to
//! another internal node.
//!
//! ## Faces and edges
//!
//! Edges are stored as a pair of 16-bit vertex indices. Faces do not reference edges directly but
//! a range of the surface edge list, a list of signed 32-bit edge indices. A non-negative surface
//! edge walks its edge from the first vertex; a negative one walks the edge at the absolute value
//! of the index from the second vertex.
//!
//! ## Clip nodes and leaves
//!
//! Clip nodes form the simplified hulls used for collision. They use the same child convention as
//! render nodes. Leaves reference a range of the mark surface list, a list of signed 16-bit edge
//! indices using the surface edge sign convention.

pub mod collision;
pub mod entity;
pub mod load;
pub mod visual;

use std::io;

use crate::common::{collider::ColliderError, wad::WadError};

use cgmath::Vector3;
use num::FromPrimitive;
use thiserror::Error;

pub use self::{
    collision::build_collider,
    entity::{parse_entities, Entity},
    load::{load, LoadFlags, LoadedMap},
    visual::{build_models, RenderModel},
};

pub const MAX_HULLS: usize = 4;
pub const MAX_LIGHTSTYLES: usize = 4;
pub const NUM_AMBIENTS: usize = 4;

/// Lightmap offset marking a face without a lightmap.
const NO_LIGHTMAP: u32 = 0xFFFF_FFFF;

#[derive(Error, Debug)]
pub enum BspError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Unsupported BSP version {version} ({label})")]
    UnsupportedVersion { version: u32, label: &'static str },
    #[error("Out of range: {0}")]
    OutOfRange(String),
    #[error("Malformed record: {0}")]
    Malformed(String),
    #[error("Bad texture data: {0}")]
    Texture(#[from] WadError),
    #[error("Bad collider: {0}")]
    Collider(#[from] ColliderError),
}

impl BspError {
    pub(crate) fn out_of_range<S>(msg: S) -> Self
    where
        S: AsRef<str>,
    {
        BspError::OutOfRange(msg.as_ref().to_owned())
    }

    pub(crate) fn malformed<S>(msg: S) -> Self
    where
        S: AsRef<str>,
    {
        BspError::Malformed(msg.as_ref().to_owned())
    }

    /// Builds the error for an unrecognized version tag, labelled with the engine that uses it if
    /// the tag is known.
    pub fn unsupported_version(version: u32) -> Self {
        BspError::UnsupportedVersion {
            version,
            label: BspVersion::label_of(version),
        }
    }
}

/// Version tags of the BSP family of formats.
#[derive(Copy, Clone, Debug, Eq, FromPrimitive, PartialEq)]
pub enum BspVersion {
    Quake = 29,
    GoldSource = 30,
    /// `VBSP` read as a little-endian integer.
    Valve = 0x5053_4256,
    /// `rBSP` read as a little-endian integer.
    Respawn = 0x5053_4272,
}

impl BspVersion {
    pub fn label(&self) -> &'static str {
        match *self {
            BspVersion::Quake => "Quake 1",
            BspVersion::GoldSource => "GoldSource",
            BspVersion::Valve => "ValveBSP (Source engine)",
            BspVersion::Respawn => "rBSP (Titanfall)",
        }
    }

    /// Returns the label of a raw version tag, or `"unknown"`.
    pub fn label_of(version: u32) -> &'static str {
        match BspVersion::from_u32(version) {
            Some(v) => v.label(),
            None => "unknown",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, FromPrimitive, PartialEq)]
pub enum BspPlaneKind {
    X = 0,
    Y = 1,
    Z = 2,
    AnyX = 3,
    AnyY = 4,
    AnyZ = 5,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BspPlane {
    pub normal: Vector3<f32>,
    pub dist: f32,
    pub kind: BspPlaneKind,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BspNodeChild {
    Node(usize),
    Leaf(usize),
}

impl BspNodeChild {
    /// Decodes a child reference. Negative values are the bitwise complement of a leaf index.
    pub fn from_i16(value: i16) -> BspNodeChild {
        match value {
            c if c < 0 => BspNodeChild::Leaf((!c) as usize),
            c => BspNodeChild::Node(c as usize),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BspRenderNode {
    pub plane_id: usize,
    pub children: [BspNodeChild; 2],
    pub min: [i16; 3],
    pub max: [i16; 3],
    pub face_id: usize,
    pub face_count: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BspClipNode {
    pub plane_id: i32,
    pub children: [BspNodeChild; 2],
}

bitflags! {
    pub struct BspTexInfoFlags: u32 {
        /// Sky or liquid surface without a lightmap.
        const SPECIAL = 0x0001;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BspTexInfo {
    pub s_vector: Vector3<f32>,
    pub s_offset: f32,
    pub t_vector: Vector3<f32>,
    pub t_offset: f32,
    pub tex_id: usize,
    pub flags: BspTexInfoFlags,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BspFaceSide {
    Front,
    Back,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BspFace {
    pub plane_id: usize,
    pub side: BspFaceSide,
    pub edge_id: usize,
    pub edge_count: usize,
    pub texinfo_id: usize,
    pub light_styles: [u8; MAX_LIGHTSTYLES],
    pub lightmap_offset: Option<usize>,
}

impl BspFace {
    pub(crate) fn lightmap_offset_from_u32(raw: u32) -> Option<usize> {
        match raw {
            NO_LIGHTMAP => None,
            o => Some(o as usize),
        }
    }
}

/// The contents of a leaf in the BSP tree, specifying how it should look and behave.
#[derive(Copy, Clone, Debug, Eq, FromPrimitive, PartialEq)]
pub enum BspLeafContents {
    /// The leaf has nothing in it. Vision is unobstructed and movement is unimpeded.
    Empty = -1,

    /// The leaf is solid. Physics objects will collide with its surface and may not move inside it.
    Solid = -2,

    /// The leaf is full of water. Movement is done by swimming instead of walking.
    Water = -3,

    /// The leaf is full of slime. Entities take periodic minor damage.
    Slime = -4,

    /// The leaf is full of lava. Entities take periodic severe damage.
    Lava = -5,

    Sky = -6,

    /// Removed during map compilation; only seen in unprocessed brush models.
    Origin = -7,

    Clip = -8,

    /// Same as `BspLeafContents::Water`, but the player is constantly pushed in the positive
    /// x-direction.
    Current0 = -9,

    /// Same as `BspLeafContents::Water`, but the player is constantly pushed in the positive
    /// y-direction.
    Current90 = -10,

    /// Same as `BspLeafContents::Water`, but the player is constantly pushed in the negative
    /// x-direction.
    Current180 = -11,

    /// Same as `BspLeafContents::Water`, but the player is constantly pushed in the negative
    /// y-direction.
    Current270 = -12,

    /// Same as `BspLeafContents::Water`, but the player is constantly pushed upward.
    CurrentUp = -13,

    /// Same as `BspLeafContents::Water`, but the player is constantly pushed downward.
    CurrentDown = -14,

    /// Rendered with transparency, e.g. glass.
    Translucent = -15,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BspLeaf {
    pub contents: BspLeafContents,
    pub vis_offset: Option<usize>,
    pub min: [i16; 3],
    pub max: [i16; 3],
    pub marksurface_id: usize,
    pub marksurface_count: usize,
    pub ambient_levels: [u8; NUM_AMBIENTS],
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BspEdge {
    pub vertex_ids: [u16; 2],
}

impl BspEdge {
    /// Returns the vertex an edge walk in the given direction starts from.
    pub fn start_vertex(&self, direction: BspEdgeDirection) -> usize {
        self.vertex_ids[direction as usize] as usize
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BspEdgeDirection {
    Forward = 0,
    Backward = 1,
}

/// A signed edge reference, as stored in the surface edge and mark surface lists.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BspEdgeIndex {
    pub direction: BspEdgeDirection,
    pub index: usize,
}

impl BspEdgeIndex {
    pub fn from_signed(value: i32) -> BspEdgeIndex {
        BspEdgeIndex {
            direction: if value >= 0 {
                BspEdgeDirection::Forward
            } else {
                BspEdgeDirection::Backward
            },
            index: value.unsigned_abs() as usize,
        }
    }

    /// Resolves this reference to a vertex index.
    pub fn resolve(&self, edges: &[BspEdge]) -> Result<usize, BspError> {
        match edges.get(self.index) {
            Some(edge) => Ok(edge.start_vertex(self.direction)),
            None => Err(BspError::out_of_range(format!(
                "edge index {} exceeds edge count {}",
                self.index,
                edges.len()
            ))),
        }
    }
}

/// A brush model descriptor. Model 0 is the world; the rest belong to brush entities.
#[derive(Clone, Debug, PartialEq)]
pub struct BspModel {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
    pub origin: Vector3<f32>,
    pub head_nodes: [i32; MAX_HULLS],
    pub vis_leaf_count: i32,
    pub face_id: usize,
    pub face_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_labels() {
        assert_eq!(BspVersion::label_of(30), "GoldSource");
        assert_eq!(BspVersion::label_of(29), "Quake 1");
        assert_eq!(
            BspVersion::label_of(u32::from_le_bytes(*b"VBSP")),
            "ValveBSP (Source engine)"
        );
        assert_eq!(BspVersion::label_of(u32::from_le_bytes(*b"rBSP")), "rBSP (Titanfall)");
        assert_eq!(BspVersion::label_of(31), "unknown");
    }

    #[test]
    fn test_node_child_complement() {
        assert_eq!(BspNodeChild::from_i16(-1), BspNodeChild::Leaf(0));
        assert_eq!(BspNodeChild::from_i16(-3), BspNodeChild::Leaf(2));
        assert_eq!(BspNodeChild::from_i16(2), BspNodeChild::Node(2));
    }

    #[test]
    fn test_edge_index_sign() {
        let edges = [BspEdge { vertex_ids: [0, 1] }, BspEdge { vertex_ids: [4, 7] }];

        let fwd = BspEdgeIndex::from_signed(1);
        assert_eq!(fwd.direction, BspEdgeDirection::Forward);
        assert_eq!(fwd.resolve(&edges).unwrap(), 4);

        let back = BspEdgeIndex::from_signed(-1);
        assert_eq!(back.direction, BspEdgeDirection::Backward);
        assert_eq!(back.index, 1);
        assert_eq!(back.resolve(&edges).unwrap(), 7);

        // zero is always forward
        assert_eq!(BspEdgeIndex::from_signed(0).resolve(&edges).unwrap(), 0);
    }

    #[test]
    fn test_edge_index_out_of_range() {
        let edges = [BspEdge { vertex_ids: [0, 1] }];
        match BspEdgeIndex::from_signed(-5).resolve(&edges) {
            Err(BspError::OutOfRange(_)) => (),
            x => panic!("expected out of range, got {:?}", x),
        }
    }

    #[test]
    fn test_edge_index_min_value() {
        let idx = BspEdgeIndex::from_signed(i32::MIN);
        assert_eq!(idx.index, 1usize << 31);
        assert_eq!(idx.direction, BspEdgeDirection::Backward);
    }
}
