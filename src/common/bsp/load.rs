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

use std::{
    collections::HashMap,
    io::{self, Read, Seek, SeekFrom, Write},
};

use crate::common::{
    bsp::{
        collision::{self, ClipGeometry},
        entity::{self, Entity},
        visual::{self, FaceGeometry, RenderModel},
        BspClipNode, BspEdge, BspEdgeIndex, BspError, BspFace, BspFaceSide, BspLeaf,
        BspLeafContents, BspModel, BspNodeChild, BspPlane, BspPlaneKind, BspRenderNode,
        BspTexInfo, BspTexInfoFlags, MAX_HULLS, MAX_LIGHTSTYLES, NUM_AMBIENTS,
    },
    collider::Collider,
    util,
    wad::texture::{MipTexture, MipTextureHeader},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use cgmath::Vector3;
use image::{ImageBuffer, RgbImage};
use num::FromPrimitive;

const VERSION: u32 = 30;

pub const LUMP_COUNT: usize = 15;

/// Size of the version number and lump table.
pub const HEADER_SIZE: usize = 4 + LUMP_COUNT * 8;

const PLANE_SIZE: usize = 20;
const RENDER_NODE_SIZE: usize = 24;
const LEAF_SIZE: usize = 28;
const TEXINFO_SIZE: usize = 40;
const FACE_SIZE: usize = 20;
const CLIP_NODE_SIZE: usize = 8;
const MARKSURFACE_SIZE: usize = 2;
const EDGE_SIZE: usize = 4;
const SURFEDGE_SIZE: usize = 4;
const MODEL_SIZE: usize = 64;
const VERTEX_SIZE: usize = 12;
const TEXTURE_HEADER_SIZE: u64 = 40;

// upper bound on up-front allocation for a lump of untrusted size
const MAX_PREALLOC: usize = 65536;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BspLumpId {
    Entities = 0,
    Planes = 1,
    Textures = 2,
    Vertices = 3,
    Visibility = 4,
    RenderNodes = 5,
    TextureInfo = 6,
    Faces = 7,
    Lighting = 8,
    ClipNodes = 9,
    Leaves = 10,
    MarkSurfaces = 11,
    Edges = 12,
    SurfEdges = 13,
    Models = 14,
}

impl BspLumpId {
    /// All lumps in file order.
    pub const ALL: [BspLumpId; LUMP_COUNT] = [
        BspLumpId::Entities,
        BspLumpId::Planes,
        BspLumpId::Textures,
        BspLumpId::Vertices,
        BspLumpId::Visibility,
        BspLumpId::RenderNodes,
        BspLumpId::TextureInfo,
        BspLumpId::Faces,
        BspLumpId::Lighting,
        BspLumpId::ClipNodes,
        BspLumpId::Leaves,
        BspLumpId::MarkSurfaces,
        BspLumpId::Edges,
        BspLumpId::SurfEdges,
        BspLumpId::Models,
    ];
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct BspLump {
    pub offset: i32,
    pub size: i32,
}

/// The lump table of a GoldSource BSP file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LumpDirectory {
    lumps: [BspLump; LUMP_COUNT],
}

impl LumpDirectory {
    pub fn new(lumps: [BspLump; LUMP_COUNT]) -> LumpDirectory {
        LumpDirectory { lumps }
    }

    /// Reads the version number and lump table at the current position.
    ///
    /// If the version is not 30, the reader is returned to where it started and `None` is
    /// returned, so that another decoder may try the same stream.
    pub fn read<R>(reader: &mut R) -> Result<Option<LumpDirectory>, BspError>
    where
        R: Read + Seek,
    {
        let start = reader.seek(SeekFrom::Current(0))?;
        let version = reader.read_u32::<LittleEndian>()?;
        if version != VERSION {
            debug!(
                "Not a GoldSource BSP: version {} ({})",
                version,
                super::BspVersion::label_of(version)
            );
            reader.seek(SeekFrom::Start(start))?;
            return Ok(None);
        }

        let mut lumps = [BspLump::default(); LUMP_COUNT];
        for (l, id) in BspLumpId::ALL.iter().enumerate() {
            let offset = reader.read_i32::<LittleEndian>()?;
            let size = reader.read_i32::<LittleEndian>()?;

            debug!(
                "{: <14} Offset = 0x{:>08x} | Size = 0x{:>08x}",
                format!("{:?}:", id),
                offset,
                size
            );

            lumps[l] = BspLump { offset, size };
        }

        Ok(Some(LumpDirectory { lumps }))
    }

    /// Like `read`, but an unrecognized version is an error.
    pub fn read_supported<R>(reader: &mut R) -> Result<LumpDirectory, BspError>
    where
        R: Read + Seek,
    {
        match LumpDirectory::read(reader)? {
            Some(dir) => Ok(dir),
            None => {
                let start = reader.seek(SeekFrom::Current(0))?;
                let version = reader.read_u32::<LittleEndian>()?;
                reader.seek(SeekFrom::Start(start))?;
                Err(BspError::unsupported_version(version))
            }
        }
    }

    pub fn lump(&self, id: BspLumpId) -> BspLump {
        self.lumps[id as usize]
    }

    pub fn lumps(&self) -> &[BspLump] {
        &self.lumps
    }

    /// Checks every lump against the length of the stream. A single bad lump rejects the table.
    pub fn validate(&self, stream_len: u64) -> Result<(), BspError> {
        for id in BspLumpId::ALL.iter() {
            let lump = self.lump(*id);
            if lump.offset < 0 || lump.size < 0 {
                return Err(BspError::out_of_range(format!(
                    "{:?} lump has negative offset ({}) or size ({})",
                    id, lump.offset, lump.size
                )));
            }

            let end = lump.offset as u64 + lump.size as u64;
            if end > stream_len {
                return Err(BspError::out_of_range(format!(
                    "{:?} lump ends at 0x{:x}, past the end of the file (0x{:x})",
                    id, end, stream_len
                )));
            }
        }

        Ok(())
    }

    pub fn write<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: Write,
    {
        writer.write_u32::<LittleEndian>(VERSION)?;
        for lump in self.lumps.iter() {
            writer.write_i32::<LittleEndian>(lump.offset)?;
            writer.write_i32::<LittleEndian>(lump.size)?;
        }
        Ok(())
    }
}

// remaining length of the lump window
fn lump_len<S>(seeker: &mut S, length: Option<usize>) -> Result<u64, BspError>
where
    S: Seek,
{
    match length {
        Some(len) => Ok(len as u64),
        None => {
            let pos = seeker.seek(SeekFrom::Current(0))?;
            let end = seeker.seek(SeekFrom::End(0))?;
            seeker.seek(SeekFrom::Start(pos))?;
            Ok(end.saturating_sub(pos))
        }
    }
}

fn read_records<R, T, F>(
    reader: &mut R,
    length: Option<usize>,
    stride: usize,
    what: &str,
    mut load_record: F,
) -> Result<Vec<T>, BspError>
where
    R: Read + Seek,
    F: FnMut(&mut R) -> Result<T, BspError>,
{
    let len = lump_len(reader, length)?;
    if len % stride as u64 != 0 {
        warn!(
            "{} lump size {} is not a multiple of {}, ignoring {} trailing bytes",
            what,
            len,
            stride,
            len % stride as u64
        );
    }

    let count = (len / stride as u64) as usize;
    debug!("{} count = {}", what, count);

    let mut records = Vec::with_capacity(count.min(MAX_PREALLOC));
    for _ in 0..count {
        records.push(load_record(reader)?);
    }

    Ok(records)
}

fn read_exact_len<R>(reader: &mut R, len: u64, what: &str) -> Result<Vec<u8>, BspError>
where
    R: Read,
{
    let mut data = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut data)?;
    if (data.len() as u64) < len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("{} lump truncated ({} of {} bytes)", what, data.len(), len),
        )
        .into());
    }

    Ok(data)
}

fn load_vector3<R>(reader: &mut R) -> Result<Vector3<f32>, BspError>
where
    R: ReadBytesExt,
{
    Ok(Vector3::new(
        reader.read_f32::<LittleEndian>()?,
        reader.read_f32::<LittleEndian>()?,
        reader.read_f32::<LittleEndian>()?,
    ))
}

fn load_i16x3<R>(reader: &mut R) -> Result<[i16; 3], BspError>
where
    R: ReadBytesExt,
{
    Ok([
        reader.read_i16::<LittleEndian>()?,
        reader.read_i16::<LittleEndian>()?,
        reader.read_i16::<LittleEndian>()?,
    ])
}

fn load_plane<R>(reader: &mut R) -> Result<BspPlane, BspError>
where
    R: ReadBytesExt,
{
    let normal = load_vector3(reader)?;
    let dist = reader.read_f32::<LittleEndian>()?;

    let kind = match BspPlaneKind::from_i32(reader.read_i32::<LittleEndian>()?) {
        Some(k) => k,
        None => return Err(BspError::malformed("invalid plane type")),
    };

    Ok(BspPlane { normal, dist, kind })
}

fn load_render_node<R>(reader: &mut R) -> Result<BspRenderNode, BspError>
where
    R: ReadBytesExt,
{
    let plane_id = reader.read_u32::<LittleEndian>()? as usize;

    // If the child ID is positive, it points to another internal node. If it is negative, its
    // bitwise negation points to a leaf node.
    let front = BspNodeChild::from_i16(reader.read_i16::<LittleEndian>()?);
    let back = BspNodeChild::from_i16(reader.read_i16::<LittleEndian>()?);

    let min = load_i16x3(reader)?;
    let max = load_i16x3(reader)?;

    let face_id = reader.read_u16::<LittleEndian>()? as usize;
    let face_count = reader.read_u16::<LittleEndian>()? as usize;

    Ok(BspRenderNode {
        plane_id,
        children: [front, back],
        min,
        max,
        face_id,
        face_count,
    })
}

fn load_texinfo<R>(reader: &mut R) -> Result<BspTexInfo, BspError>
where
    R: ReadBytesExt,
{
    let s_vector = load_vector3(reader)?;
    let s_offset = reader.read_f32::<LittleEndian>()?;
    let t_vector = load_vector3(reader)?;
    let t_offset = reader.read_f32::<LittleEndian>()?;
    let tex_id = reader.read_u32::<LittleEndian>()? as usize;
    let flags = BspTexInfoFlags::from_bits_truncate(reader.read_u32::<LittleEndian>()?);

    Ok(BspTexInfo {
        s_vector,
        s_offset,
        t_vector,
        t_offset,
        tex_id,
        flags,
    })
}

fn load_face<R>(reader: &mut R) -> Result<BspFace, BspError>
where
    R: ReadBytesExt,
{
    let plane_id = reader.read_u16::<LittleEndian>()? as usize;

    let side = match reader.read_u16::<LittleEndian>()? {
        0 => BspFaceSide::Front,
        _ => BspFaceSide::Back,
    };

    let edge_id = reader.read_u32::<LittleEndian>()? as usize;
    let edge_count = reader.read_u16::<LittleEndian>()? as usize;
    let texinfo_id = reader.read_u16::<LittleEndian>()? as usize;

    let mut light_styles = [0; MAX_LIGHTSTYLES];
    reader.read_exact(&mut light_styles)?;

    let lightmap_offset = BspFace::lightmap_offset_from_u32(reader.read_u32::<LittleEndian>()?);

    Ok(BspFace {
        plane_id,
        side,
        edge_id,
        edge_count,
        texinfo_id,
        light_styles,
        lightmap_offset,
    })
}

fn load_clip_node<R>(reader: &mut R) -> Result<BspClipNode, BspError>
where
    R: ReadBytesExt,
{
    let plane_id = reader.read_i32::<LittleEndian>()?;
    let front = BspNodeChild::from_i16(reader.read_i16::<LittleEndian>()?);
    let back = BspNodeChild::from_i16(reader.read_i16::<LittleEndian>()?);

    Ok(BspClipNode {
        plane_id,
        children: [front, back],
    })
}

fn load_leaf<R>(reader: &mut R) -> Result<BspLeaf, BspError>
where
    R: ReadBytesExt,
{
    let contents_id = reader.read_i32::<LittleEndian>()?;
    let contents = match BspLeafContents::from_i32(contents_id) {
        Some(c) => c,
        None => {
            return Err(BspError::malformed(format!(
                "invalid leaf contents ({})",
                contents_id
            )))
        }
    };

    let vis_offset = match reader.read_i32::<LittleEndian>()? {
        x if x < -1 => return Err(BspError::malformed("invalid visibility data offset")),
        -1 => None,
        x => Some(x as usize),
    };

    let min = load_i16x3(reader)?;
    let max = load_i16x3(reader)?;

    let marksurface_id = reader.read_u16::<LittleEndian>()? as usize;
    let marksurface_count = reader.read_u16::<LittleEndian>()? as usize;

    let mut ambient_levels = [0u8; NUM_AMBIENTS];
    reader.read_exact(&mut ambient_levels)?;

    Ok(BspLeaf {
        contents,
        vis_offset,
        min,
        max,
        marksurface_id,
        marksurface_count,
        ambient_levels,
    })
}

fn load_edge<R>(reader: &mut R) -> Result<BspEdge, BspError>
where
    R: ReadBytesExt,
{
    Ok(BspEdge {
        vertex_ids: [
            reader.read_u16::<LittleEndian>()?,
            reader.read_u16::<LittleEndian>()?,
        ],
    })
}

fn load_model<R>(reader: &mut R) -> Result<BspModel, BspError>
where
    R: ReadBytesExt,
{
    let min = load_vector3(reader)?;
    let max = load_vector3(reader)?;
    let origin = load_vector3(reader)?;

    let mut head_nodes = [0i32; MAX_HULLS];
    for h in 0..MAX_HULLS {
        head_nodes[h] = reader.read_i32::<LittleEndian>()?;
    }

    let vis_leaf_count = reader.read_i32::<LittleEndian>()?;

    let face_id = reader.read_i32::<LittleEndian>()?;
    let face_count = reader.read_i32::<LittleEndian>()?;
    if face_id < 0 || face_count < 0 {
        return Err(BspError::malformed(format!(
            "invalid model face range ({}, {})",
            face_id, face_count
        )));
    }

    Ok(BspModel {
        min,
        max,
        origin,
        head_nodes,
        vis_leaf_count,
        face_id: face_id as usize,
        face_count: face_count as usize,
    })
}

pub fn read_planes<R>(reader: &mut R, length: Option<usize>) -> Result<Vec<BspPlane>, BspError>
where
    R: Read + Seek,
{
    read_records(reader, length, PLANE_SIZE, "Plane", load_plane)
}

pub fn read_vertices<R>(
    reader: &mut R,
    length: Option<usize>,
) -> Result<Vec<Vector3<f32>>, BspError>
where
    R: Read + Seek,
{
    read_records(reader, length, VERTEX_SIZE, "Vertex", load_vector3)
}

pub fn read_render_nodes<R>(
    reader: &mut R,
    length: Option<usize>,
) -> Result<Vec<BspRenderNode>, BspError>
where
    R: Read + Seek,
{
    read_records(reader, length, RENDER_NODE_SIZE, "Render node", load_render_node)
}

pub fn read_texinfo<R>(reader: &mut R, length: Option<usize>) -> Result<Vec<BspTexInfo>, BspError>
where
    R: Read + Seek,
{
    read_records(reader, length, TEXINFO_SIZE, "Texinfo", load_texinfo)
}

pub fn read_faces<R>(reader: &mut R, length: Option<usize>) -> Result<Vec<BspFace>, BspError>
where
    R: Read + Seek,
{
    read_records(reader, length, FACE_SIZE, "Face", load_face)
}

pub fn read_clip_nodes<R>(
    reader: &mut R,
    length: Option<usize>,
) -> Result<Vec<BspClipNode>, BspError>
where
    R: Read + Seek,
{
    read_records(reader, length, CLIP_NODE_SIZE, "Clip node", load_clip_node)
}

pub fn read_leaves<R>(reader: &mut R, length: Option<usize>) -> Result<Vec<BspLeaf>, BspError>
where
    R: Read + Seek,
{
    read_records(reader, length, LEAF_SIZE, "Leaf", load_leaf)
}

pub fn read_marksurfaces<R>(
    reader: &mut R,
    length: Option<usize>,
) -> Result<Vec<BspEdgeIndex>, BspError>
where
    R: Read + Seek,
{
    read_records(reader, length, MARKSURFACE_SIZE, "Mark surface", |r| {
        Ok(BspEdgeIndex::from_signed(r.read_i16::<LittleEndian>()? as i32))
    })
}

pub fn read_edges<R>(reader: &mut R, length: Option<usize>) -> Result<Vec<BspEdge>, BspError>
where
    R: Read + Seek,
{
    read_records(reader, length, EDGE_SIZE, "Edge", load_edge)
}

pub fn read_surfedges<R>(
    reader: &mut R,
    length: Option<usize>,
) -> Result<Vec<BspEdgeIndex>, BspError>
where
    R: Read + Seek,
{
    read_records(reader, length, SURFEDGE_SIZE, "Surface edge", |r| {
        Ok(BspEdgeIndex::from_signed(r.read_i32::<LittleEndian>()?))
    })
}

pub fn read_models<R>(reader: &mut R, length: Option<usize>) -> Result<Vec<BspModel>, BspError>
where
    R: Read + Seek,
{
    read_records(reader, length, MODEL_SIZE, "Model", load_model)
}

/// Reads the entity lump text, up to its terminating zero byte, and parses it.
pub fn read_entities<R>(reader: &mut R, length: Option<usize>) -> Result<Vec<Entity>, BspError>
where
    R: Read + Seek,
{
    let len = lump_len(reader, length)?;
    let data = read_exact_len(reader, len, "Entity")?;
    let text = util::read_cstring(&mut data.as_slice())?;
    Ok(entity::parse_entities(&text))
}

/// Reads a lump as raw bytes. Used for the lighting and visibility lumps.
pub fn read_raw<R>(reader: &mut R, length: Option<usize>) -> Result<Vec<u8>, BspError>
where
    R: Read + Seek,
{
    let len = lump_len(reader, length)?;
    read_exact_len(reader, len, "Raw")
}

/// Cuts a `width` by `height` RGB lightmap out of the lighting lump.
pub fn lightmap_image(
    lighting: &[u8],
    offset: usize,
    width: u32,
    height: u32,
) -> Result<RgbImage, BspError> {
    let size = width as usize * height as usize * 3;
    let data = match lighting.get(offset..offset.saturating_add(size)) {
        Some(d) => d.to_vec(),
        None => {
            return Err(BspError::out_of_range(format!(
                "lightmap at {} ({}x{}) exceeds lighting size {}",
                offset,
                width,
                height,
                lighting.len()
            )))
        }
    };

    ImageBuffer::from_raw(width, height, data)
        .ok_or_else(|| BspError::malformed("lightmap buffer size mismatch"))
}

/// The contents of a texture lump.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BspTextureLump {
    /// Headers of all textures in lump order. Texture info records index this list.
    pub textures: Vec<MipTextureHeader>,

    /// Decoded textures whose pixel data is stored in the map.
    pub packed: Vec<MipTexture>,
}

impl BspTextureLump {
    pub fn names(&self) -> Vec<&str> {
        self.textures.iter().map(|t| t.name.as_str()).collect()
    }

    /// Maps texture names to dimensions. Later textures replace earlier ones with the same name.
    pub fn dimensions(&self) -> HashMap<String, (u32, u32)> {
        self.textures
            .iter()
            .map(|t| (t.name.clone(), t.dimensions()))
            .collect()
    }
}

/// Reads a texture lump. Pixel data is only decoded if `unpack` is set.
///
/// A texture offset of -1 produces an empty placeholder header.
pub fn read_texture_lump<R>(
    reader: &mut R,
    length: Option<usize>,
    unpack: bool,
) -> Result<BspTextureLump, BspError>
where
    R: Read + Seek,
{
    let start = reader.seek(SeekFrom::Current(0))?;
    let len = lump_len(reader, length)?;
    let mut lump = BspTextureLump::default();
    if len == 0 {
        return Ok(lump);
    }

    if len < 4 {
        return Err(BspError::out_of_range("texture lump too small for its count"));
    }

    let count = reader.read_u32::<LittleEndian>()? as u64;
    if 4 + count * 4 > len {
        return Err(BspError::out_of_range(format!(
            "{} texture offsets do not fit in a texture lump of {} bytes",
            count, len
        )));
    }

    let mut offsets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        offsets.push(reader.read_i32::<LittleEndian>()?);
    }

    for (t, &ofs) in offsets.iter().enumerate() {
        if ofs == -1 {
            debug!("Texture {}: missing", t);
            lump.textures.push(MipTextureHeader {
                name: String::new(),
                width: 0,
                height: 0,
                offsets: [0; 4],
            });
            continue;
        }

        if ofs < 0 || ofs as u64 + TEXTURE_HEADER_SIZE > len {
            return Err(BspError::out_of_range(format!(
                "texture {} at offset {} lies outside the texture lump",
                t, ofs
            )));
        }

        reader.seek(SeekFrom::Start(start + ofs as u64))?;
        let header = MipTextureHeader::read(reader)?;
        debug!(
            "Texture {}: {} {}x{}{}",
            t,
            header.name,
            header.width,
            header.height,
            if header.is_packed() { " (packed)" } else { "" }
        );

        if unpack && header.is_packed() {
            reader.seek(SeekFrom::Start(start + ofs as u64))?;
            let record_len = (len - ofs as u64) as usize;
            lump.packed.push(MipTexture::read(reader, Some(record_len))?);
        }

        lump.textures.push(header);
    }

    reader.seek(SeekFrom::Start(start + len))?;
    Ok(lump)
}

/// Lists the texture names of a texture lump without decoding pixel data.
pub fn read_texture_names<R>(reader: &mut R, length: Option<usize>) -> Result<Vec<String>, BspError>
where
    R: Read + Seek,
{
    Ok(read_texture_lump(reader, length, false)?
        .textures
        .into_iter()
        .map(|t| t.name)
        .collect())
}

fn read_lump<R, T, F>(
    reader: &mut R,
    base: u64,
    dir: &LumpDirectory,
    id: BspLumpId,
    decode: F,
) -> Result<T, BspError>
where
    R: Read + Seek,
    F: FnOnce(&mut R, Option<usize>) -> Result<T, BspError>,
{
    let lump = dir.lump(id);
    reader.seek(SeekFrom::Start(base + lump.offset as u64))?;
    decode(reader, Some(lump.size as usize))
}

// header and validated lump table, plus the stream position everything is relative to
fn open<R>(reader: &mut R) -> Result<(u64, LumpDirectory), BspError>
where
    R: Read + Seek,
{
    let base = reader.seek(SeekFrom::Current(0))?;
    let len = reader.seek(SeekFrom::End(0))?.saturating_sub(base);
    reader.seek(SeekFrom::Start(base))?;

    let dir = LumpDirectory::read_supported(reader)?;
    dir.validate(len)?;
    Ok((base, dir))
}

/// Cuts a map into its 15 lumps, in file order.
pub fn split_lumps<R>(reader: &mut R) -> Result<Vec<Vec<u8>>, BspError>
where
    R: Read + Seek,
{
    let (base, dir) = open(reader)?;
    BspLumpId::ALL
        .iter()
        .map(|&id| read_lump(reader, base, &dir, id, read_raw))
        .collect()
}

/// Builds a map from 15 lumps given in file order. The lumps are stored back to back after the
/// header.
pub fn assemble_lumps<B>(lumps: &[B]) -> Result<Vec<u8>, BspError>
where
    B: AsRef<[u8]>,
{
    if lumps.len() != LUMP_COUNT {
        return Err(BspError::malformed(format!(
            "need {} lumps to build a map, got {}",
            LUMP_COUNT,
            lumps.len()
        )));
    }

    let mut table = [BspLump::default(); LUMP_COUNT];
    let mut offset = HEADER_SIZE as u64;
    for (l, lump) in lumps.iter().enumerate() {
        let size = lump.as_ref().len() as u64;
        if offset + size > i32::MAX as u64 {
            return Err(BspError::out_of_range("map exceeds 2 GiB"));
        }

        table[l] = BspLump {
            offset: offset as i32,
            size: size as i32,
        };
        offset += size;
    }

    let mut data = Vec::with_capacity(offset as usize);
    LumpDirectory::new(table).write(&mut data)?;
    for lump in lumps.iter() {
        data.extend_from_slice(lump.as_ref());
    }

    Ok(data)
}

bitflags! {
    /// Selects which parts of a map `load` decodes.
    pub struct LoadFlags: u32 {
        const ENTITIES = 0x1;
        const VISUALS = 0x2;
        const COLLIDERS = 0x4;
        const PACKED_TEXTURES = 0x8;
    }
}

/// Everything decoded from one map.
#[derive(Debug, Default)]
pub struct LoadedMap {
    pub entities: Vec<Entity>,
    pub models: Vec<RenderModel>,
    pub colliders: Vec<Collider>,

    /// Headers of the textures the map uses, in lump order.
    pub textures: Vec<MipTextureHeader>,

    /// Textures whose pixel data is stored in the map.
    pub packed_textures: Vec<MipTexture>,
}

impl LoadedMap {
    /// Appends the contents of `other` to this map.
    pub fn merge(&mut self, other: LoadedMap) {
        self.entities.extend(other.entities);
        self.models.extend(other.models);
        self.colliders.extend(other.colliders);
        self.textures.extend(other.textures);
        self.packed_textures.extend(other.packed_textures);
    }

    pub fn texture_names(&self) -> Vec<&str> {
        self.textures.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Loads a GoldSource BSP file starting at the current position of `reader`.
///
/// Only the parts selected by `flags` are decoded. Nothing is returned unless every selected
/// part decodes successfully.
pub fn load<R>(reader: &mut R, flags: LoadFlags) -> Result<LoadedMap, BspError>
where
    R: Read + Seek,
{
    let (base, dir) = open(reader)?;
    let mut map = LoadedMap::default();

    if flags.contains(LoadFlags::ENTITIES) {
        map.entities = read_lump(reader, base, &dir, BspLumpId::Entities, read_entities)?;
    }

    if flags.intersects(LoadFlags::VISUALS | LoadFlags::PACKED_TEXTURES) {
        let unpack = flags.contains(LoadFlags::PACKED_TEXTURES);
        let lump = read_lump(reader, base, &dir, BspLumpId::Textures, |r, len| {
            read_texture_lump(r, len, unpack)
        })?;
        map.textures = lump.textures;
        map.packed_textures = lump.packed;
    }

    if !flags.intersects(LoadFlags::VISUALS | LoadFlags::COLLIDERS) {
        return Ok(map);
    }

    let vertices = read_lump(reader, base, &dir, BspLumpId::Vertices, read_vertices)?;
    let edges = read_lump(reader, base, &dir, BspLumpId::Edges, read_edges)?;

    if flags.contains(LoadFlags::VISUALS) {
        let surfedges = read_lump(reader, base, &dir, BspLumpId::SurfEdges, read_surfedges)?;
        let faces = read_lump(reader, base, &dir, BspLumpId::Faces, read_faces)?;
        let texinfo = read_lump(reader, base, &dir, BspLumpId::TextureInfo, read_texinfo)?;
        let models = read_lump(reader, base, &dir, BspLumpId::Models, read_models)?;

        map.models = visual::build_models(&FaceGeometry {
            vertices: &vertices,
            edges: &edges,
            surfedges: &surfedges,
            faces: &faces,
            texinfo: &texinfo,
            textures: &map.textures,
            models: &models,
        })?;
    }

    if flags.contains(LoadFlags::COLLIDERS) {
        let marksurfaces =
            read_lump(reader, base, &dir, BspLumpId::MarkSurfaces, read_marksurfaces)?;
        let leaves = read_lump(reader, base, &dir, BspLumpId::Leaves, read_leaves)?;
        let clip_nodes = read_lump(reader, base, &dir, BspLumpId::ClipNodes, read_clip_nodes)?;

        let collider = collision::build_collider(&ClipGeometry {
            vertices: &vertices,
            edges: &edges,
            marksurfaces: &marksurfaces,
            leaves: &leaves,
            clip_nodes: &clip_nodes,
        })?;
        map.colliders.push(Collider::Mesh(collider));
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use image::Rgb;

    use crate::common::wad::{texture::IndexedImage, WadError};

    fn write_vector3(buf: &mut Vec<u8>, x: f32, y: f32, z: f32) {
        buf.write_f32::<LittleEndian>(x).unwrap();
        buf.write_f32::<LittleEndian>(y).unwrap();
        buf.write_f32::<LittleEndian>(z).unwrap();
    }

    fn vertices_lump() -> Vec<u8> {
        let mut buf = Vec::new();
        write_vector3(&mut buf, 0.0, 0.0, 0.0);
        write_vector3(&mut buf, 1.0, 0.0, 0.0);
        write_vector3(&mut buf, 1.0, 1.0, 0.0);
        write_vector3(&mut buf, 0.0, 1.0, 0.0);
        buf
    }

    fn edges_lump() -> Vec<u8> {
        let mut buf = Vec::new();
        for &(a, b) in [(0, 0), (0, 1), (1, 2), (2, 3), (3, 0)].iter() {
            buf.write_u16::<LittleEndian>(a).unwrap();
            buf.write_u16::<LittleEndian>(b).unwrap();
        }
        buf
    }

    fn face_record(buf: &mut Vec<u8>, edge_id: u32, edge_count: u16, side: u16, lightmap: u32) {
        buf.write_u16::<LittleEndian>(0).unwrap();
        buf.write_u16::<LittleEndian>(side).unwrap();
        buf.write_u32::<LittleEndian>(edge_id).unwrap();
        buf.write_u16::<LittleEndian>(edge_count).unwrap();
        buf.write_u16::<LittleEndian>(0).unwrap();
        buf.extend_from_slice(&[0, 1, 255, 255]);
        buf.write_u32::<LittleEndian>(lightmap).unwrap();
    }

    fn texinfo_record(buf: &mut Vec<u8>, flags: u32) {
        write_vector3(buf, 1.0, 0.0, 0.0);
        buf.write_f32::<LittleEndian>(0.0).unwrap();
        write_vector3(buf, 0.0, 1.0, 0.0);
        buf.write_f32::<LittleEndian>(0.0).unwrap();
        buf.write_u32::<LittleEndian>(0).unwrap();
        buf.write_u32::<LittleEndian>(flags).unwrap();
    }

    fn leaf_record(buf: &mut Vec<u8>, contents: i32, marksurface_id: u16, count: u16) {
        buf.write_i32::<LittleEndian>(contents).unwrap();
        buf.write_i32::<LittleEndian>(-1).unwrap();
        for &v in [-8i16, -8, -8, 8, 8, 8].iter() {
            buf.write_i16::<LittleEndian>(v).unwrap();
        }
        buf.write_u16::<LittleEndian>(marksurface_id).unwrap();
        buf.write_u16::<LittleEndian>(count).unwrap();
        buf.extend_from_slice(&[1, 2, 3, 4]);
    }

    fn model_record(buf: &mut Vec<u8>, face_id: i32, face_count: i32) {
        write_vector3(buf, -1.0, -1.0, -1.0);
        write_vector3(buf, 1.0, 1.0, 1.0);
        write_vector3(buf, 0.0, 0.0, 0.0);
        for h in 0..MAX_HULLS {
            buf.write_i32::<LittleEndian>(h as i32).unwrap();
        }
        buf.write_i32::<LittleEndian>(1).unwrap();
        buf.write_i32::<LittleEndian>(face_id).unwrap();
        buf.write_i32::<LittleEndian>(face_count).unwrap();
    }

    fn brick_texture() -> MipTexture {
        let indices = (0..16 * 16).map(|i| (i % 2) as u8).collect();
        let palette = vec![
            image::Rgba([128, 32, 32, 255]),
            image::Rgba([96, 96, 96, 255]),
        ];
        MipTexture::new("brick", IndexedImage::new(16, 16, indices, palette).unwrap()).unwrap()
    }

    fn external_header(buf: &mut Vec<u8>, name: &str, width: u32, height: u32) {
        util::write_name(buf, name, 16).unwrap();
        buf.write_u32::<LittleEndian>(width).unwrap();
        buf.write_u32::<LittleEndian>(height).unwrap();
        for _ in 0..4 {
            buf.write_u32::<LittleEndian>(0).unwrap();
        }
    }

    // packed brick, a missing slot, and an external sky
    fn texture_lump() -> Vec<u8> {
        let mut record = Vec::new();
        brick_texture().write(&mut record).unwrap();

        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(3).unwrap();
        buf.write_i32::<LittleEndian>(16).unwrap();
        buf.write_i32::<LittleEndian>(-1).unwrap();
        buf.write_i32::<LittleEndian>(16 + record.len() as i32).unwrap();
        buf.extend_from_slice(&record);
        external_header(&mut buf, "sky", 64, 32);
        buf
    }

    // a single unit square, textured with brick and enclosed by one solid leaf
    fn square_map_lumps() -> Vec<Vec<u8>> {
        let mut lumps = vec![Vec::new(); LUMP_COUNT];

        lumps[BspLumpId::Entities as usize] =
            b"{\n\"classname\" \"worldspawn\"\n\"wad\" \"halflife.wad\"\n}\n\0".to_vec();

        let mut planes = Vec::new();
        write_vector3(&mut planes, 0.0, 0.0, 1.0);
        planes.write_f32::<LittleEndian>(0.0).unwrap();
        planes.write_i32::<LittleEndian>(2).unwrap();
        lumps[BspLumpId::Planes as usize] = planes;

        let mut record = Vec::new();
        brick_texture().write(&mut record).unwrap();
        let mut textures = Vec::new();
        textures.write_u32::<LittleEndian>(1).unwrap();
        textures.write_i32::<LittleEndian>(8).unwrap();
        textures.extend_from_slice(&record);
        lumps[BspLumpId::Textures as usize] = textures;

        lumps[BspLumpId::Vertices as usize] = vertices_lump();

        let mut texinfo = Vec::new();
        texinfo_record(&mut texinfo, 0);
        lumps[BspLumpId::TextureInfo as usize] = texinfo;

        let mut faces = Vec::new();
        face_record(&mut faces, 0, 4, 0, 0xFFFF_FFFF);
        lumps[BspLumpId::Faces as usize] = faces;

        lumps[BspLumpId::Lighting as usize] = vec![200; 12];

        let mut clip_nodes = Vec::new();
        clip_nodes.write_i32::<LittleEndian>(0).unwrap();
        clip_nodes.write_i16::<LittleEndian>(-1).unwrap();
        clip_nodes.write_i16::<LittleEndian>(-1).unwrap();
        lumps[BspLumpId::ClipNodes as usize] = clip_nodes;

        let mut leaves = Vec::new();
        leaf_record(&mut leaves, -2, 0, 4);
        lumps[BspLumpId::Leaves as usize] = leaves;

        let mut marksurfaces = Vec::new();
        for &m in [1i16, 2, 3, 4].iter() {
            marksurfaces.write_i16::<LittleEndian>(m).unwrap();
        }
        lumps[BspLumpId::MarkSurfaces as usize] = marksurfaces;

        lumps[BspLumpId::Edges as usize] = edges_lump();

        let mut surfedges = Vec::new();
        for &s in [1i32, 2, 3, 4].iter() {
            surfedges.write_i32::<LittleEndian>(s).unwrap();
        }
        lumps[BspLumpId::SurfEdges as usize] = surfedges;

        let mut models = Vec::new();
        model_record(&mut models, 0, 1);
        lumps[BspLumpId::Models as usize] = models;

        lumps
    }

    #[test]
    fn test_directory_round_trip() {
        let mut table = [BspLump::default(); LUMP_COUNT];
        for (l, lump) in table.iter_mut().enumerate() {
            *lump = BspLump {
                offset: 124 + l as i32 * 4,
                size: 4,
            };
        }
        let dir = LumpDirectory::new(table);

        let mut data = Vec::new();
        dir.write(&mut data).unwrap();
        assert_eq!(data.len(), HEADER_SIZE);

        let read = LumpDirectory::read(&mut Cursor::new(data)).unwrap().unwrap();
        assert_eq!(read, dir);
        assert_eq!(read.lump(BspLumpId::Models).offset, 124 + 14 * 4);
    }

    #[test]
    fn test_directory_other_version_rewinds() {
        let mut data = vec![0xAA; 3];
        data.write_u32::<LittleEndian>(29).unwrap();
        data.extend_from_slice(&[0; 120]);

        let mut reader = Cursor::new(data);
        reader.set_position(3);
        assert!(LumpDirectory::read(&mut reader).unwrap().is_none());
        assert_eq!(reader.position(), 3);

        match LumpDirectory::read_supported(&mut reader) {
            Err(BspError::UnsupportedVersion { version, label }) => {
                assert_eq!(version, 29);
                assert_eq!(label, "Quake 1");
            }
            x => panic!("expected unsupported version, got {:?}", x),
        }
        assert_eq!(reader.position(), 3);
    }

    #[test]
    fn test_unknown_version_label() {
        let mut data = Vec::new();
        data.write_u32::<LittleEndian>(0x1234).unwrap();
        match LumpDirectory::read_supported(&mut Cursor::new(data)) {
            Err(BspError::UnsupportedVersion { version, label }) => {
                assert_eq!(version, 0x1234);
                assert_eq!(label, "unknown");
            }
            x => panic!("expected unsupported version, got {:?}", x),
        }
    }

    #[test]
    fn test_validate() {
        let mut table = [BspLump::default(); LUMP_COUNT];
        table[BspLumpId::Vertices as usize] = BspLump {
            offset: 124,
            size: 12,
        };
        let dir = LumpDirectory::new(table);
        assert!(dir.validate(136).is_ok());

        match dir.validate(135) {
            Err(BspError::OutOfRange(_)) => (),
            x => panic!("expected out of range, got {:?}", x),
        }

        table[BspLumpId::Models as usize] = BspLump {
            offset: -4,
            size: 0,
        };
        match LumpDirectory::new(table).validate(1000) {
            Err(BspError::OutOfRange(_)) => (),
            x => panic!("expected out of range, got {:?}", x),
        }
    }

    #[test]
    fn test_single_vertex_lump() {
        let mut table = [BspLump::default(); LUMP_COUNT];
        table[BspLumpId::Vertices as usize] = BspLump {
            offset: 20,
            size: 12,
        };
        let mut header = Vec::new();
        LumpDirectory::new(table).write(&mut header).unwrap();

        let dir = LumpDirectory::read_supported(&mut Cursor::new(header)).unwrap();
        let lump = dir.lump(BspLumpId::Vertices);
        assert_eq!(lump, BspLump { offset: 20, size: 12 });

        let mut data = vec![0; 20];
        write_vector3(&mut data, 1.0, 2.0, 3.0);
        let mut reader = Cursor::new(data);
        reader.set_position(lump.offset as u64);
        let vertices = read_vertices(&mut reader, Some(lump.size as usize)).unwrap();
        assert_eq!(vertices, vec![Vector3::new(1.0, 2.0, 3.0)]);
    }

    #[test]
    fn test_vertex_lump_after_header() {
        let mut lumps = vec![Vec::new(); LUMP_COUNT];
        let mut vertex = Vec::new();
        write_vector3(&mut vertex, 1.0, 2.0, 3.0);
        lumps[BspLumpId::Vertices as usize] = vertex;

        let data = assemble_lumps(&lumps).unwrap();
        let mut reader = Cursor::new(data);
        let (base, dir) = open(&mut reader).unwrap();
        let vertices =
            read_lump(&mut reader, base, &dir, BspLumpId::Vertices, read_vertices).unwrap();
        assert_eq!(vertices, vec![Vector3::new(1.0, 2.0, 3.0)]);
    }

    #[test]
    fn test_read_edges_and_surfedges() {
        let edges = read_edges(&mut Cursor::new(edges_lump()), None).unwrap();
        assert_eq!(edges.len(), 5);
        assert_eq!(edges[2].vertex_ids, [1, 2]);

        let mut data = Vec::new();
        data.write_i32::<LittleEndian>(3).unwrap();
        data.write_i32::<LittleEndian>(-2).unwrap();
        let surfedges = read_surfedges(&mut Cursor::new(data), None).unwrap();
        assert_eq!(surfedges[0].resolve(&edges).unwrap(), 2);
        assert_eq!(surfedges[1].resolve(&edges).unwrap(), 2);
        assert_eq!(surfedges[1].index, 2);
    }

    #[test]
    fn test_read_marksurfaces() {
        let mut data = Vec::new();
        data.write_i16::<LittleEndian>(-1).unwrap();
        data.write_i16::<LittleEndian>(4).unwrap();
        let marksurfaces = read_marksurfaces(&mut Cursor::new(data), None).unwrap();
        assert_eq!(
            marksurfaces,
            vec![BspEdgeIndex::from_signed(-1), BspEdgeIndex::from_signed(4)]
        );
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let mut data = edges_lump();
        data.truncate(6);
        let edges = read_edges(&mut Cursor::new(data), None).unwrap();
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn test_truncated_lump() {
        let mut data = Vec::new();
        write_vector3(&mut data, 1.0, 2.0, 3.0);
        match read_vertices(&mut Cursor::new(data), Some(24)) {
            Err(BspError::Io(_)) => (),
            x => panic!("expected I/O error, got {:?}", x),
        }
    }

    #[test]
    fn test_read_faces() {
        let mut data = Vec::new();
        face_record(&mut data, 7, 5, 1, 0x30);
        face_record(&mut data, 0, 3, 0, 0xFFFF_FFFF);
        let faces = read_faces(&mut Cursor::new(data), None).unwrap();

        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].edge_id, 7);
        assert_eq!(faces[0].edge_count, 5);
        assert_eq!(faces[0].side, BspFaceSide::Back);
        assert_eq!(faces[0].light_styles, [0, 1, 255, 255]);
        assert_eq!(faces[0].lightmap_offset, Some(0x30));
        assert_eq!(faces[1].side, BspFaceSide::Front);
        assert_eq!(faces[1].lightmap_offset, None);
    }

    #[test]
    fn test_read_texinfo() {
        let mut data = Vec::new();
        texinfo_record(&mut data, 1);
        let texinfo = read_texinfo(&mut Cursor::new(data), None).unwrap();
        assert_eq!(texinfo[0].s_vector, Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(texinfo[0].t_vector, Vector3::new(0.0, 1.0, 0.0));
        assert_eq!(texinfo[0].tex_id, 0);
        assert!(texinfo[0].flags.contains(BspTexInfoFlags::SPECIAL));
    }

    #[test]
    fn test_read_planes_and_nodes() {
        let mut data = Vec::new();
        write_vector3(&mut data, 0.0, 0.0, 1.0);
        data.write_f32::<LittleEndian>(64.0).unwrap();
        data.write_i32::<LittleEndian>(2).unwrap();
        let planes = read_planes(&mut Cursor::new(data.clone()), None).unwrap();
        assert_eq!(planes[0].kind, BspPlaneKind::Z);
        assert_eq!(planes[0].dist, 64.0);

        let len = data.len();
        data[len - 4] = 9;
        match read_planes(&mut Cursor::new(data), None) {
            Err(BspError::Malformed(_)) => (),
            x => panic!("expected malformed, got {:?}", x),
        }

        let mut data = Vec::new();
        data.write_u32::<LittleEndian>(3).unwrap();
        data.write_i16::<LittleEndian>(1).unwrap();
        data.write_i16::<LittleEndian>(-5).unwrap();
        for &v in [-16i16, -16, -16, 16, 16, 16].iter() {
            data.write_i16::<LittleEndian>(v).unwrap();
        }
        data.write_u16::<LittleEndian>(10).unwrap();
        data.write_u16::<LittleEndian>(2).unwrap();
        let nodes = read_render_nodes(&mut Cursor::new(data), None).unwrap();
        assert_eq!(nodes[0].plane_id, 3);
        assert_eq!(
            nodes[0].children,
            [BspNodeChild::Node(1), BspNodeChild::Leaf(4)]
        );
        assert_eq!(nodes[0].max, [16, 16, 16]);
        assert_eq!((nodes[0].face_id, nodes[0].face_count), (10, 2));
    }

    #[test]
    fn test_read_clip_nodes() {
        let mut data = Vec::new();
        data.write_i32::<LittleEndian>(5).unwrap();
        data.write_i16::<LittleEndian>(-1).unwrap();
        data.write_i16::<LittleEndian>(2).unwrap();
        let nodes = read_clip_nodes(&mut Cursor::new(data), None).unwrap();
        assert_eq!(nodes[0].plane_id, 5);
        assert_eq!(
            nodes[0].children,
            [BspNodeChild::Leaf(0), BspNodeChild::Node(2)]
        );
    }

    #[test]
    fn test_read_leaves() {
        let mut data = Vec::new();
        leaf_record(&mut data, -3, 6, 2);
        let leaves = read_leaves(&mut Cursor::new(data), None).unwrap();
        assert_eq!(leaves[0].contents, BspLeafContents::Water);
        assert_eq!(leaves[0].vis_offset, None);
        assert_eq!(leaves[0].min, [-8, -8, -8]);
        assert_eq!((leaves[0].marksurface_id, leaves[0].marksurface_count), (6, 2));
        assert_eq!(leaves[0].ambient_levels, [1, 2, 3, 4]);

        for &contents in [0, -16].iter() {
            let mut data = Vec::new();
            leaf_record(&mut data, contents, 0, 0);
            match read_leaves(&mut Cursor::new(data), None) {
                Err(BspError::Malformed(_)) => (),
                x => panic!("expected malformed, got {:?}", x),
            }
        }
    }

    #[test]
    fn test_read_models() {
        let mut data = Vec::new();
        model_record(&mut data, 3, 9);
        let models = read_models(&mut Cursor::new(data), None).unwrap();
        assert_eq!(models[0].head_nodes, [0, 1, 2, 3]);
        assert_eq!((models[0].face_id, models[0].face_count), (3, 9));

        let mut data = Vec::new();
        model_record(&mut data, -1, 9);
        match read_models(&mut Cursor::new(data), None) {
            Err(BspError::Malformed(_)) => (),
            x => panic!("expected malformed, got {:?}", x),
        }
    }

    #[test]
    fn test_read_entities() {
        let data =
            b"{\n\"classname\" \"worldspawn\"\n}\n{\n\"classname\" \"light\"\n}\n\0\0\0".to_vec();
        let len = data.len();
        let entities = read_entities(&mut Cursor::new(data), Some(len)).unwrap();
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[1]["classname"], "light");
    }

    #[test]
    fn test_texture_lump() {
        let lump = texture_lump();
        let len = lump.len();
        let mut data = vec![0xEE; 5];
        data.extend_from_slice(&lump);

        let mut reader = Cursor::new(data);
        reader.set_position(5);
        let textures = read_texture_lump(&mut reader, Some(len), true).unwrap();
        assert_eq!(reader.position(), 5 + len as u64);

        assert_eq!(textures.names(), vec!["brick", "", "sky"]);
        assert_eq!(textures.textures[1].dimensions(), (0, 0));
        assert!(!textures.textures[2].is_packed());
        assert_eq!(textures.dimensions()["sky"], (64, 32));

        assert_eq!(textures.packed.len(), 1);
        let brick = &textures.packed[0];
        assert_eq!(brick.name(), "brick");
        assert_eq!(brick.dimensions(), (16, 16));
        assert_eq!(brick.image().indices(), brick_texture().image().indices());

        reader.set_position(5);
        let headers = read_texture_lump(&mut reader, Some(len), false).unwrap();
        assert!(headers.packed.is_empty());
        assert_eq!(headers.textures, textures.textures);

        let names = read_texture_names(&mut Cursor::new(lump), None).unwrap();
        assert_eq!(names, vec!["brick", "", "sky"]);
    }

    #[test]
    fn test_texture_lump_out_of_range() {
        let mut data = Vec::new();
        data.write_u32::<LittleEndian>(1).unwrap();
        data.write_i32::<LittleEndian>(1000).unwrap();
        match read_texture_lump(&mut Cursor::new(data), None, false) {
            Err(BspError::OutOfRange(_)) => (),
            x => panic!("expected out of range, got {:?}", x),
        }

        let mut data = Vec::new();
        data.write_u32::<LittleEndian>(100).unwrap();
        data.write_i32::<LittleEndian>(8).unwrap();
        match read_texture_lump(&mut Cursor::new(data), None, false) {
            Err(BspError::OutOfRange(_)) => (),
            x => panic!("expected out of range, got {:?}", x),
        }

        let empty = read_texture_lump(&mut Cursor::new(Vec::new()), None, true).unwrap();
        assert_eq!(empty, BspTextureLump::default());
    }

    #[test]
    fn test_packed_texture_outside_lump() {
        let mut record = Vec::new();
        brick_texture().write(&mut record).unwrap();

        let mut data = Vec::new();
        data.write_u32::<LittleEndian>(1).unwrap();
        data.write_i32::<LittleEndian>(8).unwrap();
        data.extend_from_slice(&record);

        // the lump only covers the count, the offset and the texture header
        let short = 8 + 40;
        match read_texture_lump(&mut Cursor::new(data.clone()), Some(short), true) {
            Err(BspError::Texture(WadError::OutOfRange(_))) => (),
            x => panic!("expected out of range, got {:?}", x),
        }

        let headers =
            read_texture_lump(&mut Cursor::new(data.clone()), Some(short), false).unwrap();
        assert_eq!(headers.names(), vec!["brick"]);

        let full = read_texture_lump(&mut Cursor::new(data), None, true).unwrap();
        assert_eq!(full.packed.len(), 1);
    }

    #[test]
    fn test_lightmap_image() {
        let lighting: Vec<u8> = (0..12).collect();
        let lightmap = lightmap_image(&lighting, 3, 2, 1).unwrap();
        assert_eq!(lightmap.dimensions(), (2, 1));
        assert_eq!(*lightmap.get_pixel(1, 0), Rgb([6, 7, 8]));

        match lightmap_image(&lighting, 9, 2, 1) {
            Err(BspError::OutOfRange(_)) => (),
            x => panic!("expected out of range, got {:?}", x),
        }
    }

    #[test]
    fn test_split_assemble() {
        let lumps = square_map_lumps();
        let data = assemble_lumps(&lumps).unwrap();
        let split = split_lumps(&mut Cursor::new(data.clone())).unwrap();
        assert_eq!(split, lumps);
        assert_eq!(assemble_lumps(&split).unwrap(), data);

        match assemble_lumps(&lumps[..14]) {
            Err(BspError::Malformed(_)) => (),
            x => panic!("expected malformed, got {:?}", x),
        }
    }

    #[test]
    fn test_load_square_map() {
        let data = assemble_lumps(&square_map_lumps()).unwrap();
        let map = load(&mut Cursor::new(data), LoadFlags::all()).unwrap();

        assert_eq!(map.entities.len(), 1);
        assert_eq!(map.entities[0]["wad"], "halflife.wad");
        assert_eq!(map.texture_names(), vec!["brick"]);
        assert_eq!(map.packed_textures.len(), 1);

        assert_eq!(map.models.len(), 1);
        let model = &map.models[0];
        assert_eq!(model.point_count(), 4);
        assert_eq!(model.group("brick").unwrap().indices(), &[0, 1, 2, 0, 2, 3]);

        assert_eq!(map.colliders.len(), 1);
        match map.colliders[0] {
            Collider::Mesh(ref mesh) => {
                assert_eq!(mesh.vertices().len(), 4);
                assert_eq!(mesh.triangle_count(), 2);
            }
            ref x => panic!("expected mesh collider, got {:?}", x),
        }
    }

    #[test]
    fn test_load_selected_parts() {
        let data = assemble_lumps(&square_map_lumps()).unwrap();

        let map = load(&mut Cursor::new(data.clone()), LoadFlags::ENTITIES).unwrap();
        assert_eq!(map.entities.len(), 1);
        assert!(map.models.is_empty());
        assert!(map.textures.is_empty());

        let map = load(&mut Cursor::new(data.clone()), LoadFlags::COLLIDERS).unwrap();
        assert!(map.models.is_empty());
        assert_eq!(map.colliders.len(), 1);

        let mut merged = load(&mut Cursor::new(data.clone()), LoadFlags::VISUALS).unwrap();
        assert!(merged.packed_textures.is_empty());
        merged.merge(map);
        assert_eq!(merged.models.len(), 1);
        assert_eq!(merged.colliders.len(), 1);
    }

    #[test]
    fn test_load_rejects_bad_maps() {
        let mut data = assemble_lumps(&square_map_lumps()).unwrap();

        let mut quake = data.clone();
        quake[0] = 29;
        match load(&mut Cursor::new(quake), LoadFlags::all()) {
            Err(BspError::UnsupportedVersion { version: 29, .. }) => (),
            x => panic!("expected unsupported version, got {:?}", x),
        }

        // models lump runs past the end of the file
        let len = data.len();
        data.truncate(len - 1);
        match load(&mut Cursor::new(data), LoadFlags::ENTITIES) {
            Err(BspError::OutOfRange(_)) => (),
            x => panic!("expected out of range, got {:?}", x),
        }
    }

    #[test]
    fn test_load_without_models() {
        let mut lumps = square_map_lumps();
        lumps[BspLumpId::Models as usize].clear();
        let data = assemble_lumps(&lumps).unwrap();
        match load(&mut Cursor::new(data), LoadFlags::VISUALS) {
            Err(BspError::Malformed(_)) => (),
            x => panic!("expected malformed, got {:?}", x),
        }
    }
}
