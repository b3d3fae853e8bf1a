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

//! Palette-indexed, mipmapped textures as stored in WAD3 archives and GoldSource BSP files.
//!
//! A texture record consists of a 16-byte name, a 32-bit width and height, 4 mipmap offsets given
//! in bytes from the start of the record, the mipmaps themselves, 2 bytes holding the palette
//! size and a 256-entry RGB palette. Each mipmap has its dimensions halved from the previous one.
//!
//! If the last palette entry is pure blue, index 255 is treated as transparent.

use std::{
    borrow::Cow,
    io::{self, Read, Seek, SeekFrom, Write},
};

use crate::common::{
    util,
    wad::{
        quantize::{self, QuantizeAlgorithm},
        WadError,
    },
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use image::{ImageBuffer, RgbImage, Rgba, RgbaImage};

pub const MIPLEVELS: usize = 4;

/// Size of a texture record header in bytes.
pub const HEADER_SIZE: u32 = 40;

pub const PALETTE_SIZE: usize = 256;

/// The color substituted for a pure blue last palette entry.
pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 255, 0]);

const NAME_SIZE: usize = 16;
const TRANSPARENCY_KEY: [u8; 3] = [0, 0, 255];

#[derive(Copy, Clone, Debug, Eq, FromPrimitive, PartialEq)]
pub enum MipLevel {
    Full = 0,
    Half = 1,
    Quarter = 2,
    Eighth = 3,
}

/// How a mipmap level is derived from the previous one.
///
/// Palette indices cannot be blended without a palette lookup, so both strategies pick existing
/// texels.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MipmapAlgorithm {
    /// Take the top-left texel of each 2x2 block.
    FirstPixel,

    /// Take the centered half-size window of the previous level.
    CropCenter,
}

impl Default for MipmapAlgorithm {
    fn default() -> Self {
        MipmapAlgorithm::FirstPixel
    }
}

/// Returns the dimensions of mipmap `level` of a texture with the given full-size dimensions.
pub fn mip_dimensions(width: u32, height: u32, level: usize) -> (u32, u32) {
    (width >> level, height >> level)
}

/// Produces the next mipmap level from `prev`, a `prev_width` by `prev_height` index buffer.
pub fn downsample(
    prev: &[u8],
    prev_width: u32,
    prev_height: u32,
    algorithm: MipmapAlgorithm,
) -> Vec<u8> {
    let prev_width = prev_width as usize;
    let width = prev_width / 2;
    let height = prev_height as usize / 2;

    let (x_ofs, y_ofs, step) = match algorithm {
        MipmapAlgorithm::FirstPixel => (0, 0, 2),
        MipmapAlgorithm::CropCenter => (prev_width / 4, prev_height as usize / 4, 1),
    };

    let mut indices = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            indices.push(prev[(x_ofs + step * x) + (y_ofs + step * y) * prev_width]);
        }
    }

    indices
}

/// A single-level image stored as one palette index per pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexedImage {
    width: u32,
    height: u32,
    indices: Vec<u8>,
    palette: Vec<Rgba<u8>>,
}

impl IndexedImage {
    pub fn new(
        width: u32,
        height: u32,
        indices: Vec<u8>,
        palette: Vec<Rgba<u8>>,
    ) -> Result<IndexedImage, WadError> {
        if palette.len() > PALETTE_SIZE {
            return Err(WadError::malformed(format!(
                "palette has {} colors (maximum is {})",
                palette.len(),
                PALETTE_SIZE
            )));
        }

        if indices.len() as u64 != width as u64 * height as u64 {
            return Err(WadError::malformed(format!(
                "{} indices for a {}x{} image",
                indices.len(),
                width,
                height
            )));
        }

        check_indices(&indices, palette.len())?;

        Ok(IndexedImage {
            width,
            height,
            indices,
            palette,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn indices(&self) -> &[u8] {
        &self.indices
    }

    pub fn palette(&self) -> &[Rgba<u8>] {
        &self.palette
    }

    /// Expands the image to RGBA using its palette.
    pub fn to_rgba(&self) -> RgbaImage {
        expand(self.width, self.height, &self.indices, &self.palette)
    }
}

fn check_indices(indices: &[u8], palette_len: usize) -> Result<(), WadError> {
    match indices.iter().find(|&&i| i as usize >= palette_len) {
        Some(i) => Err(WadError::out_of_range(format!(
            "palette index {} exceeds palette size {}",
            i, palette_len
        ))),
        None => Ok(()),
    }
}

fn expand(width: u32, height: u32, indices: &[u8], palette: &[Rgba<u8>]) -> RgbaImage {
    ImageBuffer::from_fn(width, height, |x, y| {
        palette[indices[(x + y * width) as usize] as usize]
    })
}

/// The fixed-size header of a texture record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MipTextureHeader {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub offsets: [u32; MIPLEVELS],
}

impl MipTextureHeader {
    pub fn read<R>(reader: &mut R) -> Result<MipTextureHeader, WadError>
    where
        R: Read,
    {
        let name = util::read_name(reader, NAME_SIZE)?;
        let width = reader.read_u32::<LittleEndian>()?;
        let height = reader.read_u32::<LittleEndian>()?;

        let mut offsets = [0u32; MIPLEVELS];
        for m in 0..MIPLEVELS {
            offsets[m] = reader.read_u32::<LittleEndian>()?;
        }

        Ok(MipTextureHeader {
            name,
            width,
            height,
            offsets,
        })
    }

    /// Returns true if the pixel data follows the header. Textures kept in an external archive
    /// have all offsets set to zero.
    pub fn is_packed(&self) -> bool {
        self.offsets[0] != 0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn level_size(&self, level: usize) -> u64 {
        let (w, h) = mip_dimensions(self.width, self.height, level);
        w as u64 * h as u64
    }

    // offset of the palette from the start of the record
    fn palette_offset(&self) -> u64 {
        self.offsets[MIPLEVELS - 1] as u64 + self.level_size(MIPLEVELS - 1) + 2
    }

    // everything the header points at must end within `len` bytes of the record start
    fn check_bounds(&self, len: u64) -> Result<(), WadError> {
        for m in 0..MIPLEVELS {
            let end = self.offsets[m] as u64 + self.level_size(m);
            if end > len {
                return Err(WadError::out_of_range(format!(
                    "texture {}: mipmap {} ends at 0x{:x}, past the record end (0x{:x})",
                    self.name, m, end, len
                )));
            }
        }

        let end = self.palette_offset() + (PALETTE_SIZE * 3) as u64;
        if end > len {
            return Err(WadError::out_of_range(format!(
                "texture {}: palette ends at 0x{:x}, past the record end (0x{:x})",
                self.name, end, len
            )));
        }

        Ok(())
    }

    fn check_layout(&self) -> Result<(), WadError> {
        if self.width == 0 || self.height == 0 {
            return Err(WadError::malformed(format!(
                "texture {} has empty dimensions {}x{}",
                self.name, self.width, self.height
            )));
        }

        let mut min_offset = HEADER_SIZE as u64;
        for m in 0..MIPLEVELS {
            let offset = self.offsets[m] as u64;
            if offset < min_offset {
                return Err(WadError::malformed(format!(
                    "texture {}: mipmap {} at 0x{:x} overlaps preceding data",
                    self.name, m, offset
                )));
            }
            min_offset = offset + self.level_size(m);
        }

        Ok(())
    }
}

/// A palette-indexed texture with up to 4 mipmap levels.
#[derive(Clone, Debug, PartialEq)]
pub struct MipTexture {
    name: String,
    image: IndexedImage,

    // levels 1 and up
    mipmaps: Vec<Vec<u8>>,
}

impl MipTexture {
    /// Creates a texture from its full-size level. Names are limited to 15 ASCII characters.
    pub fn new<S>(name: S, image: IndexedImage) -> Result<MipTexture, WadError>
    where
        S: AsRef<str>,
    {
        let name = name.as_ref();
        if name.len() >= NAME_SIZE || !name.is_ascii() {
            return Err(WadError::malformed(format!(
                "texture name \"{}\" must be at most {} ASCII characters",
                name,
                NAME_SIZE - 1
            )));
        }

        Ok(MipTexture {
            name: name.to_owned(),
            image,
            mipmaps: Vec::new(),
        })
    }

    /// Converts an RGB image into a texture, reducing it to a palette if necessary.
    pub fn from_rgb_image<S>(
        name: S,
        src: &RgbImage,
        algorithm: QuantizeAlgorithm,
    ) -> Result<MipTexture, WadError>
    where
        S: AsRef<str>,
    {
        MipTexture::new(name, quantize::quantize(src, algorithm)?)
    }

    /// Returns the name of the texture.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.image.width
    }

    pub fn height(&self) -> u32 {
        self.image.height
    }

    /// Returns a tuple containing the width and height of the texture.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width, self.image.height)
    }

    pub fn palette(&self) -> &[Rgba<u8>] {
        &self.image.palette
    }

    pub fn image(&self) -> &IndexedImage {
        &self.image
    }

    /// Returns the number of mipmap levels present, including the full-size level.
    pub fn level_count(&self) -> usize {
        1 + self.mipmaps.len()
    }

    /// Returns the texture's mipmap of the specified level, if it has been added.
    pub fn mipmap(&self, level: MipLevel) -> Option<&[u8]> {
        match level {
            MipLevel::Full => Some(&self.image.indices),
            l => self.mipmaps.get(l as usize - 1).map(|m| m.as_slice()),
        }
    }

    /// Appends the next mipmap level.
    pub fn push_mipmap(&mut self, indices: Vec<u8>) -> Result<(), WadError> {
        let level = self.level_count();
        if level >= MIPLEVELS {
            return Err(WadError::out_of_range(format!(
                "texture {} already has {} mipmap levels",
                self.name, MIPLEVELS
            )));
        }

        let (w, h) = mip_dimensions(self.width(), self.height(), level);
        if indices.len() as u64 != w as u64 * h as u64 {
            return Err(WadError::malformed(format!(
                "mipmap {} of {} should be {}x{} but has {} indices",
                level,
                self.name,
                w,
                h,
                indices.len()
            )));
        }

        check_indices(&indices, self.image.palette.len())?;
        self.mipmaps.push(indices);
        Ok(())
    }

    /// Generates all missing mipmap levels.
    pub fn generate_mipmaps(&mut self, algorithm: MipmapAlgorithm) {
        let levels: Vec<Vec<u8>> = self
            .levels(algorithm)
            .into_iter()
            .skip(self.level_count())
            .map(|l| l.into_owned())
            .collect();
        self.mipmaps.extend(levels);
    }

    // all levels, generating the missing ones without storing them
    fn levels(&self, algorithm: MipmapAlgorithm) -> Vec<Cow<[u8]>> {
        let mut levels: Vec<Cow<[u8]>> = Vec::with_capacity(MIPLEVELS);
        levels.push(Cow::Borrowed(self.image.indices.as_slice()));
        for m in self.mipmaps.iter() {
            levels.push(Cow::Borrowed(m.as_slice()));
        }

        while levels.len() < MIPLEVELS {
            let prev = levels.len() - 1;
            let (w, h) = mip_dimensions(self.width(), self.height(), prev);
            let next = downsample(&levels[prev], w, h, algorithm);
            levels.push(Cow::Owned(next));
        }

        levels
    }

    /// Expands mipmap `level` to RGBA.
    pub fn to_rgba(&self, level: MipLevel) -> Option<RgbaImage> {
        let (w, h) = mip_dimensions(self.width(), self.height(), level as usize);
        self.mipmap(level)
            .map(|indices| expand(w, h, indices, &self.image.palette))
    }

    /// Returns the size of the encoded texture record in bytes.
    pub fn encoded_size(&self) -> usize {
        let mips: u64 = (0..MIPLEVELS)
            .map(|m| {
                let (w, h) = mip_dimensions(self.width(), self.height(), m);
                w as u64 * h as u64
            })
            .sum();
        HEADER_SIZE as usize + mips as usize + 2 + PALETTE_SIZE * 3
    }

    /// Reads a texture record starting at the current position of `reader`.
    ///
    /// If `length` is given, every mipmap and the palette must lie within that many bytes of the
    /// start of the record.
    pub fn read<R>(reader: &mut R, length: Option<usize>) -> Result<MipTexture, WadError>
    where
        R: Read + Seek,
    {
        let start = reader.seek(SeekFrom::Current(0))?;
        if let Some(len) = length {
            if (len as u64) < HEADER_SIZE as u64 {
                return Err(WadError::out_of_range(format!(
                    "texture record of {} bytes cannot hold its header",
                    len
                )));
            }
        }

        let header = MipTextureHeader::read(reader)?;
        header.check_layout()?;
        if let Some(len) = length {
            header.check_bounds(len as u64)?;
        }

        let mut levels = Vec::with_capacity(MIPLEVELS);
        for m in 0..MIPLEVELS {
            let size = header.level_size(m);
            reader.seek(SeekFrom::Start(start + header.offsets[m] as u64))?;

            let mut data = Vec::new();
            reader.by_ref().take(size).read_to_end(&mut data)?;
            if data.len() as u64 != size {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("mipmap {} of {} is truncated", m, header.name),
                )
                .into());
            }

            levels.push(data);
        }

        let palette_ofs = start + header.palette_offset();
        reader.seek(SeekFrom::Start(palette_ofs))?;
        let palette = read_palette(reader)?;

        debug!(
            "Texture {}: {}x{}, palette at 0x{:x}",
            header.name, header.width, header.height, palette_ofs
        );

        let mut levels = levels.into_iter();
        let full = levels.next().unwrap_or_default();
        Ok(MipTexture {
            name: header.name,
            image: IndexedImage::new(header.width, header.height, full, palette)?,
            mipmaps: levels.collect(),
        })
    }

    /// Writes this texture as a texture record. Missing mipmap levels are generated with
    /// `MipmapAlgorithm::FirstPixel`.
    pub fn write<W>(&self, writer: &mut W) -> Result<(), WadError>
    where
        W: Write,
    {
        let levels = self.levels(MipmapAlgorithm::FirstPixel);

        util::write_name(writer, &self.name, NAME_SIZE)?;
        writer.write_u32::<LittleEndian>(self.width())?;
        writer.write_u32::<LittleEndian>(self.height())?;

        let mut offset = HEADER_SIZE as u64;
        for level in levels.iter() {
            if offset > u32::MAX as u64 {
                return Err(WadError::out_of_range(format!(
                    "texture {} is too large to encode",
                    self.name
                )));
            }
            writer.write_u32::<LittleEndian>(offset as u32)?;
            offset += level.len() as u64;
        }

        for level in levels.iter() {
            writer.write_all(level)?;
        }

        writer.write_u16::<LittleEndian>(PALETTE_SIZE as u16)?;
        write_palette(writer, &self.image.palette)?;

        Ok(())
    }
}

fn read_palette<R>(reader: &mut R) -> Result<Vec<Rgba<u8>>, WadError>
where
    R: Read,
{
    let mut data = [0u8; PALETTE_SIZE * 3];
    reader.read_exact(&mut data)?;

    let mut palette: Vec<Rgba<u8>> = data
        .chunks_exact(3)
        .map(|c| Rgba([c[0], c[1], c[2], 0xFF]))
        .collect();

    let last = PALETTE_SIZE - 1;
    if data[last * 3..] == TRANSPARENCY_KEY {
        palette[last] = TRANSPARENT;
    }

    Ok(palette)
}

fn write_palette<W>(writer: &mut W, palette: &[Rgba<u8>]) -> io::Result<()>
where
    W: Write,
{
    let mut data = [0u8; PALETTE_SIZE * 3];
    for (i, color) in palette.iter().enumerate() {
        data[i * 3..i * 3 + 3].copy_from_slice(&color.0[..3]);
    }

    // a free last slot marks index 255 as transparent
    if palette.len() < PALETTE_SIZE {
        let last = PALETTE_SIZE - 1;
        data[last * 3..].copy_from_slice(&TRANSPARENCY_KEY);
    }

    writer.write_all(&data)
}
