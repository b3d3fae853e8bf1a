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

//! WAD3 texture archives.
//!
//! A WAD3 file starts with the magic number `WAD3`, a 32-bit entry count and the 32-bit offset of
//! the entry table. Each entry is 32 bytes: offset, size on disk, uncompressed size, a type byte,
//! a compression flag, 2 bytes of padding and a 16-byte name. Only uncompressed entries of type
//! `0x43` (mipmapped textures) are decoded.

pub mod quantize;
pub mod texture;

use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};

use crate::common::util;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use num::FromPrimitive;
use thiserror::Error;

pub use self::{
    quantize::QuantizeAlgorithm,
    texture::{IndexedImage, MipLevel, MipTexture, MipTextureHeader, MipmapAlgorithm},
};

const MAGIC: u32 = 'W' as u32 | ('A' as u32) << 8 | ('D' as u32) << 16 | ('3' as u32) << 24;
const HEADER_SIZE: u64 = 12;
const ENTRY_SIZE: u64 = 32;
const NAME_SIZE: usize = 16;

#[derive(Error, Debug)]
pub enum WadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Bad magic number for WAD3: got 0x{found:08x}")]
    BadMagic { found: u32 },
    #[error("Out of range: {0}")]
    OutOfRange(String),
    #[error("Malformed record: {0}")]
    Malformed(String),
    #[error("Color reduction failed: {0}")]
    Quantize(String),
}

impl WadError {
    pub(crate) fn out_of_range<S>(msg: S) -> Self
    where
        S: AsRef<str>,
    {
        WadError::OutOfRange(msg.as_ref().to_owned())
    }

    pub(crate) fn malformed<S>(msg: S) -> Self
    where
        S: AsRef<str>,
    {
        WadError::Malformed(msg.as_ref().to_owned())
    }
}

#[derive(Copy, Clone, Debug, Eq, FromPrimitive, PartialEq)]
pub enum WadEntryKind {
    Palette = 0x40,
    QPic = 0x42,
    MipTexture = 0x43,
    Font = 0x46,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WadEntry {
    pub offset: i32,
    pub size: i32,
    pub uncompressed_size: i32,
    pub kind: u8,
    pub compressed: bool,
    pub name: String,
}

impl WadEntry {
    fn read<R>(reader: &mut R) -> Result<WadEntry, WadError>
    where
        R: Read,
    {
        let offset = reader.read_i32::<LittleEndian>()?;
        let size = reader.read_i32::<LittleEndian>()?;
        let uncompressed_size = reader.read_i32::<LittleEndian>()?;
        let kind = reader.read_u8()?;
        let compressed = reader.read_u8()? != 0;
        let _pad = reader.read_u16::<LittleEndian>()?;
        let name = util::read_name(reader, NAME_SIZE)?;

        debug!(
            "{: <16} Offset = 0x{:>08x} | Size = 0x{:>08x} | Type = 0x{:02x}",
            name, offset, size, kind
        );

        Ok(WadEntry {
            offset,
            size,
            uncompressed_size,
            kind,
            compressed,
            name,
        })
    }

    fn write<W>(&self, writer: &mut W) -> Result<(), WadError>
    where
        W: Write,
    {
        writer.write_i32::<LittleEndian>(self.offset)?;
        writer.write_i32::<LittleEndian>(self.size)?;
        writer.write_i32::<LittleEndian>(self.uncompressed_size)?;
        writer.write_u8(self.kind)?;
        writer.write_u8(self.compressed as u8)?;
        writer.write_u16::<LittleEndian>(0)?;
        util::write_name(writer, &self.name, NAME_SIZE)?;
        Ok(())
    }

    pub fn kind(&self) -> Option<WadEntryKind> {
        WadEntryKind::from_u8(self.kind)
    }

    fn is_texture(&self) -> bool {
        self.kind() == Some(WadEntryKind::MipTexture)
    }
}

/// Why an entry was left out of a loaded archive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SkipReason {
    Compressed,
    NotATexture(u8),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SkippedEntry {
    pub name: String,
    pub reason: SkipReason,
}

/// Reads the header and entry table of a WAD3 archive starting at the current position.
///
/// Entry offsets are relative to that position.
pub fn read_entries<R>(reader: &mut R) -> Result<Vec<WadEntry>, WadError>
where
    R: Read + Seek,
{
    let start = reader.seek(SeekFrom::Current(0))?;
    let len = reader.seek(SeekFrom::End(0))? - start;
    reader.seek(SeekFrom::Start(start))?;

    let magic = reader.read_u32::<LittleEndian>()?;
    if magic != MAGIC {
        return Err(WadError::BadMagic { found: magic });
    }

    let entry_count = reader.read_i32::<LittleEndian>()?;
    let table_ofs = reader.read_i32::<LittleEndian>()?;
    if entry_count < 0 || table_ofs < 0 {
        return Err(WadError::malformed(format!(
            "negative entry count ({}) or table offset ({})",
            entry_count, table_ofs
        )));
    }

    let table_end = table_ofs as u64 + entry_count as u64 * ENTRY_SIZE;
    if table_end > len {
        return Err(WadError::out_of_range(format!(
            "entry table ends at 0x{:x}, past the end of the archive (0x{:x})",
            table_end, len
        )));
    }

    reader.seek(SeekFrom::Start(start + table_ofs as u64))?;
    let mut entries = Vec::with_capacity(entry_count as usize);
    for _ in 0..entry_count {
        let entry = WadEntry::read(reader)?;
        if entry.offset < 0
            || entry.size < 0
            || entry.offset as u64 + entry.size as u64 > len
        {
            return Err(WadError::out_of_range(format!(
                "entry {} (offset {}, size {}) lies outside the archive",
                entry.name, entry.offset, entry.size
            )));
        }
        entries.push(entry);
    }

    Ok(entries)
}

/// Lists the names of the decodable textures in an archive without reading any pixel data.
pub fn texture_names<R>(reader: &mut R) -> Result<Vec<String>, WadError>
where
    R: Read + Seek,
{
    Ok(read_entries(reader)?
        .into_iter()
        .filter(|e| e.is_texture() && !e.compressed)
        .map(|e| e.name)
        .collect())
}

/// An in-memory WAD3 archive.
#[derive(Debug, Default)]
pub struct Wad {
    textures: Vec<MipTexture>,
    skipped: Vec<SkippedEntry>,
}

impl Wad {
    pub fn new() -> Wad {
        Wad::default()
    }

    pub fn load<R>(data: R) -> Result<Wad, WadError>
    where
        R: Read + Seek,
    {
        let mut reader = BufReader::new(data);
        let start = reader.seek(SeekFrom::Current(0))?;
        let entries = read_entries(&mut reader)?;

        let mut wad = Wad::new();
        for entry in entries {
            if entry.compressed {
                warn!("Skipping compressed WAD entry {}", entry.name);
                wad.skipped.push(SkippedEntry {
                    name: entry.name,
                    reason: SkipReason::Compressed,
                });
                continue;
            }

            if !entry.is_texture() {
                warn!(
                    "Skipping WAD entry {} of unsupported type 0x{:02x}",
                    entry.name, entry.kind
                );
                wad.skipped.push(SkippedEntry {
                    name: entry.name,
                    reason: SkipReason::NotATexture(entry.kind),
                });
                continue;
            }

            reader.seek(SeekFrom::Start(start + entry.offset as u64))?;
            let size = entry.size as usize;
            wad.textures.push(MipTexture::read(&mut reader, Some(size))?);
        }

        Ok(wad)
    }

    pub fn textures(&self) -> &[MipTexture] {
        &self.textures
    }

    /// Finds a texture by name. Texture names are case-insensitive.
    pub fn texture<S>(&self, name: S) -> Option<&MipTexture>
    where
        S: AsRef<str>,
    {
        self.textures
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(name.as_ref()))
    }

    /// Returns the entries left out when the archive was loaded.
    pub fn skipped(&self) -> &[SkippedEntry] {
        &self.skipped
    }

    pub fn add_texture(&mut self, texture: MipTexture) {
        self.textures.push(texture);
    }

    pub fn into_textures(self) -> Vec<MipTexture> {
        self.textures
    }

    /// Writes the archive: header, texture records, then the entry table.
    pub fn write<W>(&self, writer: &mut W) -> Result<(), WadError>
    where
        W: Write,
    {
        let mut entries = Vec::with_capacity(self.textures.len());
        let mut offset = HEADER_SIZE;
        for tex in self.textures.iter() {
            let size = tex.encoded_size() as u64;
            if offset + size > i32::MAX as u64 {
                return Err(WadError::out_of_range("archive exceeds 2 GiB"));
            }

            entries.push(WadEntry {
                offset: offset as i32,
                size: size as i32,
                uncompressed_size: size as i32,
                kind: WadEntryKind::MipTexture as u8,
                compressed: false,
                name: tex.name().to_owned(),
            });
            offset += size;
        }

        writer.write_u32::<LittleEndian>(MAGIC)?;
        writer.write_i32::<LittleEndian>(entries.len() as i32)?;
        writer.write_i32::<LittleEndian>(offset as i32)?;

        for tex in self.textures.iter() {
            tex.write(writer)?;
        }

        for entry in entries.iter() {
            entry.write(writer)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use image::Rgba;

    fn texture(name: &str, width: u32, height: u32) -> MipTexture {
        let indices = (0..width * height).map(|i| (i % 2) as u8).collect();
        let palette = vec![Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 255])];
        MipTexture::new(name, IndexedImage::new(width, height, indices, palette).unwrap()).unwrap()
    }

    fn push_entry(
        table: &mut Vec<u8>,
        offset: i32,
        size: i32,
        kind: u8,
        compressed: bool,
        name: &str,
    ) {
        WadEntry {
            offset,
            size,
            uncompressed_size: size,
            kind,
            compressed,
            name: name.to_owned(),
        }
        .write(table)
        .unwrap();
    }

    // one texture record followed by a table with the given extra entries pointing at it
    fn handmade(extra: &[(u8, bool, &str)]) -> Vec<u8> {
        let mut record = Vec::new();
        texture("{grate", 16, 16).write(&mut record).unwrap();

        let mut table = Vec::new();
        push_entry(&mut table, 12, record.len() as i32, 0x43, false, "{grate");
        for &(kind, compressed, name) in extra {
            push_entry(&mut table, 12, record.len() as i32, kind, compressed, name);
        }

        let mut data = Vec::new();
        data.write_u32::<LittleEndian>(MAGIC).unwrap();
        data.write_i32::<LittleEndian>(1 + extra.len() as i32).unwrap();
        data.write_i32::<LittleEndian>(12 + record.len() as i32).unwrap();
        data.extend(record);
        data.extend(table);
        data
    }

    #[test]
    fn test_load_texture_entry() {
        let wad = Wad::load(Cursor::new(handmade(&[]))).unwrap();
        assert_eq!(wad.textures().len(), 1);

        let tex = wad.texture("{GRATE").unwrap();
        assert_eq!(tex.dimensions(), (16, 16));
        assert_eq!(tex.level_count(), 4);
        assert!(wad.skipped().is_empty());
    }

    #[test]
    fn test_skip_compressed_and_foreign() {
        let data = handmade(&[(0x43, true, "packed"), (0x42, false, "conchars")]);
        let wad = Wad::load(Cursor::new(data)).unwrap();

        assert_eq!(wad.textures().len(), 1);
        assert_eq!(
            wad.skipped(),
            &[
                SkippedEntry {
                    name: "packed".to_owned(),
                    reason: SkipReason::Compressed,
                },
                SkippedEntry {
                    name: "conchars".to_owned(),
                    reason: SkipReason::NotATexture(0x42),
                },
            ]
        );
    }

    #[test]
    fn test_texture_names() {
        let data = handmade(&[(0x43, true, "packed"), (0x43, false, "again")]);
        let names = texture_names(&mut Cursor::new(data)).unwrap();
        assert_eq!(names, vec!["{grate".to_owned(), "again".to_owned()]);
    }

    #[test]
    fn test_bad_magic() {
        let mut data = handmade(&[]);
        data[3] = b'2';
        match Wad::load(Cursor::new(data)) {
            Err(WadError::BadMagic { found }) => assert_eq!(found, 0x3244_4157),
            x => panic!("expected bad magic, got {:?}", x),
        }
    }

    #[test]
    fn test_texture_larger_than_entry() {
        let mut data = handmade(&[]);
        let table = data.len() - 32;
        data[table + 4..table + 8].copy_from_slice(&40i32.to_le_bytes());

        match Wad::load(Cursor::new(data)) {
            Err(WadError::OutOfRange(_)) => (),
            x => panic!("expected out of range, got {:?}", x),
        }
    }

    #[test]
    fn test_entry_out_of_range() {
        let mut data = Vec::new();
        data.write_u32::<LittleEndian>(MAGIC).unwrap();
        data.write_i32::<LittleEndian>(1).unwrap();
        data.write_i32::<LittleEndian>(12).unwrap();
        push_entry(&mut data, 40, 1000, 0x43, false, "missing");

        match Wad::load(Cursor::new(data)) {
            Err(WadError::OutOfRange(_)) => (),
            x => panic!("expected out of range, got {:?}", x),
        }
    }

    #[test]
    fn test_table_out_of_range() {
        let mut data = Vec::new();
        data.write_u32::<LittleEndian>(MAGIC).unwrap();
        data.write_i32::<LittleEndian>(4).unwrap();
        data.write_i32::<LittleEndian>(12).unwrap();

        assert!(read_entries(&mut Cursor::new(data)).is_err());
    }

    #[test]
    fn test_write_and_load() {
        let mut wad = Wad::new();
        wad.add_texture(texture("wall01", 32, 32));
        wad.add_texture(texture("floor", 64, 16));

        let mut data = Vec::new();
        wad.write(&mut data).unwrap();

        let entries = read_entries(&mut Cursor::new(&data)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].offset, 12);
        assert_eq!(entries[1].offset, 12 + entries[0].size);
        assert_eq!(entries[1].kind(), Some(WadEntryKind::MipTexture));

        let loaded = Wad::load(Cursor::new(&data)).unwrap();
        assert_eq!(loaded.textures().len(), 2);
        let floor = loaded.texture("floor").unwrap();
        assert_eq!(floor.dimensions(), (64, 16));
        assert_eq!(
            floor.mipmap(MipLevel::Full),
            wad.texture("floor").unwrap().mipmap(MipLevel::Full)
        );
        assert_eq!(floor.mipmap(MipLevel::Eighth).unwrap().len(), 16);
    }
}
