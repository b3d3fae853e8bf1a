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

use std::io::{self, BufRead, Read, Write};

/// Read a null-terminated sequence of bytes and convert it into a `String`.
///
/// The zero byte is consumed if present. Reading stops at the end of the input otherwise. Bytes
/// that are not valid UTF-8 are replaced with `U+FFFD`.
pub fn read_cstring<R>(src: &mut R) -> io::Result<String>
where
    R: BufRead,
{
    let mut bytes: Vec<u8> = Vec::new();
    src.read_until(0, &mut bytes)?;
    if bytes.last() == Some(&0) {
        bytes.pop();
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read a fixed-width name field of `width` bytes, truncated at the first zero byte.
///
/// All `width` bytes are consumed regardless of where the name ends.
pub fn read_name<R>(src: &mut R, width: usize) -> io::Result<String>
where
    R: Read,
{
    let mut bytes = vec![0u8; width];
    src.read_exact(&mut bytes)?;
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(width);
    Ok(String::from_utf8_lossy(&bytes[..len]).into_owned())
}

/// Write `name` into a fixed-width field of `width` bytes, padding with zeroes.
///
/// The last byte of the field is always zero, so at most `width - 1` bytes of the name fit.
pub fn write_name<W>(dst: &mut W, name: &str, width: usize) -> io::Result<()>
where
    W: Write,
{
    let bytes = name.as_bytes();
    if width == 0 || bytes.len() >= width {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("name \"{}\" does not fit in {} bytes", name, width),
        ));
    }

    let mut field = vec![0u8; width];
    field[..bytes.len()].copy_from_slice(bytes);
    dst.write_all(&field)
}
