/* Copyright (C) 2024 Philipp Benner
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Bounds-checked little-endian field readers. Every reader takes the buffer
//! and an absolute offset into it and fails instead of reading out of range.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/* -------------------------------------------------------------------------- */

pub fn slice<'a>(buffer: &'a [u8], offset: usize, n: usize, what: &'static str) -> Result<&'a [u8]> {
    match offset.checked_add(n) {
        Some(end) if end <= buffer.len() => Ok(&buffer[offset..end]),
        _ => Err(Error::Truncated {
            what,
            offset,
            needed   : n,
            available: buffer.len().saturating_sub(offset),
        }),
    }
}

/* -------------------------------------------------------------------------- */

pub fn read_u8(buffer: &[u8], offset: usize) -> Result<u8> {
    Ok(slice(buffer, offset, 1, "u8")?[0])
}

pub fn read_u16(buffer: &[u8], offset: usize) -> Result<u16> {
    Ok(LittleEndian::read_u16(slice(buffer, offset, 2, "u16")?))
}

pub fn read_u32(buffer: &[u8], offset: usize) -> Result<u32> {
    Ok(LittleEndian::read_u32(slice(buffer, offset, 4, "u32")?))
}

pub fn read_u64(buffer: &[u8], offset: usize) -> Result<u64> {
    Ok(LittleEndian::read_u64(slice(buffer, offset, 8, "u64")?))
}

pub fn read_f32(buffer: &[u8], offset: usize) -> Result<f32> {
    Ok(LittleEndian::read_f32(slice(buffer, offset, 4, "f32")?))
}

pub fn read_f64(buffer: &[u8], offset: usize) -> Result<f64> {
    Ok(LittleEndian::read_f64(slice(buffer, offset, 8, "f64")?))
}

/// Read a NUL-padded string of fixed width.
pub fn read_padded_str(buffer: &[u8], offset: usize, n: usize) -> Result<String> {
    let bytes = slice(buffer, offset, n, "key")?;
    let end   = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */
