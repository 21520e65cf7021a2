// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Little-endian fixed-width integer access over byte buffers.
//!
//! Every accessor checks its range up front and fails with
//! [ChanError::OutOfBounds] rather than panicking, since the offsets handed to
//! these functions usually come straight out of an untrusted file.

use apkchan_common::*;
use byteorder::{ByteOrder, LittleEndian};

fn range(buf_len: usize, offset: usize, width: usize) -> Result<std::ops::Range<usize>> {
    match offset.checked_add(width) {
        Some(end) if end <= buf_len => Ok(offset..end),
        _ => Err(ChanError::OutOfBounds {
            offset,
            width,
            len: buf_len
        })
    }
}

pub fn read_u16(buf: &[u8], offset: usize) -> Result<u16> {
    let r = range(buf.len(), offset, 2)?;
    Ok(LittleEndian::read_u16(&buf[r]))
}

pub fn read_u32(buf: &[u8], offset: usize) -> Result<u32> {
    let r = range(buf.len(), offset, 4)?;
    Ok(LittleEndian::read_u32(&buf[r]))
}

pub fn read_u64(buf: &[u8], offset: usize) -> Result<u64> {
    let r = range(buf.len(), offset, 8)?;
    Ok(LittleEndian::read_u64(&buf[r]))
}

pub fn write_u16(value: u16, buf: &mut [u8], offset: usize) -> Result<()> {
    let r = range(buf.len(), offset, 2)?;
    LittleEndian::write_u16(&mut buf[r], value);
    Ok(())
}

pub fn write_u32(value: u32, buf: &mut [u8], offset: usize) -> Result<()> {
    let r = range(buf.len(), offset, 4)?;
    LittleEndian::write_u32(&mut buf[r], value);
    Ok(())
}

pub fn write_u64(value: u64, buf: &mut [u8], offset: usize) -> Result<()> {
    let r = range(buf.len(), offset, 8)?;
    LittleEndian::write_u64(&mut buf[r], value);
    Ok(())
}

/// Copies `count` bytes from `src[src_start..]` into `dst[dst_start..]`.
///
/// Returns the number of bytes copied.
pub fn copy_range(
    src: &[u8],
    src_start: usize,
    dst: &mut [u8],
    dst_start: usize,
    count: usize
) -> Result<usize> {
    let src_range = range(src.len(), src_start, count)?;
    let dst_range = range(dst.len(), dst_start, count)?;
    dst[dst_range].copy_from_slice(&src[src_range]);
    Ok(count)
}
