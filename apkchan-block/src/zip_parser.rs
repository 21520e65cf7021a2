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

use std::io::{Read, Seek, SeekFrom};

use crate::byte_view::{read_u16, read_u32, write_u32};
use apkchan_common::*;

pub const EOCD_MAGIC: u32 = 0x06054B50;
/// Size of an End Of Central Directory record with an empty comment.
pub const EOCD_MIN_SIZE: usize = 22;
/// The comment length is a u16, so the EOCD can never sit further back than this.
pub const EOCD_MAX_COMMENT_SIZE: usize = u16::MAX as usize;

const EOCD_CD_SIZE_FIELD: usize = 12;
const EOCD_CD_OFFSET_FIELD: usize = 16;
const EOCD_COMMENT_LENGTH_FIELD: usize = 20;

/// End Of Central Directory record, including its trailing comment.
///
/// ```text
/// Offset  Bytes  Description
/// 0       4      Signature (0x06054b50)
/// 4       2      Number of this disk
/// 6       2      Disk where central directory starts
/// 8       2      Number of central directory records on this disk
/// 10      2      Total number of central directory records
/// 12      4      Size of central directory
/// 16      4      Offset of start of central directory
/// 20      2      Comment length (n)
/// 22      n      Comment
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Eocd {
    pub bytes: Vec<u8>,
    // From start of file
    pub offset: u64
}

impl Eocd {
    pub fn cd_size(&self) -> Result<u32> {
        read_u32(&self.bytes, EOCD_CD_SIZE_FIELD)
    }

    pub fn cd_offset(&self) -> Result<u32> {
        read_u32(&self.bytes, EOCD_CD_OFFSET_FIELD)
    }

    pub fn comment_len(&self) -> Result<u16> {
        read_u16(&self.bytes, EOCD_COMMENT_LENGTH_FIELD)
    }

    /// Returns a copy of this record pointing at a different Central Directory.
    /// Everything else, the comment included, is kept byte for byte.
    pub fn with_cd_offset(&self, cd_offset: u32) -> Result<Eocd> {
        let mut bytes = self.bytes.clone();
        write_u32(cd_offset, &mut bytes, EOCD_CD_OFFSET_FIELD)?;
        Ok(Eocd {
            bytes,
            offset: self.offset
        })
    }
}

/// Returns the length of the archive, leaving the cursor wherever it was.
pub(crate) fn archive_len<R: Seek>(reader: &mut R) -> Result<u64> {
    let pos = reader.stream_position()?;
    let len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(pos))?;
    Ok(len)
}

/// Reads exactly `len` bytes starting at `offset`.
pub(crate) fn read_at<R: Read + Seek>(reader: &mut R, offset: u64, len: usize) -> Result<Vec<u8>> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::with_capacity(len);
    let actual = reader.by_ref().take(len as u64).read_to_end(&mut buf)?;
    if actual != len {
        return Err(ChanError::ShortRead {
            expected: len as u64,
            actual: actual as u64
        });
    }
    Ok(buf)
}

/// Finds the End Of Central Directory record at the tail of the archive.
pub fn find_eocd<R: Read + Seek>(reader: &mut R) -> Result<Eocd> {
    let file_size = archive_len(reader)?;
    if file_size < EOCD_MIN_SIZE as u64 {
        return Err(ChanError::ArchiveTooSmall(file_size));
    }
    // Nearly every APK has no archive comment, so the record is exactly
    // 22 bytes from the end. Only read the wider window if that fails.
    if let Some(eocd) = find_eocd_within(reader, file_size, 0)? {
        return Ok(eocd);
    }
    find_eocd_within(reader, file_size, EOCD_MAX_COMMENT_SIZE)?.ok_or(ChanError::EocdNotFound)
}

fn find_eocd_within<R: Read + Seek>(
    reader: &mut R,
    file_size: u64,
    max_comment_size: usize
) -> Result<Option<Eocd>> {
    let max_comment_size = (max_comment_size as u64).min(file_size - EOCD_MIN_SIZE as u64) as usize;
    let window_len = EOCD_MIN_SIZE + max_comment_size;
    let window_start = file_size - window_len as u64;
    let window = read_at(reader, window_start, window_len)?;

    let empty_comment_pos = window.len() - EOCD_MIN_SIZE;
    for expected_comment_len in 0..=max_comment_size {
        let pos = empty_comment_pos - expected_comment_len;
        if read_u32(&window, pos)? != EOCD_MAGIC {
            continue;
        }
        // The magic can turn up inside a comment, so the record only counts if
        // its comment runs exactly to the end of the file.
        let comment_len = read_u16(&window, pos + EOCD_COMMENT_LENGTH_FIELD)?;
        if comment_len as usize == expected_comment_len {
            return Ok(Some(Eocd {
                bytes: window[pos..].to_vec(),
                offset: window_start + pos as u64
            }));
        }
        log::debug!(
            "Skipping EOCD magic at {} declaring a {comment_len} byte comment, {expected_comment_len} bytes remain",
            window_start + pos as u64
        );
    }
    Ok(None)
}
