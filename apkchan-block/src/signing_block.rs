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

use std::io::{Read, Seek};

use crate::{
    byte_view::read_u64,
    id_values::{find_id_values, IdValues},
    zip_parser::read_at
};
use apkchan_common::*;

pub const APK_SIGNING_BLOCK_MAGIC: &[u8; 16] = b"APK Sig Block 42";
/// Leading size + trailing size + magic, with no pairs at all.
pub const APK_SIGNING_BLOCK_MIN_SIZE: u64 = 32;
/// Trailing size field plus magic.
pub const APK_SIGNING_BLOCK_FOOTER_SIZE: usize = 24;
// Android refuses anything larger than this
pub(crate) const APK_SIGNING_BLOCK_MAX_SIZE: u64 = i32::MAX as u64 - 8;

/// An APK Signing Block as it sits in the file, immediately before the
/// Central Directory.
///
/// ```text
/// u64                  size of the block, not counting this field
/// repeated:
///     u64              size of the pair, not counting this field
///     u32              ID
///     (size - 4) bytes value
/// u64                  size of the block, same as above
/// [u8; 16]             magic "APK Sig Block 42"
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SigningBlock {
    pub bytes: Vec<u8>,
    // From start of file
    pub offset: u64
}

impl SigningBlock {
    /// Where the block stops, which is also where the Central Directory starts.
    pub fn end(&self) -> u64 {
        self.offset + self.bytes.len() as u64
    }

    /// Looks up ID-value pairs in this block, see [find_id_values].
    pub fn id_values(&self, ids: &[u32]) -> Result<IdValues<'_>> {
        find_id_values(&self.bytes, ids)
    }
}

/// Finds the APK Signing Block that ends exactly at `cd_offset`.
pub fn find_signing_block<R: Read + Seek>(reader: &mut R, cd_offset: u64) -> Result<SigningBlock> {
    if cd_offset < APK_SIGNING_BLOCK_MIN_SIZE {
        return Err(ChanError::SigningBlockTooSmall(cd_offset));
    }

    let footer_offset = cd_offset - APK_SIGNING_BLOCK_FOOTER_SIZE as u64;
    let footer = read_at(reader, footer_offset, APK_SIGNING_BLOCK_FOOTER_SIZE)?;
    if &footer[8..] != APK_SIGNING_BLOCK_MAGIC {
        return Err(ChanError::NoSigningBlock);
    }

    let footer_size = read_u64(&footer, 0)?;
    if !(APK_SIGNING_BLOCK_FOOTER_SIZE as u64..=APK_SIGNING_BLOCK_MAX_SIZE).contains(&footer_size) {
        return Err(ChanError::SigningBlockSizeOutOfRange(footer_size));
    }

    // The leading size field doesn't count itself
    let total_len = footer_size + 8;
    let offset = cd_offset as i64 - total_len as i64;
    if offset <= 0 {
        return Err(ChanError::SigningBlockOffsetInvalid(offset));
    }
    let offset = offset as u64;

    let bytes = read_at(reader, offset, total_len as usize)?;
    let header_size = read_u64(&bytes, 0)?;
    if header_size != footer_size {
        return Err(ChanError::SigningBlockSizeMismatch {
            header: header_size,
            footer: footer_size
        });
    }

    log::debug!("Found APK Signing Block of {total_len} bytes at offset {offset}");
    Ok(SigningBlock { bytes, offset })
}
