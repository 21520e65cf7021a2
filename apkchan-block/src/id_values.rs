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

use std::collections::HashMap;

use crate::{
    byte_view::{read_u32, read_u64},
    signing_block::{APK_SIGNING_BLOCK_FOOTER_SIZE, APK_SIGNING_BLOCK_MIN_SIZE}
};
use apkchan_common::*;

/// ID-value pairs found in a signing block, borrowing their values from it.
pub type IdValues<'a> = HashMap<u32, &'a [u8]>;

/// Walks the ID-value pairs of a whole signing block (leading size field
/// through magic) and returns the values for `ids`, or every pair if `ids`
/// is empty.
///
/// If an ID appears more than once, the last pair wins.
pub fn find_id_values<'a>(block: &'a [u8], ids: &[u32]) -> Result<IdValues<'a>> {
    if (block.len() as u64) < APK_SIGNING_BLOCK_MIN_SIZE {
        return Err(ChanError::OutOfBounds {
            offset: 0,
            width: APK_SIGNING_BLOCK_MIN_SIZE as usize,
            len: block.len()
        });
    }

    let mut values = HashMap::new();
    let mut position = 8;
    let limit = block.len() - APK_SIGNING_BLOCK_FOOTER_SIZE;
    let mut entry = 0;
    while position < limit {
        entry += 1;
        if limit - position < 8 {
            return Err(ChanError::TruncatedEntryHeader { entry });
        }
        let length = read_u64(block, position)?;
        position += 8;

        let remaining = (limit - position) as u64;
        if length < 4 || length > remaining {
            return Err(ChanError::EntryLengthOutOfRange {
                entry,
                length,
                remaining
            });
        }
        let next_position = position + length as usize;
        let id = read_u32(block, position)?;
        if ids.is_empty() || ids.contains(&id) {
            values.insert(id, &block[position + 4..next_position]);
        }
        position = next_position;
    }

    Ok(values)
}
