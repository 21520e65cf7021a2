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

use deku::prelude::*;

use crate::signing_block::{
    APK_SIGNING_BLOCK_FOOTER_SIZE, APK_SIGNING_BLOCK_MAX_SIZE, APK_SIGNING_BLOCK_MIN_SIZE
};
use apkchan_common::*;

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct ApkSigningBlock {
    // Size of this structure MINUS this field!
    // This field appears twice, the 'minus' is only for one of them.
    // So if the structure is 128 bytes, this reads 120, NOT 112.
    pub size_of_self_not_counted: u64,
    // Pairs carried over from the source block, untouched. These hold the
    // signatures, so they must not be re-encoded.
    pub existing_pairs: Vec<u8>,
    pub pairs: SigningBlockPairs,
    pub size_of_self_counted: u64,
    pub magic: [u8; 16]
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct SigningBlockPairs {
    pub pairs: Vec<U64LengthPrefixed<SigningBlockIdValuePair>>
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct SigningBlockIdValuePair {
    pub id: u32,
    pub value: Vec<u8>
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct U64LengthPrefixed<T: DekuWriter> {
    pub length: u64,
    pub value: T
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct RawWrapper<T: DekuWriter> {
    pub value: T
}

pub fn len_pfx_u64<T: DekuWriter + Clone>(thing: T) -> Result<U64LengthPrefixed<T>> {
    let wrap = RawWrapper {
        value: thing.clone()
    };

    Ok(U64LengthPrefixed {
        length: wrap.to_bytes()?.len() as u64,
        value: thing
    })
}

impl ApkSigningBlock {
    /// Builds a block holding every pair of `source` followed by `new_pairs`.
    ///
    /// `source` is a whole signing block as read from an archive. Its pairs
    /// and magic are copied verbatim.
    pub fn extend(
        source: &[u8],
        new_pairs: Vec<SigningBlockIdValuePair>
    ) -> Result<ApkSigningBlock> {
        if (source.len() as u64) < APK_SIGNING_BLOCK_MIN_SIZE {
            return Err(ChanError::OutOfBounds {
                offset: 0,
                width: APK_SIGNING_BLOCK_MIN_SIZE as usize,
                len: source.len()
            });
        }
        let footer_start = source.len() - APK_SIGNING_BLOCK_FOOTER_SIZE;
        let existing_pairs = source[8..footer_start].to_vec();
        let mut magic = [0u8; 16];
        magic.copy_from_slice(&source[source.len() - 16..]);

        let pairs = SigningBlockPairs {
            pairs: new_pairs
                .into_iter()
                .map(len_pfx_u64)
                .collect::<Result<Vec<_>>>()?
        };

        let pairs_length = existing_pairs.len() + pairs.to_bytes()?.len();
        let sig_block_size = block_size(pairs_length)?;

        Ok(ApkSigningBlock {
            size_of_self_not_counted: sig_block_size,
            existing_pairs,
            pairs,
            size_of_self_counted: sig_block_size,
            magic
        })
    }
}

/// Size field value for a block whose pairs take `pairs_length` bytes.
///
/// Readers reject blocks above the Android limit, so writing one is an error.
fn block_size(pairs_length: usize) -> Result<u64> {
    // Plus size_of_self_counted plus magic
    let size = pairs_length as u64 + 8 + 16;
    if size > APK_SIGNING_BLOCK_MAX_SIZE {
        return Err(ChanError::SigningBlockSizeOutOfRange(size));
    }
    Ok(size)
}
