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

//! Reads and writes the channel ID-value pair inside an APK Signing Block.
//!
//! The pair lives next to the v2/v3 signature pairs, which sign everything
//! in the archive except the signing block itself. Adding a pair therefore
//! leaves every signature valid, as long as the Central Directory offset in
//! the EOCD is moved along with it.

use std::{
    collections::HashMap,
    io::{Read, Seek}
};

use apkchan_common::Result;
use signing_block::find_signing_block;
use zip_parser::find_eocd;

pub mod byte_view;
pub mod channel_info;
pub mod id_values;
pub mod signing_block;
pub mod signing_types;
pub mod zip_parser;
pub mod zip_rebuilder;

pub use channel_info::ChannelInfo;
pub use zip_rebuilder::ZipSections;

pub const SIGNATURE_SCHEME_V2_BLOCK_ID: u32 = 0x7109871A;
pub const SIGNATURE_SCHEME_V3_BLOCK_ID: u32 = 0xF05368C0;
/// ID of the pair holding [ChannelInfo].
pub const APK_CHANNEL_BLOCK_ID: u32 = 0x71777777;

/// Reads the values of the signing block pairs with the given IDs, or every
/// pair if `ids` is empty.
pub fn read_id_values<R: Read + Seek>(reader: &mut R, ids: &[u32]) -> Result<HashMap<u32, Vec<u8>>> {
    let eocd = find_eocd(reader)?;
    let signing_block = find_signing_block(reader, eocd.cd_offset()? as u64)?;
    let values = signing_block
        .id_values(ids)?
        .into_iter()
        .map(|(id, value)| (id, value.to_vec()))
        .collect();
    Ok(values)
}

/// Reads the raw value of the channel pair, if the archive has one.
pub fn read_channel_block<R: Read + Seek>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut values = read_id_values(reader, &[APK_CHANNEL_BLOCK_ID])?;
    Ok(values.remove(&APK_CHANNEL_BLOCK_ID))
}

/// Reads and decodes the channel pair, if the archive has one.
pub fn read_channel_info<R: Read + Seek>(reader: &mut R) -> Result<Option<ChannelInfo>> {
    read_channel_block(reader)?
        .map(|raw| ChannelInfo::decode(&raw))
        .transpose()
}
