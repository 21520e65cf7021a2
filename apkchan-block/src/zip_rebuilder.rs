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

use std::{
    io::{Read, Seek, Write},
    rc::Rc
};

use deku::DekuContainerWrite;

use crate::{
    channel_info::ChannelInfo,
    signing_block::{find_signing_block, SigningBlock},
    signing_types::{ApkSigningBlock, SigningBlockIdValuePair},
    zip_parser::{find_eocd, read_at, Eocd},
    APK_CHANNEL_BLOCK_ID
};
use apkchan_common::*;

/// Above this, holding the start of the archive in memory gets noticeable.
pub const LARGE_PREFIX_WARNING_BYTES: u64 = 64 * 1024 * 1024;

/// An archive split around its APK Signing Block.
///
/// The contents before the signing block and the Central Directory are
/// shared between an instance and every variant derived from it, since
/// rewriting never touches them.
#[derive(Debug, Clone)]
pub struct ZipSections {
    pub before_signing_block: Rc<[u8]>,
    pub signing_block: SigningBlock,
    pub central_dir: Rc<[u8]>,
    pub central_dir_offset: u64,
    pub eocd: Eocd
}

impl ZipSections {
    /// Locates the EOCD and signing block of an archive and reads all four
    /// sections into memory.
    pub fn read_from<R: Read + Seek>(reader: &mut R) -> Result<ZipSections> {
        let eocd = find_eocd(reader)?;
        let central_dir_offset = eocd.cd_offset()? as u64;
        let signing_block = find_signing_block(reader, central_dir_offset)?;

        if central_dir_offset > eocd.offset {
            return Err(ChanError::CentralDirectoryOutOfRange {
                offset: central_dir_offset,
                eocd_offset: eocd.offset
            });
        }
        // The Central Directory is everything between the signing block and
        // the EOCD; the size field is only checked, not trusted.
        let central_dir_len = eocd.offset - central_dir_offset;
        let declared_len = eocd.cd_size()? as u64;
        if central_dir_len != declared_len {
            log::debug!(
                "Central Directory declares {declared_len} bytes but spans {central_dir_len}"
            );
        }

        if signing_block.offset >= LARGE_PREFIX_WARNING_BYTES {
            log::warn!(
                "Reading {} MB before the APK Signing Block into memory",
                signing_block.offset / 1024 / 1024
            );
        }
        let before_signing_block = read_at(reader, 0, signing_block.offset as usize)?;
        let central_dir = read_at(reader, central_dir_offset, central_dir_len as usize)?;

        Ok(ZipSections {
            before_signing_block: before_signing_block.into(),
            signing_block,
            central_dir: central_dir.into(),
            central_dir_offset,
            eocd
        })
    }

    /// Total length of the archive these sections make up.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        (self.before_signing_block.len()
            + self.signing_block.bytes.len()
            + self.central_dir.len()
            + self.eocd.bytes.len()) as u64
    }

    /// Returns a variant of this archive carrying `info` in its channel pair.
    ///
    /// Fails if the archive already has a channel pair. If `info` encodes to
    /// nothing, the archive is returned unchanged.
    pub fn with_channel(&self, info: &ChannelInfo) -> Result<ZipSections> {
        let existing = self.signing_block.id_values(&[APK_CHANNEL_BLOCK_ID])?;
        if let Some(raw) = existing.get(&APK_CHANNEL_BLOCK_ID) {
            return Err(ChanError::ChannelAlreadyPresent(
                String::from_utf8_lossy(raw).into_owned()
            ));
        }

        match info.encode()? {
            Some(value) => self.with_id_value(APK_CHANNEL_BLOCK_ID, value),
            None => {
                log::debug!("Channel info is empty, leaving the signing block alone");
                Ok(self.clone())
            }
        }
    }

    /// Returns a variant of this archive with one more ID-value pair appended
    /// to its signing block, and the EOCD moved along to match.
    pub fn with_id_value(&self, id: u32, value: Vec<u8>) -> Result<ZipSections> {
        let new_block = ApkSigningBlock::extend(
            &self.signing_block.bytes,
            vec![SigningBlockIdValuePair { id, value }]
        )?
        .to_bytes()?;

        let delta = new_block.len() as i64 - self.signing_block.bytes.len() as i64;
        let new_cd_offset = self.central_dir_offset as i64 + delta;
        let new_cd_offset = u32::try_from(new_cd_offset)
            .map_err(|_| ChanError::ArchiveTooLarge(new_cd_offset as u64))?;
        let eocd = self.eocd.with_cd_offset(new_cd_offset)?;

        Ok(ZipSections {
            before_signing_block: self.before_signing_block.clone(),
            signing_block: SigningBlock {
                bytes: new_block,
                offset: self.signing_block.offset
            },
            central_dir: self.central_dir.clone(),
            central_dir_offset: new_cd_offset as u64,
            eocd: Eocd {
                offset: (eocd.offset as i64 + delta) as u64,
                ..eocd
            }
        })
    }

    /// Writes the four sections out in order.
    ///
    /// A failure part way through leaves `output` holding a partial archive.
    pub fn write_to<W: Write>(&self, output: &mut W) -> Result<()> {
        for section in [
            &self.before_signing_block[..],
            &self.signing_block.bytes,
            &self.central_dir[..],
            &self.eocd.bytes
        ] {
            output.write_all(section)?;
        }
        output.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, io::Cursor};

    use super::*;
    use crate::{
        read_channel_info, read_id_values, signing_block::tests::signing_block_bytes,
        zip_parser::tests::eocd_bytes, SIGNATURE_SCHEME_V2_BLOCK_ID,
        SIGNATURE_SCHEME_V3_BLOCK_ID
    };

    const LOCAL_FILES: &[u8] = b"PK\x03\x04 pretend local file headers and data";
    const CENTRAL_DIR: &[u8] = b"PK\x01\x02 pretend central directory entries";

    fn fixture(pairs: &[(u32, &[u8])], comment: &[u8]) -> Vec<u8> {
        let mut file = LOCAL_FILES.to_vec();
        file.extend(signing_block_bytes(pairs));
        let cd_offset = file.len() as u32;
        file.extend(CENTRAL_DIR);
        file.extend(eocd_bytes(
            cd_offset,
            CENTRAL_DIR.len() as u32,
            comment.len() as u16,
            comment
        ));
        file
    }

    fn rewrite(file: &[u8], info: &ChannelInfo) -> Result<Vec<u8>> {
        let sections = ZipSections::read_from(&mut Cursor::new(file))?;
        let mut out = vec![];
        sections.with_channel(info)?.write_to(&mut out)?;
        Ok(out)
    }

    #[test]
    fn splits_into_four_sections() {
        let file = fixture(&[(SIGNATURE_SCHEME_V2_BLOCK_ID, b"sig")], b"");
        let sections = ZipSections::read_from(&mut Cursor::new(&file)).unwrap();
        assert_eq!(&sections.before_signing_block[..], LOCAL_FILES);
        assert_eq!(&sections.central_dir[..], CENTRAL_DIR);
        assert_eq!(sections.len(), file.len() as u64);

        let mut out = vec![];
        sections.write_to(&mut out).unwrap();
        assert_eq!(out, file);
    }

    #[test]
    fn adds_channel_pair_and_moves_central_directory() {
        let file = fixture(&[(SIGNATURE_SCHEME_V2_BLOCK_ID, b"sig")], b"");
        let before = ZipSections::read_from(&mut Cursor::new(&file)).unwrap();
        let info = ChannelInfo::new("beta", BTreeMap::new());
        let out = rewrite(&file, &info).unwrap();

        let after = ZipSections::read_from(&mut Cursor::new(&out)).unwrap();
        let delta = (after.signing_block.bytes.len() - before.signing_block.bytes.len()) as u64;
        assert_eq!(delta, 8 + 4 + br#"{"channel":"beta"}"#.len() as u64);
        assert_eq!(after.central_dir_offset, before.central_dir_offset + delta);
        assert_eq!(
            &out[after.central_dir_offset as usize..][..CENTRAL_DIR.len()],
            CENTRAL_DIR
        );
        assert_eq!(after.before_signing_block, before.before_signing_block);
        assert_eq!(&after.eocd.bytes[..16], &before.eocd.bytes[..16]);
        assert_eq!(after.eocd.offset, before.eocd.offset + delta);

        let values = read_id_values(&mut Cursor::new(&out), &[]).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[&SIGNATURE_SCHEME_V2_BLOCK_ID], b"sig");

        let read_back = read_channel_info(&mut Cursor::new(&out)).unwrap().unwrap();
        assert_eq!(read_back.channel.as_deref(), Some("beta"));
        assert!(read_back.extras.is_empty());
    }

    #[test]
    fn keeps_every_existing_pair() {
        let file = fixture(
            &[
                (SIGNATURE_SCHEME_V2_BLOCK_ID, b"v2"),
                (SIGNATURE_SCHEME_V3_BLOCK_ID, b"v3"),
                (0x42726577, &[0u8; 64])
            ],
            b""
        );
        let out = rewrite(&file, &ChannelInfo::new("store", BTreeMap::new())).unwrap();
        let values = read_id_values(&mut Cursor::new(&out), &[]).unwrap();
        assert_eq!(values.len(), 4);
        assert_eq!(values[&SIGNATURE_SCHEME_V3_BLOCK_ID], b"v3");
        assert_eq!(values[&0x42726577], &[0u8; 64]);
    }

    #[test]
    fn keeps_the_archive_comment() {
        let comment = b"release PK\x05\x06 comment";
        let file = fixture(&[(SIGNATURE_SCHEME_V2_BLOCK_ID, b"sig")], comment);
        let out = rewrite(&file, &ChannelInfo::new("beta", BTreeMap::new())).unwrap();
        assert!(out.ends_with(comment));
        let info = read_channel_info(&mut Cursor::new(&out)).unwrap().unwrap();
        assert_eq!(info.channel.as_deref(), Some("beta"));
    }

    #[test]
    fn refuses_to_add_a_second_channel() {
        let file = fixture(
            &[
                (SIGNATURE_SCHEME_V2_BLOCK_ID, b"sig"),
                (APK_CHANNEL_BLOCK_ID, br#"{"channel":"old"}"#)
            ],
            b""
        );
        let err = rewrite(&file, &ChannelInfo::new("new", BTreeMap::new())).unwrap_err();
        assert!(matches!(err, ChanError::ChannelAlreadyPresent(raw) if raw.contains("old")));
    }

    #[test]
    fn empty_info_leaves_the_archive_alone() {
        let file = fixture(&[(SIGNATURE_SCHEME_V2_BLOCK_ID, b"sig")], b"");
        let out = rewrite(&file, &ChannelInfo::default()).unwrap();
        assert_eq!(out, file);
    }

    #[test]
    fn unsigned_archive_cannot_be_split() {
        let mut file = b"PK\x03\x04 local data, no signing block at all......".to_vec();
        let cd_offset = file.len() as u32;
        file.extend(CENTRAL_DIR);
        file.extend(eocd_bytes(cd_offset, CENTRAL_DIR.len() as u32, 0, &[]));
        assert!(matches!(
            ZipSections::read_from(&mut Cursor::new(&file)),
            Err(ChanError::NoSigningBlock)
        ));
    }

    #[test]
    fn central_directory_past_eocd_is_rejected() {
        // The only signing block sits in the archive comment, so the EOCD has
        // to point past itself to reach it.
        let block = signing_block_bytes(&[(SIGNATURE_SCHEME_V2_BLOCK_ID, b"sig")]);
        let mut file = LOCAL_FILES.to_vec();
        let cd_offset = (file.len() + 22 + block.len()) as u32;
        file.extend(eocd_bytes(cd_offset, 0, block.len() as u16, &block));
        assert!(matches!(
            ZipSections::read_from(&mut Cursor::new(&file)),
            Err(ChanError::CentralDirectoryOutOfRange { .. })
        ));
    }
}
