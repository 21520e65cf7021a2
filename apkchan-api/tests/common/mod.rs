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

//! Fixture archives: real zips from the `zip` crate with a hand-made APK
//! Signing Block spliced in front of the Central Directory.

#![allow(dead_code)]

use std::{
    fs,
    io::{Cursor, Write},
    path::{Path, PathBuf}
};

use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

pub const SIGNATURE_SCHEME_V2_BLOCK_ID: u32 = 0x7109871A;
pub const APK_CHANNEL_BLOCK_ID: u32 = 0x71777777;
pub const MANIFEST: &[u8] = b"<manifest package=\"com.example.app\"/>";
pub const DEX: &[u8] = b"dex\n035\0 not really bytecode but it compresses well well well well";

pub fn zip_bytes(comment: Option<&str>) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(vec![]));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    zip.start_file("AndroidManifest.xml", stored).unwrap();
    zip.write_all(MANIFEST).unwrap();
    zip.start_file("classes.dex", deflated).unwrap();
    zip.write_all(DEX).unwrap();
    if let Some(comment) = comment {
        zip.set_comment(comment);
    }
    zip.finish().unwrap().into_inner()
}

pub fn signing_block(pairs: &[(u32, &[u8])]) -> Vec<u8> {
    let mut body = vec![];
    for (id, value) in pairs {
        body.extend((value.len() as u64 + 4).to_le_bytes());
        body.extend(id.to_le_bytes());
        body.extend(*value);
    }
    let size = (body.len() + 24) as u64;
    let mut block = size.to_le_bytes().to_vec();
    block.extend(body);
    block.extend(size.to_le_bytes());
    block.extend(b"APK Sig Block 42");
    block
}

/// Offset of the EOCD, assuming the comment (if any) is `comment_len` bytes.
pub fn eocd_offset(archive: &[u8], comment_len: usize) -> usize {
    archive.len() - 22 - comment_len
}

pub fn cd_offset(archive: &[u8], comment_len: usize) -> u32 {
    let field = eocd_offset(archive, comment_len) + 16;
    u32::from_le_bytes(archive[field..field + 4].try_into().unwrap())
}

/// Inserts `block` right before the Central Directory and moves the EOCD's
/// Central Directory offset to match.
pub fn splice_signing_block(archive: &[u8], comment_len: usize, block: &[u8]) -> Vec<u8> {
    let cd_start = cd_offset(archive, comment_len) as usize;
    let field = eocd_offset(archive, comment_len) + 16;
    let mut out = archive[..cd_start].to_vec();
    out.extend(block);
    out.extend(&archive[cd_start..]);
    let new_cd_start = (cd_start + block.len()) as u32;
    let field = field + block.len();
    out[field..field + 4].copy_from_slice(&new_cd_start.to_le_bytes());
    out
}

/// A "signed" APK with a single v2 signature pair.
pub fn signed_apk(comment: Option<&str>) -> Vec<u8> {
    let block = signing_block(&[(SIGNATURE_SCHEME_V2_BLOCK_ID, b"pretend v2 signature")]);
    splice_signing_block(&zip_bytes(comment), comment.map_or(0, str::len), &block)
}

pub fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

/// Checks the archive still opens as a zip and its files are intact.
pub fn assert_zip_intact(bytes: &[u8]) {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    assert_eq!(archive.len(), 2);
    for (name, expected) in [("AndroidManifest.xml", MANIFEST), ("classes.dex", DEX)] {
        let mut contents = vec![];
        std::io::copy(&mut archive.by_name(name).unwrap(), &mut contents).unwrap();
        assert_eq!(contents, expected, "{name} changed");
    }
}
