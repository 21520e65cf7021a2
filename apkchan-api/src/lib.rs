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

//! # apkchan API
//!
//! File-level operations for tagging signed APKs with a distribution channel
//! without re-signing them.
//!
//! ## Reading a channel
//!
//! ```no_run
//! let info = apkchan_api::inspect("app-release.apk".as_ref())?;
//! if let Some(info) = info {
//!     println!("channel={}", info.channel.unwrap_or_default());
//! }
//! # Ok::<(), apkchan_api::ChanError>(())
//! ```
//!
//! ## Writing channels
//!
//! ```no_run
//! # use std::collections::BTreeMap;
//! let outcomes = apkchan_api::generate(
//!     None,
//!     &["store".into(), "beta".into()],
//!     &BTreeMap::new(),
//!     "app-release.apk".as_ref(),
//!     &apkchan_api::GenerateOptions::default()
//! )?;
//! // app-release-store.apk and app-release-beta.apk next to the input
//! # Ok::<(), apkchan_api::ChanError>(())
//! ```

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufReader, BufWriter},
    path::{Path, PathBuf},
    time::Instant
};

use apkchan_block::{read_channel_block, read_channel_info, ZipSections};
use log::Level;

pub use apkchan_block::ChannelInfo;
pub use apkchan_common::{ChanError, Result};

/// Knobs for [generate] that the caller passes through from its own
/// configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Replace output files that already exist.
    pub overwrite: bool,
    /// Log section layout and timings at `info` instead of `debug`.
    pub debug: bool
}

impl GenerateOptions {
    fn detail_level(&self) -> Level {
        if self.debug {
            Level::Info
        } else {
            Level::Debug
        }
    }
}

/// What happened to a single channel during [generate].
#[derive(Debug, Clone)]
pub struct ChannelOutcome {
    pub channel: String,
    pub output: PathBuf,
    pub result: Result<()>
}

/// Reads the channel info of a single archive.
///
/// Returns `Ok(None)` for a signed archive without a channel pair.
pub fn inspect(path: &Path) -> Result<Option<ChannelInfo>> {
    ensure_regular_file(path)?;
    let mut reader = BufReader::new(File::open(path)?);
    read_channel_info(&mut reader)
}

/// Writes one copy of `input` per channel into `output_dir`, each carrying
/// that channel plus `extras`.
///
/// Problems with the input itself fail the whole call. Once the input has
/// been read, each channel succeeds or fails on its own and is reported in
/// the returned list, in the same order as `channels`.
pub fn generate(
    output_dir: Option<&Path>,
    channels: &[String],
    extras: &BTreeMap<String, String>,
    input: &Path,
    options: &GenerateOptions
) -> Result<Vec<ChannelOutcome>> {
    ensure_regular_file(input)?;
    let output_dir = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    };
    if !output_dir.as_os_str().is_empty() && !output_dir.is_dir() {
        return Err(ChanError::OutputNotADirectory(output_dir));
    }
    if channels.is_empty() {
        return Err(ChanError::NoChannels);
    }

    let start = Instant::now();
    let mut reader = BufReader::new(File::open(input)?);
    // TODO: allow re-tagging an already channelled archive by dropping the old pair
    if let Some(raw) = read_channel_block(&mut reader)? {
        return Err(ChanError::ChannelAlreadyPresent(
            String::from_utf8_lossy(&raw).into_owned()
        ));
    }

    log::info!(
        "Generating channels {channels:?} for {} into {}",
        input.display(),
        output_dir.display()
    );
    let sections = ZipSections::read_from(&mut reader)?;
    drop(reader);
    log::log!(
        options.detail_level(),
        "archive length={}; signing block offset={}, length={}; \
         central directory offset={}, length={}; eocd offset={}, length={}",
        sections.len(),
        sections.signing_block.offset,
        sections.signing_block.bytes.len(),
        sections.central_dir_offset,
        sections.central_dir.len(),
        sections.eocd.offset,
        sections.eocd.bytes.len()
    );

    let outcomes = channels
        .iter()
        .map(|channel| {
            let output = output_dir.join(channel_file_name(input, channel));
            let info = ChannelInfo::new(channel.as_str(), extras.clone());
            let result = write_channel(&sections, &info, &output, options);
            ChannelOutcome {
                channel: channel.clone(),
                output,
                result
            }
        })
        .collect();

    log::log!(options.detail_level(), "Consumed {:?}", start.elapsed());
    Ok(outcomes)
}

fn write_channel(
    sections: &ZipSections,
    info: &ChannelInfo,
    output: &Path,
    options: &GenerateOptions
) -> Result<()> {
    if output.exists() {
        if !options.overwrite {
            return Err(ChanError::OutputExists(output.to_path_buf()));
        }
        log::info!(
            "Force generating channel {}",
            info.channel.as_deref().unwrap_or_default()
        );
    }

    let start = Instant::now();
    let channelled = sections.with_channel(info)?;
    let mut writer = BufWriter::new(File::create(output)?);
    channelled.write_to(&mut writer)?;
    log::log!(
        options.detail_level(),
        "    write {} consumed {:?}",
        output.display(),
        start.elapsed()
    );
    Ok(())
}

/// `<stem>-<channel><ext>`, where `<ext>` keeps its leading dot.
pub fn channel_file_name(input: &Path, channel: &str) -> String {
    let (stem, ext) = split_extension(input);
    format!("{stem}-{channel}{ext}")
}

/// Splits a file name at its last dot, e.g. `app.release.apk` becomes
/// `("app.release", ".apk")`. Names without a dot get an empty extension.
pub fn split_extension(path: &Path) -> (String, String) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.rfind('.') {
        Some(dot) => (name[..dot].to_string(), name[dot..].to_string()),
        None => (name, String::new())
    }
}

/// Parses `key=value,key2=value2` into a map.
///
/// Values may contain `=`; only the first one splits. Empty keys are rejected.
pub fn parse_extras(extras: &str) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for pair in extras.split(',') {
        match pair.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                map.insert(key.to_string(), value.to_string());
            }
            _ => return Err(ChanError::MalformedExtras(extras.to_string()))
        }
    }
    Ok(map)
}

fn ensure_regular_file(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => Ok(()),
        _ => Err(ChanError::NotARegularFile(path.to_path_buf()))
    }
}
