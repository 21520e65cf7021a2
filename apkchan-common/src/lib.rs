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

use std::{fmt, io, path::PathBuf, rc::Rc};

use deku::prelude::*;

/// Common error type making it easier to share `Result`s between apkchan crates.
///
/// In general designed to avoid needing utilities like `map_err`.
#[derive(Debug, Clone)]
pub enum ChanError {
    /// apkchan-cli encountered an error while processing something specific to
    /// the command line implementation.
    Cli(String),
    /// The file is smaller than the smallest possible End Of Central Directory
    /// record (22 bytes).
    ArchiveTooSmall(u64),
    /// No End Of Central Directory record could be found in the last
    /// `22 + 65535` bytes of the file. It is probably not a zip file.
    EocdNotFound,
    /// The Central Directory starts too early in the file for an APK Signing
    /// Block to fit in front of it.
    SigningBlockTooSmall(u64),
    /// The 16 bytes before the Central Directory are not the APK Signing Block
    /// magic. Expected for unsigned or v1-only archives.
    NoSigningBlock,
    /// The size field in the signing block footer is outside `[24, 2^31 - 8]`.
    SigningBlockSizeOutOfRange(u64),
    /// The signing block would have to start at or before the beginning of
    /// the file.
    SigningBlockOffsetInvalid(i64),
    /// The size fields at the start and end of the signing block disagree.
    SigningBlockSizeMismatch { header: u64, footer: u64 },
    /// Fewer than 8 bytes remained where an ID-value pair length was expected.
    /// `entry` is 1-based.
    TruncatedEntryHeader { entry: usize },
    /// An ID-value pair declared a length shorter than its ID or longer than
    /// the rest of the block. `entry` is 1-based.
    EntryLengthOutOfRange {
        entry: usize,
        length: u64,
        remaining: u64
    },
    /// A fixed-width read or write, or a range copy, ran past the end of its
    /// buffer.
    OutOfBounds { offset: usize, width: usize, len: usize },
    /// The file ended before a section could be read in full.
    ShortRead { expected: u64, actual: u64 },
    /// The EOCD points at a Central Directory which does not lie between the
    /// signing block and the EOCD itself.
    CentralDirectoryOutOfRange { offset: u64, eocd_offset: u64 },
    /// After growing the signing block, the Central Directory offset no longer
    /// fits in the 32-bit EOCD field.
    ArchiveTooLarge(u64),
    /// The archive already carries a channel entry. The encoded value is
    /// attached as text.
    ChannelAlreadyPresent(String),
    /// The channel entry exists but is not a flat JSON object of strings.
    ChannelDecodingFailed(Rc<serde_json::Error>),
    /// An output file exists and overwriting was not requested.
    OutputExists(PathBuf),
    /// The output location is missing or is not a directory.
    OutputNotADirectory(PathBuf),
    /// The input path is missing or is not a regular file.
    NotARegularFile(PathBuf),
    /// An extras argument was not a comma separated list of `key=value`.
    MalformedExtras(String),
    /// `generate` was called without any channel names.
    NoChannels,
    /// Serialising the new signing block failed. See [DekuError].
    ByteSerialisationFailed(DekuError),
    /// An error occurred while reading or writing a file.
    FileIoError(Rc<io::Error>)
}

/// Result type where the error is always [ChanError].
pub type Result<T> = std::result::Result<T, ChanError>;

impl fmt::Display for ChanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChanError::Cli(msg) => write!(f, "{msg}"),
            ChanError::ArchiveTooSmall(size) => {
                write!(f, "file of {size} bytes is too small to be a zip archive")
            }
            ChanError::EocdNotFound => {
                write!(f, "cannot find EOCD record, maybe a broken zip file")
            }
            ChanError::SigningBlockTooSmall(cd_offset) => write!(
                f,
                "archive too small for a signing block, central directory offset: {cd_offset}"
            ),
            ChanError::NoSigningBlock => {
                write!(f, "no APK Signing Block before ZIP Central Directory")
            }
            ChanError::SigningBlockSizeOutOfRange(size) => {
                write!(f, "APK Signing Block size out of range: {size}")
            }
            ChanError::SigningBlockOffsetInvalid(offset) => {
                write!(f, "invalid offset for APK Signing Block: {offset}")
            }
            ChanError::SigningBlockSizeMismatch { header, footer } => write!(
                f,
                "APK Signing Block header/footer size mismatch: header {header}, footer {footer}"
            ),
            ChanError::TruncatedEntryHeader { entry } => {
                write!(f, "APK Signing Block broken on entry #{entry}: truncated entry header")
            }
            ChanError::EntryLengthOutOfRange {
                entry,
                length,
                remaining
            } => write!(
                f,
                "APK Signing Block broken on entry #{entry}: entry length out of range, \
                 length={length}, remaining={remaining}"
            ),
            ChanError::OutOfBounds { offset, width, len } => write!(
                f,
                "access of {width} bytes at offset {offset} is out of bounds for {len} bytes"
            ),
            ChanError::ShortRead { expected, actual } => {
                write!(f, "read bytes count mismatched, expected {expected} but got {actual}")
            }
            ChanError::CentralDirectoryOutOfRange {
                offset,
                eocd_offset
            } => write!(
                f,
                "central directory offset {offset} is out of range, EOCD is at {eocd_offset}"
            ),
            ChanError::ArchiveTooLarge(cd_offset) => {
                write!(f, "central directory offset {cd_offset} does not fit in a zip archive")
            }
            ChanError::ChannelAlreadyPresent(raw) => {
                write!(f, "archive already carries a channel block {raw}")
            }
            ChanError::ChannelDecodingFailed(err) => {
                write!(f, "channel block is not valid: {err}")
            }
            ChanError::OutputExists(path) => write!(f, "file already exists {}", path.display()),
            ChanError::OutputNotADirectory(path) => {
                write!(f, "output {} is neither existing nor a directory", path.display())
            }
            ChanError::NotARegularFile(path) => {
                write!(f, "{} is not a regular file", path.display())
            }
            ChanError::MalformedExtras(extras) => {
                write!(f, "extras must look like key=value,key2=value2, got {extras:?}")
            }
            ChanError::NoChannels => write!(f, "no channel specified"),
            ChanError::ByteSerialisationFailed(err) => write!(f, "serialisation failed: {err}"),
            ChanError::FileIoError(err) => write!(f, "{err}")
        }
    }
}

impl std::error::Error for ChanError {}

/// Lets the binary hand errors straight to a string sink.
impl From<ChanError> for String {
    fn from(value: ChanError) -> Self {
        value.to_string()
    }
}

impl From<io::Error> for ChanError {
    fn from(value: io::Error) -> Self {
        ChanError::FileIoError(value.into())
    }
}

impl From<DekuError> for ChanError {
    fn from(value: DekuError) -> Self {
        ChanError::ByteSerialisationFailed(value)
    }
}

impl From<serde_json::Error> for ChanError {
    fn from(value: serde_json::Error) -> Self {
        ChanError::ChannelDecodingFailed(value.into())
    }
}
