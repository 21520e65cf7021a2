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

use std::{collections::BTreeMap, fmt};

use apkchan_common::*;

/// Key of the channel name inside the encoded bundle.
pub const CHANNEL_KEY: &str = "channel";

/// Distribution channel metadata carried in the channel ID-value pair.
///
/// The value is a flat JSON object of strings. `channel` is pulled out into
/// its own field and everything else lands in `extras`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelInfo {
    pub channel: Option<String>,
    pub extras: BTreeMap<String, String>,
    // Bytes this was decoded from, if any
    raw: Option<Vec<u8>>
}

impl ChannelInfo {
    pub fn new(channel: impl Into<String>, extras: BTreeMap<String, String>) -> ChannelInfo {
        ChannelInfo {
            channel: Some(channel.into()),
            extras,
            raw: None
        }
    }

    /// Decodes the value of a channel pair read from an archive.
    ///
    /// The bytes are kept and handed back unchanged by [ChannelInfo::encode].
    pub fn decode(raw: &[u8]) -> Result<ChannelInfo> {
        let mut extras: BTreeMap<String, String> = serde_json::from_slice(raw)?;
        let channel = extras.remove(CHANNEL_KEY);
        Ok(ChannelInfo {
            channel,
            extras,
            raw: Some(raw.to_vec())
        })
    }

    /// The bytes this info was decoded from.
    pub fn raw(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    /// Returns the bytes to store in the channel pair, or `None` when there is
    /// nothing worth storing.
    ///
    /// Decoded infos return their original bytes, so fields this crate doesn't
    /// know about survive a round trip.
    pub fn encode(&self) -> Result<Option<Vec<u8>>> {
        if let Some(raw) = &self.raw {
            return Ok(Some(raw.clone()));
        }

        let channel = self.channel.as_deref().filter(|c| !c.is_empty());
        if channel.is_none() && self.extras.is_empty() {
            return Ok(None);
        }

        let mut fields = vec![];
        if let Some(channel) = channel {
            fields.push(encode_field(CHANNEL_KEY, channel)?);
        }
        for (key, value) in &self.extras {
            fields.push(encode_field(key, value)?);
        }
        Ok(Some(format!("{{{}}}", fields.join(",")).into_bytes()))
    }
}

fn encode_field(key: &str, value: &str) -> Result<String> {
    Ok(format!(
        "{}:{}",
        serde_json::to_string(key)?,
        serde_json::to_string(value)?
    ))
}

/// Renders the encoded bundle as text, or nothing if there's nothing to encode.
impl fmt::Display for ChannelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.encode() {
            Ok(Some(bytes)) => write!(f, "{}", String::from_utf8_lossy(&bytes)),
            _ => Ok(())
        }
    }
}
