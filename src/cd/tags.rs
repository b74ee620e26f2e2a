//! Tag lists handed to tag-setting encoder stages

use crate::cd::engine::PropertyValue;

pub const TITLE: &str = "title";
pub const ARTIST: &str = "artist";
pub const ALBUM: &str = "album";
pub const ALBUM_ARTIST: &str = "album-artist";
pub const GENRE: &str = "genre";
pub const TRACK_NUMBER: &str = "track-number";
pub const TRACK_COUNT: &str = "track-count";
pub const DISC_NUMBER: &str = "album-disc-number";
pub const ENCODER: &str = "encoder";
pub const ENCODER_VERSION: &str = "encoder-version";
pub const MUSICBRAINZ_DISCID: &str = "musicbrainz-discid";

/// How a tag list combines with the tags a stage already holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagMergeMode {
    /// Drop every existing tag, keep only the new ones
    ReplaceAll,
    /// New values replace existing values of the same tag
    Replace,
    /// New values are added after existing values
    Append,
    /// New values are added before existing values
    Prepend,
    /// Existing values win
    Keep,
    /// Keep everything that exists, ignore the new list
    KeepAll,
}

/// Ordered list of tag name / value pairs. A tag may carry several values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagList {
    entries: Vec<(String, PropertyValue)>,
}

impl TagList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tag: &str, value: impl Into<PropertyValue>) -> Self {
        self.add(tag, value);
        self
    }

    pub fn add(&mut self, tag: &str, value: impl Into<PropertyValue>) {
        self.entries.push((tag.to_string(), value.into()));
    }

    pub fn get(&self, tag: &str) -> Option<&PropertyValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == tag)
            .map(|(_, value)| value)
    }

    pub fn values<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a PropertyValue> + 'a {
        self.entries
            .iter()
            .filter(move |(name, _)| name == tag)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.get(tag).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Combine `other` into this list following `mode`
    pub fn merge(&mut self, other: &TagList, mode: TagMergeMode) {
        match mode {
            TagMergeMode::ReplaceAll => {
                self.entries = other.entries.clone();
            }
            TagMergeMode::Replace => {
                self.entries
                    .retain(|(name, _)| !other.contains(name));
                self.entries.extend(other.entries.iter().cloned());
            }
            TagMergeMode::Append => {
                self.entries.extend(other.entries.iter().cloned());
            }
            TagMergeMode::Prepend => {
                let mut merged = other.entries.clone();
                merged.append(&mut self.entries);
                self.entries = merged;
            }
            TagMergeMode::Keep => {
                let missing: Vec<_> = other
                    .entries
                    .iter()
                    .filter(|(name, _)| !self.contains(name))
                    .cloned()
                    .collect();
                self.entries.extend(missing);
            }
            TagMergeMode::KeepAll => {}
        }
    }

    /// Tags identifying this program as the encoder of the output file
    pub fn encoder_identity() -> Self {
        TagList::new()
            .with(ENCODER, format!("cdrip {}", env!("CARGO_PKG_VERSION")))
            .with(ENCODER_VERSION, encoder_version_number())
    }
}

/// Package version packed as `major * 10000 + minor * 100 + patch`
pub fn encoder_version_number() -> u32 {
    let part = |s: &str| s.parse::<u32>().unwrap_or(0);
    part(env!("CARGO_PKG_VERSION_MAJOR")) * 10_000
        + part(env!("CARGO_PKG_VERSION_MINOR")) * 100
        + part(env!("CARGO_PKG_VERSION_PATCH"))
}
