//! Encoder profiles - named encoder descriptions with a file extension

use crate::cd::engine::PipelineEngine;
use std::fmt;

/// Builds an engine description string: elements with `key=value`
/// properties and caps filters, joined with ` ! `.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncoderDescription {
    parts: Vec<String>,
}

impl EncoderDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element, e.g. `element("lamemp3enc", &[("bitrate", "192")])`
    pub fn element(mut self, factory: &str, properties: &[(&str, &str)]) -> Self {
        self.push(factory, properties, ' ');
        self
    }

    /// Append a caps filter, e.g. `caps("audio/x-raw", &[("rate", "44100")])`
    pub fn caps(mut self, media_type: &str, fields: &[(&str, &str)]) -> Self {
        self.push(media_type, fields, ',');
        self
    }

    /// Append a pre-built fragment as is
    pub fn raw(mut self, fragment: &str) -> Self {
        let fragment = fragment.trim();
        if !fragment.is_empty() {
            self.parts.push(fragment.to_string());
        }
        self
    }

    fn push(&mut self, head: &str, pairs: &[(&str, &str)], separator: char) {
        let head = head.trim();
        if head.is_empty() {
            return;
        }

        let mut part = head.to_string();
        for (key, value) in pairs {
            part.push(separator);
            part.push_str(key.trim());
            part.push('=');
            part.push_str(value.trim());
        }
        self.parts.push(part);
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl fmt::Display for EncoderDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parts.join(" ! "))
    }
}

/// Built-in encoder profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderProfile {
    pub id: &'static str,
    pub name: &'static str,
    pub extension: &'static str,
    pub mime_type: &'static str,
    pub description: String,
}

impl EncoderProfile {
    pub const IDS: [&'static str; 4] = ["flac", "vorbis", "mp3", "wav"];

    pub fn flac() -> Self {
        EncoderProfile {
            id: "flac",
            name: "FLAC",
            extension: "flac",
            mime_type: "audio/x-flac",
            description: EncoderDescription::new()
                .element("audioconvert", &[])
                .element("flacenc", &[("quality", "5")])
                .to_string(),
        }
    }

    pub fn vorbis() -> Self {
        EncoderProfile {
            id: "vorbis",
            name: "Ogg Vorbis",
            extension: "ogg",
            mime_type: "application/ogg",
            description: EncoderDescription::new()
                .element("audioconvert", &[])
                .element("vorbisenc", &[("quality", "0.5")])
                .element("oggmux", &[])
                .to_string(),
        }
    }

    pub fn mp3() -> Self {
        EncoderProfile {
            id: "mp3",
            name: "MP3",
            extension: "mp3",
            mime_type: "application/x-id3",
            description: EncoderDescription::new()
                .element("audioconvert", &[])
                .element("lamemp3enc", &[("target", "bitrate"), ("bitrate", "192"), ("cbr", "true")])
                .element("xingmux", &[])
                .element("id3v2mux", &[])
                .to_string(),
        }
    }

    pub fn wav() -> Self {
        EncoderProfile {
            id: "wav",
            name: "Waveform PCM",
            extension: "wav",
            mime_type: "audio/x-wav",
            description: EncoderDescription::new()
                .element("audioconvert", &[])
                .element("wavenc", &[])
                .to_string(),
        }
    }

    pub fn by_id(id: &str) -> Option<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "flac" => Some(Self::flac()),
            "vorbis" | "ogg" => Some(Self::vorbis()),
            "mp3" => Some(Self::mp3()),
            "wav" => Some(Self::wav()),
            _ => None,
        }
    }

    pub fn all() -> Vec<Self> {
        Self::IDS.iter().filter_map(|id| Self::by_id(id)).collect()
    }

    /// Output file name for a track, e.g. `03.flac`
    pub fn file_name(&self, track_number: u32) -> String {
        format!("{:02}.{}", track_number, self.extension)
    }
}

/// A description is usable when the engine can build it
pub fn profile_available<E: PipelineEngine>(engine: &E, description: &str) -> bool {
    if description.trim().is_empty() {
        return false;
    }
    match engine.parse_bin(description) {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!("Encoder pipeline does not build: {} ({})", description, e);
            false
        }
    }
}
