use crate::cd::profile::EncoderProfile;
use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_DEVICE: &str = "/dev/cdrom";
/// Full paranoia: every verification and repair pass the source offers
pub const DEFAULT_PARANOIA_MODE: i32 = 255;

/// Ripper configuration
/// In debug builds: loads a .env file first, then reads the environment
#[derive(Clone, Debug, PartialEq)]
pub struct RipperConfig {
    /// CD drive device path
    pub device: String,
    /// Read mode handed to the source when it supports one
    pub paranoia_mode: i32,
    /// Encoder description parsed by the engine
    pub encoder_pipeline: String,
    /// File extension matching the encoder
    pub extension: String,
    /// Directory ripped tracks are written to
    pub output_dir: PathBuf,
}

impl Default for RipperConfig {
    fn default() -> Self {
        let profile = EncoderProfile::flac();
        RipperConfig {
            device: DEFAULT_DEVICE.to_string(),
            paranoia_mode: DEFAULT_PARANOIA_MODE,
            encoder_pipeline: profile.description,
            extension: profile.extension.to_string(),
            output_dir: default_output_dir(),
        }
    }
}

impl RipperConfig {
    /// Load configuration based on build mode
    pub fn load() -> Self {
        #[cfg(debug_assertions)]
        {
            if dotenvy::dotenv().is_ok() {
                tracing::info!("Config: Dev mode activated - loaded .env file");
            }
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from a variable lookup.
    ///
    /// - `CDRIP_DEVICE`: drive path
    /// - `CDRIP_PARANOIA_MODE`: integer read mode
    /// - `CDRIP_ENCODER`: profile id (`flac`, `vorbis`, `mp3`, `wav`) or a raw
    ///   encoder description
    /// - `CDRIP_EXTENSION`: extension for a raw encoder description
    /// - `CDRIP_OUTPUT_DIR`: output directory
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(device) = lookup("CDRIP_DEVICE").filter(|v| !v.trim().is_empty()) {
            config.device = device;
        }

        if let Some(mode) = lookup("CDRIP_PARANOIA_MODE") {
            match mode.trim().parse::<i32>() {
                Ok(mode) => config.paranoia_mode = mode,
                Err(_) => warn!("Config: Ignoring invalid CDRIP_PARANOIA_MODE: {}", mode),
            }
        }

        if let Some(encoder) = lookup("CDRIP_ENCODER").filter(|v| !v.trim().is_empty()) {
            config.set_encoder(&encoder);
        }

        if let Some(extension) = lookup("CDRIP_EXTENSION").filter(|v| !v.trim().is_empty()) {
            config.extension = extension.trim_start_matches('.').to_string();
        }

        if let Some(dir) = lookup("CDRIP_OUTPUT_DIR").filter(|v| !v.trim().is_empty()) {
            config.output_dir = PathBuf::from(dir);
        }

        config
    }

    /// Use a profile id, or treat `encoder` as a raw description
    pub fn set_encoder(&mut self, encoder: &str) {
        match EncoderProfile::by_id(encoder) {
            Some(profile) => {
                self.encoder_pipeline = profile.description;
                self.extension = profile.extension.to_string();
            }
            None => {
                self.encoder_pipeline = encoder.trim().to_string();
            }
        }
    }

    /// Built-in profile the encoder description came from, if any
    pub fn profile(&self) -> Option<EncoderProfile> {
        EncoderProfile::all()
            .into_iter()
            .find(|profile| profile.description == self.encoder_pipeline)
    }

    /// Output path for a track number
    pub fn track_path(&self, track_number: u32) -> PathBuf {
        self.output_dir
            .join(format!("{:02}.{}", track_number, self.extension))
    }
}

fn default_output_dir() -> PathBuf {
    dirs::audio_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cdrip")
}
