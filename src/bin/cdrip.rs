use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use cdrip::cd::profile::profile_available;
use cdrip::cd::tags::{self, TagList, TagMergeMode};
use cdrip::cd::{GstEngine, RipperSession};
use cdrip::RipperConfig;

#[derive(Debug, Default)]
struct Args {
    tracks: Vec<u32>,
    device: Option<String>,
    encoder: Option<String>,
    output_dir: Option<PathBuf>,
    paranoia_mode: Option<i32>,
    /// Tags shared by every ripped track
    album_tags: TagList,
}

#[tokio::main]
async fn main() {
    // Use RUST_LOG env var if set, otherwise default to info level
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let argv: Vec<String> = env::args().collect();
    let args = match parse_args(&argv) {
        Ok(args) => args,
        Err(message) => {
            error!("{}", message);
            print_usage(&argv[0]);
            std::process::exit(1);
        }
    };

    let mut config = RipperConfig::load();
    if let Some(device) = args.device.clone() {
        config.device = device;
    }
    if let Some(mode) = args.paranoia_mode {
        config.paranoia_mode = mode;
    }
    if let Some(encoder) = args.encoder.as_deref() {
        config.set_encoder(encoder);
    }
    if let Some(dir) = args.output_dir.clone() {
        config.output_dir = dir;
    }

    let engine = match GstEngine::init() {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to initialize media engine: {}", e);
            std::process::exit(1);
        }
    };

    if !profile_available(&engine, &config.encoder_pipeline) {
        error!("Encoder is not available: {}", config.encoder_pipeline);
        std::process::exit(1);
    }

    if let Err(e) = std::fs::create_dir_all(&config.output_dir) {
        error!("Cannot create {}: {}", config.output_dir.display(), e);
        std::process::exit(1);
    }

    info!("Device: {}", config.device);
    info!("Encoder: {}", config.encoder_pipeline);
    info!("Output: {}", config.output_dir.display());

    if let Err(message) = rip_tracks(engine, &config, &args).await {
        error!("{}", message);
        std::process::exit(1);
    }

    info!("✓ Ripped {} track(s)", args.tracks.len());
}

/// Rip every requested track in order, reusing one session
async fn rip_tracks(engine: GstEngine, config: &RipperConfig, args: &Args) -> Result<(), String> {
    let mut session = RipperSession::from_config(engine, config);
    let failure: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

    session.set_progress_callback(Some(Box::new(|elapsed_ms: u64| {
        print!("\r  {}:{:02}", elapsed_ms / 60_000, (elapsed_ms / 1000) % 60);
        let _ = std::io::stdout().flush();
    })));
    let expected_mime = config.profile().map(|profile| profile.mime_type);
    session.set_mime_type_callback(Some(Box::new(move |mime_type: &str| {
        info!("Encoding to {}", mime_type);
        if let Some(expected) = expected_mime.filter(|expected| *expected != mime_type) {
            warn!("Encoder produced {}, expected {}", mime_type, expected);
        }
    })));
    session.set_finished_callback(Some(Box::new(|| {
        println!();
    })));
    let failure_slot = failure.clone();
    session.set_error_callback(Some(Box::new(move |message: &str, debug: Option<&str>| {
        let text = match debug {
            Some(debug) => format!("{} ({})", message, debug),
            None => message.to_string(),
        };
        if let Ok(mut slot) = failure_slot.lock() {
            *slot = Some(text);
        }
    })));

    for &track in &args.tracks {
        let output_path = config.track_path(track);
        let tags = track_tags(args, track);

        info!("Track {} -> {}", track, output_path.display());
        let rip = session
            .start_track_rip(track, &output_path, Some(&tags))
            .map_err(|e| format!("Track {}: {}", track, e))?;
        if !rip.tagging_supported {
            info!("Encoder cannot tag, track {} will be untagged", track);
        }

        session.run().await;

        if let Some(message) = failure.lock().ok().and_then(|mut slot| slot.take()) {
            return Err(format!("Track {}: {}", track, message));
        }
        info!("✓ {}", output_path.display());
    }

    session.destroy();
    Ok(())
}

fn track_tags(args: &Args, track: u32) -> TagList {
    let mut list = TagList::new().with(tags::TRACK_NUMBER, track);
    list.merge(&args.album_tags, TagMergeMode::Append);
    list
}

fn parse_args(argv: &[String]) -> Result<Args, String> {
    let mut args = Args::default();

    let mut i = 1;
    while i < argv.len() {
        let flag = argv[i].as_str();
        let value = || {
            argv.get(i + 1)
                .cloned()
                .ok_or_else(|| format!("{} requires a value", flag))
        };

        match flag {
            "--track" => {
                let track = value()?;
                let track = track
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| format!("Invalid track number: {}", track))?;
                args.tracks.push(track);
            }
            "--device" => args.device = Some(value()?),
            "--profile" | "--encoder" => {
                if args.encoder.is_some() {
                    return Err("Use either --profile or --encoder, not both".to_string());
                }
                args.encoder = Some(value()?);
            }
            "--output" => args.output_dir = Some(PathBuf::from(value()?)),
            "--paranoia" => {
                let mode = value()?;
                args.paranoia_mode = Some(
                    mode.parse::<i32>()
                        .map_err(|_| format!("Invalid paranoia mode: {}", mode))?,
                );
            }
            "--title" => args.album_tags.add(tags::TITLE, value()?),
            "--artist" => args.album_tags.add(tags::ARTIST, value()?),
            "--album" => args.album_tags.add(tags::ALBUM, value()?),
            "--album-artist" => args.album_tags.add(tags::ALBUM_ARTIST, value()?),
            "--genre" => args.album_tags.add(tags::GENRE, value()?),
            "--discid" => args.album_tags.add(tags::MUSICBRAINZ_DISCID, value()?),
            "--disc" | "--track-count" => {
                let number = value()?;
                let number = number
                    .parse::<u32>()
                    .map_err(|_| format!("Invalid number for {}: {}", flag, number))?;
                let tag = if flag == "--disc" {
                    tags::DISC_NUMBER
                } else {
                    tags::TRACK_COUNT
                };
                args.album_tags.add(tag, number);
            }
            _ => return Err(format!("Unknown argument: {}", flag)),
        }
        i += 2;
    }

    if args.tracks.is_empty() {
        return Err("At least one --track is required".to_string());
    }
    Ok(args)
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} --track <n> [--track <n> ...] [options]", program);
    eprintln!();
    eprintln!("Rip audio CD tracks to files");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --device <path>      CD drive (default: $CDRIP_DEVICE or /dev/cdrom)");
    eprintln!("  --profile <id>       flac, vorbis, mp3 or wav (default: flac)");
    eprintln!("  --encoder <desc>     Raw encoder pipeline description");
    eprintln!("  --output <dir>       Output directory (default: $CDRIP_OUTPUT_DIR)");
    eprintln!("  --paranoia <mode>    Read mode passed to the source (default: 255)");
    eprintln!("  --title, --artist, --album, --album-artist, --genre <text>");
    eprintln!("                       Tags written to every ripped track");
    eprintln!("  --disc <n>           Disc number within the release");
    eprintln!("  --track-count <n>    Number of tracks on the disc");
    eprintln!("  --discid <id>        MusicBrainz disc id");
}
