//! MIME type detection for encoded output
//!
//! Once the pipeline prerolls, every output port inside the encoder bin has a
//! negotiated format. The ripper picks the one that best describes the file
//! being written.

use crate::cd::engine::{NegotiatedFormat, PipelineEngine, StreamState};
use tracing::debug;

/// True for the transition that happens right after a rip is started:
/// ready -> paused while heading for playing. Formats are negotiated by then.
pub fn is_probe_trigger(old: StreamState, current: StreamState, pending: StreamState) -> bool {
    old == StreamState::Ready && current == StreamState::Paused && pending == StreamState::Playing
}

/// Apply the MIME precedence rules to formats in discovery order.
///
/// - `audio/mpeg` with an `mpegversion` is always taken, mapped to
///   `audio/mp2` or `audio/mp4` for versions 2 and 4
/// - the first non-raw format is taken if nothing was chosen yet
/// - `application/*` containers always override what came before
pub fn preferred_mime_type<'a, I>(formats: I) -> Option<String>
where
    I: IntoIterator<Item = &'a NegotiatedFormat>,
{
    let mut preferred: Option<String> = None;

    for format in formats {
        let media_type = format.media_type.as_str();

        if media_type.starts_with("audio/mpeg") {
            if let Some(version) = format.int("mpegversion") {
                let mapped = match version {
                    2 => "audio/mp2",
                    4 => "audio/mp4",
                    _ => media_type,
                };
                preferred = Some(mapped.to_string());
                continue;
            }
        }

        if preferred.is_none() && !media_type.starts_with("audio/x-raw") {
            preferred = Some(media_type.to_string());
        } else if media_type.starts_with("application/") {
            preferred = Some(media_type.to_string());
        }
    }

    preferred
}

/// Collect the negotiated format of every output port of every stage nested
/// inside `encoder`
pub fn negotiated_formats<E: PipelineEngine>(engine: &E, encoder: &E::Stage) -> Vec<NegotiatedFormat> {
    engine
        .stages_recursive(encoder)
        .iter()
        .flat_map(|stage| engine.output_ports(stage))
        .filter_map(|port| engine.negotiated_format(&port))
        .collect()
}

pub fn probe_encoder<E: PipelineEngine>(engine: &E, encoder: &E::Stage) -> Option<String> {
    let formats = negotiated_formats(engine, encoder);
    debug!("Probing {} negotiated formats in encoder", formats.len());
    preferred_mime_type(&formats)
}
