//! CD ripping module
//!
//! Rips audio CD tracks through a media pipeline engine: a cdda source, a
//! buffering queue, a caller-supplied encoder and a file sink. The session
//! reports progress, the encoded MIME type, completion and errors through
//! callbacks.

pub mod callbacks;
pub mod dispatcher;
pub mod engine;
#[cfg(feature = "gstreamer")]
pub mod gst;
pub mod mime;
pub mod pipeline;
pub mod profile;
pub mod progress;
pub mod ripper;
pub mod tags;

pub use callbacks::{RipEvent, RipperCallbacks};
pub use engine::{BusMessage, EngineError, NegotiatedFormat, PipelineEngine, PropertyValue, StreamState};
#[cfg(feature = "gstreamer")]
pub use gst::GstEngine;
pub use mime::preferred_mime_type;
pub use pipeline::{PipelineBuilder, RipPipeline};
pub use profile::{EncoderDescription, EncoderProfile};
pub use progress::{ProgressMonitor, PROGRESS_INTERVAL};
pub use ripper::{RipperError, RipperSession, SessionEvent, TrackRip};
pub use tags::{TagList, TagMergeMode};
