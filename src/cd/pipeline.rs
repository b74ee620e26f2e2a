//! Construction of the four-stage rip pipeline:
//! cdda source -> queue -> encoder bin -> file sink

use crate::cd::engine::{BusMessage, EngineError, PipelineEngine, PropertyValue};
use crate::cd::ripper::RipperError;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub const PIPELINE_NAME: &str = "pipeline";
pub const SOURCE_URI: &str = "cdda://1";
pub const SOURCE_NAME: &str = "cddasrc";
pub const QUEUE_FACTORY: &str = "queue";
pub const SINK_FACTORY: &str = "filesink";
pub const TRACK_FORMAT_NICK: &str = "track";

pub const PROP_DEVICE: &str = "device";
pub const PROP_PARANOIA_MODE: &str = "paranoia-mode";
pub const PROP_TRACK: &str = "track";
pub const PROP_LOCATION: &str = "location";
pub const PROP_MAX_SIZE_TIME: &str = "max-size-time";

/// Amount of audio the queue may hold between the disc reader and the encoder
pub const QUEUE_MAX_TIME: Duration = Duration::from_secs(120);

/// Position of a stage in the rip pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRole {
    Source,
    Queue,
    Encoder,
    Sink,
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageRole::Source => "cdda source",
            StageRole::Queue => "queue",
            StageRole::Encoder => "encoder",
            StageRole::Sink => "file sink",
        };
        f.write_str(name)
    }
}

/// A constructed and linked rip pipeline
#[derive(Debug)]
pub struct RipPipeline<E: PipelineEngine> {
    pub graph: E::Graph,
    pub source: E::Stage,
    pub queue: E::Stage,
    pub encoder: E::Stage,
    pub sink: E::Stage,
}

/// Builds a fresh [`RipPipeline`] for each track
pub struct PipelineBuilder<'a, E: PipelineEngine> {
    engine: &'a E,
    device: &'a str,
    paranoia_mode: i32,
    encoder_pipeline: &'a str,
}

impl<'a, E: PipelineEngine> PipelineBuilder<'a, E> {
    pub fn new(engine: &'a E, device: &'a str, paranoia_mode: i32, encoder_pipeline: &'a str) -> Self {
        Self {
            engine,
            device,
            paranoia_mode,
            encoder_pipeline,
        }
    }

    /// Resolve the track format handle, reusing a previously resolved one
    pub fn resolve_track_format(&self, cached: &mut Option<E::Format>) {
        if cached.is_none() {
            *cached = self.engine.resolve_format(TRACK_FORMAT_NICK);
            debug!("Resolved track format: {:?}", cached);
        }
    }

    /// Construct, link and subscribe the pipeline.
    ///
    /// Bus messages are forwarded to `bus` only once every stage is in place,
    /// so a failed build never produces messages.
    pub fn build(&self, bus: mpsc::UnboundedSender<BusMessage>) -> Result<RipPipeline<E>, RipperError> {
        let graph = self
            .engine
            .create_graph(PIPELINE_NAME)
            .map_err(RipperError::PipelineCreation)?;

        match self.assemble(&graph, bus) {
            Ok([source, queue, encoder, sink]) => {
                info!(
                    "Built rip pipeline for {} (paranoia mode {}): {}",
                    self.device, self.paranoia_mode, self.encoder_pipeline
                );
                Ok(RipPipeline {
                    graph,
                    source,
                    queue,
                    encoder,
                    sink,
                })
            }
            Err(e) => {
                self.engine.release_graph(graph);
                Err(e)
            }
        }
    }

    /// Create the stages, add them to `graph` and link them.
    /// Returns them in chain order.
    fn assemble(
        &self,
        graph: &E::Graph,
        bus: mpsc::UnboundedSender<BusMessage>,
    ) -> Result<[E::Stage; 4], RipperError> {
        let engine = self.engine;

        let source = engine
            .create_stage_from_uri(SOURCE_URI, SOURCE_NAME)
            .map_err(|e| RipperError::stage(StageRole::Source, e))?;

        engine
            .set_property(&source, PROP_DEVICE, PropertyValue::from(self.device))
            .map_err(|e| RipperError::stage(StageRole::Source, e))?;

        if engine.supports_property(&source, PROP_PARANOIA_MODE) {
            engine
                .set_property(&source, PROP_PARANOIA_MODE, PropertyValue::from(self.paranoia_mode))
                .map_err(|e| RipperError::stage(StageRole::Source, e))?;
        } else {
            debug!("Source does not support {}, ignoring read mode", PROP_PARANOIA_MODE);
        }

        let encoder = engine.parse_bin(self.encoder_pipeline).map_err(|e| match e {
            EngineError::Parse(message) => RipperError::EncoderParse(message),
            other => RipperError::EncoderParse(other.to_string()),
        })?;

        let queue = engine
            .create_stage(QUEUE_FACTORY, QUEUE_FACTORY)
            .map_err(|e| RipperError::stage(StageRole::Queue, e))?;

        engine
            .set_property(&queue, PROP_MAX_SIZE_TIME, PropertyValue::Time(QUEUE_MAX_TIME))
            .map_err(|e| RipperError::stage(StageRole::Queue, e))?;

        let sink = engine
            .create_stage(SINK_FACTORY, SINK_FACTORY)
            .map_err(|e| RipperError::stage(StageRole::Sink, e))?;

        let chain = [&source, &queue, &encoder, &sink];
        engine.add_stages(graph, &chain).map_err(RipperError::Link)?;
        engine.link_stages(&chain).map_err(RipperError::Link)?;

        engine.subscribe_messages(graph, bus).map_err(RipperError::Link)?;

        Ok([source, queue, encoder, sink])
    }
}
