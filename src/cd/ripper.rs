//! CD ripping session - drives one track at a time through the media engine

use crate::cd::callbacks::{
    ErrorCallback, FinishedCallback, MimeTypeCallback, ProgressCallback, RipperCallbacks,
};
use crate::cd::engine::{BusMessage, EngineError, PipelineEngine, PropertyValue, StreamState};
use crate::cd::pipeline::{PipelineBuilder, RipPipeline, StageRole, PROP_LOCATION, PROP_TRACK};
use crate::cd::progress::{sample_position, ProgressMonitor};
use crate::cd::tags::{TagList, TagMergeMode};
use crate::config::RipperConfig;
use std::ops::ControlFlow;
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum RipperError {
    #[error("Could not create pipeline: {0}")]
    PipelineCreation(EngineError),
    #[error("Could not create {stage} stage: {source}")]
    StageCreation { stage: StageRole, source: EngineError },
    #[error("Could not create encoder pipeline: {0}")]
    EncoderParse(String),
    #[error("Could not link pipeline elements: {0}")]
    Link(EngineError),
    #[error("Could not configure pipeline: {0}")]
    Configure(EngineError),
    #[error("Could not start pipeline: {0}")]
    Start(EngineError),
    #[error("A track is already being ripped")]
    AlreadyRipping,
}

impl RipperError {
    pub(crate) fn stage(stage: StageRole, source: EngineError) -> Self {
        RipperError::StageCreation { stage, source }
    }

    /// Short, user-facing message passed to the error callback
    pub fn message(&self) -> String {
        match self {
            RipperError::PipelineCreation(_) => "Could not create pipeline".to_string(),
            RipperError::StageCreation { stage, .. } => format!("Could not create {} stage", stage),
            RipperError::EncoderParse(_) => "Could not create encoder pipeline".to_string(),
            RipperError::Link(_) => "Could not link pipeline elements".to_string(),
            RipperError::Configure(_) => "Could not configure pipeline".to_string(),
            RipperError::Start(_) => "Could not start pipeline".to_string(),
            RipperError::AlreadyRipping => "A track is already being ripped".to_string(),
        }
    }

    /// Underlying cause, passed to the error callback as debug detail
    pub fn debug_detail(&self) -> Option<String> {
        match self {
            RipperError::PipelineCreation(e)
            | RipperError::StageCreation { source: e, .. }
            | RipperError::Link(e)
            | RipperError::Configure(e)
            | RipperError::Start(e) => Some(e.to_string()),
            RipperError::EncoderParse(message) => Some(message.clone()),
            RipperError::AlreadyRipping => None,
        }
    }
}

/// Outcome of a successfully started track rip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackRip {
    /// False when no stage in the encoder can embed tags; the file is still
    /// written, just without metadata
    pub tagging_supported: bool,
}

/// Something the session's event loop has to react to
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Message(BusMessage),
    ProgressTick,
}

/// One ripping session bound to a drive, read mode and encoder.
///
/// A session rips one track at a time and builds a new pipeline for every
/// track. It is driven by a single task: the public methods and the event
/// loop ([`RipperSession::run`]) are meant to be called from the same owner.
pub struct RipperSession<E: PipelineEngine> {
    pub(super) engine: E,
    device: String,
    paranoia_mode: i32,
    encoder_pipeline: String,
    pub(super) is_ripping: bool,
    pub(super) pipeline: Option<RipPipeline<E>>,
    pub(super) bus: Option<mpsc::UnboundedReceiver<BusMessage>>,
    pub(super) progress: ProgressMonitor,
    track_format: Option<E::Format>,
    pub(super) mime_type: Option<String>,
    pub(super) callbacks: RipperCallbacks,
}

impl<E: PipelineEngine> RipperSession<E> {
    /// Create a session. Nothing is validated until a rip starts.
    pub fn new(
        engine: E,
        device: impl Into<String>,
        paranoia_mode: i32,
        encoder_pipeline: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            device: device.into(),
            paranoia_mode,
            encoder_pipeline: encoder_pipeline.into(),
            is_ripping: false,
            pipeline: None,
            bus: None,
            progress: ProgressMonitor::default(),
            track_format: None,
            mime_type: None,
            callbacks: RipperCallbacks::default(),
        }
    }

    pub fn from_config(engine: E, config: &RipperConfig) -> Self {
        Self::new(
            engine,
            config.device.clone(),
            config.paranoia_mode,
            config.encoder_pipeline.clone(),
        )
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn paranoia_mode(&self) -> i32 {
        self.paranoia_mode
    }

    pub fn encoder_pipeline(&self) -> &str {
        &self.encoder_pipeline
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn is_ripping(&self) -> bool {
        self.is_ripping
    }

    pub fn has_pipeline(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn is_polling(&self) -> bool {
        self.progress.is_running()
    }

    /// MIME type detected for the current track, once known
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn set_progress_callback(&mut self, cb: Option<ProgressCallback>) {
        self.callbacks.progress = cb;
    }

    pub fn set_mime_type_callback(&mut self, cb: Option<MimeTypeCallback>) {
        self.callbacks.mime_type = cb;
    }

    pub fn set_finished_callback(&mut self, cb: Option<FinishedCallback>) {
        self.callbacks.finished = cb;
    }

    pub fn set_error_callback(&mut self, cb: Option<ErrorCallback>) {
        self.callbacks.error = cb;
    }

    /// Replace all four callbacks at once
    pub fn set_callbacks(&mut self, callbacks: RipperCallbacks) {
        self.callbacks = callbacks;
    }

    /// Start ripping `track_number` into `output_path`.
    ///
    /// Every failure is reported both through the error callback and the
    /// returned error, and leaves no pipeline behind.
    pub fn start_track_rip(
        &mut self,
        track_number: u32,
        output_path: impl AsRef<Path>,
        tags: Option<&TagList>,
    ) -> Result<TrackRip, RipperError> {
        if self.is_ripping {
            return Err(self.fail(RipperError::AlreadyRipping));
        }

        // Release whatever the previous track left behind
        self.cancel();

        let (bus_tx, bus_rx) = mpsc::unbounded_channel();
        let builder = PipelineBuilder::new(
            &self.engine,
            &self.device,
            self.paranoia_mode,
            &self.encoder_pipeline,
        );
        builder.resolve_track_format(&mut self.track_format);

        let pipeline = match builder.build(bus_tx) {
            Ok(pipeline) => pipeline,
            Err(e) => return Err(self.fail(e)),
        };

        let output_path = output_path.as_ref();
        let tagging_supported = match self.prepare(&pipeline, track_number, output_path, tags) {
            Ok(tagging_supported) => tagging_supported,
            Err(e) => {
                self.teardown(pipeline);
                return Err(self.fail(e));
            }
        };

        if let Err(e) = self.engine.set_graph_state(&pipeline.graph, StreamState::Playing) {
            self.teardown(pipeline);
            return Err(self.fail(RipperError::Start(e)));
        }

        info!(
            "Ripping track {} from {} to {}",
            track_number,
            self.device,
            output_path.display()
        );

        self.pipeline = Some(pipeline);
        self.bus = Some(bus_rx);
        self.mime_type = None;
        self.progress.start();
        self.is_ripping = true;

        Ok(TrackRip { tagging_supported })
    }

    /// Point the sink at the output file, tag the encoder and select the track
    fn prepare(
        &self,
        pipeline: &RipPipeline<E>,
        track_number: u32,
        output_path: &Path,
        tags: Option<&TagList>,
    ) -> Result<bool, RipperError> {
        let engine = &self.engine;

        engine
            .set_stage_state(&pipeline.sink, StreamState::Null)
            .map_err(RipperError::Configure)?;
        let location = output_path.to_str().ok_or_else(|| {
            RipperError::Configure(EngineError::InvalidProperty {
                key: PROP_LOCATION.to_string(),
                reason: format!("{} is not valid UTF-8", output_path.display()),
            })
        })?;
        engine
            .set_property(&pipeline.sink, PROP_LOCATION, PropertyValue::from(location))
            .map_err(RipperError::Configure)?;

        let mut tagging_supported = false;
        for setter in engine.tag_setters(&pipeline.encoder) {
            engine.merge_tags(&setter, &TagList::encoder_identity(), TagMergeMode::ReplaceAll);
            if let Some(tags) = tags {
                engine.merge_tags(&setter, tags, TagMergeMode::Append);
                for (name, value) in tags.iter() {
                    debug!("Tag {:?} on {:?}: {} = {}", setter, output_path, name, value);
                }
            }
            tagging_supported = true;
        }

        if !tagging_supported {
            warn!("Encoder has no tag-setting stage, output will not be tagged");
        }

        engine
            .set_property(&pipeline.source, PROP_TRACK, PropertyValue::from(track_number))
            .map_err(RipperError::Configure)?;

        Ok(tagging_supported)
    }

    /// Stop polling, detach from the bus and release the pipeline.
    /// Safe to call at any time, any number of times.
    pub fn cancel(&mut self) {
        self.progress.stop();
        self.bus = None;
        self.is_ripping = false;

        if let Some(pipeline) = self.pipeline.take() {
            debug!("Releasing rip pipeline");
            self.teardown(pipeline);
        }
    }

    /// Cancel any rip and dispose of the session
    pub fn destroy(mut self) {
        self.cancel();
    }

    fn teardown(&self, pipeline: RipPipeline<E>) {
        self.engine.unsubscribe_messages(&pipeline.graph);
        if let Err(e) = self.engine.set_graph_state(&pipeline.graph, StreamState::Null) {
            warn!("Failed to stop rip pipeline: {}", e);
        }
        self.engine.release_graph(pipeline.graph);
    }

    /// Report a failed rip start through the error callback
    fn fail(&mut self, e: RipperError) -> RipperError {
        error!("Failed to start rip: {}", e);
        let debug = e.debug_detail();
        self.callbacks.error(&e.message(), debug.as_deref());
        e
    }

    /// One poll of the progress monitor
    pub fn on_progress_tick(&mut self) {
        if !self.progress.is_running() {
            return;
        }
        let Some(pipeline) = self.pipeline.as_ref() else {
            return;
        };

        if let Some(elapsed_ms) = sample_position(&self.engine, &pipeline.graph, &pipeline.source) {
            self.callbacks.progress(elapsed_ms);
        }
    }

    /// Wait for the next bus message or progress tick.
    ///
    /// Returns None when there is nothing left to wait for: no pipeline bus
    /// attached and the progress monitor stopped. The bus stays attached
    /// after end of stream or an error until [`RipperSession::cancel`], so
    /// after either of those this waits for further messages; use
    /// [`RipperSession::run`] to stop at the end of the rip.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        loop {
            if self.bus.is_none() && !self.progress.is_running() {
                return None;
            }

            let next = tokio::select! {
                message = next_message(&mut self.bus) => message.map(SessionEvent::Message),
                () = self.progress.tick() => Some(SessionEvent::ProgressTick),
            };

            match next {
                Some(event) => return Some(event),
                // Engine dropped its end of the bus
                None => self.bus = None,
            }
        }
    }

    pub fn dispatch(&mut self, event: SessionEvent) -> ControlFlow<()> {
        match event {
            SessionEvent::Message(message) => self.handle_message(message),
            SessionEvent::ProgressTick => {
                self.on_progress_tick();
                ControlFlow::Continue(())
            }
        }
    }

    /// Handle one event. Returns false when the session has nothing to wait
    /// for, or when handling the event asked to stop listening.
    pub async fn process_next_event(&mut self) -> bool {
        match self.next_event().await {
            Some(event) => self.dispatch(event).is_continue(),
            None => false,
        }
    }

    /// Drive the session until the current rip finishes or fails
    pub async fn run(&mut self) {
        while self.is_ripping {
            if !self.process_next_event().await {
                break;
            }
        }
    }
}

async fn next_message(bus: &mut Option<mpsc::UnboundedReceiver<BusMessage>>) -> Option<BusMessage> {
    match bus {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl<E: PipelineEngine> Drop for RipperSession<E> {
    fn drop(&mut self) {
        self.cancel();
    }
}
