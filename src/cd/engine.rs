//! Media pipeline engine contract
//!
//! The ripper never talks to a media framework directly. Everything it needs
//! (building stages, linking them, driving state, reading positions and
//! negotiated formats, tagging) goes through [`PipelineEngine`], so the
//! session logic can run against GStreamer or an in-memory engine alike.

use crate::cd::tags::{TagList, TagMergeMode};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Could not create {0}")]
    Create(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Unknown property: {0}")]
    UnknownProperty(String),
    #[error("Invalid value for property {key}: {reason}")]
    InvalidProperty { key: String, reason: String },
    #[error("Link error: {0}")]
    Link(String),
    #[error("State change to {0} failed")]
    StateChange(StreamState),
    #[error("Message bus unavailable")]
    NoBus,
}

/// Pipeline element states, in the order the engine walks through them
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StreamState {
    VoidPending,
    Null,
    Ready,
    Paused,
    Playing,
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamState::VoidPending => "void-pending",
            StreamState::Null => "null",
            StreamState::Ready => "ready",
            StreamState::Paused => "paused",
            StreamState::Playing => "playing",
        };
        f.write_str(name)
    }
}

/// Asynchronous notifications posted by a running pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    StateChanged {
        old: StreamState,
        current: StreamState,
        pending: StreamState,
    },
    Error {
        message: String,
        debug: Option<String>,
    },
    Eos,
    /// Any message type the ripper does not act on
    Other(String),
}

/// Typed value for stage properties, format attributes and tags
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Str(String),
    Time(Duration),
}

impl PropertyValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            PropertyValue::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    /// Renders the value the way engine property parsers expect it.
    /// Times are written as nanoseconds.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::UInt(v) => write!(f, "{}", v),
            PropertyValue::Str(v) => f.write_str(v),
            PropertyValue::Time(v) => write!(f, "{}", v.as_nanos()),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Str(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Str(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Int(value as i64)
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        PropertyValue::UInt(value as u64)
    }
}

/// Format agreed on an output port once data started flowing
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NegotiatedFormat {
    pub media_type: String,
    pub attributes: BTreeMap<String, PropertyValue>,
}

impl NegotiatedFormat {
    pub fn new(media_type: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.attributes.get(key).and_then(PropertyValue::as_int)
    }
}

/// Capabilities the ripper consumes from a media pipeline engine.
///
/// Handles are cheap clones referring to engine-owned objects. Every method
/// is called from the task that owns the ripper session; engines that post
/// messages from their own threads must do so through the sender handed to
/// [`PipelineEngine::subscribe_messages`].
pub trait PipelineEngine {
    type Graph: Clone + fmt::Debug;
    type Stage: Clone + fmt::Debug;
    type Port;
    type Format: Clone + fmt::Debug;

    fn create_graph(&self, name: &str) -> Result<Self::Graph, EngineError>;

    /// Create a stage from a factory name such as `queue` or `filesink`
    fn create_stage(&self, factory: &str, name: &str) -> Result<Self::Stage, EngineError>;

    /// Create a source stage able to handle `uri`
    fn create_stage_from_uri(&self, uri: &str, name: &str) -> Result<Self::Stage, EngineError>;

    /// Parse a textual sub-pipeline into a single stage with ghosted ports
    fn parse_bin(&self, description: &str) -> Result<Self::Stage, EngineError>;

    fn set_property(
        &self,
        stage: &Self::Stage,
        key: &str,
        value: PropertyValue,
    ) -> Result<(), EngineError>;

    fn supports_property(&self, stage: &Self::Stage, key: &str) -> bool;

    fn add_stages(&self, graph: &Self::Graph, stages: &[&Self::Stage]) -> Result<(), EngineError>;

    /// Link stages in the given order
    fn link_stages(&self, stages: &[&Self::Stage]) -> Result<(), EngineError>;

    fn set_graph_state(&self, graph: &Self::Graph, state: StreamState) -> Result<(), EngineError>;

    fn set_stage_state(&self, stage: &Self::Stage, state: StreamState) -> Result<(), EngineError>;

    /// Current state, without waiting for pending transitions
    fn graph_state(&self, graph: &Self::Graph) -> StreamState;

    /// Look up a stream format by nick (e.g. `track`)
    fn resolve_format(&self, nick: &str) -> Option<Self::Format>;

    /// Elapsed stream time reported by `stage`
    fn query_position(&self, stage: &Self::Stage) -> Option<Duration>;

    fn subscribe_messages(
        &self,
        graph: &Self::Graph,
        sender: mpsc::UnboundedSender<BusMessage>,
    ) -> Result<(), EngineError>;

    fn unsubscribe_messages(&self, graph: &Self::Graph);

    /// All stages nested inside `bin`, at any depth
    fn stages_recursive(&self, bin: &Self::Stage) -> Vec<Self::Stage>;

    fn output_ports(&self, stage: &Self::Stage) -> Vec<Self::Port>;

    fn negotiated_format(&self, port: &Self::Port) -> Option<NegotiatedFormat>;

    /// Stages inside `bin` that can embed metadata into their output
    fn tag_setters(&self, bin: &Self::Stage) -> Vec<Self::Stage>;

    fn merge_tags(&self, stage: &Self::Stage, tags: &TagList, mode: TagMergeMode);

    /// Drop the engine's reference to a graph that has been set to null
    fn release_graph(&self, graph: Self::Graph) {
        drop(graph);
    }
}
