// Test support utilities for both unit and integration tests

use crate::cd::engine::{BusMessage, EngineError, NegotiatedFormat, PipelineEngine, PropertyValue, StreamState};
use crate::cd::tags::{TagList, TagMergeMode};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

/// Operations the mock engine can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Graph,
    Source,
    Queue,
    Sink,
    Link,
    /// Refuse the transition to playing
    Play,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MockGraph(u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MockStage {
    id: u32,
    name: String,
}

impl MockStage {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MockPort {
    index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockFormat(String);

#[derive(Debug)]
struct MockState {
    failures: Vec<MockFailure>,
    parse_error: Option<String>,
    paranoia_supported: bool,
    tagging_supported: bool,
    encoder_formats: Vec<NegotiatedFormat>,
    position: Option<Duration>,
    next_id: u32,
    graphs_created: usize,
    graphs_released: usize,
    format_lookups: usize,
    last_graph: Option<u32>,
    graph_states: HashMap<u32, StreamState>,
    stage_states: HashMap<u32, StreamState>,
    properties: HashMap<(u32, String), PropertyValue>,
    linked: Vec<String>,
    tags: HashMap<u32, TagList>,
    subscriber: Option<mpsc::UnboundedSender<BusMessage>>,
    history: Vec<String>,
}

impl Default for MockState {
    fn default() -> Self {
        MockState {
            failures: Vec::new(),
            parse_error: None,
            paranoia_supported: true,
            tagging_supported: true,
            encoder_formats: Vec::new(),
            position: None,
            next_id: 1,
            graphs_created: 0,
            graphs_released: 0,
            format_lookups: 0,
            last_graph: None,
            graph_states: HashMap::new(),
            stage_states: HashMap::new(),
            properties: HashMap::new(),
            linked: Vec::new(),
            tags: HashMap::new(),
            subscriber: None,
            history: Vec::new(),
        }
    }
}

impl MockState {
    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn stage(&mut self, name: &str) -> MockStage {
        MockStage {
            id: self.next_id(),
            name: name.to_string(),
        }
    }

    fn fails(&self, failure: MockFailure) -> bool {
        self.failures.contains(&failure)
    }
}

/// In-memory pipeline engine for testing
///
/// Records what the ripper asks of it and lets tests inject failures,
/// negotiated formats, positions and bus messages. Clones share state, so a
/// test keeps one clone and hands another to the session.
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
}

impl MockEngine {
    /// Create a new mock engine instance
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn fail(&self, failure: MockFailure) {
        self.lock().failures.push(failure);
    }

    pub fn set_parse_error(&self, message: &str) {
        self.lock().parse_error = Some(message.to_string());
    }

    pub fn set_source_supports_paranoia(&self, supported: bool) {
        self.lock().paranoia_supported = supported;
    }

    pub fn set_tagging_supported(&self, supported: bool) {
        self.lock().tagging_supported = supported;
    }

    /// Formats reported by the encoder's output ports, in port order
    pub fn set_encoder_formats(&self, formats: Vec<NegotiatedFormat>) {
        self.lock().encoder_formats = formats;
    }

    pub fn set_position(&self, position: Option<Duration>) {
        self.lock().position = position;
    }

    /// Force the state of the most recently created graph
    pub fn set_graph_state_now(&self, state: StreamState) {
        let mut s = self.lock();
        if let Some(id) = s.last_graph {
            s.graph_states.insert(id, state);
        }
    }

    /// State of the most recently created graph
    pub fn graph_state_now(&self) -> Option<StreamState> {
        let s = self.lock();
        s.last_graph.and_then(|id| s.graph_states.get(&id).copied())
    }

    pub fn stage_state(&self, stage: &MockStage) -> Option<StreamState> {
        self.lock().stage_states.get(&stage.id).copied()
    }

    pub fn property(&self, stage: &MockStage, key: &str) -> Option<PropertyValue> {
        self.lock().properties.get(&(stage.id, key.to_string())).cloned()
    }

    /// Names of the stages of the last successful link, in order
    pub fn linked_chain(&self) -> Vec<String> {
        self.lock().linked.clone()
    }

    /// Tags held by the encoder's tag-setting stage
    pub fn encoder_tags(&self) -> Option<TagList> {
        let s = self.lock();
        s.tags.values().next().cloned()
    }

    pub fn is_subscribed(&self) -> bool {
        self.lock().subscriber.is_some()
    }

    pub fn graphs_created(&self) -> usize {
        self.lock().graphs_created
    }

    pub fn graphs_released(&self) -> usize {
        self.lock().graphs_released
    }

    pub fn format_lookups(&self) -> usize {
        self.lock().format_lookups
    }

    /// Post a message on the subscribed bus. Returns false if nobody listens.
    pub fn post(&self, message: BusMessage) -> bool {
        match self.lock().subscriber.as_ref() {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Drop the bus sender, as an engine shutting down would
    pub fn close_bus(&self) {
        self.lock().subscriber = None;
    }

    /// Append an entry to the call history, so tests can interleave their own
    /// observations (e.g. from callbacks) with engine calls
    pub fn note(&self, entry: &str) {
        self.lock().history.push(entry.to_string());
    }

    pub fn history(&self) -> Vec<String> {
        self.lock().history.clone()
    }
}

impl PipelineEngine for MockEngine {
    type Graph = MockGraph;
    type Stage = MockStage;
    type Port = MockPort;
    type Format = MockFormat;

    fn create_graph(&self, _name: &str) -> Result<MockGraph, EngineError> {
        let mut s = self.lock();
        if s.fails(MockFailure::Graph) {
            return Err(EngineError::Create("pipeline".to_string()));
        }
        let id = s.next_id();
        s.graphs_created += 1;
        s.last_graph = Some(id);
        s.graph_states.insert(id, StreamState::Null);
        Ok(MockGraph(id))
    }

    fn create_stage(&self, factory: &str, name: &str) -> Result<MockStage, EngineError> {
        let mut s = self.lock();
        let failure = match factory {
            "queue" => MockFailure::Queue,
            "filesink" => MockFailure::Sink,
            _ => return Err(EngineError::Create(format!("element {}", factory))),
        };
        if s.fails(failure) {
            return Err(EngineError::Create(format!("element {}", factory)));
        }
        Ok(s.stage(name))
    }

    fn create_stage_from_uri(&self, uri: &str, name: &str) -> Result<MockStage, EngineError> {
        let mut s = self.lock();
        if s.fails(MockFailure::Source) {
            return Err(EngineError::Create(format!("element from URI {}", uri)));
        }
        Ok(s.stage(name))
    }

    fn parse_bin(&self, description: &str) -> Result<MockStage, EngineError> {
        let mut s = self.lock();
        if let Some(message) = s.parse_error.clone() {
            return Err(EngineError::Parse(message));
        }
        if description.trim().is_empty() {
            return Err(EngineError::Parse("empty pipeline not allowed".to_string()));
        }
        Ok(s.stage("encoder"))
    }

    fn set_property(&self, stage: &MockStage, key: &str, value: PropertyValue) -> Result<(), EngineError> {
        self.lock().properties.insert((stage.id, key.to_string()), value);
        Ok(())
    }

    fn supports_property(&self, stage: &MockStage, key: &str) -> bool {
        if key == "paranoia-mode" {
            return stage.name == "cddasrc" && self.lock().paranoia_supported;
        }
        true
    }

    fn add_stages(&self, _graph: &MockGraph, _stages: &[&MockStage]) -> Result<(), EngineError> {
        Ok(())
    }

    fn link_stages(&self, stages: &[&MockStage]) -> Result<(), EngineError> {
        let mut s = self.lock();
        if s.fails(MockFailure::Link) {
            return Err(EngineError::Link("refused".to_string()));
        }
        s.linked = stages.iter().map(|stage| stage.name.clone()).collect();
        Ok(())
    }

    fn set_graph_state(&self, graph: &MockGraph, state: StreamState) -> Result<(), EngineError> {
        let mut s = self.lock();
        if state == StreamState::Playing && s.fails(MockFailure::Play) {
            return Err(EngineError::StateChange(state));
        }
        s.graph_states.insert(graph.0, state);
        s.history.push(format!("graph:{}", state));
        Ok(())
    }

    fn set_stage_state(&self, stage: &MockStage, state: StreamState) -> Result<(), EngineError> {
        self.lock().stage_states.insert(stage.id, state);
        Ok(())
    }

    fn graph_state(&self, graph: &MockGraph) -> StreamState {
        self.lock()
            .graph_states
            .get(&graph.0)
            .copied()
            .unwrap_or(StreamState::Null)
    }

    fn resolve_format(&self, nick: &str) -> Option<MockFormat> {
        self.lock().format_lookups += 1;
        Some(MockFormat(nick.to_string()))
    }

    fn query_position(&self, _stage: &MockStage) -> Option<Duration> {
        self.lock().position
    }

    fn subscribe_messages(
        &self,
        _graph: &MockGraph,
        sender: mpsc::UnboundedSender<BusMessage>,
    ) -> Result<(), EngineError> {
        self.lock().subscriber = Some(sender);
        Ok(())
    }

    fn unsubscribe_messages(&self, _graph: &MockGraph) {
        self.lock().subscriber = None;
    }

    fn stages_recursive(&self, _bin: &MockStage) -> Vec<MockStage> {
        let mut s = self.lock();
        vec![s.stage("encoder-element")]
    }

    fn output_ports(&self, _stage: &MockStage) -> Vec<MockPort> {
        let count = self.lock().encoder_formats.len();
        (0..count).map(|index| MockPort { index }).collect()
    }

    fn negotiated_format(&self, port: &MockPort) -> Option<NegotiatedFormat> {
        self.lock().encoder_formats.get(port.index).cloned()
    }

    fn tag_setters(&self, _bin: &MockStage) -> Vec<MockStage> {
        let mut s = self.lock();
        if s.tagging_supported {
            vec![s.stage("tagger")]
        } else {
            Vec::new()
        }
    }

    fn merge_tags(&self, stage: &MockStage, tags: &TagList, mode: TagMergeMode) {
        let mut s = self.lock();
        // One tag setter per encoder: keep the list of the latest track only
        let setter_id = stage.id;
        s.tags.retain(|id, _| *id == setter_id);
        s.tags.entry(setter_id).or_default().merge(tags, mode);
    }

    fn release_graph(&self, graph: MockGraph) {
        let mut s = self.lock();
        s.graphs_released += 1;
        s.history.push(format!("release:{}", graph.0));
    }
}
