//! GStreamer-backed pipeline engine

use crate::cd::engine::{BusMessage, EngineError, NegotiatedFormat, PipelineEngine, PropertyValue, StreamState};
use crate::cd::tags::{TagList, TagMergeMode};
use gst::prelude::*;
use gstreamer as gst;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// [`PipelineEngine`] over the process-wide GStreamer instance
#[derive(Debug, Clone, Copy)]
pub struct GstEngine {
    _initialized: (),
}

impl GstEngine {
    /// Initialize GStreamer. Safe to call more than once.
    pub fn init() -> Result<Self, EngineError> {
        gst::init().map_err(|e| EngineError::Create(format!("GStreamer: {}", e)))?;
        debug!("GStreamer {} initialized", gst::version_string());
        Ok(GstEngine { _initialized: () })
    }
}

impl PipelineEngine for GstEngine {
    type Graph = gst::Pipeline;
    type Stage = gst::Element;
    type Port = gst::Pad;
    type Format = gst::Format;

    fn create_graph(&self, name: &str) -> Result<gst::Pipeline, EngineError> {
        Ok(gst::Pipeline::with_name(name))
    }

    fn create_stage(&self, factory: &str, name: &str) -> Result<gst::Element, EngineError> {
        gst::ElementFactory::make(factory)
            .name(name)
            .build()
            .map_err(|e| EngineError::Create(format!("element {}: {}", factory, e)))
    }

    fn create_stage_from_uri(&self, uri: &str, name: &str) -> Result<gst::Element, EngineError> {
        gst::Element::make_from_uri(gst::URIType::Src, uri, Some(name))
            .map_err(|e| EngineError::Create(format!("element from URI {}: {}", uri, e.message())))
    }

    fn parse_bin(&self, description: &str) -> Result<gst::Element, EngineError> {
        gst::parse::bin_from_description(description, true)
            .map(|bin| bin.upcast::<gst::Element>())
            .map_err(|e| EngineError::Parse(e.message().to_string()))
    }

    fn set_property(
        &self,
        stage: &gst::Element,
        key: &str,
        value: PropertyValue,
    ) -> Result<(), EngineError> {
        let pspec = stage
            .find_property(key)
            .ok_or_else(|| EngineError::UnknownProperty(key.to_string()))?;

        let value = property_to_value(&value, pspec.value_type()).map_err(|reason| {
            EngineError::InvalidProperty {
                key: key.to_string(),
                reason,
            }
        })?;

        stage.set_property_from_value(key, &value);
        Ok(())
    }

    fn supports_property(&self, stage: &gst::Element, key: &str) -> bool {
        stage.find_property(key).is_some()
    }

    fn add_stages(&self, graph: &gst::Pipeline, stages: &[&gst::Element]) -> Result<(), EngineError> {
        graph
            .add_many(stages.iter().copied())
            .map_err(|e| EngineError::Link(e.to_string()))
    }

    fn link_stages(&self, stages: &[&gst::Element]) -> Result<(), EngineError> {
        gst::Element::link_many(stages.iter().copied()).map_err(|e| EngineError::Link(e.to_string()))
    }

    fn set_graph_state(&self, graph: &gst::Pipeline, state: StreamState) -> Result<(), EngineError> {
        graph
            .set_state(gst_state(state))
            .map(|_| ())
            .map_err(|_| EngineError::StateChange(state))
    }

    fn set_stage_state(&self, stage: &gst::Element, state: StreamState) -> Result<(), EngineError> {
        stage
            .set_state(gst_state(state))
            .map(|_| ())
            .map_err(|_| EngineError::StateChange(state))
    }

    fn graph_state(&self, graph: &gst::Pipeline) -> StreamState {
        stream_state(graph.current_state())
    }

    fn resolve_format(&self, nick: &str) -> Option<gst::Format> {
        match gst::Format::by_nick(nick) {
            gst::Format::Undefined => None,
            format => Some(format),
        }
    }

    fn query_position(&self, stage: &gst::Element) -> Option<Duration> {
        stage
            .query_position::<gst::ClockTime>()
            .map(|position| Duration::from_nanos(position.nseconds()))
    }

    fn subscribe_messages(
        &self,
        graph: &gst::Pipeline,
        sender: mpsc::UnboundedSender<BusMessage>,
    ) -> Result<(), EngineError> {
        let bus = graph.bus().ok_or(EngineError::NoBus)?;

        // Runs on the streaming threads; the session picks messages up on its own task
        bus.set_sync_handler(move |_, message| {
            let _ = sender.send(bus_message(message));
            gst::BusSyncReply::Drop
        });
        Ok(())
    }

    fn unsubscribe_messages(&self, graph: &gst::Pipeline) {
        if let Some(bus) = graph.bus() {
            bus.unset_sync_handler();
        }
    }

    fn stages_recursive(&self, bin: &gst::Element) -> Vec<gst::Element> {
        match bin.downcast_ref::<gst::Bin>() {
            Some(bin) => collect_elements(bin.iterate_recurse()),
            None => Vec::new(),
        }
    }

    fn output_ports(&self, stage: &gst::Element) -> Vec<gst::Pad> {
        stage.src_pads()
    }

    fn negotiated_format(&self, port: &gst::Pad) -> Option<NegotiatedFormat> {
        let caps = port.current_caps()?;
        let structure = caps.structure(0)?;

        let mut format = NegotiatedFormat::new(structure.name().as_str());
        for (field, value) in structure.iter() {
            if let Some(value) = property_value(value) {
                format = format.with_attribute(field.as_str(), value);
            }
        }
        Some(format)
    }

    fn tag_setters(&self, bin: &gst::Element) -> Vec<gst::Element> {
        match bin.downcast_ref::<gst::Bin>() {
            Some(inner) => collect_elements(inner.iterate_all_by_interface(gst::TagSetter::static_type())),
            None if bin.is::<gst::TagSetter>() => vec![bin.clone()],
            None => Vec::new(),
        }
    }

    fn merge_tags(&self, stage: &gst::Element, tags: &TagList, mode: TagMergeMode) {
        let Some(setter) = stage.dynamic_cast_ref::<gst::TagSetter>() else {
            warn!("{} cannot set tags", stage.name());
            return;
        };
        setter.merge_tags(&gst_tags(tags), gst_merge_mode(mode));
    }

    fn release_graph(&self, graph: gst::Pipeline) {
        debug!("Releasing {}", graph.name());
        drop(graph);
    }
}

fn collect_elements(mut iter: gst::Iterator<gst::Element>) -> Vec<gst::Element> {
    let mut elements = Vec::new();
    loop {
        match iter.next() {
            Ok(Some(element)) => elements.push(element),
            Ok(None) => break,
            Err(gst::IteratorError::Resync) => {
                elements.clear();
                iter.resync();
            }
            Err(gst::IteratorError::Error) => {
                warn!("Element iteration failed");
                break;
            }
        }
    }
    elements
}

fn bus_message(message: &gst::Message) -> BusMessage {
    use gst::MessageView;

    match message.view() {
        MessageView::StateChanged(change) => BusMessage::StateChanged {
            old: stream_state(change.old()),
            current: stream_state(change.current()),
            pending: stream_state(change.pending()),
        },
        MessageView::Error(err) => BusMessage::Error {
            message: err.error().message().to_string(),
            debug: err.debug().map(|debug| debug.to_string()),
        },
        MessageView::Eos(_) => BusMessage::Eos,
        _ => BusMessage::Other(format!("{:?}", message.type_())),
    }
}

/// Convert to the property's own type. Strings, booleans and integers are
/// set as is; anything else (enums, flags) is parsed from its text form.
fn property_to_value(value: &PropertyValue, ty: gst::glib::Type) -> Result<gst::glib::Value, String> {
    use gst::glib::Type;

    let integer = match value {
        PropertyValue::Int(v) => Some(i128::from(*v)),
        PropertyValue::UInt(v) => Some(i128::from(*v)),
        PropertyValue::Time(v) => Some(v.as_nanos() as i128),
        _ => None,
    };
    let out_of_range = |_| format!("{} is out of range for {}", value, ty);

    match (value, integer) {
        (PropertyValue::Str(v), _) if ty == Type::STRING => Ok(v.to_value()),
        (PropertyValue::Bool(v), _) if ty == Type::BOOL => Ok(v.to_value()),
        (_, Some(n)) if ty == Type::I32 => i32::try_from(n).map(|v| v.to_value()).map_err(out_of_range),
        (_, Some(n)) if ty == Type::U32 => u32::try_from(n).map(|v| v.to_value()).map_err(out_of_range),
        (_, Some(n)) if ty == Type::I64 => i64::try_from(n).map(|v| v.to_value()).map_err(out_of_range),
        (_, Some(n)) if ty == Type::U64 => u64::try_from(n).map(|v| v.to_value()).map_err(out_of_range),
        _ => gst::glib::Value::deserialize(&value.to_string(), ty).map_err(|e| e.to_string()),
    }
}

fn property_value(value: &gst::glib::Value) -> Option<PropertyValue> {
    if let Ok(v) = value.get::<i32>() {
        Some(PropertyValue::Int(v.into()))
    } else if let Ok(v) = value.get::<u32>() {
        Some(PropertyValue::UInt(v.into()))
    } else if let Ok(v) = value.get::<bool>() {
        Some(PropertyValue::Bool(v))
    } else if let Ok(v) = value.get::<String>() {
        Some(PropertyValue::Str(v))
    } else {
        None
    }
}

fn gst_tags(tags: &TagList) -> gst::TagList {
    let mut list = gst::TagList::new();
    if let Some(list_mut) = list.get_mut() {
        for (name, value) in tags.iter() {
            let mode = gst::TagMergeMode::Append;
            let added = match value {
                PropertyValue::Str(v) => list_mut.add_generic(name, v.as_str(), mode),
                PropertyValue::Bool(v) => list_mut.add_generic(name, *v, mode),
                PropertyValue::Int(v) => match u32::try_from(*v) {
                    Ok(v) => list_mut.add_generic(name, v, mode),
                    Err(_) => list_mut.add_generic(name, *v, mode),
                },
                PropertyValue::UInt(v) => match u32::try_from(*v) {
                    Ok(v) => list_mut.add_generic(name, v, mode),
                    Err(_) => list_mut.add_generic(name, *v, mode),
                },
                PropertyValue::Time(v) => {
                    list_mut.add_generic(name, gst::ClockTime::from_nseconds(v.as_nanos() as u64), mode)
                }
            };
            if let Err(e) = added {
                warn!("Skipping tag {} = {}: {}", name, value, e);
            }
        }
    }
    list
}

fn gst_state(state: StreamState) -> gst::State {
    match state {
        StreamState::VoidPending => gst::State::VoidPending,
        StreamState::Null => gst::State::Null,
        StreamState::Ready => gst::State::Ready,
        StreamState::Paused => gst::State::Paused,
        StreamState::Playing => gst::State::Playing,
    }
}

fn stream_state(state: gst::State) -> StreamState {
    match state {
        gst::State::Null => StreamState::Null,
        gst::State::Ready => StreamState::Ready,
        gst::State::Paused => StreamState::Paused,
        gst::State::Playing => StreamState::Playing,
        _ => StreamState::VoidPending,
    }
}

fn gst_merge_mode(mode: TagMergeMode) -> gst::TagMergeMode {
    match mode {
        TagMergeMode::ReplaceAll => gst::TagMergeMode::ReplaceAll,
        TagMergeMode::Replace => gst::TagMergeMode::Replace,
        TagMergeMode::Append => gst::TagMergeMode::Append,
        TagMergeMode::Prepend => gst::TagMergeMode::Prepend,
        TagMergeMode::Keep => gst::TagMergeMode::Keep,
        TagMergeMode::KeepAll => gst::TagMergeMode::KeepAll,
    }
}
