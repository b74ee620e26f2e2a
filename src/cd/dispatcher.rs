//! Reaction to pipeline bus messages

use crate::cd::engine::{BusMessage, PipelineEngine, StreamState};
use crate::cd::mime::{is_probe_trigger, probe_encoder};
use crate::cd::ripper::RipperSession;
use std::ops::ControlFlow;
use tracing::{debug, error, info, warn};

impl<E: PipelineEngine> RipperSession<E> {
    /// Handle one message from the pipeline bus.
    ///
    /// Always continues: the subscription stays attached until the session
    /// cancels it.
    pub fn handle_message(&mut self, message: BusMessage) -> ControlFlow<()> {
        match message {
            BusMessage::StateChanged {
                old,
                current,
                pending,
            } => {
                if is_probe_trigger(old, current, pending) {
                    self.detect_mime_type();
                }
            }
            BusMessage::Error {
                message,
                debug: detail,
            } => {
                self.is_ripping = false;
                self.progress.stop();

                error!("Rip failed: {} ({})", message, detail.as_deref().unwrap_or("no details"));
                self.callbacks.error(&message, detail.as_deref());
            }
            BusMessage::Eos => {
                if let Some(pipeline) = self.pipeline.as_ref() {
                    if let Err(e) = self.engine.set_graph_state(&pipeline.graph, StreamState::Null) {
                        warn!("Failed to stop pipeline after end of stream: {}", e);
                    }
                }

                self.is_ripping = false;
                self.progress.stop();

                info!("Rip finished");
                self.callbacks.finished();
            }
            BusMessage::Other(kind) => {
                debug!("Ignoring bus message: {}", kind);
            }
        }

        ControlFlow::Continue(())
    }

    /// Probe the encoder once per track and report the MIME type
    fn detect_mime_type(&mut self) {
        if self.mime_type.is_some() {
            return;
        }
        let Some(pipeline) = self.pipeline.as_ref() else {
            return;
        };

        match probe_encoder(&self.engine, &pipeline.encoder) {
            Some(mime_type) => {
                debug!("Found MIME type for encoded content: {}", mime_type);
                self.callbacks.mime_type(&mime_type);
                self.mime_type = Some(mime_type);
            }
            None => debug!("No MIME type negotiated by encoder yet"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::cd::engine::{BusMessage, NegotiatedFormat, PropertyValue, StreamState};
    use crate::cd::ripper::RipperSession;
    use crate::test_support::MockEngine;
    use std::ops::ControlFlow;
    use std::sync::{Arc, Mutex};

    fn prerolled() -> BusMessage {
        BusMessage::StateChanged {
            old: StreamState::Ready,
            current: StreamState::Paused,
            pending: StreamState::Playing,
        }
    }

    fn ripping_session(engine: &MockEngine) -> (RipperSession<MockEngine>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut session = RipperSession::new(engine.clone(), "/dev/sr0", 0, "lamemp3enc ! id3v2mux");

        let sink = log.clone();
        session.set_mime_type_callback(Some(Box::new(move |mime: &str| {
            sink.lock().unwrap().push(format!("mime:{}", mime));
        })));
        let sink = log.clone();
        session.set_finished_callback(Some(Box::new(move || {
            sink.lock().unwrap().push("finished".to_string());
        })));
        let sink = log.clone();
        session.set_error_callback(Some(Box::new(move |message: &str, debug: Option<&str>| {
            sink.lock()
                .unwrap()
                .push(format!("error:{}:{}", message, debug.unwrap_or("-")));
        })));

        session.start_track_rip(1, "/tmp/01.mp3", None).unwrap();
        (session, log)
    }

    #[test]
    fn test_preroll_reports_mime_type_once() {
        let engine = MockEngine::new();
        engine.set_encoder_formats(vec![
            NegotiatedFormat::new("audio/x-raw"),
            NegotiatedFormat::new("audio/mpeg").with_attribute("mpegversion", PropertyValue::Int(1)),
        ]);
        let (mut session, log) = ripping_session(&engine);

        assert_eq!(session.handle_message(prerolled()), ControlFlow::Continue(()));
        assert_eq!(session.handle_message(prerolled()), ControlFlow::Continue(()));

        assert_eq!(session.mime_type(), Some("audio/mpeg"));
        assert_eq!(*log.lock().unwrap(), vec!["mime:audio/mpeg".to_string()]);
    }

    #[test]
    fn test_other_transitions_do_not_probe() {
        let engine = MockEngine::new();
        engine.set_encoder_formats(vec![NegotiatedFormat::new("audio/x-flac")]);
        let (mut session, log) = ripping_session(&engine);

        let flow = session.handle_message(BusMessage::StateChanged {
            old: StreamState::Paused,
            current: StreamState::Playing,
            pending: StreamState::VoidPending,
        });
        assert_eq!(flow, ControlFlow::Continue(()));
        let flow = session.handle_message(BusMessage::StateChanged {
            old: StreamState::Null,
            current: StreamState::Ready,
            pending: StreamState::Playing,
        });
        assert_eq!(flow, ControlFlow::Continue(()));

        assert_eq!(session.mime_type(), None);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_no_negotiated_format_is_silent() {
        let engine = MockEngine::new();
        engine.set_encoder_formats(vec![NegotiatedFormat::new("audio/x-raw")]);
        let (mut session, log) = ripping_session(&engine);

        let flow = session.handle_message(prerolled());
        assert_eq!(flow, ControlFlow::Continue(()));

        assert_eq!(session.mime_type(), None);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_error_stops_rip_but_keeps_pipeline() {
        let engine = MockEngine::new();
        let (mut session, log) = ripping_session(&engine);

        let flow = session.handle_message(BusMessage::Error {
            message: "Could not read from CD".into(),
            debug: Some("cdparanoia: read error".into()),
        });

        assert_eq!(flow, ControlFlow::Continue(()));
        assert!(!session.is_ripping());
        assert!(!session.is_polling());
        assert!(session.has_pipeline());
        assert_eq!(engine.graph_state_now(), Some(StreamState::Playing));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["error:Could not read from CD:cdparanoia: read error".to_string()]
        );

        session.cancel();
        assert!(!session.has_pipeline());
    }

    #[test]
    fn test_eos_stops_pipeline_then_finishes() {
        let engine = MockEngine::new();
        let (mut session, log) = ripping_session(&engine);

        let flow = session.handle_message(BusMessage::Eos);
        assert_eq!(flow, ControlFlow::Continue(()));

        assert!(!session.is_ripping());
        assert!(!session.is_polling());
        assert_eq!(engine.graph_state_now(), Some(StreamState::Null));
        assert_eq!(*log.lock().unwrap(), vec!["finished".to_string()]);
    }

    #[test]
    fn test_unknown_messages_are_ignored() {
        let engine = MockEngine::new();
        let (mut session, log) = ripping_session(&engine);

        let flow = session.handle_message(BusMessage::Other("tag".into()));

        assert_eq!(flow, ControlFlow::Continue(()));
        assert!(session.is_ripping());
        assert!(session.is_polling());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_missing_callbacks_are_tolerated() {
        let engine = MockEngine::new();
        let mut session = RipperSession::new(engine.clone(), "/dev/sr0", 0, "flacenc");
        session.start_track_rip(1, "/tmp/01.flac", None).unwrap();

        let flow = session.handle_message(prerolled());
        assert_eq!(flow, ControlFlow::Continue(()));
        let flow = session.handle_message(BusMessage::Error {
            message: "boom".into(),
            debug: None,
        });
        assert_eq!(flow, ControlFlow::Continue(()));
        let flow = session.handle_message(BusMessage::Eos);
        assert_eq!(flow, ControlFlow::Continue(()));

        assert!(!session.is_ripping());
    }
}
