use cdrip::cd::engine::{BusMessage, StreamState};
use cdrip::cd::RipperSession;
use cdrip::test_support::MockEngine;
use std::sync::{Arc, Mutex};

/// Initialize tracing for tests with proper test output handling
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Everything the session reported through its callbacks, in order
pub type Events = Arc<Mutex<Vec<String>>>;

/// Install callbacks that record into a shared list and note each
/// notification in the engine history, so tests can check the ordering of
/// engine calls against notifications
pub fn record_callbacks(session: &mut RipperSession<MockEngine>, engine: &MockEngine) -> Events {
    let events: Events = Arc::new(Mutex::new(Vec::new()));

    let (sink, history) = (events.clone(), engine.clone());
    session.set_progress_callback(Some(Box::new(move |elapsed_ms: u64| {
        sink.lock().unwrap().push(format!("progress:{}", elapsed_ms));
        history.note("progress");
    })));
    let (sink, history) = (events.clone(), engine.clone());
    session.set_mime_type_callback(Some(Box::new(move |mime_type: &str| {
        sink.lock().unwrap().push(format!("mime:{}", mime_type));
        history.note("mime");
    })));
    let (sink, history) = (events.clone(), engine.clone());
    session.set_finished_callback(Some(Box::new(move || {
        sink.lock().unwrap().push("finished".to_string());
        history.note("finished");
    })));
    let (sink, history) = (events.clone(), engine.clone());
    session.set_error_callback(Some(Box::new(move |message: &str, debug: Option<&str>| {
        sink.lock()
            .unwrap()
            .push(format!("error:{}:{}", message, debug.unwrap_or("-")));
        history.note("error");
    })));

    events
}

pub fn snapshot(events: &Events) -> Vec<String> {
    events.lock().unwrap().clone()
}

pub fn prerolled() -> BusMessage {
    BusMessage::StateChanged {
        old: StreamState::Ready,
        current: StreamState::Paused,
        pending: StreamState::Playing,
    }
}
