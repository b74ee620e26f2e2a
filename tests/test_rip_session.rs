#![cfg(feature = "test-utils")]

mod support;

use cdrip::cd::engine::{BusMessage, NegotiatedFormat, PropertyValue, StreamState};
use cdrip::cd::tags::{self, TagList};
use cdrip::cd::{RipEvent, RipperCallbacks, RipperError, RipperSession};
use cdrip::test_support::{MockEngine, MockFailure};
use cdrip::RipperConfig;
use tempfile::TempDir;
use tokio::sync::mpsc;

use crate::support::{prerolled, record_callbacks, snapshot, tracing_init};

fn flac_session(engine: &MockEngine) -> RipperSession<MockEngine> {
    tracing_init();
    engine.set_encoder_formats(vec![
        NegotiatedFormat::new("audio/x-raw"),
        NegotiatedFormat::new("audio/x-flac"),
    ]);
    RipperSession::new(engine.clone(), "/dev/sr0", 255, "audioconvert ! flacenc")
}

#[test]
fn test_successful_start_leaves_pipeline_playing() {
    let engine = MockEngine::new();
    let mut session = flac_session(&engine);
    let events = record_callbacks(&mut session, &engine);

    let rip = session.start_track_rip(1, "/tmp/01.flac", None).unwrap();

    assert!(rip.tagging_supported);
    assert!(session.is_ripping());
    assert!(session.has_pipeline());
    assert!(session.is_polling());
    assert!(engine.is_subscribed());
    assert_eq!(engine.graph_state_now(), Some(StreamState::Playing));
    assert!(snapshot(&events).is_empty());
}

#[test]
fn test_every_start_failure_reports_once_and_keeps_nothing() {
    let cases = [
        (MockFailure::Graph, "Could not create pipeline"),
        (MockFailure::Source, "Could not create cdda source stage"),
        (MockFailure::Queue, "Could not create queue stage"),
        (MockFailure::Sink, "Could not create file sink stage"),
        (MockFailure::Link, "Could not link pipeline elements"),
        (MockFailure::Play, "Could not start pipeline"),
    ];

    for (failure, expected) in cases {
        let engine = MockEngine::new();
        engine.fail(failure);
        let mut session = flac_session(&engine);
        let events = record_callbacks(&mut session, &engine);

        assert!(session.start_track_rip(1, "/tmp/01.flac", None).is_err(), "{:?}", failure);

        let events = snapshot(&events);
        assert_eq!(events.len(), 1, "{:?}: {:?}", failure, events);
        assert!(events[0].starts_with(&format!("error:{}:", expected)), "{:?}: {:?}", failure, events);

        assert!(!session.is_ripping());
        assert!(!session.has_pipeline());
        assert!(!session.is_polling());
        assert!(!engine.is_subscribed());
        assert_eq!(engine.graphs_created(), engine.graphs_released(), "{:?}", failure);
    }
}

#[test]
fn test_unparsable_encoder_never_starts() {
    let engine = MockEngine::new();
    engine.set_parse_error("no element \"opusenc\"");
    let mut session = flac_session(&engine);
    let events = record_callbacks(&mut session, &engine);

    let err = session.start_track_rip(1, "/tmp/01.opus", None).unwrap_err();

    assert!(matches!(err, RipperError::EncoderParse(_)));
    assert!(!session.is_ripping());
    assert_eq!(
        snapshot(&events),
        vec!["error:Could not create encoder pipeline:no element \"opusenc\"".to_string()]
    );
}

#[test]
fn test_empty_encoder_description_is_rejected() {
    let engine = MockEngine::new();
    let mut session = RipperSession::new(engine.clone(), "/dev/sr0", 0, "");
    let events = record_callbacks(&mut session, &engine);

    assert!(session.start_track_rip(1, "/tmp/01.flac", None).is_err());
    assert!(!session.is_ripping());
    assert_eq!(
        snapshot(&events),
        vec!["error:Could not create encoder pipeline:empty pipeline not allowed".to_string()]
    );
}

#[test]
fn test_cancel_is_idempotent() {
    let engine = MockEngine::new();
    let mut session = flac_session(&engine);

    session.cancel();
    session.cancel();
    assert!(!session.has_pipeline());
    assert!(!session.is_polling());

    session.start_track_rip(4, "/tmp/04.flac", None).unwrap();
    session.cancel();
    session.cancel();

    assert!(!session.is_ripping());
    assert!(!session.has_pipeline());
    assert!(!session.is_polling());
    assert!(!engine.is_subscribed());
    assert_eq!(engine.graphs_released(), 1);
}

#[tokio::test]
async fn test_eos_stops_before_finished_fires() {
    let engine = MockEngine::new();
    let mut session = flac_session(&engine);
    let events = record_callbacks(&mut session, &engine);

    session.start_track_rip(2, "/tmp/02.flac", None).unwrap();
    assert!(engine.post(prerolled()));
    assert!(engine.post(BusMessage::Eos));

    session.run().await;

    assert_eq!(
        snapshot(&events),
        vec!["mime:audio/x-flac".to_string(), "finished".to_string()]
    );
    assert_eq!(engine.history(), vec!["graph:playing", "mime", "graph:null", "finished"]);
    assert!(!session.is_ripping());
    assert!(!session.is_polling());
    assert_eq!(session.mime_type(), Some("audio/x-flac"));

    // Stopped, but released only by the next start or cancel
    assert!(session.has_pipeline());
    assert_eq!(engine.graphs_released(), 0);
}

#[tokio::test]
async fn test_runtime_error_keeps_pipeline_until_cancel() {
    let engine = MockEngine::new();
    let mut session = flac_session(&engine);
    let events = record_callbacks(&mut session, &engine);

    session.start_track_rip(2, "/tmp/02.flac", None).unwrap();
    engine.post(BusMessage::Error {
        message: "Read error".into(),
        debug: Some("sector 42".into()),
    });

    session.run().await;

    assert_eq!(snapshot(&events), vec!["error:Read error:sector 42".to_string()]);
    assert!(!session.is_ripping());
    assert!(!session.is_polling());
    assert!(session.has_pipeline());
    assert_eq!(engine.graph_state_now(), Some(StreamState::Playing));

    session.cancel();
    assert!(!session.has_pipeline());
    assert_eq!(engine.graph_state_now(), Some(StreamState::Null));
    assert_eq!(engine.graphs_released(), 1);
}

#[tokio::test]
async fn test_session_is_reused_across_tracks() {
    let engine = MockEngine::new();
    let mut session = flac_session(&engine);
    let events = record_callbacks(&mut session, &engine);

    for track in 1..=3 {
        session
            .start_track_rip(track, format!("/tmp/{:02}.flac", track), None)
            .unwrap();
        assert_eq!(session.mime_type(), None);

        engine.post(prerolled());
        engine.post(BusMessage::Eos);
        session.run().await;
    }

    assert_eq!(engine.graphs_created(), 3);
    assert_eq!(engine.graphs_released(), 2);
    assert_eq!(engine.format_lookups(), 1);
    assert_eq!(
        snapshot(&events)
            .iter()
            .filter(|event| event.as_str() == "finished")
            .count(),
        3
    );
}

#[test]
fn test_tags_follow_encoder_identity() {
    let engine = MockEngine::new();
    let mut session = flac_session(&engine);

    let track_tags = TagList::new()
        .with(tags::TITLE, "Intro")
        .with(tags::ARTIST, "The Band")
        .with(tags::TRACK_NUMBER, 1u32);
    session.start_track_rip(1, "/tmp/01.flac", Some(&track_tags)).unwrap();

    let written = engine.encoder_tags().unwrap();
    let names: Vec<&str> = written.iter().map(|(name, _)| name).collect();
    assert_eq!(
        names,
        vec![tags::ENCODER, tags::ENCODER_VERSION, tags::TITLE, tags::ARTIST, tags::TRACK_NUMBER]
    );
    assert_eq!(
        written.get(tags::ENCODER),
        Some(&PropertyValue::from(format!("cdrip {}", env!("CARGO_PKG_VERSION"))))
    );

    // The next track starts from a clean list
    session.cancel();
    let next_tags = TagList::new().with(tags::TITLE, "Outro");
    session.start_track_rip(2, "/tmp/02.flac", Some(&next_tags)).unwrap();

    let written = engine.encoder_tags().unwrap();
    assert_eq!(written.len(), 3);
    assert_eq!(written.get(tags::TITLE), Some(&PropertyValue::from("Outro")));
    assert!(!written.contains(tags::ARTIST));
}

#[test]
fn test_untaggable_encoder_still_rips() {
    let engine = MockEngine::new();
    engine.set_tagging_supported(false);
    let mut session = RipperSession::new(engine.clone(), "/dev/sr0", 255, "wavenc");
    let events = record_callbacks(&mut session, &engine);

    let tags = TagList::new().with(tags::TITLE, "Intro");
    let rip = session.start_track_rip(1, "/tmp/01.wav", Some(&tags)).unwrap();

    assert!(!rip.tagging_supported);
    assert!(session.is_ripping());
    assert!(engine.encoder_tags().is_none());
    assert!(snapshot(&events).is_empty());
}

#[tokio::test]
async fn test_forwarding_callbacks_deliver_events() {
    let engine = MockEngine::new();
    engine.set_encoder_formats(vec![
        NegotiatedFormat::new("audio/x-raw"),
        NegotiatedFormat::new("audio/mpeg").with_attribute("mpegversion", PropertyValue::Int(2)),
        NegotiatedFormat::new("application/x-id3"),
    ]);

    let output_dir = TempDir::new().unwrap();
    let mut config = RipperConfig {
        output_dir: output_dir.path().to_path_buf(),
        ..RipperConfig::default()
    };
    config.set_encoder("mp3");
    let mut session = RipperSession::from_config(engine.clone(), &config);
    assert_eq!(session.device(), "/dev/cdrom");

    let (tx, mut rx) = mpsc::unbounded_channel();
    session.set_callbacks(RipperCallbacks::forwarding(tx));

    let output_path = config.track_path(5);
    assert_eq!(output_path, output_dir.path().join("05.mp3"));
    session.start_track_rip(5, &output_path, None).unwrap();
    engine.post(prerolled());
    engine.post(BusMessage::Other("tag".into()));
    engine.post(BusMessage::Eos);
    session.run().await;

    assert_eq!(rx.try_recv().unwrap(), RipEvent::MimeType("application/x-id3".into()));
    assert_eq!(rx.try_recv().unwrap(), RipEvent::Finished);
    assert!(rx.try_recv().is_err());
}
