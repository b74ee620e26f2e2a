//! Caller notification slots for a ripper session

use tokio::sync::mpsc;

pub type ProgressCallback = Box<dyn FnMut(u64) + Send>;
pub type MimeTypeCallback = Box<dyn FnMut(&str) + Send>;
pub type FinishedCallback = Box<dyn FnMut() + Send>;
pub type ErrorCallback = Box<dyn FnMut(&str, Option<&str>) + Send>;

/// Event form of the callbacks, for callers that prefer a channel
#[derive(Debug, Clone, PartialEq)]
pub enum RipEvent {
    Progress { elapsed_ms: u64 },
    MimeType(String),
    Finished,
    Error { message: String, debug: Option<String> },
}

/// Four independent, optional handlers. An empty slot is skipped silently.
#[derive(Default)]
pub struct RipperCallbacks {
    pub(crate) progress: Option<ProgressCallback>,
    pub(crate) mime_type: Option<MimeTypeCallback>,
    pub(crate) finished: Option<FinishedCallback>,
    pub(crate) error: Option<ErrorCallback>,
}

impl RipperCallbacks {
    /// Callbacks that forward every notification into `tx`.
    /// Sends to a closed channel are dropped.
    pub fn forwarding(tx: mpsc::UnboundedSender<RipEvent>) -> Self {
        let progress_tx = tx.clone();
        let mime_tx = tx.clone();
        let finished_tx = tx.clone();
        let error_tx = tx;

        Self {
            progress: Some(Box::new(move |elapsed_ms: u64| {
                let _ = progress_tx.send(RipEvent::Progress { elapsed_ms });
            })),
            mime_type: Some(Box::new(move |mime_type: &str| {
                let _ = mime_tx.send(RipEvent::MimeType(mime_type.to_string()));
            })),
            finished: Some(Box::new(move || {
                let _ = finished_tx.send(RipEvent::Finished);
            })),
            error: Some(Box::new(move |message: &str, debug: Option<&str>| {
                let _ = error_tx.send(RipEvent::Error {
                    message: message.to_string(),
                    debug: debug.map(str::to_string),
                });
            })),
        }
    }

    pub(crate) fn progress(&mut self, elapsed_ms: u64) {
        if let Some(cb) = self.progress.as_mut() {
            cb(elapsed_ms);
        }
    }

    pub(crate) fn mime_type(&mut self, mime_type: &str) {
        if let Some(cb) = self.mime_type.as_mut() {
            cb(mime_type);
        }
    }

    pub(crate) fn finished(&mut self) {
        if let Some(cb) = self.finished.as_mut() {
            cb();
        }
    }

    pub(crate) fn error(&mut self, message: &str, debug: Option<&str>) {
        if let Some(cb) = self.error.as_mut() {
            cb(message, debug);
        }
    }
}
