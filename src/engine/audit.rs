//! Audit notifications for applied overlays
//!
//! Delivery is best-effort. Events are queued to a background worker so a
//! slow sink never blocks `apply`; sink errors and panics are logged and
//! dropped.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use overlay_spec::{OverlayLookup, OverlayRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// One applied overlay, as reported to the audit sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayAuditEvent {
    pub overlay: OverlayRef,
    pub context: OverlayLookup,
    /// Serialized as an ISO-8601 string
    pub timestamp: DateTime<Utc>,
}

/// Failure reported by an audit sink (logged, never propagated)
#[derive(Debug, Clone, Error)]
#[error("audit sink failed: {0}")]
pub struct AuditError(pub String);

/// Receiver of audit events
pub trait AuditSink: Send + Sync + 'static {
    fn record(&self, event: &OverlayAuditEvent) -> Result<(), AuditError>;
}

impl<F> AuditSink for F
where
    F: Fn(&OverlayAuditEvent) -> Result<(), AuditError> + Send + Sync + 'static,
{
    fn record(&self, event: &OverlayAuditEvent) -> Result<(), AuditError> {
        self(event)
    }
}

enum Message {
    Event(OverlayAuditEvent),
    Flush(mpsc::SyncSender<()>),
}

/// Fire-and-forget delivery of audit events on a dedicated thread
pub struct AuditDispatcher {
    sender: Option<mpsc::Sender<Message>>,
    worker: Option<JoinHandle<()>>,
}

impl AuditDispatcher {
    /// Start the delivery thread. If it cannot be spawned, events are dropped.
    pub fn spawn(sink: Arc<dyn AuditSink>) -> Self {
        let (sender, receiver) = mpsc::channel::<Message>();

        let spawned = thread::Builder::new()
            .name("overlay-audit".to_string())
            .spawn(move || deliver(sink, receiver));

        match spawned {
            Ok(worker) => Self {
                sender: Some(sender),
                worker: Some(worker),
            },
            Err(e) => {
                warn!(error = %e, "could not start audit thread; audit events will be dropped");
                Self {
                    sender: None,
                    worker: None,
                }
            }
        }
    }

    /// Queue an event. Never blocks and never fails.
    pub fn dispatch(&self, event: OverlayAuditEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(Message::Event(event)).is_err() {
                warn!("audit thread has stopped; dropping event");
            }
        }
    }

    /// Block until every event queued so far has been handed to the sink
    pub fn flush(&self) {
        let Some(sender) = &self.sender else {
            return;
        };
        let (ack, done) = mpsc::sync_channel(1);
        if sender.send(Message::Flush(ack)).is_ok() {
            let _ = done.recv();
        }
    }
}

impl Drop for AuditDispatcher {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl std::fmt::Debug for AuditDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditDispatcher")
            .field("running", &self.sender.is_some())
            .finish()
    }
}

fn deliver(sink: Arc<dyn AuditSink>, receiver: mpsc::Receiver<Message>) {
    for message in receiver {
        match message {
            Message::Event(event) => {
                match panic::catch_unwind(AssertUnwindSafe(|| sink.record(&event))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(overlay = %event.overlay, error = %e, "audit sink rejected event");
                    }
                    Err(_) => {
                        warn!(overlay = %event.overlay, "audit sink panicked");
                    }
                }
            }
            Message::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}
