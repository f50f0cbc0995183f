//! Ordered event delivery for a single load
//!
//! One [`EventSender`] is shared by every phase of a load (cache attempt,
//! network attempt) so the ordering guarantees hold across phases: progress
//! never goes backwards, exactly one `Progress(1.0)` is sent, partial
//! snapshots only grow and nothing follows the terminal event.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::errors::IngestError;
use crate::models::{ChannelList, IngestionEvent};

/// Receiving half handed to the subscriber
pub type EventReceiver = mpsc::UnboundedReceiver<IngestionEvent>;

/// Largest value an intermediate progress event may carry
const MAX_INTERMEDIATE_PROGRESS: f32 = 0.999;

#[derive(Debug, Default)]
struct EmitState {
    last_progress: f32,
    last_partial_len: usize,
    final_progress_sent: bool,
    finished: bool,
}

/// Cloneable sender that enforces the event ordering of one load
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Option<mpsc::UnboundedSender<IngestionEvent>>,
    state: Arc<Mutex<EmitState>>,
}

impl EventSender {
    /// Create a connected sender and its receiver
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                state: Arc::new(Mutex::new(EmitState::default())),
            },
            rx,
        )
    }

    /// A sender with no subscriber; every event is discarded
    pub fn disabled() -> Self {
        Self {
            tx: None,
            state: Arc::new(Mutex::new(EmitState::default())),
        }
    }

    /// Whether anyone is still listening
    pub fn has_subscriber(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut EmitState) -> T) -> T {
        // A poisoned lock only means another emitter panicked mid-update
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }

    fn send(&self, event: IngestionEvent) {
        if let Some(tx) = &self.tx {
            // The subscriber may have gone away; loads continue regardless
            let _ = tx.send(event);
        }
    }

    /// Report intermediate progress; regressions and values >= 1.0 are capped
    pub fn progress(&self, fraction: f32) {
        if !fraction.is_finite() {
            return;
        }
        let fraction = fraction.clamp(0.0, MAX_INTERMEDIATE_PROGRESS);
        let should_send = self.with_state(|state| {
            if state.finished || state.final_progress_sent || fraction <= state.last_progress {
                return false;
            }
            state.last_progress = fraction;
            true
        });
        if should_send {
            self.send(IngestionEvent::Progress(fraction));
        }
    }

    /// Publish a snapshot of channels parsed so far
    ///
    /// Skipped when nobody listens or when the snapshot is not larger than the
    /// previous one.
    pub fn partial(&self, channels: ChannelList) {
        if !self.has_subscriber() {
            return;
        }
        let len = channels.len();
        let should_send = self.with_state(|state| {
            if state.finished || len <= state.last_partial_len {
                return false;
            }
            state.last_partial_len = len;
            true
        });
        if should_send {
            self.send(IngestionEvent::Partial(channels));
        }
    }

    /// Send the single `Progress(1.0)` of this load
    pub fn final_progress(&self) {
        let should_send = self.with_state(|state| {
            if state.finished || state.final_progress_sent {
                return false;
            }
            state.final_progress_sent = true;
            state.last_progress = 1.0;
            true
        });
        if should_send {
            self.send(IngestionEvent::Progress(1.0));
        }
    }

    /// Terminal success event, preceded by the final progress if still due
    pub fn complete(&self, channels: ChannelList) {
        self.final_progress();
        if self.finish() {
            self.send(IngestionEvent::Complete(channels));
        }
    }

    /// Terminal failure event
    pub fn failed(&self, error: IngestError) {
        if self.finish() {
            self.send(IngestionEvent::Failed(error));
        }
    }

    fn finish(&self) -> bool {
        self.with_state(|state| !std::mem::replace(&mut state.finished, true))
    }
}
