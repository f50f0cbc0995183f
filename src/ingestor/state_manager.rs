use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::LoadState;

/// Identity of one load: its generation and cancellation token
#[derive(Debug, Clone)]
pub struct LoadTicket {
    generation: u64,
    token: CancellationToken,
}

impl LoadTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Single-flight bookkeeping and observable load state
///
/// Starting a load cancels the one before it. Only the most recent ticket
/// may publish state, so a superseded load finishing late cannot overwrite
/// what the newer one reported.
#[derive(Debug)]
pub struct IngestionStateManager {
    state_tx: watch::Sender<LoadState>,
    generation: AtomicU64,
    current_token: Mutex<Option<CancellationToken>>,
}

impl Default for IngestionStateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestionStateManager {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(LoadState::Idle);
        Self {
            state_tx,
            generation: AtomicU64::new(0),
            current_token: Mutex::new(None),
        }
    }

    /// Register a new load, cancelling the previous one
    pub fn begin_load(&self) -> LoadTicket {
        let token = CancellationToken::new();
        let mut current = self
            .current_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(previous) = current.replace(token.clone()) {
            previous.cancel();
        }
        // Bumped under the lock so generation order matches token order
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        drop(current);

        debug!("Starting load generation {}", generation);
        LoadTicket { generation, token }
    }

    /// Whether `ticket` belongs to the most recent load
    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.generation
    }

    /// Publish a state on behalf of `ticket`; ignored for superseded loads
    pub fn set_state(&self, ticket: &LoadTicket, state: LoadState) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.state_tx.send_replace(state);
        true
    }

    /// Cancel whatever load is running, if any
    pub fn cancel_current(&self) {
        let current = self
            .current_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(token) = current.as_ref() {
            token.cancel();
        }
    }

    pub fn current_state(&self) -> LoadState {
        self.state_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.state_tx.subscribe()
    }
}
