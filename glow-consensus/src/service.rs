//! Async driver for one engine.
//!
//! The service owns the single consumer of the inbound event channel, so
//! events are still processed one at a time and in arrival order. It adds no
//! protocol logic of its own.
//!
//! ```text
//! network / timer ──► ServiceHandle::submit ──► mpsc ──► ConsensusService::run
//!                                                            │ engine.handle(event)
//!                                                            ▼
//!                                            mpsc ──► EngineOutput consumer
//! ```

use std::sync::Arc;

use glow_core::{FinalizedLedger, Slot};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::engine::{ConsensusEngine, EngineOutput, EngineStats, Event};

/// Errors returned by [`ServiceHandle`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("consensus service has shut down")]
    Closed,
}

/// Event loop around a [`ConsensusEngine`].
pub struct ConsensusService {
    engine: Arc<RwLock<ConsensusEngine>>,
    inbox: mpsc::Receiver<Event>,
    outbox: mpsc::Sender<EngineOutput>,
}

impl ConsensusService {
    /// Wrap `engine`. Both channels hold up to `capacity` items.
    ///
    /// Returns the service, a handle for submitting events, and the receiver
    /// of engine outputs.
    pub fn new(
        engine: ConsensusEngine,
        capacity: usize,
    ) -> (Self, ServiceHandle, mpsc::Receiver<EngineOutput>) {
        let engine = Arc::new(RwLock::new(engine));
        let (inbox_tx, inbox_rx) = mpsc::channel(capacity.max(1));
        let (outbox_tx, outbox_rx) = mpsc::channel(capacity.max(1));
        let service = Self {
            engine: engine.clone(),
            inbox: inbox_rx,
            outbox: outbox_tx,
        };
        let handle = ServiceHandle {
            engine,
            inbox: inbox_tx,
        };
        (service, handle, outbox_rx)
    }

    /// Run until every handle is dropped or the output receiver is closed.
    pub async fn run(mut self) {
        info!("Consensus service started");
        while let Some(event) = self.inbox.recv().await {
            let outputs = self.engine.write().await.handle(event);
            for output in outputs {
                if self.outbox.send(output).await.is_err() {
                    warn!("Output receiver dropped, stopping consensus service");
                    return;
                }
            }
        }
        debug!("All handles dropped");
        info!("Consensus service stopped");
    }
}

/// Cloneable handle to a running [`ConsensusService`].
#[derive(Clone)]
pub struct ServiceHandle {
    engine: Arc<RwLock<ConsensusEngine>>,
    inbox: mpsc::Sender<Event>,
}

impl ServiceHandle {
    /// Queue an event for the engine.
    pub async fn submit(&self, event: Event) -> Result<(), ServiceError> {
        self.inbox.send(event).await.map_err(|_| ServiceError::Closed)
    }

    /// Current statistics.
    pub async fn stats(&self) -> EngineStats {
        self.engine.read().await.stats()
    }

    /// Current slot.
    pub async fn slot(&self) -> Slot {
        self.engine.read().await.slot()
    }

    /// Copy of the finalized ledger.
    pub async fn ledger(&self) -> FinalizedLedger {
        self.engine.read().await.ledger().clone()
    }

    /// Copy of the whole engine state.
    pub async fn snapshot(&self) -> ConsensusEngine {
        self.engine.read().await.clone()
    }
}
