//! # UI Event Emitter
//!
//! A pub-sub bus for the events the Main Agent Loop and Sub-Agent emit as
//! they run, consumed by whatever renders progress to a user (TUI, plain
//! log, websocket bridge — none of which live in this crate). Built on a
//! `tokio::sync::broadcast` channel so an arbitrary number of renderers can
//! subscribe; slow subscribers drop the oldest events rather than stalling
//! the agent loop.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// The kind of event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEventKind {
    IterationStarted,
    ThoughtGenerated { reasoning: String },
    ActionSelected { tool_name: String },
    ToolExecutionStarted { tool_name: String },
    ToolExecutionCompleted { tool_name: String, success: bool },
    ObservationMade { observation: String },
    SystemInfo { message: String },
    ConfirmationRequested { tool_name: String },
    ConfirmationResolved { approved: bool },
    TaskCompleted { success: bool },
}

/// A single published event: a monotonic sequence number, the iteration it
/// occurred in (when applicable), and its payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiEvent {
    pub sequence: u64,
    pub iteration: Option<usize>,
    pub kind: UiEventKind,
}

/// Publishes [`UiEvent`]s and stamps each with a monotonically increasing
/// sequence number. Cheaply cloneable; every clone shares the same
/// broadcast channel and sequence counter.
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<UiEvent>,
    sequence: Arc<AtomicU64>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Subscribe a new receiver. Events published before this call are not
    /// replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }

    /// Publish an event, stamping it with the next sequence number. Returns
    /// the number of active subscribers it was delivered to (zero is not an
    /// error — nobody may be listening).
    pub fn emit(&self, iteration: Option<usize>, kind: UiEventKind) -> usize {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let event = UiEvent {
            sequence,
            iteration,
            kind,
        };
        self.tx.send(event).unwrap_or(0)
    }

    /// Number of events published so far.
    pub fn sequence_count(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}
