//! Observer-visible event stream.
//!
//! A bounded ring buffer of recent envelopes plus live broadcast to
//! subscribers. Envelopes carry a global monotonic sequence assigned at
//! publish time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;

/// One observer-visible envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiEnvelope {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    /// Dotted kind, e.g. "adapter.circuit_open", "contract_net.award".
    pub kind: String,
    pub detail: String,
}

/// Bounded ring buffer + live subscribers.
pub struct UiEventStream {
    buffer: Mutex<VecDeque<UiEnvelope>>,
    capacity: usize,
    sequence: AtomicU64,
    sender: broadcast::Sender<UiEnvelope>,
}

impl UiEventStream {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            sequence: AtomicU64::new(0),
            sender,
        }
    }

    /// Publish an envelope; assigns the next global sequence.
    pub fn publish(&self, kind: impl Into<String>, detail: impl Into<String>) -> UiEnvelope {
        let envelope = UiEnvelope {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            timestamp: Utc::now(),
            kind: kind.into(),
            detail: detail.into(),
        };

        {
            let mut buffer = self.buffer.lock().expect("ui buffer poisoned");
            if buffer.len() == self.capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let _ = self.sender.send(envelope.clone());
        envelope
    }

    /// The most recent `n` envelopes, oldest first.
    pub fn recent(&self, n: usize) -> Vec<UiEnvelope> {
        let buffer = self.buffer.lock().expect("ui buffer poisoned");
        buffer.iter().rev().take(n).rev().cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEnvelope> {
        self.sender.subscribe()
    }

    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}
