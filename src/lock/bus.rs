//! Cross-agent notification channel.
//!
//! Started/stopped events fan out to every subscriber on the shared channel.
//! Delivery is best-effort: an agent that misses an event (or lives in a
//! process the broadcast cannot reach) converges through the lease store's
//! TTL poll instead.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::store::now_ms;

/// Channel name shared by every cooperating agent.
pub const CHANNEL_NAME: &str = "omiai-tools";

const CHANNEL_CAPACITY: usize = 16;

/// Wire shape: `{ "type": "started" | "stopped", "ts": <epoch-ms> }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AgentSignal {
    Started { ts: i64 },
    Stopped { ts: i64 },
}

impl AgentSignal {
    pub fn started() -> Self {
        Self::Started { ts: now_ms() }
    }

    pub fn stopped() -> Self {
        Self::Stopped { ts: now_ms() }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped { .. })
    }
}

#[derive(Clone)]
pub struct SignalBus {
    tx: broadcast::Sender<AgentSignal>,
}

impl SignalBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish to all current subscribers. Having no subscribers is fine.
    pub fn publish(&self, signal: AgentSignal) {
        let _ = self.tx.send(signal);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentSignal> {
        self.tx.subscribe()
    }
}

impl Default for SignalBus {
    fn default() -> Self {
        Self::new()
    }
}
