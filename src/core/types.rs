use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// Coarse page mode: a list of cards, or a single opened entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    List,
    Detail,
}

/// One list entry, re-read from the page on every scan.
///
/// `index` is only stable for the paint frame the enumeration came from;
/// callers must not hold it across a navigation.
#[derive(Debug, Clone)]
pub struct Card {
    pub index: usize,
    pub id: Option<String>,
    pub snippet: String,
}

impl Card {
    /// Dedup key: id when one could be extracted, text signature otherwise.
    pub fn dedup_key(&self) -> String {
        match &self.id {
            Some(id) => format!("id:{id}"),
            None => format!("t:{}", self.snippet),
        }
    }
}

/// Ordered navigation fallbacks for a card id, tried until one of them
/// produces a detail-route transition.
pub fn candidate_urls(origin: &str, id: &str) -> Vec<String> {
    vec![
        format!("{origin}/profile/{id}"),
        format!("{origin}/profile?id={id}"),
        format!("{origin}/profile"),
    ]
}

/// Bounded numeric filter range. The cursor only moves forward.
#[derive(Debug, Clone)]
pub struct AgeRange {
    pub start: u32,
    pub end: u32,
    pub step: u32,
    pub cursor: u32,
}

impl AgeRange {
    pub fn new(start: u32, end: u32, step: u32) -> Self {
        let end = end.max(start);
        Self {
            start,
            end,
            step: step.max(1),
            cursor: start,
        }
    }

    /// Advance the cursor by one step. Returns `false` when the range is
    /// exhausted (the cursor moved past `end`).
    pub fn advance(&mut self) -> bool {
        self.cursor = self.cursor.saturating_add(self.step);
        self.cursor <= self.end
    }
}

/// Shared run/sweep flags. `stop()` is the sole cancellation mechanism:
/// loops observe it at iteration boundaries, in-flight bounded waits are
/// left to time out naturally.
#[derive(Debug, Default)]
pub struct SessionFlags {
    running: AtomicBool,
    sweeping: AtomicBool,
}

impl SessionFlags {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn sweeping(&self) -> bool {
        self.sweeping.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, v: bool) {
        self.running.store(v, Ordering::SeqCst);
    }

    pub fn set_sweeping(&self, v: bool) {
        self.sweeping.store(v, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.sweeping.store(false, Ordering::SeqCst);
    }
}

/// Per-session traversal state, owned exclusively by the scheduler and
/// reset at the start of every list re-scan.
#[derive(Debug)]
pub struct WalkSession {
    pub flags: Arc<SessionFlags>,
    pub visited: HashSet<String>,
    pub age: AgeRange,
}

impl WalkSession {
    pub fn new(flags: Arc<SessionFlags>, age: AgeRange) -> Self {
        Self {
            flags,
            visited: HashSet::new(),
            age,
        }
    }
}

/// Why a walk cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No unseen card even after forced-load bursts.
    Exhausted,
    /// The per-cycle card cap was reached.
    LimitReached,
    /// The running flag was cleared mid-cycle.
    Stopped,
}

#[derive(Debug, Clone, Copy)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub opened: usize,
}

/// Final session status, reported once at Done.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionReport {
    pub cards_opened: usize,
    pub filter_values_applied: Vec<u32>,
    pub stopped_by_request: bool,
}
