//! Bookkeeping for the completion orchestrator: which games have already been
//! advanced, and when each division's pool check last ran.

use crate::GameId;
use std::collections::HashMap;
use tokio::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Idempotency ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Scores the game had when it was processed.
    pub fingerprint: (u32, u32),
    pub processed_at: Instant,
}

/// Games already processed in this session. Entries expire after `ttl`.
#[derive(Debug)]
pub struct ProcessedLedger {
    entries: HashMap<GameId, LedgerEntry>,
    ttl: Duration,
}

impl ProcessedLedger {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: HashMap::new(), ttl }
    }

    pub fn lookup(&self, id: &str, now: Instant) -> Option<LedgerEntry> {
        self.entries
            .get(id)
            .filter(|entry| now.duration_since(entry.processed_at) < self.ttl)
            .copied()
    }

    /// Processed with exactly these scores (a redundant notification).
    pub fn is_processed(&self, id: &str, fingerprint: (u32, u32), now: Instant) -> bool {
        self.lookup(id, now).is_some_and(|entry| entry.fingerprint == fingerprint)
    }

    pub fn mark(&mut self, id: &str, fingerprint: (u32, u32), now: Instant) {
        self.entries
            .insert(id.to_owned(), LedgerEntry { fingerprint, processed_at: now });
    }

    pub fn forget(&mut self, id: &str) {
        self.entries.remove(id);
    }

    pub fn evict_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| now.duration_since(entry.processed_at) < ttl);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Per-key debounce
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Debounce {
    /// Run the check now.
    Run,
    /// Too soon; the caller schedules one trailing run at `at`.
    Deferred { at: Instant },
    /// A trailing run is already scheduled and will cover this request.
    Coalesced,
}

#[derive(Debug, Clone, Copy)]
struct DebounceState {
    last_run: Instant,
    trailing: bool,
}

/// Coalescing debounce keyed by division id. A burst of requests yields the
/// immediate run plus at most one trailing run at the end of the window.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    keys: HashMap<String, DebounceState>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, keys: HashMap::new() }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn poll(&mut self, key: &str, now: Instant) -> Debounce {
        let Some(state) = self.keys.get_mut(key) else {
            self.keys
                .insert(key.to_owned(), DebounceState { last_run: now, trailing: false });
            return Debounce::Run;
        };
        if state.trailing {
            return Debounce::Coalesced;
        }
        if now.duration_since(state.last_run) >= self.window {
            state.last_run = now;
            return Debounce::Run;
        }
        state.trailing = true;
        Debounce::Deferred { at: state.last_run + self.window }
    }

    /// The trailing run for `key` is starting.
    pub fn fire(&mut self, key: &str, now: Instant) {
        self.keys
            .insert(key.to_owned(), DebounceState { last_run: now, trailing: false });
    }
}
