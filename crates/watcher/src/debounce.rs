//! Per-key debouncing with async timers
//!
//! Each raw event resets the key's timer; only the last event kind of a burst
//! is emitted, once the key has been quiet for the debounce duration.
//!
//! Example: an editor writing a file in five steps within 100ms produces one
//! debounced event 500ms after the last step.

use crate::ChangeKind;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::sleep;

/// A debounced event: document key and the last kind seen for it
pub type Debounced = (String, ChangeKind);

/// Per-key debouncer with async timers
pub struct Debouncer {
    /// Per-key debounce state
    state: Arc<DashMap<String, DebounceEntry>>,

    /// Debounce duration (how long to wait after last event)
    debounce_duration: Duration,

    /// Channel for debounced keys
    tx: mpsc::UnboundedSender<Debounced>,
}

/// Per-key debounce state
#[derive(Debug)]
struct DebounceEntry {
    /// Latest event kind, replacing earlier ones in the burst
    kind: ChangeKind,

    /// When the timer is scheduled to fire
    scheduled_fire: Instant,
}

impl Debouncer {
    /// Create a debouncer and the receiver its events are delivered on
    pub fn new(debounce_duration: Duration) -> (Self, mpsc::UnboundedReceiver<Debounced>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let debouncer = Self {
            state: Arc::new(DashMap::new()),
            debounce_duration,
            tx,
        };
        (debouncer, rx)
    }

    /// Register an event for debouncing
    ///
    /// Starts or resets the timer for the key. Must be called within a tokio runtime.
    pub fn push(&self, key: &str, kind: ChangeKind) {
        let scheduled_fire = Instant::now() + self.debounce_duration;

        let needs_timer = match self.state.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                // Updating the deadline effectively resets the running timer
                let entry = entry.get_mut();
                entry.kind = kind;
                entry.scheduled_fire = scheduled_fire;
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(DebounceEntry {
                    kind,
                    scheduled_fire,
                });
                true
            }
        };

        if needs_timer {
            self.spawn_timer(key.to_string());
        }
    }

    fn spawn_timer(&self, key: String) {
        let state = Arc::clone(&self.state);
        let tx = self.tx.clone();
        let mut wait = self.debounce_duration;

        tokio::spawn(async move {
            loop {
                sleep(wait).await;

                let now = Instant::now();
                if let Some((key, entry)) = state.remove_if(&key, |_, e| e.scheduled_fire <= now) {
                    let _ = tx.send((key, entry.kind));
                    return;
                }

                // Reset by a newer event: sleep out the remainder, or stop if cancelled
                match state.get(&key) {
                    Some(entry) => wait = entry.scheduled_fire.saturating_duration_since(now),
                    None => return,
                }
            }
        });
    }

    /// Drop a pending event without emitting it
    pub fn cancel(&self, key: &str) -> bool {
        self.state.remove(key).is_some()
    }

    /// Get the number of keys currently being debounced
    pub fn pending_count(&self) -> usize {
        self.state.len()
    }

    /// Flush all pending debounces immediately
    ///
    /// Returns every pending event without waiting out its timer.
    pub fn flush(&self) -> Vec<Debounced> {
        let keys: Vec<String> = self.state.iter().map(|e| e.key().clone()).collect();

        keys.into_iter()
            .filter_map(|key| self.state.remove(&key))
            .map(|(key, entry)| (key, entry.kind))
            .collect()
    }
}
