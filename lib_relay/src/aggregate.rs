//! Cumulative session state.
//!
//! The aggregator owns the single state document the relay accumulates from
//! delta fragments, plus the liveness counters that decide whether that
//! document represents a session worth broadcasting. All mutation goes
//! through [`StateAggregator::apply`]; readers take [`StateAggregator::snapshot`].
//! Merge and snapshot are mutually exclusive critical sections over one
//! mutex, so a snapshot can never observe a half-applied fragment. The
//! sections are short and never await, hence a sync mutex inside async code.

use std::sync::Mutex;

use serde_json::{Map, Value};

/// Consecutive empty frames tolerated before the session is judged over.
/// Small fixed constant inherited from observed feed behaviour.
pub const EMPTY_FRAME_LIMIT: u32 = 5;

/// Accepted updates required before broadcasts carry real state.
pub const ACTIVE_MESSAGE_THRESHOLD: u64 = 5;

#[derive(Default)]
struct Session {
    state: Map<String, Value>,
    message_count: u64,
    empty_frame_run: u32,
}

/// Owner of the cumulative state document and its liveness counters.
pub struct StateAggregator {
    session: Mutex<Session>,
    debug_mode: bool,
}

impl StateAggregator {
    /// `debug_mode` disables the empty-frame liveness reset and forces the
    /// broadcast gate open, so development against a quiet feed still
    /// produces output.
    pub fn new(debug_mode: bool) -> Self {
        Self {
            session: Mutex::new(Session::default()),
            debug_mode,
        }
    }

    /// Applies one decoded frame: the liveness update first, then a merge
    /// per field.
    pub fn apply(&self, fields: Vec<(String, Value)>) {
        let mut session = self.session.lock().expect("aggregator lock poisoned");

        if fields.is_empty() {
            session.empty_frame_run += 1;
            if session.empty_frame_run > EMPTY_FRAME_LIMIT && !self.debug_mode {
                // Session end. The connection stays open (it may still be
                // delivering heartbeats); only the document is discarded.
                log::warn!(
                    "{} consecutive empty frames, discarding session state",
                    session.empty_frame_run
                );
                session.state = Map::new();
                session.message_count = 0;
            }
            return;
        }

        session.empty_frame_run = 0;
        for (topic, value) in fields {
            merge_entry(&mut session.state, topic, value);
            session.message_count += 1;
        }
    }

    /// Clears the document and both counters. Called whenever the upstream
    /// connection is (re)established or torn down.
    pub fn reset(&self) {
        let mut session = self.session.lock().expect("aggregator lock poisoned");
        *session = Session::default();
    }

    /// An independent deep copy of the current document, safe to serialize
    /// outside the lock.
    pub fn snapshot(&self) -> Value {
        let session = self.session.lock().expect("aggregator lock poisoned");
        Value::Object(session.state.clone())
    }

    /// The broadcast gate: has this session produced enough updates to be
    /// worth relaying?
    pub fn is_active(&self) -> bool {
        if self.debug_mode {
            return true;
        }
        let session = self.session.lock().expect("aggregator lock poisoned");
        session.message_count > ACTIVE_MESSAGE_THRESHOLD
    }

    pub fn message_count(&self) -> u64 {
        self.session
            .lock()
            .expect("aggregator lock poisoned")
            .message_count
    }
}

fn merge_entry(state: &mut Map<String, Value>, topic: String, incoming: Value) {
    match state.get_mut(&topic) {
        Some(existing) => merge_value(existing, incoming),
        None => {
            if !incoming.is_null() {
                state.insert(topic, incoming);
            }
        }
    }
}

/// The merge rule: non-empty mappings merge key-by-key at unbounded depth,
/// everything else (scalars, sequences, empty mappings) replaces the
/// existing value wholesale. `null` never erases accumulated state.
fn merge_value(existing: &mut Value, incoming: Value) {
    if incoming.is_null() {
        return;
    }
    match incoming {
        Value::Object(update) if !update.is_empty() => {
            if let Value::Object(current) = existing {
                for (key, value) in update {
                    match current.get_mut(&key) {
                        Some(slot) => merge_value(slot, value),
                        None => {
                            if !value.is_null() {
                                current.insert(key, value);
                            }
                        }
                    }
                }
            } else {
                // A leaf is becoming a subtree: wholesale replacement.
                *existing = Value::Object(update);
            }
        }
        other => *existing = other,
    }
}
