//! Downstream fan-out.
//!
//! The `Dispatcher` tracks the set of connected subscribers and pushes each
//! broadcast payload to all of them. Every subscriber gets its own unbounded
//! MPSC channel, drained by that subscriber's socket task; the broadcast
//! loop never awaits a socket, so one stalled consumer cannot delay the
//! tick or its peers. The serialized payload is shared via `Arc`, so the
//! fan-out cost is a pointer clone per subscriber, not a copy of the state
//! document. A failed send means the receiving task is gone and the
//! subscriber is evicted on the spot.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

struct ClientHandle {
    id: usize,
    sender: mpsc::UnboundedSender<Arc<str>>,
}

/// Registry of live subscriber channels.
pub struct Dispatcher {
    clients: Mutex<Vec<ClientHandle>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(Vec::new()),
        }
    }

    /// Registers a new subscriber and returns the receiving half of its
    /// channel, to be drained by the subscriber's socket task.
    pub fn add_client(&self, id: usize) -> mpsc::UnboundedReceiver<Arc<str>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut clients = self.clients.lock().expect("dispatcher lock poisoned");
        clients.push(ClientHandle { id, sender: tx });
        log::info!("Subscriber {id} registered with fan-out");
        rx
    }

    /// Removes a subscriber by id. Safe to call for an id already evicted
    /// by a failed send.
    pub fn remove_client(&self, id: usize) {
        let mut clients = self.clients.lock().expect("dispatcher lock poisoned");
        clients.retain(|c| c.id != id);
    }

    /// Sends one payload to every live subscriber. Subscribers whose
    /// receiving task has gone away are dropped from the registry; the
    /// remaining sends are unaffected.
    pub fn broadcast(&self, payload: String) {
        let payload: Arc<str> = payload.into();
        let mut clients = self.clients.lock().expect("dispatcher lock poisoned");
        clients.retain(|client| match client.sender.send(Arc::clone(&payload)) {
            Ok(()) => true,
            Err(_) => {
                log::info!("Subscriber {} gone, removing from fan-out", client.id);
                false
            }
        });
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().expect("dispatcher lock poisoned").len()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
