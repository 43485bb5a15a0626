use std::collections::HashSet;

use parking_lot::Mutex;

/// Thread-safe set of known peer addresses.
///
/// The one piece of state mutated from independently-scheduled tasks; both
/// operations take the same lock and hold it for a single set operation,
/// never across I/O.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: Mutex<HashSet<String>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent insert; the address is visible to any concurrent `list`.
    pub fn add(&self, address: &str) {
        self.peers.lock().insert(address.to_string());
    }

    /// Point-in-time snapshot, copied out under the lock.
    pub fn list(&self) -> Vec<String> {
        self.peers.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
