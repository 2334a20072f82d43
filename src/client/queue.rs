use std::collections::VecDeque;
use std::sync::Mutex;

/// Outbound message captured while the connection was down
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub destination: String,
    pub body: String,
}

/// FIFO buffer for sends issued while disconnected.
///
/// Bounded: past the limit the push is refused so callers see backpressure
/// instead of the queue growing without bound for the whole outage.
pub struct PendingQueue {
    entries: Mutex<VecDeque<PendingSend>>,
    limit: usize,
}

impl PendingQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            limit,
        }
    }

    /// Append an entry. Returns false when the queue is at its limit.
    pub fn push(&self, entry: PendingSend) -> bool {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= self.limit {
            return false;
        }
        entries.push_back(entry);
        true
    }

    /// Pop the oldest entry. Drains pop one at a time so the lock is never
    /// held across the publish that follows.
    pub fn pop(&self) -> Option<PendingSend> {
        self.entries.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
