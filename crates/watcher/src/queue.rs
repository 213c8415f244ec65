//! Single-producer/single-consumer change queue
//!
//! The watcher thread appends, the supervisor polls. Neither half blocks on the
//! other: the lock is only held for an O(1) push or pop.

use crate::ChangeRecord;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct Shared {
    records: Mutex<VecDeque<ChangeRecord>>,
    /// `None` = unbounded
    capacity: Option<usize>,
    /// Records evicted by the drop-oldest policy
    dropped: AtomicU64,
}

/// Constructors for the producer/consumer pair
pub struct ChangeQueue;

impl ChangeQueue {
    /// Unbounded FIFO, no backpressure
    pub fn unbounded() -> (ChangeProducer, ChangeConsumer) {
        Self::with_capacity(None)
    }

    /// Bounded FIFO that evicts the oldest record when full
    pub fn bounded(capacity: usize) -> (ChangeProducer, ChangeConsumer) {
        Self::with_capacity(Some(capacity))
    }

    /// `None` or `Some(0)` both mean unbounded
    pub fn with_capacity(capacity: Option<usize>) -> (ChangeProducer, ChangeConsumer) {
        let capacity = capacity.filter(|&c| c > 0);
        let shared = Arc::new(Shared {
            records: Mutex::new(VecDeque::new()),
            capacity,
            dropped: AtomicU64::new(0),
        });

        (
            ChangeProducer {
                shared: Arc::clone(&shared),
            },
            ChangeConsumer { shared },
        )
    }
}

/// Appending half, owned by the watcher
pub struct ChangeProducer {
    shared: Arc<Shared>,
}

impl ChangeProducer {
    /// Append a record
    ///
    /// Returns the evicted record if a bounded queue was full.
    pub fn push(&self, record: ChangeRecord) -> Option<ChangeRecord> {
        let mut records = self.shared.records.lock();

        let evicted = match self.shared.capacity {
            Some(cap) if records.len() >= cap => records.pop_front(),
            _ => None,
        };
        records.push_back(record);
        drop(records);

        if evicted.is_some() {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.shared.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

/// Removing half, owned by the supervisor
pub struct ChangeConsumer {
    shared: Arc<Shared>,
}

impl ChangeConsumer {
    /// Remove the oldest record, or `None` if the queue is empty
    pub fn poll(&self) -> Option<ChangeRecord> {
        self.shared.records.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.shared.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Configured bound, if any
    pub fn capacity(&self) -> Option<usize> {
        self.shared.capacity
    }
}
