//! Blocking run queue.
//!
//! Many producers, one consumer. `pop` blocks while the queue is empty and
//! returns `None` once the queue is stopped; requests still queued at that
//! point stay in place until drained.

use super::request::RunRequest;
use ge_core::error::GeError;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Why a push was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueRejection {
    /// The queue is at capacity.
    Full {
        /// Current length.
        current: usize,
        /// Capacity.
        max: usize,
    },
    /// The queue has been stopped.
    Stopped,
}

impl QueueRejection {
    /// Convert into the manager error.
    pub fn to_error(self) -> GeError {
        match self {
            Self::Full { current, max } => GeError::QueueFull { current, max },
            Self::Stopped => GeError::QueueStopped,
        }
    }
}

/// FIFO queue of async run requests.
pub struct RunQueue {
    capacity: usize,
    queue: Mutex<VecDeque<RunRequest>>,
    available: Condvar,
    stopped: AtomicBool,
    total_enqueued: AtomicUsize,
    total_dequeued: AtomicUsize,
}

impl RunQueue {
    /// Create a queue holding at most `capacity` requests.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queue: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            stopped: AtomicBool::new(false),
            total_enqueued: AtomicUsize::new(0),
            total_dequeued: AtomicUsize::new(0),
        }
    }

    /// Enqueue a request. A refused request is handed back.
    pub fn push(&self, request: RunRequest) -> Result<(), (QueueRejection, RunRequest)> {
        let mut queue = self.queue.lock();
        if self.stopped.load(Ordering::Acquire) {
            return Err((QueueRejection::Stopped, request));
        }
        if queue.len() >= self.capacity {
            let rejection = QueueRejection::Full {
                current: queue.len(),
                max: self.capacity,
            };
            return Err((rejection, request));
        }

        queue.push_back(request);
        self.total_enqueued.fetch_add(1, Ordering::Relaxed);
        drop(queue);
        self.available.notify_one();
        Ok(())
    }

    /// Block until a request is available or the queue is stopped.
    pub fn pop(&self) -> Option<RunRequest> {
        let mut queue = self.queue.lock();
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return None;
            }
            if let Some(request) = queue.pop_front() {
                self.total_dequeued.fetch_add(1, Ordering::Relaxed);
                return Some(request);
            }
            self.available.wait(&mut queue);
        }
    }

    /// Stop the queue and wake the consumer.
    pub fn stop(&self) {
        let _queue = self.queue.lock();
        self.stopped.store(true, Ordering::Release);
        self.available.notify_all();
    }

    /// Accept requests again after a stop.
    pub fn reopen(&self) {
        let _queue = self.queue.lock();
        self.stopped.store(false, Ordering::Release);
    }

    /// Whether the queue is stopped.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Remove every queued request.
    pub fn drain(&self) -> Vec<RunRequest> {
        self.queue.lock().drain(..).collect()
    }

    /// Current queue length.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get total enqueued count.
    pub fn total_enqueued(&self) -> usize {
        self.total_enqueued.load(Ordering::Relaxed)
    }

    /// Get total dequeued count.
    pub fn total_dequeued(&self) -> usize {
        self.total_dequeued.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for RunQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RunCompletion;
    use ge_core::types::{GraphId, SessionId};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn request(id: u32) -> RunRequest {
        let completion = RunCompletion::new(GraphId::new(id), |_| {});
        RunRequest::new(GraphId::new(id), SessionId::new(0), Vec::new(), completion)
    }

    fn resolve_all(requests: Vec<RunRequest>) {
        for r in requests {
            r.completion.resolve(Ok(Vec::new()));
        }
    }

    #[test]
    fn fifo_order() {
        let queue = RunQueue::new(8);
        for id in 1..=3 {
            queue.push(request(id)).unwrap();
        }
        let popped: Vec<u32> = (0..3)
            .filter_map(|_| queue.pop())
            .map(|r| {
                let id = r.graph_id.as_u32();
                r.completion.resolve(Ok(Vec::new()));
                id
            })
            .collect();
        assert_eq!(popped, vec![1, 2, 3]);
        assert_eq!(queue.total_dequeued(), 3);
    }

    #[test]
    fn full_queue_hands_request_back() {
        let queue = RunQueue::new(1);
        queue.push(request(1)).unwrap();
        let (rejection, returned) = queue.push(request(2)).unwrap_err();
        assert_eq!(rejection, QueueRejection::Full { current: 1, max: 1 });
        assert_eq!(returned.graph_id, GraphId::new(2));
        returned.completion.resolve(Ok(Vec::new()));
        resolve_all(queue.drain());
    }

    #[test]
    fn stop_unblocks_consumer_and_keeps_entries() {
        let queue = Arc::new(RunQueue::new(8));
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop().is_none())
        };
        thread::sleep(Duration::from_millis(20));
        queue.stop();
        assert!(consumer.join().unwrap());

        let (rejection, returned) = queue.push(request(1)).unwrap_err();
        assert_eq!(rejection, QueueRejection::Stopped);
        returned.completion.resolve(Ok(Vec::new()));

        queue.reopen();
        queue.push(request(2)).unwrap();
        queue.stop();
        assert!(queue.pop().is_none());
        let drained = queue.drain();
        assert_eq!(drained.len(), 1);
        resolve_all(drained);
    }
}
