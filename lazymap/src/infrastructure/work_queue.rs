//! Bounded blocking FIFO shared by submitters and Flushers workers.

use core::time::Duration;
use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

/// Result of a timed receive.
#[derive(Debug, PartialEq, Eq)]
pub enum Recv<T> {
    /// The next item.
    Item(T),
    /// Nothing arrived before the timeout.
    Empty,
    /// The queue is closed and fully drained.
    Closed,
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Multi-producer, multi-consumer queue holding at most `capacity` items.
///
/// `send` blocks while the queue is full, so producers slow down to the
/// consumers' pace instead of growing the queue. Closing the queue refuses
/// new items but lets consumers drain what is already queued.
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> WorkQueue<T> {
    /// Create an empty queue. A `capacity` of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Maximum number of queued items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Check whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Check whether the queue refuses new items.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Append `item`, waiting for room if the queue is full.
    ///
    /// # Errors
    ///
    /// Hands `item` back if the queue is closed, before or while waiting.
    pub fn send(&self, item: T) -> Result<(), T> {
        let mut state = self.state.lock();
        while state.items.len() >= self.capacity && !state.closed {
            self.not_full.wait(&mut state);
        }
        if state.closed {
            return Err(item);
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Take the oldest item, waiting up to `timeout` for one to arrive.
    pub fn recv_timeout(&self, timeout: Duration) -> Recv<T> {
        let mut state = self.state.lock();
        if state.items.is_empty() && !state.closed {
            self.not_empty.wait_for(&mut state, timeout);
        }
        match state.items.pop_front() {
            Some(item) => {
                drop(state);
                self.not_full.notify_one();
                Recv::Item(item)
            }
            None if state.closed => Recv::Closed,
            None => Recv::Empty,
        }
    }

    /// Refuse further items and wake every blocked producer and consumer.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let queue = WorkQueue::new(4);
        for i in 0..3 {
            queue.send(i).unwrap();
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.recv_timeout(Duration::ZERO), Recv::Item(0));
        assert_eq!(queue.recv_timeout(Duration::ZERO), Recv::Item(1));
        assert_eq!(queue.recv_timeout(Duration::ZERO), Recv::Item(2));
        assert_eq!(queue.recv_timeout(Duration::from_millis(1)), Recv::Empty);
    }

    #[test]
    fn test_close_drains_then_reports_closed() {
        let queue = WorkQueue::new(2);
        queue.send("a").unwrap();
        queue.close();
        assert_eq!(queue.send("b"), Err("b"));
        assert_eq!(queue.recv_timeout(Duration::ZERO), Recv::Item("a"));
        assert_eq!(queue.recv_timeout(Duration::ZERO), Recv::Closed);
    }

    #[test]
    fn test_full_queue_blocks_producer() {
        let queue = Arc::new(WorkQueue::new(1));
        let sent = Arc::new(AtomicUsize::new(0));

        let producer = {
            let queue = Arc::clone(&queue);
            let sent = Arc::clone(&sent);
            thread::spawn(move || {
                for i in 0..3 {
                    queue.send(i).unwrap();
                    sent.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(sent.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(), 1);

        let mut received = Vec::new();
        while received.len() < 3 {
            if let Recv::Item(i) = queue.recv_timeout(Duration::from_secs(5)) {
                received.push(i);
            }
        }
        producer.join().unwrap();
        assert_eq!(received, vec![0, 1, 2]);
    }

    #[test]
    fn test_close_wakes_blocked_producer() {
        let queue = Arc::new(WorkQueue::new(1));
        queue.send(0).unwrap();
        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.send(1))
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert_eq!(producer.join().unwrap(), Err(1));
    }
}
