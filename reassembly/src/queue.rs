//! A guarded FIFO that knows when no more items can ever arrive.

use prometheus_client::metrics::gauge::Gauge;
use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex},
};

struct State<T> {
    items: VecDeque<T>,

    // Enlisted producers that have not yet retired.
    producers: usize,

    // Once set, no producer is enlisted and no item is offered.
    sealed: bool,
}

impl<T> State<T> {
    fn closed(&self) -> bool {
        self.items.is_empty() && self.producers == 0 && self.sealed
    }
}

/// A multi-producer, multi-consumer FIFO behind one lock and one condition variable.
///
/// The queue is closed once it is empty, every enlisted [Producer] has retired, and the queue
/// has been sealed. Consumers blocked in [Queue::pop] are woken whenever an item arrives on an
/// empty queue or the queue may have become closed, and always re-check on wake.
pub(crate) struct Queue<T> {
    state: Mutex<State<T>>,
    cv: Condvar,
    producers: Gauge,
}

impl<T> Queue<T> {
    /// Create an open queue with no producers.
    ///
    /// The live producer count is mirrored into `producers`.
    pub fn new(producers: Gauge) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                producers: 0,
                sealed: false,
            }),
            cv: Condvar::new(),
            producers,
        }
    }

    /// Register a new [Producer]. The queue cannot close until it is dropped.
    ///
    /// # Panics
    ///
    /// Panics if the queue has already been sealed.
    pub fn enlist(self: &Arc<Self>) -> Producer<T> {
        let mut state = self.state.lock().unwrap();
        assert!(!state.sealed, "enlisted producer on sealed queue");
        state.producers += 1;
        self.producers.inc();
        Producer {
            queue: self.clone(),
        }
    }

    /// Enqueue `item` unless the queue has been sealed, in which case it is handed back.
    pub fn offer(&self, item: T) -> Result<(), T> {
        let mut state = self.state.lock().unwrap();
        if state.sealed {
            return Err(item);
        }
        self.enqueue(&mut state, item);
        Ok(())
    }

    /// Record that no further producers or offers will be admitted.
    pub fn seal(&self) {
        let mut state = self.state.lock().unwrap();
        state.sealed = true;
        self.cv.notify_all();
    }

    /// Block until an item is available or the queue is closed.
    ///
    /// Returns `None` only once the queue is closed, after which every call returns `None`.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed() {
                return None;
            }
            state = self.cv.wait(state).unwrap();
        }
    }

    /// Wake every blocked consumer so it re-evaluates whether the queue is closed.
    pub fn wake(&self) {
        let _state = self.state.lock().unwrap();
        self.cv.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().items.len()
    }

    fn enqueue(&self, state: &mut State<T>, item: T) {
        let was_empty = state.items.is_empty();
        state.items.push_back(item);
        if was_empty {
            self.cv.notify_all();
        }
    }

    fn retire(&self) {
        let mut state = self.state.lock().unwrap();
        state.producers -= 1;
        self.producers.dec();
        if state.producers == 0 {
            self.cv.notify_all();
        }
    }
}

/// An enlisted producer of a [Queue].
///
/// Pushes are accepted even after the queue is sealed. Dropping the producer (including
/// during a panic) retires it.
pub(crate) struct Producer<T> {
    queue: Arc<Queue<T>>,
}

impl<T> Producer<T> {
    pub fn push(&self, item: T) {
        let mut state = self.queue.state.lock().unwrap();
        self.queue.enqueue(&mut state, item);
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        self.queue.retire();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        thread,
        time::Duration,
    };

    #[test]
    fn test_fifo_order() {
        let queue = Arc::new(Queue::new(Gauge::default()));
        let producer = queue.enlist();
        queue.seal();
        for i in 0..5 {
            producer.push(i);
        }
        assert_eq!(queue.len(), 5);
        drop(producer);

        let drained: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_closed_requires_seal() {
        let queue = Arc::new(Queue::<u64>::new(Gauge::default()));
        let done = Arc::new(AtomicBool::new(false));

        let consumer = {
            let queue = queue.clone();
            let done = done.clone();
            thread::spawn(move || {
                let item = queue.pop();
                done.store(true, Ordering::SeqCst);
                item
            })
        };

        // No producers, but not sealed: the consumer must keep waiting
        thread::sleep(Duration::from_millis(50));
        assert!(!done.load(Ordering::SeqCst));

        queue.seal();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_closed_requires_retired_producers() {
        let gauge = Gauge::default();
        let queue = Arc::new(Queue::<u64>::new(gauge.clone()));
        let first = queue.enlist();
        let second = queue.enlist();
        queue.seal();
        assert_eq!(gauge.get(), 2);

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || std::iter::from_fn(|| queue.pop()).collect::<Vec<_>>())
        };

        first.push(1);
        drop(first);
        assert_eq!(gauge.get(), 1);
        second.push(2);
        drop(second);
        assert_eq!(gauge.get(), 0);

        assert_eq!(consumer.join().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_offer_rejected_after_seal() {
        let queue = Arc::new(Queue::new(Gauge::default()));
        let producer = queue.enlist();
        assert_eq!(queue.offer(1), Ok(()));
        queue.seal();
        assert_eq!(queue.offer(2), Err(2));

        // Enlisted producers may still push
        producer.push(3);
        drop(producer);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    #[should_panic(expected = "enlisted producer on sealed queue")]
    fn test_enlist_after_seal() {
        let queue = Arc::new(Queue::<u64>::new(Gauge::default()));
        queue.seal();
        let _producer = queue.enlist();
    }

    #[test]
    fn test_panicking_producer_retires() {
        let queue = Arc::new(Queue::<u64>::new(Gauge::default()));
        let producer = queue.enlist();
        queue.seal();

        let result = thread::spawn(move || {
            producer.push(1);
            panic!("source failed");
        })
        .join();
        assert!(result.is_err());

        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_many_consumers_terminate() {
        let queue = Arc::new(Queue::new(Gauge::default()));
        let producer = queue.enlist();
        queue.seal();
        let consumers: Vec<_> = (0..8)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || std::iter::from_fn(|| queue.pop()).count())
            })
            .collect();

        for i in 0..10_000u64 {
            producer.push(i);
        }
        drop(producer);

        let total: usize = consumers.into_iter().map(|c| c.join().unwrap()).sum();
        assert_eq!(total, 10_000);
    }
}
