use crate::GroupKey;
use num_bigint::BigUint;
use std::sync::{Arc, Mutex};

/// An outcome delivered to a [Recorder].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Sent {
        sink: usize,
        key: GroupKey,
        value: BigUint,
    },
    Incomplete {
        sink: usize,
        key: GroupKey,
    },
}

impl Event {
    /// The [GroupKey] this event reports on.
    pub fn key(&self) -> GroupKey {
        match self {
            Event::Sent { key, .. } | Event::Incomplete { key, .. } => *key,
        }
    }
}

/// Events recorded by every [Recorder] sharing it, in delivery order.
#[derive(Clone, Default)]
pub struct Log {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Log {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// All `(key, value)` pairs delivered via [crate::Sink::send].
    pub fn sent(&self) -> Vec<(GroupKey, BigUint)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                Event::Sent { key, value, .. } => Some((*key, value.clone())),
                Event::Incomplete { .. } => None,
            })
            .collect()
    }

    /// All keys reported via [crate::Sink::incomplete].
    pub fn incomplete(&self) -> Vec<GroupKey> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                Event::Incomplete { key, .. } => Some(*key),
                Event::Sent { .. } => None,
            })
            .collect()
    }
}

/// A mock [crate::Sink] that records every call into a shared [Log].
#[derive(Clone)]
pub struct Recorder {
    sink: usize,
    log: Log,
}

impl Recorder {
    /// Create a new [Recorder] and the [Log] it writes to.
    pub fn new() -> (Self, Log) {
        let log = Log::default();
        (Self::with_log(0, log.clone()), log)
    }

    /// Create a [Recorder] labeled `sink` that appends to an existing `log`.
    pub fn with_log(sink: usize, log: Log) -> Self {
        Self { sink, log }
    }
}

impl crate::Sink for Recorder {
    fn send(&mut self, key: GroupKey, value: BigUint) {
        self.log.events.lock().unwrap().push(Event::Sent {
            sink: self.sink,
            key,
            value,
        });
    }

    fn incomplete(&mut self, key: GroupKey) {
        self.log.events.lock().unwrap().push(Event::Incomplete {
            sink: self.sink,
            key,
        });
    }
}
