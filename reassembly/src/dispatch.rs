use crate::{metrics::Metrics, queue::Queue, store::Store, GroupKey, Sink};
use num_bigint::BigUint;
use std::sync::Arc;
use tracing::debug;

/// Delivers results to one [Sink], then helps drain the groups that were never solved.
pub(crate) struct Dispatcher<K: Sink> {
    index: usize,
    sink: K,
    outbound: Arc<Queue<(GroupKey, BigUint)>>,
    store: Arc<Store>,
    metrics: Metrics,
}

impl<K: Sink> Dispatcher<K> {
    pub fn new(
        index: usize,
        sink: K,
        outbound: Arc<Queue<(GroupKey, BigUint)>>,
        store: Arc<Store>,
        metrics: Metrics,
    ) -> Self {
        Self {
            index,
            sink,
            outbound,
            store,
            metrics,
        }
    }

    pub fn run(mut self) {
        // Results, until every worker has terminated and the queue is empty
        let mut sent = 0u64;
        while let Some((key, value)) = self.outbound.pop() {
            debug!(sink = self.index, key, %value, "sending result");
            self.sink.send(key, value);
            self.metrics.sent.inc();
            sent += 1;
        }

        // No worker remains, so the store can only shrink: race the other dispatchers for
        // whatever is left
        let mut incomplete = 0u64;
        while let Some((key, fragments)) = self.store.take_any() {
            debug!(
                sink = self.index,
                key,
                fragments = fragments.len(),
                "reporting incomplete group"
            );
            self.sink.incomplete(key);
            self.metrics.incomplete.inc();
            incomplete += 1;
        }
        debug!(sink = self.index, sent, incomplete, "dispatcher terminated");
    }
}
