use crate::{
    metrics::Metrics,
    queue::{Producer, Queue},
    store::{Snapshot, Store},
    Fragment, GroupKey, Solver,
};
use num_bigint::BigUint;
use std::sync::Arc;
use tracing::{debug, trace};

/// Attributes fragments to their groups and solves each group as it grows.
pub(crate) struct Worker<V: Solver> {
    index: usize,
    solver: Arc<V>,
    inbound: Arc<Queue<Fragment>>,
    store: Arc<Store>,
    outbound: Producer<(GroupKey, BigUint)>,
    metrics: Metrics,
}

impl<V: Solver> Worker<V> {
    pub fn new(
        index: usize,
        solver: Arc<V>,
        inbound: Arc<Queue<Fragment>>,
        store: Arc<Store>,
        outbound: Producer<(GroupKey, BigUint)>,
        metrics: Metrics,
    ) -> Self {
        Self {
            index,
            solver,
            inbound,
            store,
            outbound,
            metrics,
        }
    }

    pub fn run(self) {
        let mut processed = 0u64;
        while let Some(fragment) = self.inbound.pop() {
            processed += 1;
            self.metrics.fragments.inc();
            let Snapshot {
                key,
                epoch,
                fragments,
            } = self.store.append(fragment);

            // The solver runs without any lock held
            self.metrics.attempts.inc();
            let Some(value) = self.solver.solve(&fragments) else {
                trace!(
                    worker = self.index,
                    key,
                    fragments = fragments.len(),
                    "group not yet solvable"
                );
                continue;
            };

            // Another worker may have solved a larger snapshot of this group first
            if !self.store.claim(key, epoch) {
                trace!(worker = self.index, key, epoch, "group already solved");
                continue;
            }
            debug!(
                worker = self.index,
                key,
                fragments = fragments.len(),
                "group solved"
            );
            self.metrics.solved.inc();
            self.outbound.push((key, value));
        }

        // Retire this worker (dropping the producer), waking idle dispatchers if it was the last
        drop(self.outbound);
        debug!(worker = self.index, processed, "worker terminated");
    }
}
