use crate::{queue::Producer, Fragment, Source};
use tracing::{debug, info};

/// Pulls fragments from one [Source] until it is exhausted.
pub(crate) struct Ingestor<S: Source> {
    index: usize,
    source: S,
    inbound: Producer<Fragment>,
}

impl<S: Source> Ingestor<S> {
    pub fn new(index: usize, source: S, inbound: Producer<Fragment>) -> Self {
        Self {
            index,
            source,
            inbound,
        }
    }

    pub fn run(mut self) {
        debug!(source = self.index, "ingestion started");
        let mut pulled = 0u64;
        while let Some(fragment) = self.source.pull() {
            self.inbound.push(fragment);
            pulled += 1;
        }

        // Retire this source (dropping the producer), waking idle workers if it was the last
        drop(self.inbound);
        info!(source = self.index, pulled, "source exhausted");
    }
}
