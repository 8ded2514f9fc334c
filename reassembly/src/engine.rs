//! Start, run, and drain the pipeline.
//!
//! An [Engine] is configured with sources, sinks, and a solver, then started to obtain a
//! [Running] handle. Stopping the handle drains every stage in order:
//!
//! 1. Seal the inbound queue (no more [Submitter] fragments) and join every ingestion thread.
//!    Stopping never interrupts a blocking [Source::pull]: each source must exhaust on its own.
//! 2. Join every worker. Each exits once the inbound queue is empty and no source remains.
//! 3. Join every dispatcher. Each delivers results until no worker remains, then races the
//!    others to report whatever groups are left as incomplete.

use crate::{
    dispatch::Dispatcher, ingest::Ingestor, metrics::Metrics, queue::Queue, store::Store,
    worker::Worker, Error, Fragment, GroupKey, Sink, Solver, Source,
};
use num_bigint::BigUint;
use prometheus_client::registry::Registry;
use std::{
    any::Any,
    sync::Arc,
    thread::{self, JoinHandle},
};
use tracing::{error, info, warn};

/// Configuration for an [Engine].
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of worker threads attributing fragments to groups and solving them.
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self { workers: 2 }
    }
}

/// Lifecycle of the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Sources and sinks are being registered. No thread has been started.
    Configured,
    /// All threads are running.
    Running,
    /// Stop was requested. Stages are being joined in order.
    Draining,
    /// All threads have been joined and every group has been reported.
    Stopped,
}

/// Totals observed by a pipeline that has stopped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    /// Fragments attributed to a group.
    pub fragments: u64,
    /// Solver invocations.
    pub attempts: u64,
    /// Groups solved.
    pub solved: u64,
    /// Results delivered via [Sink::send].
    pub sent: u64,
    /// Groups reported via [Sink::incomplete].
    pub incomplete: u64,
}

/// A pipeline in the [Phase::Configured] phase.
pub struct Engine<V: Solver> {
    cfg: Config,
    solver: V,
    sources: Vec<Box<dyn Source>>,
    sinks: Vec<Box<dyn Sink>>,
    metrics: Metrics,
}

impl<V: Solver> Engine<V> {
    pub fn new(cfg: Config, solver: V) -> Self {
        Self {
            cfg,
            solver,
            sources: Vec::new(),
            sinks: Vec::new(),
            metrics: Metrics::default(),
        }
    }

    /// Register a [Source]. Each source is pulled by its own thread.
    pub fn add_source(&mut self, source: impl Source) {
        self.sources.push(Box::new(source));
    }

    /// Register a [Sink]. Each sink is driven by its own thread.
    pub fn add_sink(&mut self, sink: impl Sink) {
        self.sinks.push(Box::new(sink));
    }

    pub fn phase(&self) -> Phase {
        Phase::Configured
    }

    /// Register the pipeline's metrics with `registry`.
    pub fn register(&self, registry: &mut Registry) {
        self.metrics.register(registry);
    }

    /// Spawn every ingestion thread, then every worker, then every dispatcher.
    ///
    /// If a thread cannot be spawned, the threads already started are stopped (which waits
    /// for their sources to exhaust) before the error is returned.
    pub fn start(self) -> Result<Running, Error> {
        if self.cfg.workers == 0 {
            return Err(Error::NoWorkers);
        }
        if self.sinks.is_empty() {
            return Err(Error::NoSinks);
        }
        info!(
            sources = self.sources.len(),
            workers = self.cfg.workers,
            sinks = self.sinks.len(),
            "starting pipeline"
        );

        let mut running = Running {
            phase: Phase::Running,
            inbound: Arc::new(Queue::new(self.metrics.active_sources.clone())),
            outbound: Arc::new(Queue::new(self.metrics.active_workers.clone())),
            store: Arc::new(Store::new(self.metrics.open_groups.clone())),
            metrics: self.metrics,
            ingestors: Vec::new(),
            workers: Vec::new(),
            dispatchers: Vec::new(),
        };
        let spawned = running.launch(
            self.sources,
            Arc::new(self.solver),
            self.cfg.workers,
            self.sinks,
        );
        if let Err(err) = spawned {
            error!(?err, "failed to start pipeline");
            if let Err(err) = running.shutdown() {
                warn!(?err, "failed to stop partially started pipeline");
            }
            return Err(err);
        }
        Ok(running)
    }
}

/// Injects fragments into a [Running] pipeline from any thread.
#[derive(Clone)]
pub struct Submitter {
    inbound: Arc<Queue<Fragment>>,
}

impl Submitter {
    /// Queue `fragment` for attribution, as if it had been pulled from a [Source].
    ///
    /// Returns [Error::Closed] once stop has been requested.
    pub fn submit(&self, fragment: Fragment) -> Result<(), Error> {
        self.inbound.offer(fragment).map_err(|fragment| {
            warn!(fragment, "rejected fragment after stop");
            Error::Closed
        })
    }
}

/// A pipeline in the [Phase::Running] phase.
///
/// Dropping a [Running] pipeline stops it, exactly like [Running::stop].
pub struct Running {
    phase: Phase,

    inbound: Arc<Queue<Fragment>>,
    outbound: Arc<Queue<(GroupKey, BigUint)>>,
    store: Arc<Store>,
    metrics: Metrics,

    ingestors: Vec<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
    dispatchers: Vec<JoinHandle<()>>,
}

impl Running {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Create a [Submitter] for this pipeline.
    pub fn submitter(&self) -> Submitter {
        Submitter {
            inbound: self.inbound.clone(),
        }
    }

    /// Queue `fragment` for attribution. See [Submitter::submit].
    pub fn submit(&self, fragment: Fragment) -> Result<(), Error> {
        self.submitter().submit(fragment)
    }

    /// Drain every stage and wait for all threads to exit.
    ///
    /// Blocks until every [Source] is exhausted. Once this returns, every group ever opened
    /// has been reported exactly once, via either [Sink::send] or [Sink::incomplete].
    ///
    /// If any thread panicked, the remaining threads are still joined before the first panic
    /// is returned as [Error::Panicked].
    pub fn stop(mut self) -> Result<Summary, Error> {
        self.shutdown()
    }

    fn launch<V: Solver>(
        &mut self,
        sources: Vec<Box<dyn Source>>,
        solver: Arc<V>,
        workers: usize,
        sinks: Vec<Box<dyn Sink>>,
    ) -> Result<(), Error> {
        for (index, source) in sources.into_iter().enumerate() {
            let ingestor = Ingestor::new(index, source, self.inbound.enlist());
            self.ingestors
                .push(spawn(format!("ingest-{index}"), move || ingestor.run())?);
        }
        for index in 0..workers {
            let worker = Worker::new(
                index,
                solver.clone(),
                self.inbound.clone(),
                self.store.clone(),
                self.outbound.enlist(),
                self.metrics.clone(),
            );
            self.workers
                .push(spawn(format!("worker-{index}"), move || worker.run())?);
        }

        // Every worker is enlisted, so dispatchers may now observe the last one retiring
        self.outbound.seal();
        for (index, sink) in sinks.into_iter().enumerate() {
            let dispatcher = Dispatcher::new(
                index,
                sink,
                self.outbound.clone(),
                self.store.clone(),
                self.metrics.clone(),
            );
            self.dispatchers
                .push(spawn(format!("dispatch-{index}"), move || dispatcher.run())?);
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<Summary, Error> {
        self.phase = Phase::Draining;
        info!(backlog = self.inbound.len(), "draining pipeline");
        let mut failure = None;

        // Sources are never interrupted, so this waits for each to exhaust
        self.inbound.seal();
        join(&mut self.ingestors, &mut failure);

        self.inbound.wake();
        join(&mut self.workers, &mut failure);

        self.outbound.seal();
        self.outbound.wake();
        join(&mut self.dispatchers, &mut failure);
        self.phase = Phase::Stopped;

        if !self.store.is_empty() {
            // Only possible if no dispatcher could be started (or every dispatcher panicked)
            warn!(groups = self.store.len(), "groups left unreported");
        }
        if let Some(err) = failure {
            return Err(err);
        }
        let summary = Summary {
            fragments: self.metrics.fragments.get(),
            attempts: self.metrics.attempts.get(),
            solved: self.metrics.solved.get(),
            sent: self.metrics.sent.get(),
            incomplete: self.metrics.incomplete.get(),
        };
        info!(?summary, "pipeline stopped");
        Ok(summary)
    }
}

impl Drop for Running {
    fn drop(&mut self) {
        if self.phase == Phase::Stopped {
            return;
        }
        if let Err(err) = self.shutdown() {
            error!(?err, "failed to stop pipeline");
        }
    }
}

fn spawn(name: String, f: impl FnOnce() + Send + 'static) -> Result<JoinHandle<()>, Error> {
    Ok(thread::Builder::new().name(name).spawn(f)?)
}

/// Join every handle, recording the first panic in `failure`.
fn join(handles: &mut Vec<JoinHandle<()>>, failure: &mut Option<Error>) {
    for handle in handles.drain(..) {
        let thread = handle.thread().name().unwrap_or("unnamed").to_string();
        if let Err(err) = handle.join() {
            let message = extract_panic_message(&*err);
            error!(%thread, %message, "thread panicked");
            if failure.is_none() {
                *failure = Some(Error::Panicked { thread, message });
            }
        }
    }
}

fn extract_panic_message(err: &(dyn Any + Send)) -> String {
    if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else {
        format!("{err:?}")
    }
}
