use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};

/// Counters and gauges shared by every stage of the pipeline.
#[derive(Clone, Default)]
pub(crate) struct Metrics {
    pub fragments: Counter,
    pub attempts: Counter,
    pub solved: Counter,
    pub sent: Counter,
    pub incomplete: Counter,

    pub open_groups: Gauge,
    pub active_sources: Gauge,
    pub active_workers: Gauge,
}

impl Metrics {
    /// Register all metrics with `registry`.
    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "fragments",
            "fragments attributed to a group",
            self.fragments.clone(),
        );
        registry.register("attempts", "solve attempts", self.attempts.clone());
        registry.register("solved", "groups solved", self.solved.clone());
        registry.register("sent", "results sent to sinks", self.sent.clone());
        registry.register(
            "incomplete",
            "groups reported incomplete",
            self.incomplete.clone(),
        );
        registry.register(
            "open_groups",
            "groups awaiting more fragments",
            self.open_groups.clone(),
        );
        registry.register(
            "active_sources",
            "sources not yet exhausted",
            self.active_sources.clone(),
        );
        registry.register(
            "active_workers",
            "workers not yet terminated",
            self.active_workers.clone(),
        );
    }
}
