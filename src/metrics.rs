//! Metrics collection and export module

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Lifecycle counters
    pub operations_prepared: IntCounter,
    pub operations_injected: IntCounter,
    pub preapply_failures: IntCounter,
    pub simulations: IntCounter,
    pub confirmations: IntCounter,
    pub confirmation_timeouts: IntCounter,

    // Head cache
    pub head_cache_hits: IntCounter,
    pub head_cache_misses: IntCounter,

    // Subscriptions
    pub subscription_events: IntCounter,
    pub active_subscriptions: IntGauge,

    /// Failures by `OperationError::category()`
    pub operation_errors: IntCounterVec,

    // Histograms
    pub prepare_latency: Histogram,
    pub inject_latency: Histogram,
    pub confirmation_latency: Histogram,
    pub rpc_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let operations_prepared = IntCounter::with_opts(Opts::new(
            "operations_prepared_total",
            "Operation groups prepared for forging",
        ))?;

        let operations_injected = IntCounter::with_opts(Opts::new(
            "operations_injected_total",
            "Operation groups broadcast to the node",
        ))?;

        let preapply_failures = IntCounter::with_opts(Opts::new(
            "preapply_failures_total",
            "Groups rejected by preapply before injection",
        ))?;

        let simulations = IntCounter::with_opts(Opts::new(
            "simulations_total",
            "Dry-run simulations issued for estimation",
        ))?;

        let confirmations = IntCounter::with_opts(Opts::new(
            "confirmations_total",
            "Confirmation waits that reached the requested depth",
        ))?;

        let confirmation_timeouts = IntCounter::with_opts(Opts::new(
            "confirmation_timeouts_total",
            "Confirmation waits that exhausted their tick budget",
        ))?;

        let head_cache_hits = IntCounter::with_opts(Opts::new(
            "head_cache_hits_total",
            "Head lookups served from the shared fetch",
        ))?;

        let head_cache_misses = IntCounter::with_opts(Opts::new(
            "head_cache_misses_total",
            "Head lookups that started a new fetch",
        ))?;

        let subscription_events = IntCounter::with_opts(Opts::new(
            "subscription_events_total",
            "Events delivered to subscription handlers",
        ))?;

        let active_subscriptions = IntGauge::with_opts(Opts::new(
            "active_subscriptions",
            "Subscriptions currently open",
        ))?;

        let operation_errors = IntCounterVec::new(
            Opts::new("operation_errors_total", "Lifecycle failures by category"),
            &["category"],
        )?;

        let prepare_latency = Histogram::with_opts(
            HistogramOpts::new("prepare_latency_seconds", "Operation preparation latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0]),
        )?;

        let inject_latency = Histogram::with_opts(
            HistogramOpts::new(
                "inject_latency_seconds",
                "Preapply plus injection latency",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]),
        )?;

        let confirmation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "confirmation_latency_seconds",
                "Time from first poll to confirmation",
            )
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        )?;

        let rpc_latency = Histogram::with_opts(
            HistogramOpts::new("rpc_latency_seconds", "RPC call latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(operations_prepared.clone()))?;
        registry.register(Box::new(operations_injected.clone()))?;
        registry.register(Box::new(preapply_failures.clone()))?;
        registry.register(Box::new(simulations.clone()))?;
        registry.register(Box::new(confirmations.clone()))?;
        registry.register(Box::new(confirmation_timeouts.clone()))?;
        registry.register(Box::new(head_cache_hits.clone()))?;
        registry.register(Box::new(head_cache_misses.clone()))?;
        registry.register(Box::new(subscription_events.clone()))?;
        registry.register(Box::new(active_subscriptions.clone()))?;
        registry.register(Box::new(operation_errors.clone()))?;
        registry.register(Box::new(prepare_latency.clone()))?;
        registry.register(Box::new(inject_latency.clone()))?;
        registry.register(Box::new(confirmation_latency.clone()))?;
        registry.register(Box::new(rpc_latency.clone()))?;

        Ok(Self {
            registry,
            operations_prepared,
            operations_injected,
            preapply_failures,
            simulations,
            confirmations,
            confirmation_timeouts,
            head_cache_hits,
            head_cache_misses,
            subscription_events,
            active_subscriptions,
            operation_errors,
            prepare_latency,
            inject_latency,
            confirmation_latency,
            rpc_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Count a failure under its category label
    pub fn record_error(&self, category: &str) {
        self.operation_errors.with_label_values(&[category]).inc();
    }

    /// Text exposition of every registered metric
    pub fn gather_text(&self) -> String {
        use prometheus::Encoder;
        let mut buffer = Vec::new();
        let encoder = prometheus::TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::debug!(error = %e, "Metrics encoding failed");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
