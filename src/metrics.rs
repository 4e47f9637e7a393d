//! Prometheus metrics for jeapcached

use crate::protocol::Command;
use crate::storage::CacheStore;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

/// Global metrics instance
pub struct Metrics {
    pub registry: Registry,

    // Command counters, labelled by command name
    pub commands: IntCounterVec,

    // Hit/miss counters
    pub get_hits: IntCounter,
    pub get_misses: IntCounter,

    // Scheduler
    pub jobs_submitted: IntCounter,
    pub jobs_completed: IntCounter,
    pub jobs_in_flight: IntGauge,
    pub jobs_rejected: IntCounter,

    // Bytes counters
    pub bytes_read: IntCounter,
    pub bytes_written: IntCounter,

    // Time from claim to completion on a worker
    pub cmd_latency: Histogram,

    // Error counters
    pub protocol_errors: IntCounter,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        let registry = Registry::new();

        let commands = IntCounterVec::new(
            Opts::new("jeapcached_commands_total", "Total commands executed"),
            &["command"],
        )
        .unwrap();

        let get_hits = IntCounter::new("jeapcached_get_hits_total", "Total GET hits").unwrap();
        let get_misses =
            IntCounter::new("jeapcached_get_misses_total", "Total GET misses").unwrap();

        let jobs_submitted =
            IntCounter::new("jeapcached_jobs_submitted_total", "Jobs handed to workers").unwrap();
        let jobs_completed =
            IntCounter::new("jeapcached_jobs_completed_total", "Jobs finished by workers")
                .unwrap();
        let jobs_in_flight = IntGauge::new(
            "jeapcached_jobs_in_flight",
            "Jobs submitted but not yet completed",
        )
        .unwrap();
        let jobs_rejected = IntCounter::new(
            "jeapcached_jobs_rejected_total",
            "Jobs refused at submission",
        )
        .unwrap();

        let bytes_read =
            IntCounter::new("jeapcached_bytes_read_total", "Total bytes read").unwrap();
        let bytes_written =
            IntCounter::new("jeapcached_bytes_written_total", "Total bytes written").unwrap();

        let cmd_latency = Histogram::with_opts(
            HistogramOpts::new(
                "jeapcached_cmd_latency_seconds",
                "Command latency in seconds",
            )
            .buckets(vec![
                0.000_01, 0.000_05, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
            ]),
        )
        .unwrap();

        let protocol_errors =
            IntCounter::new("jeapcached_protocol_errors_total", "Total protocol errors").unwrap();

        // Register all metrics
        registry.register(Box::new(commands.clone())).unwrap();
        registry.register(Box::new(get_hits.clone())).unwrap();
        registry.register(Box::new(get_misses.clone())).unwrap();
        registry.register(Box::new(jobs_submitted.clone())).unwrap();
        registry.register(Box::new(jobs_completed.clone())).unwrap();
        registry.register(Box::new(jobs_in_flight.clone())).unwrap();
        registry.register(Box::new(jobs_rejected.clone())).unwrap();
        registry.register(Box::new(bytes_read.clone())).unwrap();
        registry.register(Box::new(bytes_written.clone())).unwrap();
        registry.register(Box::new(cmd_latency.clone())).unwrap();
        registry
            .register(Box::new(protocol_errors.clone()))
            .unwrap();

        Self {
            registry,
            commands,
            get_hits,
            get_misses,
            jobs_submitted,
            jobs_completed,
            jobs_in_flight,
            jobs_rejected,
            bytes_read,
            bytes_written,
            cmd_latency,
            protocol_errors,
        }
    }

    /// Count one executed command
    pub fn record_command(&self, command: Command) {
        self.commands.with_label_values(&[command.name()]).inc();
    }

    /// Get Prometheus formatted metrics, with store counters appended
    pub fn gather(&self, store: &CacheStore) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        let mut output = String::from_utf8(buffer).unwrap();

        let stats = store.stats();
        let purged = stats.purged;
        let items = stats.items;

        output.push_str(&format!(
            "\n# HELP jeapcached_expired_items_purged_total Items removed by lazy expiration\n\
             # TYPE jeapcached_expired_items_purged_total counter\n\
             jeapcached_expired_items_purged_total {purged}\n"
        ));

        output.push_str(&format!(
            "\n# HELP jeapcached_items Items linked in the store, tombstones included\n\
             # TYPE jeapcached_items gauge\n\
             jeapcached_items {items}\n"
        ));

        output
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
