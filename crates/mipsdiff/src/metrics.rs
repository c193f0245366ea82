//! Session metrics using metrics-rs.
//!
//! The engine reports through the `metrics` facade. With `--metrics` the CLI
//! installs [`CliRecorder`], which keeps the values in memory and prints a
//! summary when the session ends.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit, counter,
    describe_counter, describe_gauge, gauge,
};
use parking_lot::RwLock;

use crate::engine::SessionStats;

pub const CYCLES_TOTAL: &str = "mipsdiff_cycles_total";
pub const COMMITS_TOTAL: &str = "mipsdiff_commits_total";
pub const BUBBLES_TOTAL: &str = "mipsdiff_bubbles_total";
pub const REFERENCE_STEPS_TOTAL: &str = "mipsdiff_reference_steps_total";
pub const SYNCS_TOTAL: &str = "mipsdiff_syncs_total";
pub const COMMITS_PER_CYCLE: &str = "mipsdiff_commits_per_cycle";

/// Register metric descriptions. Call once at startup.
pub fn init() {
    describe_counter!(CYCLES_TOTAL, Unit::Count, "DUT clock cycles simulated");
    describe_counter!(COMMITS_TOTAL, Unit::Count, "Instructions committed by the DUT");
    describe_counter!(
        BUBBLES_TOTAL,
        Unit::Count,
        "DUT cycles that committed nothing"
    );
    describe_counter!(
        REFERENCE_STEPS_TOTAL,
        Unit::Count,
        "Instructions single-stepped on the reference"
    );
    describe_counter!(
        SYNCS_TOTAL,
        Unit::Count,
        "Registers overwritten at whitelisted PCs"
    );
    describe_gauge!(
        COMMITS_PER_CYCLE,
        Unit::Count,
        "Average DUT commits per cycle"
    );
}

/// Record the totals of a finished session.
pub fn record_session(stats: &SessionStats) {
    counter!(CYCLES_TOTAL).absolute(stats.cycles);
    counter!(COMMITS_TOTAL).absolute(stats.commits);
    counter!(BUBBLES_TOTAL).absolute(stats.bubbles);
    counter!(REFERENCE_STEPS_TOTAL).absolute(stats.reference_steps);
    counter!(SYNCS_TOTAL).absolute(stats.syncs);
    gauge!(COMMITS_PER_CYCLE).set(stats.commits_per_cycle());
}

// ============================================================================
// CLI Recorder for terminal output
// ============================================================================

type Store<T> = Arc<RwLock<HashMap<String, T>>>;

struct CliCounter {
    key: String,
    store: Store<u64>,
}

impl metrics::CounterFn for CliCounter {
    fn increment(&self, value: u64) {
        *self.store.write().entry(self.key.clone()).or_insert(0) += value;
    }

    fn absolute(&self, value: u64) {
        self.store.write().insert(self.key.clone(), value);
    }
}

struct CliGauge {
    key: String,
    store: Store<f64>,
}

impl metrics::GaugeFn for CliGauge {
    fn increment(&self, value: f64) {
        *self.store.write().entry(self.key.clone()).or_insert(0.0) += value;
    }

    fn decrement(&self, value: f64) {
        *self.store.write().entry(self.key.clone()).or_insert(0.0) -= value;
    }

    fn set(&self, value: f64) {
        self.store.write().insert(self.key.clone(), value);
    }
}

/// In-memory recorder for `--metrics`. Histograms are not used and dropped.
#[derive(Default)]
pub struct CliRecorder {
    counters: Store<u64>,
    gauges: Store<f64>,
}

impl CliRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install as the global recorder. `None` if one is already installed.
    #[must_use]
    pub fn install(self) -> Option<CliRecorderHandle> {
        let handle = CliRecorderHandle {
            counters: Arc::clone(&self.counters),
            gauges: Arc::clone(&self.gauges),
        };
        metrics::set_global_recorder(self).ok()?;
        Some(handle)
    }
}

fn key_to_string(key: &Key) -> String {
    let labels: Vec<String> = key
        .labels()
        .map(|l| format!("{}={}", l.key(), l.value()))
        .collect();
    if labels.is_empty() {
        key.name().to_string()
    } else {
        format!("{}{{{}}}", key.name(), labels.join(","))
    }
}

impl Recorder for CliRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(CliCounter {
            key: key_to_string(key),
            store: Arc::clone(&self.counters),
        }))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(Arc::new(CliGauge {
            key: key_to_string(key),
            store: Arc::clone(&self.gauges),
        }))
    }

    fn register_histogram(&self, _key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::noop()
    }
}

/// Read access to the values collected by an installed [`CliRecorder`].
pub struct CliRecorderHandle {
    counters: Store<u64>,
    gauges: Store<f64>,
}

impl CliRecorderHandle {
    #[must_use]
    pub fn counter(&self, key: &str) -> Option<u64> {
        self.counters.read().get(key).copied()
    }

    #[must_use]
    pub fn gauge(&self, key: &str) -> Option<f64> {
        self.gauges.read().get(key).copied()
    }

    /// Print all collected metrics to stdout, sorted by key.
    pub fn print_summary(&self) {
        let counters = self.counters.read();
        let gauges = self.gauges.read();
        if counters.is_empty() && gauges.is_empty() {
            println!("No metrics collected.");
            return;
        }

        println!();
        println!("## Metrics Summary");
        println!();
        if !counters.is_empty() {
            println!("### Counters");
            let mut entries: Vec<_> = counters.iter().collect();
            entries.sort_by_key(|(key, _)| key.as_str());
            for (key, value) in entries {
                println!("  {key}: {value}");
            }
            println!();
        }
        if !gauges.is_empty() {
            println!("### Gauges");
            let mut entries: Vec<_> = gauges.iter().collect();
            entries.sort_by_key(|(key, _)| key.as_str());
            for (key, value) in entries {
                println!("  {key}: {value:.6}");
            }
            println!();
        }
    }
}
