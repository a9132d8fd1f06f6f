//! Hand-rolled counters with Prometheus text exposition.

use std::sync::atomic::{AtomicU64, Ordering};

const LATENCY_BUCKETS_MS: [u64; 5] = [5, 20, 100, 500, 2000];

/// Operational counters for the consumer worker, shared with the HTTP
/// exposition endpoint.
#[derive(Default)]
pub struct Metrics {
    pub ingested: AtomicU64,
    pub malformed: AtomicU64,
    pub store_failures: AtomicU64,
    pub redeliveries: AtomicU64,
    // Non-cumulative bucket counts; the last slot is > 2000ms.
    latency_buckets: [AtomicU64; 6],
    latency_sum_ms: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one occurred_at -> stored latency observation.
    pub fn observe_ingest_latency(&self, millis: u64) {
        let slot = LATENCY_BUCKETS_MS
            .iter()
            .position(|le| millis <= *le)
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        self.latency_buckets[slot].fetch_add(1, Ordering::Relaxed);
        self.latency_sum_ms.fetch_add(millis, Ordering::Relaxed);
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(1024);
        let counter = |out: &mut String, name: &str, help: &str, value: u64| {
            out.push_str(&format!("# HELP {name} {help}\n"));
            out.push_str(&format!("# TYPE {name} counter\n"));
            out.push_str(&format!("{name} {value}\n"));
        };
        counter(
            &mut out,
            "logs_events_ingested_total",
            "Audit events persisted to the store",
            self.ingested.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "logs_events_malformed_total",
            "Messages acknowledged and dropped as unparseable",
            self.malformed.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "logs_store_failures_total",
            "Append attempts that failed and requeued the message",
            self.store_failures.load(Ordering::Relaxed),
        );
        counter(
            &mut out,
            "logs_redeliveries_total",
            "Deliveries the broker marked as redelivered",
            self.redeliveries.load(Ordering::Relaxed),
        );

        out.push_str("# HELP logs_event_ingest_latency_ms Time from event occurred_at to store write (ms)\n");
        out.push_str("# TYPE logs_event_ingest_latency_ms histogram\n");
        let mut cumulative = 0;
        for (slot, le) in LATENCY_BUCKETS_MS.iter().enumerate() {
            cumulative += self.latency_buckets[slot].load(Ordering::Relaxed);
            out.push_str(&format!(
                "logs_event_ingest_latency_ms_bucket{{le=\"{le}\"}} {cumulative}\n"
            ));
        }
        cumulative += self.latency_buckets[LATENCY_BUCKETS_MS.len()].load(Ordering::Relaxed);
        out.push_str(&format!(
            "logs_event_ingest_latency_ms_bucket{{le=\"+Inf\"}} {cumulative}\n"
        ));
        out.push_str(&format!("logs_event_ingest_latency_ms_count {cumulative}\n"));
        out.push_str(&format!(
            "logs_event_ingest_latency_ms_sum {}\n",
            self.latency_sum_ms.load(Ordering::Relaxed)
        ));
        out
    }
}
