//! The broker layout for the logs pipeline, declared once at process start.

use common_broker::{ExchangeKind, Topology};

pub const LOGS_EXCHANGE: &str = "logs_exchange";
pub const LOGS_QUEUE: &str = "logs_queue";

/// Categories the source services emit today. Each gets its own binding so
/// per-category queues stay possible later; the catch-all covers the rest.
pub const KNOWN_CATEGORIES: [&str; 5] =
    ["product", "category", "ingredient", "order", "reservation"];

/// Topic exchange + one durable queue fanning in every category binding plus
/// the `log.*.event` catch-all, so a new producer category needs no topology
/// change.
pub fn logs_topology() -> Topology {
    logs_topology_with(LOGS_EXCHANGE, LOGS_QUEUE)
}

/// Same layout under deployment-specific names.
pub fn logs_topology_with(exchange: &str, queue: &str) -> Topology {
    let mut topology = Topology::new()
        .exchange(exchange, ExchangeKind::Topic, true)
        .queue(queue, true);
    for category in KNOWN_CATEGORIES {
        topology = topology.bind(exchange, queue, format!("log.{category}.event"));
    }
    topology.bind(exchange, queue, "log.*.event")
}
