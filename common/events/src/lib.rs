//! Audit-event wire contract shared by every producer service and the logs
//! consumer.
//!
//! Producers construct an [`AuditEvent`] right after their own write commits
//! and hand it to an [`EventPublisher`] (or the non-blocking
//! [`BufferedEventPublisher`]); the consumer decodes the same bytes with
//! [`AuditEvent::from_bytes`]. The broker layout both sides rely on lives in
//! [`topology`].

pub mod model;
pub mod publisher;
pub mod topology;

pub use model::{AuditEvent, Category, MalformedEventError, Operation};
pub use publisher::{BufferedEventPublisher, EventPublisher, PublishError, PublisherSnapshot};
pub use topology::{logs_topology, logs_topology_with, KNOWN_CATEGORIES, LOGS_EXCHANGE, LOGS_QUEUE};
