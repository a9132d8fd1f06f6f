//! Producer-side publishing.
//!
//! `EventPublisher` is the one-shot client: encode, derive the routing key,
//! hand the bytes to the exchange. `BufferedEventPublisher` puts a bounded
//! queue and a background sender in front of it so broker latency never
//! reaches the request path of the service that emitted the event.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use common_broker::{BrokerError, Publisher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::model::{AuditEvent, MalformedEventError};
use crate::topology::LOGS_EXCHANGE;

/// Why a publish did not happen. Every variant is non-fatal to the caller:
/// the business write already committed before the event was attempted.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("event encoding failed: {0}")]
    Encode(#[from] MalformedEventError),
    #[error("broker publish failed: {0}")]
    Broker(#[from] BrokerError),
    #[error("outbound buffer full, event dropped")]
    BufferFull,
    #[error("buffered publisher closed")]
    Closed,
}

pub struct EventPublisher<P> {
    transport: P,
    exchange: String,
}

impl<P: Publisher> EventPublisher<P> {
    pub fn new(transport: P) -> Self {
        Self { transport, exchange: LOGS_EXCHANGE.to_string() }
    }

    pub fn with_exchange(transport: P, exchange: impl Into<String>) -> Self {
        Self { transport, exchange: exchange.into() }
    }

    /// Exactly one best-effort attempt; no retry here. Callers that must not
    /// surface the failure use [`publish_best_effort`](Self::publish_best_effort).
    pub async fn publish(&self, event: &AuditEvent) -> Result<(), PublishError> {
        let body = event.to_bytes()?;
        let routing_key = event.category.routing_key();
        self.transport.publish(&self.exchange, &routing_key, &body).await?;
        Ok(())
    }

    /// The caller contract for business code: any failure is logged locally
    /// and swallowed, never propagated past the call site.
    pub async fn publish_best_effort(&self, event: &AuditEvent) {
        if let Err(err) = self.publish(event).await {
            warn!(
                error = %err,
                category = %event.category,
                operation = %event.operation,
                "audit event publish failed, event dropped"
            );
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    published: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Counter snapshot for operational introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherSnapshot {
    /// Events sitting in the outbound buffer right now.
    pub queued: usize,
    pub published: u64,
    pub failed: u64,
    pub dropped: u64,
}

/// Bounded outbound buffer plus a background sender task.
///
/// `enqueue` never waits: a full buffer drops the event and says so. The
/// sender publishes one event at a time and logs failures the same way
/// [`EventPublisher::publish_best_effort`] does.
#[derive(Clone)]
pub struct BufferedEventPublisher {
    tx: mpsc::Sender<AuditEvent>,
    capacity: usize,
    counters: Arc<Counters>,
}

impl BufferedEventPublisher {
    pub fn spawn<P>(transport: P, capacity: usize) -> Self
    where
        P: Publisher + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<AuditEvent>(capacity);
        let counters = Arc::new(Counters::default());
        let task_counters = Arc::clone(&counters);
        tokio::spawn(async move {
            let publisher = EventPublisher::new(transport);
            while let Some(event) = rx.recv().await {
                match publisher.publish(&event).await {
                    Ok(()) => {
                        task_counters.published.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        task_counters.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            error = %err,
                            category = %event.category,
                            "buffered audit publish failed, event dropped"
                        );
                    }
                }
            }
        });
        Self { tx, capacity, counters }
    }

    /// Synchronous, non-blocking hand-off from request-handling code.
    pub fn enqueue(&self, event: AuditEvent) -> Result<(), PublishError> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                Err(PublishError::BufferFull)
            }
            Err(TrySendError::Closed(_)) => Err(PublishError::Closed),
        }
    }

    pub fn snapshot(&self) -> PublisherSnapshot {
        PublisherSnapshot {
            queued: self.capacity - self.tx.capacity(),
            published: self.counters.published.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}
