//! Consumer worker: receive -> decode -> persist -> settle, one message at a
//! time.
//!
//! Acknowledgment happens strictly after a confirmed store write. A crash (or
//! failed ack) between the write and the ack causes a redelivery and a second
//! append with a new `store_id`; the pipeline accepts that duplicate rather
//! than risk losing an event.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common_broker::{BrokerError, Consumer, Delivery};
use common_events::AuditEvent;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::store::AuditStore;

/// Pause after a failed append so a down store is not hammered in a hot loop.
pub const DEFAULT_STORE_BACKOFF: Duration = Duration::from_millis(500);

pub struct ConsumerWorker<C> {
    consumer: C,
    store: Arc<dyn AuditStore>,
    metrics: Arc<Metrics>,
    backoff: Duration,
    worker_id: String,
}

impl<C: Consumer> ConsumerWorker<C> {
    pub fn new(consumer: C, store: Arc<dyn AuditStore>, metrics: Arc<Metrics>) -> Self {
        let mut worker_id = Uuid::new_v4().simple().to_string();
        worker_id.truncate(8);
        Self { consumer, store, metrics, backoff: DEFAULT_STORE_BACKOFF, worker_id }
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Event loop. Blocks on message receipt; any number of workers may run
    /// against the same queue as competing consumers.
    pub async fn run(mut self) -> Result<(), BrokerError> {
        info!(worker_id = %self.worker_id, "consumer worker started");
        loop {
            self.process_one().await?;
        }
    }

    /// One full pass of the state machine. Split out from [`run`](Self::run)
    /// so tests can drive the worker message by message.
    pub async fn process_one(&mut self) -> Result<(), BrokerError> {
        let delivery = self.consumer.receive().await?;
        self.handle(delivery).await;
        Ok(())
    }

    async fn handle(&self, delivery: Delivery) {
        if delivery.redelivered {
            self.metrics.redeliveries.fetch_add(1, Ordering::Relaxed);
        }

        let event = match AuditEvent::from_bytes(&delivery.body) {
            Ok(event) => event,
            Err(err) => {
                // Poison message: ack it anyway so it cannot loop through
                // redelivery forever. This is the single deliberate data-loss
                // path in the pipeline; the warning below is its audit trail.
                self.metrics.malformed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    worker_id = %self.worker_id,
                    error = %err,
                    routing_key = %delivery.routing_key,
                    "dropping malformed audit message"
                );
                if let Err(err) = delivery.ack().await {
                    warn!(worker_id = %self.worker_id, error = %err, "failed to ack malformed message");
                }
                return;
            }
        };

        match self.store.append(&event).await {
            Ok(store_id) => {
                self.metrics.ingested.fetch_add(1, Ordering::Relaxed);
                let latency_ms = (Utc::now() - event.occurred_at).num_milliseconds().max(0) as u64;
                self.metrics.observe_ingest_latency(latency_ms);
                // Write-then-ack. A failed ack after a successful append is
                // tolerated: the broker redelivers and the duplicate append
                // is the accepted at-least-once outcome.
                if let Err(err) = delivery.ack().await {
                    warn!(
                        worker_id = %self.worker_id,
                        store_id,
                        error = %err,
                        "ack failed after successful append, expecting a redelivery duplicate"
                    );
                }
            }
            Err(err) => {
                self.metrics.store_failures.fetch_add(1, Ordering::Relaxed);
                error!(worker_id = %self.worker_id, error = %err, "append failed, requeueing message");
                if let Err(err) = delivery.requeue().await {
                    warn!(
                        worker_id = %self.worker_id,
                        error = %err,
                        "requeue failed, relying on the broker visibility timeout"
                    );
                }
                tokio::time::sleep(self.backoff).await;
            }
        }
    }
}
