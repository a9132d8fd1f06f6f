//! Write-before-ack semantics. A crash between a successful append and the
//! acknowledgment must cause a redelivery and a second append with a new
//! `store_id`. The duplicate is the designed outcome, not a bug: the pipeline
//! chooses audit completeness over exactly-once counting.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common_broker::{Consumer, MemoryBroker};
use common_events::{logs_topology, AuditEvent, EventPublisher, LOGS_QUEUE};
use logs_service::consumer::ConsumerWorker;
use logs_service::metrics::Metrics;
use logs_service::store::{AuditStore, MemoryAuditStore};

#[tokio::test]
async fn crash_after_write_before_ack_appends_a_duplicate() {
    let broker = MemoryBroker::new();
    broker.declare(&logs_topology()).unwrap();
    let store = Arc::new(MemoryAuditStore::new());
    let metrics = Arc::new(Metrics::new());

    let event = AuditEvent::new("created reservation 4", "RESERVATION", "CREATE");
    EventPublisher::new(broker.publisher()).publish(&event).await.unwrap();

    // First attempt: write succeeds, then the worker dies before acking.
    {
        let mut crashing_consumer = broker.consumer(LOGS_QUEUE).unwrap();
        let delivery = crashing_consumer.receive().await.unwrap();
        let decoded = AuditEvent::from_bytes(&delivery.body).unwrap();
        let first_id = store.append(&decoded).await.unwrap();
        assert_eq!(first_id, 1);
        // Delivery dropped unsettled: the simulated crash.
    }
    assert_eq!(broker.queue_depth(LOGS_QUEUE).unwrap(), 1);

    // A surviving worker picks up the redelivery and appends again.
    let mut worker = ConsumerWorker::new(
        broker.consumer(LOGS_QUEUE).unwrap(),
        Arc::clone(&store) as Arc<dyn AuditStore>,
        Arc::clone(&metrics),
    );
    worker.process_one().await.unwrap();

    let page = store.query(0, 10).await.unwrap();
    assert_eq!(page.total, 2, "expected the redelivery duplicate to be appended");
    assert_ne!(page.records[0].store_id, page.records[1].store_id);
    assert_eq!(page.records[0].message, page.records[1].message);
    assert_eq!(page.records[0].occurred_at, page.records[1].occurred_at);
    assert_eq!(metrics.redeliveries.load(Ordering::Relaxed), 1);
    assert_eq!(broker.queue_depth(LOGS_QUEUE).unwrap(), 0);
}
