//! End-to-end pipeline: publisher -> broker -> consumer worker -> store ->
//! query API, all in process.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common_broker::{MemoryBroker, Publisher};
use common_events::{logs_topology, AuditEvent, EventPublisher, LOGS_EXCHANGE, LOGS_QUEUE};
use http_body_util::BodyExt;
use logs_service::consumer::ConsumerWorker;
use logs_service::metrics::Metrics;
use logs_service::store::{AuditStore, MemoryAuditStore, Page};
use logs_service::{build_router, AppState};
use tower::util::ServiceExt;

struct Pipeline {
    broker: MemoryBroker,
    store: Arc<MemoryAuditStore>,
    metrics: Arc<Metrics>,
    worker: ConsumerWorker<common_broker::MemoryConsumer>,
}

fn pipeline() -> Pipeline {
    let broker = MemoryBroker::new();
    broker.declare(&logs_topology()).unwrap();
    let store = Arc::new(MemoryAuditStore::new());
    let metrics = Arc::new(Metrics::new());
    let consumer = broker.consumer(LOGS_QUEUE).unwrap();
    let worker = ConsumerWorker::new(
        consumer,
        Arc::clone(&store) as Arc<dyn AuditStore>,
        Arc::clone(&metrics),
    );
    Pipeline { broker, store, metrics, worker }
}

async fn read_page(response: axum::response::Response) -> Page {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn published_event_is_persisted_and_served_with_store_fields() {
    let mut p = pipeline();
    let publisher = EventPublisher::new(p.broker.publisher());
    let event = AuditEvent::new("created product 7", "PRODUCT", "CREATE");
    publisher.publish(&event).await.unwrap();

    p.worker.process_one().await.unwrap();

    let state = AppState {
        store: Arc::clone(&p.store) as Arc<dyn AuditStore>,
        metrics: Arc::clone(&p.metrics),
    };
    let response = build_router(state)
        .oneshot(Request::builder().uri("/api/logs?page=0&size=10").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let page = read_page(response).await;
    assert_eq!(page.total, 1);
    let record = &page.records[0];
    assert_eq!(record.message, "created product 7");
    assert_eq!(record.category, "PRODUCT");
    assert_eq!(record.operation, "CREATE");
    assert_eq!(record.occurred_at, event.occurred_at);
    assert!(record.store_id >= 1);
    assert!(record.stored_at >= record.occurred_at);
    assert_eq!(p.broker.queue_depth(LOGS_QUEUE).unwrap(), 0);
}

#[tokio::test]
async fn events_from_different_producers_come_back_newest_stored_first() {
    let mut p = pipeline();
    let publisher = EventPublisher::new(p.broker.publisher());
    publisher.publish(&AuditEvent::new("created product 7", "PRODUCT", "CREATE")).await.unwrap();
    publisher.publish(&AuditEvent::new("created order 3", "ORDER", "CREATE")).await.unwrap();
    publisher.publish(&AuditEvent::new("updated product 7", "PRODUCT", "UPDATE")).await.unwrap();

    for _ in 0..3 {
        p.worker.process_one().await.unwrap();
    }

    let page = p.store.query(0, 10).await.unwrap();
    assert_eq!(page.total, 3);
    // Non-increasing stored_at, strictly decreasing store_id.
    for pair in page.records.windows(2) {
        assert!(pair[0].stored_at >= pair[1].stored_at);
        assert!(pair[0].store_id > pair[1].store_id);
    }
}

#[tokio::test]
async fn each_append_is_served_exactly_once_by_the_query_side() {
    let mut p = pipeline();
    let publisher = EventPublisher::new(p.broker.publisher());
    for n in 0..5 {
        publisher.publish(&AuditEvent::new(format!("event {n}"), "ORDER", "CREATE")).await.unwrap();
    }
    for _ in 0..5 {
        p.worker.process_one().await.unwrap();
    }

    let page = p.store.query(0, 100).await.unwrap();
    assert_eq!(page.records.len(), 5);
    for n in 0..5 {
        let hits = page.records.iter().filter(|r| r.message == format!("event {n}")).count();
        assert_eq!(hits, 1, "event {n} appeared {hits} times");
    }
}

#[tokio::test]
async fn malformed_message_is_dropped_and_does_not_block_the_queue() {
    let mut p = pipeline();

    // Straight onto the queue, bypassing the event codec.
    p.broker
        .publisher()
        .publish(LOGS_EXCHANGE, "log.product.event", b"not json at all")
        .await
        .unwrap();
    let publisher = EventPublisher::new(p.broker.publisher());
    publisher.publish(&AuditEvent::new("created product 8", "PRODUCT", "CREATE")).await.unwrap();

    p.worker.process_one().await.unwrap();
    p.worker.process_one().await.unwrap();

    let page = p.store.query(0, 10).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.records[0].message, "created product 8");
    // The poison message was acked, not requeued.
    assert_eq!(p.broker.queue_depth(LOGS_QUEUE).unwrap(), 0);
    assert_eq!(p.metrics.malformed.load(std::sync::atomic::Ordering::Relaxed), 1);
    assert_eq!(p.metrics.ingested.load(std::sync::atomic::Ordering::Relaxed), 1);
}

#[tokio::test]
async fn well_formed_json_missing_fields_is_also_poison() {
    let mut p = pipeline();
    p.broker
        .publisher()
        .publish(LOGS_EXCHANGE, "log.order.event", br#"{"category":"ORDER"}"#)
        .await
        .unwrap();
    p.worker.process_one().await.unwrap();
    assert_eq!(p.store.query(0, 10).await.unwrap().total, 0);
    assert_eq!(p.broker.queue_depth(LOGS_QUEUE).unwrap(), 0);
}

#[tokio::test]
async fn store_outage_requeues_and_the_event_survives_recovery() {
    let broker = MemoryBroker::new();
    broker.declare(&logs_topology()).unwrap();
    let store = Arc::new(MemoryAuditStore::new());
    let metrics = Arc::new(Metrics::new());
    let mut worker = ConsumerWorker::new(
        broker.consumer(LOGS_QUEUE).unwrap(),
        Arc::clone(&store) as Arc<dyn AuditStore>,
        Arc::clone(&metrics),
    )
    .with_backoff(std::time::Duration::from_millis(1));

    let publisher = EventPublisher::new(broker.publisher());
    publisher.publish(&AuditEvent::new("created order 9", "ORDER", "CREATE")).await.unwrap();

    store.set_unavailable(true);
    worker.process_one().await.unwrap();
    // Append failed; the message went back to the queue.
    assert_eq!(broker.queue_depth(LOGS_QUEUE).unwrap(), 1);
    assert_eq!(metrics.store_failures.load(std::sync::atomic::Ordering::Relaxed), 1);

    store.set_unavailable(false);
    worker.process_one().await.unwrap();
    let page = store.query(0, 10).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.records[0].message, "created order 9");
}
