//! In-process broker used by tests and single-node setups.
//!
//! Same contract as the AMQP backend: topic routing, one durable queue can
//! fan in several bindings, competing consumers each own at most the message
//! they are processing, and an unsettled message is redelivered. Queue
//! contents live in process memory, so durability flags only hold for the
//! lifetime of the process.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use crate::error::BrokerError;
use crate::pattern::topic_matches;
use crate::topology::{ExchangeKind, Topology};
use crate::transport::{Acker, Consumer, Delivery, Publisher};

/// How long a delivered-but-unsettled message stays invisible before the
/// broker assumes its consumer died and returns it to the queue.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    exchanges: Mutex<HashMap<String, ExchangeState>>,
    queues: Mutex<HashMap<String, Arc<QueueCore>>>,
    visibility_timeout: Duration,
}

struct ExchangeState {
    kind: ExchangeKind,
    /// (queue name, routing pattern)
    bindings: Vec<(String, String)>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_visibility_timeout(DEFAULT_VISIBILITY_TIMEOUT)
    }

    pub fn with_visibility_timeout(visibility_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                exchanges: Mutex::new(HashMap::new()),
                queues: Mutex::new(HashMap::new()),
                visibility_timeout,
            }),
        }
    }

    /// Declares exchanges, queues and bindings. Idempotent: names already
    /// declared are kept, bindings are added once. Redeclaring an exchange
    /// with a different kind is an error.
    pub fn declare(&self, topology: &Topology) -> Result<(), BrokerError> {
        topology.validate()?;
        {
            let mut queues = lock(&self.inner.queues);
            for queue in &topology.queues {
                queues.entry(queue.name.clone()).or_insert_with(|| {
                    Arc::new(QueueCore::new(queue.name.clone(), self.inner.visibility_timeout))
                });
            }
        }
        let mut exchanges = lock(&self.inner.exchanges);
        for exchange in &topology.exchanges {
            let state = exchanges
                .entry(exchange.name.clone())
                .or_insert_with(|| ExchangeState { kind: exchange.kind, bindings: Vec::new() });
            if state.kind != exchange.kind {
                return Err(BrokerError::Topology(format!(
                    "exchange `{}` already declared as {}",
                    exchange.name,
                    state.kind.as_str()
                )));
            }
        }
        for binding in &topology.bindings {
            let state = exchanges
                .get_mut(&binding.exchange)
                .ok_or_else(|| BrokerError::UnknownExchange(binding.exchange.clone()))?;
            let entry = (binding.queue.clone(), binding.routing_key.clone());
            if !state.bindings.contains(&entry) {
                state.bindings.push(entry);
            }
        }
        Ok(())
    }

    pub fn publisher(&self) -> MemoryPublisher {
        MemoryPublisher { inner: Arc::clone(&self.inner) }
    }

    pub fn consumer(&self, queue: &str) -> Result<MemoryConsumer, BrokerError> {
        let core = self.queue_core(queue)?;
        Ok(MemoryConsumer { queue: core })
    }

    /// Messages currently visible on the queue.
    pub fn queue_depth(&self, queue: &str) -> Result<usize, BrokerError> {
        let core = self.queue_core(queue)?;
        let depth = lock(&core.state).ready.len();
        Ok(depth)
    }

    /// Messages handed to a consumer and not yet settled.
    pub fn in_flight(&self, queue: &str) -> Result<usize, BrokerError> {
        let core = self.queue_core(queue)?;
        let count = lock(&core.state).in_flight.len();
        Ok(count)
    }

    fn queue_core(&self, queue: &str) -> Result<Arc<QueueCore>, BrokerError> {
        lock(&self.inner.queues)
            .get(queue)
            .cloned()
            .ok_or_else(|| BrokerError::UnknownQueue(queue.to_string()))
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct MemoryPublisher {
    inner: Arc<BrokerInner>,
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), BrokerError> {
        let targets: Vec<Arc<QueueCore>> = {
            let exchanges = lock(&self.inner.exchanges);
            let state = exchanges
                .get(exchange)
                .ok_or_else(|| BrokerError::UnknownExchange(exchange.to_string()))?;
            let mut names: Vec<&str> = Vec::new();
            for (queue, pattern) in &state.bindings {
                let matched = match state.kind {
                    ExchangeKind::Topic => topic_matches(pattern, routing_key),
                    ExchangeKind::Direct => pattern == routing_key,
                    ExchangeKind::Fanout => true,
                };
                // A queue gets one copy no matter how many bindings match.
                if matched && !names.contains(&queue.as_str()) {
                    names.push(queue);
                }
            }
            let queues = lock(&self.inner.queues);
            names.iter().filter_map(|name| queues.get(*name).cloned()).collect()
        };
        if targets.is_empty() {
            debug!(exchange, routing_key, "no binding matched, message dropped");
            return Ok(());
        }
        for core in targets {
            core.enqueue(QueuedMessage {
                body: body.to_vec(),
                routing_key: routing_key.to_string(),
                redelivered: false,
            });
        }
        Ok(())
    }
}

pub struct MemoryConsumer {
    queue: Arc<QueueCore>,
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn receive(&mut self) -> Result<Delivery, BrokerError> {
        loop {
            // Register for wakeups before checking the queue so an enqueue
            // between the check and the await is not missed.
            let notified = self.queue.notify.notified();
            let (delivery, next_deadline) = self.queue.try_take();
            if let Some(delivery) = delivery {
                return Ok(delivery);
            }
            tokio::select! {
                _ = notified => {}
                _ = tokio::time::sleep(next_deadline) => {}
            }
        }
    }
}

struct QueuedMessage {
    body: Vec<u8>,
    routing_key: String,
    redelivered: bool,
}

struct InFlight {
    message: QueuedMessage,
    taken_at: Instant,
}

struct QueueCore {
    name: String,
    state: Mutex<QueueState>,
    notify: Notify,
    next_tag: AtomicU64,
    visibility_timeout: Duration,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<QueuedMessage>,
    in_flight: HashMap<u64, InFlight>,
}

impl QueueCore {
    fn new(name: String, visibility_timeout: Duration) -> Self {
        Self {
            name,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            next_tag: AtomicU64::new(1),
            visibility_timeout,
        }
    }

    fn enqueue(&self, message: QueuedMessage) {
        let mut state = lock(&self.state);
        state.ready.push_back(message);
        drop(state);
        self.notify.notify_one();
    }

    /// Pops the next visible message, reclaiming expired in-flight messages
    /// first. Returns the delivery (if any) and how long the caller may sleep
    /// before anything can change without a wakeup.
    fn try_take(self: &Arc<Self>) -> (Option<Delivery>, Duration) {
        let now = Instant::now();
        let mut state = lock(&self.state);

        let expired: Vec<u64> = state
            .in_flight
            .iter()
            .filter(|(_, in_flight)| {
                now.duration_since(in_flight.taken_at) >= self.visibility_timeout
            })
            .map(|(tag, _)| *tag)
            .collect();
        let reclaimed = expired.len();
        for tag in expired {
            if let Some(in_flight) = state.in_flight.remove(&tag) {
                let mut message = in_flight.message;
                message.redelivered = true;
                debug!(queue = %self.name, tag, "visibility timeout elapsed, message requeued");
                state.ready.push_front(message);
            }
        }

        let delivery = state.ready.pop_front().map(|message| {
            let tag = self.next_tag.fetch_add(1, Ordering::Relaxed);
            let body = message.body.clone();
            let routing_key = message.routing_key.clone();
            let redelivered = message.redelivered;
            state.in_flight.insert(tag, InFlight { message, taken_at: now });
            Delivery::new(
                body,
                routing_key,
                redelivered,
                Box::new(MemoryAcker { queue: Arc::clone(self), tag: Some(tag) }),
            )
        });

        let next_deadline = state
            .in_flight
            .values()
            .map(|in_flight| {
                self.visibility_timeout
                    .saturating_sub(now.duration_since(in_flight.taken_at))
            })
            .min()
            .unwrap_or(self.visibility_timeout)
            .max(Duration::from_millis(1));
        drop(state);

        // Other consumers may be parked while reclaimed messages sit ready.
        for _ in 1..=reclaimed {
            self.notify.notify_one();
        }
        (delivery, next_deadline)
    }

    fn settle(&self, tag: u64) {
        lock(&self.state).in_flight.remove(&tag);
    }

    fn reinstate(&self, tag: u64) {
        let mut state = lock(&self.state);
        if let Some(in_flight) = state.in_flight.remove(&tag) {
            let mut message = in_flight.message;
            message.redelivered = true;
            state.ready.push_front(message);
            drop(state);
            self.notify.notify_one();
        }
    }
}

struct MemoryAcker {
    queue: Arc<QueueCore>,
    tag: Option<u64>,
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        let mut this = self;
        if let Some(tag) = this.tag.take() {
            this.queue.settle(tag);
        }
        Ok(())
    }

    async fn requeue(self: Box<Self>) -> Result<(), BrokerError> {
        let mut this = self;
        if let Some(tag) = this.tag.take() {
            this.queue.reinstate(tag);
        }
        Ok(())
    }
}

impl Drop for MemoryAcker {
    fn drop(&mut self) {
        // A delivery dropped unsettled belongs to a consumer that went away;
        // hand the message back for redelivery.
        if let Some(tag) = self.tag.take() {
            self.queue.reinstate(tag);
        }
    }
}
