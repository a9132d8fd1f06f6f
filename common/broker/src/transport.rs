use std::fmt;

use async_trait::async_trait;

use crate::error::BrokerError;

/// Producer-side transport: hands a message to an exchange under a routing
/// key. One best-effort attempt; retry policy belongs to callers.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), BrokerError>;
}

/// Consumer-side transport bound to a single queue.
///
/// `receive` suspends until a message is available; implementations must not
/// busy-poll.
#[async_trait]
pub trait Consumer: Send {
    async fn receive(&mut self) -> Result<Delivery, BrokerError>;
}

/// Settlement handle for one delivery. Exactly one of `ack`/`requeue`
/// consumes it; an implementation decides what an unsettled drop means.
#[async_trait]
pub trait Acker: Send {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError>;
    async fn requeue(self: Box<Self>) -> Result<(), BrokerError>;
}

/// A message owned by exactly one consumer between `receive` and settlement.
///
/// `ack` removes the message from the queue for good; `requeue` (and, for the
/// in-process broker, dropping the delivery unsettled) hands ownership back
/// to the broker for redelivery.
pub struct Delivery {
    pub body: Vec<u8>,
    pub routing_key: String,
    pub redelivered: bool,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(
        body: Vec<u8>,
        routing_key: String,
        redelivered: bool,
        acker: Box<dyn Acker>,
    ) -> Self {
        Self { body, routing_key, redelivered, acker }
    }

    pub async fn ack(self) -> Result<(), BrokerError> {
        self.acker.ack().await
    }

    pub async fn requeue(self) -> Result<(), BrokerError> {
        self.acker.requeue().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("routing_key", &self.routing_key)
            .field("redelivered", &self.redelivered)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Discards every publish; stands in for a real transport where event
/// publishing is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

#[async_trait]
impl Publisher for NoopPublisher {
    async fn publish(
        &self,
        _exchange: &str,
        _routing_key: &str,
        _body: &[u8],
    ) -> Result<(), BrokerError> {
        Ok(())
    }
}
