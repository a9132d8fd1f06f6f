//! Messaging substrate shared by event producers and the logs consumer.
//!
//! The broker contract is exchange/routing-key/binding routing with durable
//! queues and per-message acknowledgment. `MemoryBroker` implements it fully
//! in process (tests, local development); the `amqp` feature adds the
//! `lapin`-backed client for a real broker.

pub mod error;
pub mod memory;
pub mod pattern;
pub mod topology;
pub mod transport;

#[cfg(feature = "amqp")]
pub mod amqp;

pub use error::{BrokerError, BrokerResult};
pub use memory::{MemoryBroker, MemoryConsumer, MemoryPublisher};
pub use topology::{Binding, ExchangeKind, ExchangeSpec, QueueSpec, Topology};
pub use transport::{Acker, Consumer, Delivery, NoopPublisher, Publisher};

#[cfg(feature = "amqp")]
pub use amqp::{AmqpBroker, AmqpConsumer, AmqpPublisher};
