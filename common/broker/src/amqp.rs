//! AMQP 0.9.1 backend over `lapin`.
//!
//! Maps the transport traits onto a real broker: topology is declared once at
//! startup, publishes are persistent (delivery mode 2), and consumers run with
//! `basic_qos(1)` so each worker owns at most one unsettled message.

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::info;

use crate::error::BrokerError;
use crate::topology::{ExchangeKind, Topology};
use crate::transport::{Acker, Consumer, Delivery, Publisher};

const PERSISTENT: u8 = 2;

fn lapin_kind(kind: ExchangeKind) -> lapin::ExchangeKind {
    match kind {
        ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        ExchangeKind::Direct => lapin::ExchangeKind::Direct,
        ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
    }
}

pub struct AmqpBroker {
    connection: Connection,
}

impl AmqpBroker {
    pub async fn connect(uri: &str) -> Result<Self, BrokerError> {
        let connection = Connection::connect(uri, ConnectionProperties::default()).await?;
        Ok(Self { connection })
    }

    /// Declares the topology on a short-lived channel. Declarations are
    /// idempotent on the broker side as long as the attributes match.
    pub async fn declare(&self, topology: &Topology) -> Result<(), BrokerError> {
        topology.validate()?;
        let channel = self.connection.create_channel().await?;
        for exchange in &topology.exchanges {
            channel
                .exchange_declare(
                    &exchange.name,
                    lapin_kind(exchange.kind),
                    ExchangeDeclareOptions { durable: exchange.durable, ..Default::default() },
                    FieldTable::default(),
                )
                .await?;
        }
        for queue in &topology.queues {
            channel
                .queue_declare(
                    &queue.name,
                    QueueDeclareOptions { durable: queue.durable, ..Default::default() },
                    FieldTable::default(),
                )
                .await?;
        }
        for binding in &topology.bindings {
            channel
                .queue_bind(
                    &binding.queue,
                    &binding.exchange,
                    &binding.routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }
        info!(
            exchanges = topology.exchanges.len(),
            queues = topology.queues.len(),
            bindings = topology.bindings.len(),
            "declared broker topology"
        );
        Ok(())
    }

    pub async fn publisher(&self) -> Result<AmqpPublisher, BrokerError> {
        let channel = self.connection.create_channel().await?;
        Ok(AmqpPublisher { channel })
    }

    /// Opens a consumer on `queue` with a prefetch of one.
    pub async fn consumer(&self, queue: &str, consumer_tag: &str) -> Result<AmqpConsumer, BrokerError> {
        let channel = self.connection.create_channel().await?;
        channel.basic_qos(1, BasicQosOptions::default()).await?;
        let stream = channel
            .basic_consume(queue, consumer_tag, BasicConsumeOptions::default(), FieldTable::default())
            .await?;
        Ok(AmqpConsumer { stream })
    }
}

pub struct AmqpPublisher {
    channel: Channel,
}

#[async_trait]
impl Publisher for AmqpPublisher {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), BrokerError> {
        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default().with_delivery_mode(PERSISTENT),
            )
            .await?
            .await?;
        Ok(())
    }
}

pub struct AmqpConsumer {
    stream: lapin::Consumer,
}

#[async_trait]
impl Consumer for AmqpConsumer {
    async fn receive(&mut self) -> Result<Delivery, BrokerError> {
        let delivery = self
            .stream
            .next()
            .await
            .ok_or(BrokerError::ConnectionClosed)??;
        let routing_key = delivery.routing_key.as_str().to_string();
        let redelivered = delivery.redelivered;
        Ok(Delivery::new(
            delivery.data,
            routing_key,
            redelivered,
            Box::new(AmqpAcker { acker: delivery.acker }),
        ))
    }
}

struct AmqpAcker {
    acker: lapin::acker::Acker,
}

#[async_trait]
impl Acker for AmqpAcker {
    async fn ack(self: Box<Self>) -> Result<(), BrokerError> {
        self.acker.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn requeue(self: Box<Self>) -> Result<(), BrokerError> {
        self.acker
            .nack(BasicNackOptions { requeue: true, ..Default::default() })
            .await?;
        Ok(())
    }
}
