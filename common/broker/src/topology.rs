//! Declarative broker layout.
//!
//! A `Topology` is plain data describing the exchanges, queues and bindings a
//! process relies on. It is built (or deserialized) once at startup and handed
//! to a broker backend to declare, instead of scattering declaration calls
//! across the codebase.

use serde::{Deserialize, Serialize};

use crate::error::BrokerError;

/// Exchange routing behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Topic,
    Direct,
    Fanout,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Topic => "topic",
            ExchangeKind::Direct => "direct",
            ExchangeKind::Fanout => "fanout",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeSpec {
    pub name: String,
    pub kind: ExchangeKind,
    pub durable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
}

/// Routes messages published on `exchange` whose routing key matches
/// `routing_key` into `queue`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    pub exchanges: Vec<ExchangeSpec>,
    pub queues: Vec<QueueSpec>,
    pub bindings: Vec<Binding>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exchange(mut self, name: impl Into<String>, kind: ExchangeKind, durable: bool) -> Self {
        self.exchanges.push(ExchangeSpec { name: name.into(), kind, durable });
        self
    }

    pub fn queue(mut self, name: impl Into<String>, durable: bool) -> Self {
        self.queues.push(QueueSpec { name: name.into(), durable });
        self
    }

    pub fn bind(
        mut self,
        exchange: impl Into<String>,
        queue: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        self.bindings.push(Binding {
            exchange: exchange.into(),
            queue: queue.into(),
            routing_key: routing_key.into(),
        });
        self
    }

    /// Every binding must reference an exchange and a queue declared in the
    /// same topology.
    pub fn validate(&self) -> Result<(), BrokerError> {
        for binding in &self.bindings {
            if !self.exchanges.iter().any(|e| e.name == binding.exchange) {
                return Err(BrokerError::Topology(format!(
                    "binding `{}` references undeclared exchange `{}`",
                    binding.routing_key, binding.exchange
                )));
            }
            if !self.queues.iter().any(|q| q.name == binding.queue) {
                return Err(BrokerError::Topology(format!(
                    "binding `{}` references undeclared queue `{}`",
                    binding.routing_key, binding.queue
                )));
            }
        }
        Ok(())
    }
}
