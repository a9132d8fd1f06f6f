use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("unknown exchange: {0}")]
    UnknownExchange(String),
    #[error("unknown queue: {0}")]
    UnknownQueue(String),
    #[error("invalid topology: {0}")]
    Topology(String),
    #[error("broker connection closed")]
    ConnectionClosed,
    #[cfg(feature = "amqp")]
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),
}

pub type BrokerResult<T> = Result<T, BrokerError>;
