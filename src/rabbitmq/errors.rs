// src/rabbitmq/errors.rs

use std::fmt;

use lapin::Error as LapinError;
use serde_json::Error as SerdeError;
use thiserror::Error;

/// Step of the rebuild protocol an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Dial,
    Topology,
    ConsumeChannel,
    PublishChannel,
    Consume,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Dial => "dial",
            Stage::Topology => "topology",
            Stage::ConsumeChannel => "consume_channel",
            Stage::PublishChannel => "publish_channel",
            Stage::Consume => "consume",
        };
        f.write_str(name)
    }
}

// Clone so a single close error can be handed to every waiter on the connection.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RabbitMQError {
    #[error("RabbitMQ connection error: {0}")]
    ConnectionError(String),

    #[error("RabbitMQ channel error: {0}")]
    ChannelError(String),

    #[error("RabbitMQ publish error: {0}")]
    PublishError(String),

    #[error("RabbitMQ consume error: {0}")]
    ConsumeError(String),

    #[error("RabbitMQ topology error: {0}")]
    TopologyError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("rabbitmq_redial [{stage}]: {source}")]
    Redial {
        stage: Stage,
        source: Box<RabbitMQError>,
    },

    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Custom Result type for RabbitMQ operations
pub type Result<T> = std::result::Result<T, RabbitMQError>;

impl RabbitMQError {
    /// Tags the error with the rebuild stage that produced it.
    pub fn at(self, stage: Stage) -> Self {
        RabbitMQError::Redial {
            stage,
            source: Box::new(self),
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            RabbitMQError::Redial { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

// Converting from lapin errors
impl From<LapinError> for RabbitMQError {
    fn from(error: LapinError) -> Self {
        // Use string representation for classification
        let error_text = error.to_string();
        let lowered = error_text.to_lowercase();

        if lowered.contains("connection") || lowered.contains("io error") {
            RabbitMQError::ConnectionError(error_text)
        } else if lowered.contains("channel") {
            RabbitMQError::ChannelError(error_text)
        } else if lowered.contains("publish") {
            RabbitMQError::PublishError(error_text)
        } else if lowered.contains("consume") {
            RabbitMQError::ConsumeError(error_text)
        } else {
            RabbitMQError::Unknown(error_text)
        }
    }
}

impl From<SerdeError> for RabbitMQError {
    fn from(error: SerdeError) -> Self {
        RabbitMQError::ConfigError(error.to_string())
    }
}

impl From<std::num::ParseIntError> for RabbitMQError {
    fn from(err: std::num::ParseIntError) -> Self {
        RabbitMQError::ConfigError(format!("Parse error: {}", err))
    }
}

impl From<String> for RabbitMQError {
    fn from(message: String) -> Self {
        RabbitMQError::Unknown(message)
    }
}

impl From<&str> for RabbitMQError {
    fn from(message: &str) -> Self {
        RabbitMQError::Unknown(message.to_string())
    }
}
