// src/rabbitmq/topology.rs

use async_trait::async_trait;
use lapin::{options::*, types::FieldTable, ExchangeKind};
use tracing::{debug, info};

use super::connection::LapinConnection;
use super::errors::{RabbitMQError, Result};
use crate::env::DriverConfig;

/// Declares the exchanges, queues and bindings the driver consumes from.
#[async_trait]
pub trait Topology<C>: Send + Sync {
    async fn declare(&self, connection: &C) -> Result<()>;
}

/// For brokers where topology is provisioned out of band.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTopology;

#[async_trait]
impl<C: Sync> Topology<C> for NoTopology {
    async fn declare(&self, _connection: &C) -> Result<()> {
        Ok(())
    }
}

/// One durable exchange bound to one durable queue.
#[derive(Debug, Clone)]
pub struct QueueTopology {
    pub exchange: String,
    pub exchange_kind: ExchangeKind,
    pub queue: String,
    pub routing_key: String,
}

impl QueueTopology {
    pub fn from_config(config: &DriverConfig) -> Self {
        Self {
            exchange: config.exchange.clone(),
            exchange_kind: exchange_kind(&config.exchange_type),
            queue: config.queue.clone(),
            routing_key: config.routing_key.clone(),
        }
    }
}

pub fn exchange_kind(name: &str) -> ExchangeKind {
    match name.to_ascii_lowercase().as_str() {
        "direct" => ExchangeKind::Direct,
        "fanout" => ExchangeKind::Fanout,
        "headers" => ExchangeKind::Headers,
        "topic" => ExchangeKind::Topic,
        _ => ExchangeKind::Custom(name.to_string()),
    }
}

#[async_trait]
impl Topology<LapinConnection> for QueueTopology {
    async fn declare(&self, connection: &LapinConnection) -> Result<()> {
        let channel = connection
            .inner()
            .create_channel()
            .await
            .map_err(|e| RabbitMQError::TopologyError(format!("Failed to open channel: {}", e)))?;

        // the default exchange cannot be redeclared
        if !self.exchange.is_empty() {
            channel
                .exchange_declare(
                    &self.exchange,
                    self.exchange_kind.clone(),
                    ExchangeDeclareOptions {
                        durable: true,
                        ..ExchangeDeclareOptions::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    RabbitMQError::TopologyError(format!("Failed to declare exchange: {}", e))
                })?;
        }

        let queue = channel
            .queue_declare(
                &self.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| RabbitMQError::TopologyError(format!("Failed to declare queue: {}", e)))?;
        debug!(queue = %self.queue, messages = queue.message_count(), "Queue declared");

        if !self.exchange.is_empty() {
            channel
                .queue_bind(
                    &self.queue,
                    &self.exchange,
                    &self.routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| {
                    RabbitMQError::TopologyError(format!("Failed to bind queue: {}", e))
                })?;
        }

        channel
            .close(200, "topology declared")
            .await
            .map_err(|e| RabbitMQError::TopologyError(e.to_string()))?;

        info!(
            exchange = %self.exchange,
            queue = %self.queue,
            routing_key = %self.routing_key,
            "Topology declared"
        );
        Ok(())
    }
}
