// src/rabbitmq/connection.rs
// lapin-backed implementation of the transport traits.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    message::Delivery, options::*, types::FieldTable, BasicProperties, Channel, Connection,
    ConnectionProperties,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::errors::{RabbitMQError, Result};
use super::transport::{Broker, BrokerChannel, BrokerConnection, Deliveries};

const REPLY_SUCCESS: u16 = 200;

#[derive(Debug, Clone)]
enum LinkState {
    Open,
    Closed(Option<RabbitMQError>),
}

impl LinkState {
    fn is_open(&self) -> bool {
        matches!(self, LinkState::Open)
    }

    /// Moves to `Closed` unless a close outcome was already recorded.
    fn close_with(&mut self, outcome: Option<RabbitMQError>) -> bool {
        if self.is_open() {
            *self = LinkState::Closed(outcome);
            true
        } else {
            false
        }
    }

    fn outcome(&self) -> Option<RabbitMQError> {
        match self {
            LinkState::Closed(outcome) => outcome.clone(),
            LinkState::Open => None,
        }
    }
}

/// Dials RabbitMQ through lapin.
#[derive(Clone, Default)]
pub struct LapinBroker {
    properties: ConnectionProperties,
}

impl LapinBroker {
    pub fn new(properties: ConnectionProperties) -> Self {
        Self { properties }
    }
}

#[async_trait]
impl Broker for LapinBroker {
    type Connection = LapinConnection;

    async fn dial(&self, uri: &str) -> Result<LapinConnection> {
        info!("Attempting to connect to RabbitMQ");
        let connection = Connection::connect(uri, self.properties.clone()).await?;
        debug!("Successfully connected to RabbitMQ");
        Ok(LapinConnection::new(connection))
    }
}

pub struct LapinConnection {
    inner: Connection,
    state: Arc<watch::Sender<LinkState>>,
}

impl LapinConnection {
    pub fn new(inner: Connection) -> Self {
        let (state, _) = watch::channel(LinkState::Open);
        let state = Arc::new(state);

        // lapin reports unsolicited closes (heartbeat loss, broker shutdown, io errors) here
        let notify = Arc::clone(&state);
        inner.on_error(move |err| {
            warn!(error = %err, "RabbitMQ connection lost");
            let err = RabbitMQError::from(err);
            notify.send_if_modified(|s| s.close_with(Some(err)));
        });

        Self { inner, state }
    }

    pub fn inner(&self) -> &Connection {
        &self.inner
    }
}

#[async_trait]
impl BrokerConnection for LapinConnection {
    type Channel = LapinChannel;

    async fn open_channel(&self) -> Result<LapinChannel> {
        let channel = self
            .inner
            .create_channel()
            .await
            .map_err(|e| RabbitMQError::ChannelError(e.to_string()))?;
        Ok(LapinChannel(channel))
    }

    async fn closed(&self) -> Option<RabbitMQError> {
        let mut rx = self.state.subscribe();
        let outcome = match rx.wait_for(|s| !s.is_open()).await {
            Ok(state) => state.outcome(),
            // the sender lives as long as self
            Err(_) => None,
        };
        outcome
    }

    async fn close(&self) -> Result<()> {
        // record the deliberate close first so the error callback cannot win the race
        self.state.send_if_modified(|s| s.close_with(None));
        info!("Closing RabbitMQ connection gracefully");
        self.inner
            .close(REPLY_SUCCESS, "driver stopped")
            .await
            .map_err(|e| RabbitMQError::ConnectionError(e.to_string()))
    }
}

#[derive(Clone)]
pub struct LapinChannel(pub Channel);

#[async_trait]
impl BrokerChannel for LapinChannel {
    type Delivery = Delivery;

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        options: BasicConsumeOptions,
    ) -> Result<Deliveries<Delivery>> {
        let consumer = self
            .0
            .basic_consume(queue, consumer_tag, options, FieldTable::default())
            .await
            .map_err(|e| RabbitMQError::ConsumeError(e.to_string()))?;

        info!(queue, consumer_tag, "Started consuming");
        Ok(consumer.map(|d| d.map_err(RabbitMQError::from)).boxed())
    }

    async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<()> {
        self.0
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default(),
            )
            .await
            .map_err(|e| RabbitMQError::PublishError(e.to_string()))?
            .await
            .map_err(|e| RabbitMQError::PublishError(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.0
            .close(REPLY_SUCCESS, "channel closed")
            .await
            .map_err(|e| RabbitMQError::ChannelError(e.to_string()))
    }
}
