// src/rabbitmq/transport.rs
// Broker-facing traits the supervisor is written against.

use async_trait::async_trait;
use futures::stream::BoxStream;
use lapin::options::BasicConsumeOptions;

use super::errors::{RabbitMQError, Result};

/// Stream of deliveries produced by a consume call.
pub type Deliveries<D> = BoxStream<'static, Result<D>>;

pub type ChannelOf<B> = <<B as Broker>::Connection as BrokerConnection>::Channel;
pub type DeliveryOf<B> = <ChannelOf<B> as BrokerChannel>::Delivery;

/// Dials new connections to the broker.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    type Connection: BrokerConnection;

    async fn dial(&self, uri: &str) -> Result<Self::Connection>;
}

/// A live transport session.
#[async_trait]
pub trait BrokerConnection: Send + Sync + 'static {
    type Channel: BrokerChannel;

    async fn open_channel(&self) -> Result<Self::Channel>;

    /// Resolves once the connection is gone.
    ///
    /// `None` means the connection was closed locally on purpose, `Some` carries the
    /// error of an unsolicited disconnect. Every caller observes the same outcome.
    async fn closed(&self) -> Option<RabbitMQError>;

    async fn close(&self) -> Result<()>;
}

/// A protocol channel multiplexed over a connection.
#[async_trait]
pub trait BrokerChannel: Send + Sync + 'static {
    type Delivery: Send + 'static;

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        options: BasicConsumeOptions,
    ) -> Result<Deliveries<Self::Delivery>>;

    async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<()>;

    async fn close(&self) -> Result<()>;
}
