// src/rabbitmq/driver.rs
//! The AMQP job driver: one broker connection, a consume channel feeding the job
//! pipeline and a publish channel, kept alive across network interruptions.
//!
//! The connection, the consume channel and the publish [`ChannelSlot`] are only ever
//! replaced by the background redialer while it holds the driver-wide `links` lock.
//! Publishers never take that lock; they borrow the publish channel from the slot, which
//! stays empty for the whole of a reconnect, so they simply wait it out.

use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::backoff::ExponentialBackoff;
use super::channel_slot::ChannelSlot;
use super::dispatch::Dispatcher;
use super::errors::{RabbitMQError, Result};
use super::events::{fixed_pipeline, EventSink, LogEvents, Pipeline, PipelineHandle};
use super::topology::{NoTopology, Topology};
use super::transport::{Broker, BrokerChannel, BrokerConnection, ChannelOf, DeliveryOf};
use crate::env::DriverConfig;

pub const DRIVER_NAME: &str = "amqp";

/// How the redialer task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// Stop was requested and resources were torn down.
    Stopped,
    /// The connection was closed on purpose somewhere else.
    ClosedGracefully,
    /// A reconnect episode ran out of retry budget. The driver stays disconnected.
    Exhausted,
}

pub(super) struct Links<C: BrokerConnection> {
    pub(super) connection: Option<Arc<C>>,
    pub(super) consume_channel: Option<C::Channel>,
}

impl<C: BrokerConnection> Default for Links<C> {
    fn default() -> Self {
        Self {
            connection: None,
            consume_channel: None,
        }
    }
}

pub(super) struct Shared<B: Broker> {
    pub(super) broker: B,
    pub(super) config: DriverConfig,
    pub(super) backoff: ExponentialBackoff,
    pub(super) topology: Box<dyn Topology<B::Connection>>,
    pub(super) dispatcher: Box<dyn Dispatcher<DeliveryOf<B>>>,
    pub(super) events: Box<dyn EventSink>,
    pub(super) pipeline: PipelineHandle,
    pub(super) links: Mutex<Links<B::Connection>>,
    pub(super) publish_slot: ChannelSlot<ChannelOf<B>>,
}

pub struct DriverBuilder<B: Broker> {
    broker: B,
    config: DriverConfig,
    backoff: Option<ExponentialBackoff>,
    topology: Box<dyn Topology<B::Connection>>,
    dispatcher: Option<Box<dyn Dispatcher<DeliveryOf<B>>>>,
    events: Box<dyn EventSink>,
    pipeline: Option<PipelineHandle>,
}

impl<B: Broker> DriverBuilder<B> {
    pub fn topology(mut self, topology: impl Topology<B::Connection> + 'static) -> Self {
        self.topology = Box::new(topology);
        self
    }

    pub fn dispatcher(mut self, dispatcher: impl Dispatcher<DeliveryOf<B>> + 'static) -> Self {
        self.dispatcher = Some(Box::new(dispatcher));
        self
    }

    pub fn events(mut self, events: impl EventSink + 'static) -> Self {
        self.events = Box::new(events);
        self
    }

    pub fn pipeline(mut self, pipeline: PipelineHandle) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Template for the retry policy; every reconnect episode starts from a fresh copy.
    pub fn backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Connects, declares topology, opens both channels and starts consuming, then
    /// spawns the redialer. The first connection is not retried.
    pub async fn start(self) -> Result<AmqpDriver<B>> {
        self.config.validate()?;
        let dispatcher = self
            .dispatcher
            .ok_or_else(|| RabbitMQError::ConfigError("a delivery dispatcher is required".into()))?;

        let pipeline = self
            .pipeline
            .unwrap_or_else(|| fixed_pipeline(Pipeline::new(&self.config.pipeline, DRIVER_NAME)));
        let backoff = self
            .backoff
            .unwrap_or_else(|| ExponentialBackoff::new(self.config.retry_timeout()));

        let shared = Arc::new(Shared {
            broker: self.broker,
            config: self.config,
            backoff,
            topology: self.topology,
            dispatcher,
            events: self.events,
            pipeline,
            links: Mutex::new(Links::default()),
            publish_slot: ChannelSlot::new(),
        });

        let established = {
            let mut links = shared.links.lock().await;
            shared.establish(&mut links).await
        };
        let connection = match established {
            Ok(connection) => connection,
            Err(e) => {
                error!(error = %e, "Failed to connect to RabbitMQ");
                shared.teardown().await;
                return Err(e);
            }
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let monitor = tokio::spawn(redialer(Arc::clone(&shared), connection, stop_rx));
        info!(queue = %shared.config.queue, "AMQP driver started");

        Ok(AmqpDriver {
            shared,
            stop_tx: Mutex::new(Some(stop_tx)),
            monitor: Mutex::new(Some(monitor)),
        })
    }
}

pub struct AmqpDriver<B: Broker> {
    shared: Arc<Shared<B>>,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    monitor: Mutex<Option<JoinHandle<MonitorExit>>>,
}

impl<B: Broker> AmqpDriver<B> {
    pub fn builder(broker: B, config: DriverConfig) -> DriverBuilder<B> {
        DriverBuilder {
            broker,
            config,
            backoff: None,
            topology: Box::new(NoTopology),
            dispatcher: None,
            events: Box::new(LogEvents),
            pipeline: None,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.shared.config
    }

    /// Whether a publish would go out right now instead of waiting for a reconnect.
    pub fn is_publish_ready(&self) -> bool {
        self.shared.publish_slot.is_filled()
    }

    /// Publishes on the shared publish channel.
    ///
    /// Waits while the channel is being replaced. After the driver has stopped or given
    /// up reconnecting there is no channel to wait for, so guard calls with a timeout
    /// if that matters.
    pub async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<()> {
        let channel = self.shared.publish_slot.borrow().await;
        let published = channel.publish(exchange, routing_key, payload).await;

        // the driver stopped while this publish was in flight
        if let Some(retired) = channel.release() {
            debug!("Closing publish channel retired during publish");
            if let Err(e) = retired.close().await {
                error!(error = %e, "publish channel close");
            }
        }
        published
    }

    /// Signals the redialer to tear everything down and waits for it to finish.
    ///
    /// Returns how the redialer ended, which may predate this call. Later calls return
    /// `None`.
    pub async fn stop(&self) -> Option<MonitorExit> {
        if let Some(stop) = self.stop_tx.lock().await.take() {
            // the redialer may already be gone
            let _ = stop.send(());
        }

        let handle = self.monitor.lock().await.take()?;
        match handle.await {
            Ok(exit) => Some(exit),
            Err(e) => {
                error!(error = %e, "Redialer task failed");
                None
            }
        }
    }
}

/// Watches the current connection until it closes or a stop is requested.
///
/// A close with an error runs one reconnect episode inline, so no other close can be
/// serviced until it finishes. A stop that arrives meanwhile is served once the episode
/// is over. Exhausting the retry budget ends the task for good.
async fn redialer<B: Broker>(
    shared: Arc<Shared<B>>,
    mut connection: Arc<B::Connection>,
    mut stop: oneshot::Receiver<()>,
) -> MonitorExit {
    loop {
        tokio::select! {
            closed = connection.closed() => match closed {
                None => {
                    debug!("RabbitMQ connection closed locally, redialer exiting");
                    return MonitorExit::ClosedGracefully;
                }
                Some(err) => match shared.redial(err).await {
                    Ok(fresh) => connection = fresh,
                    Err(e) => {
                        error!(error = %e, "backoff failed, giving up on RabbitMQ reconnection");
                        return MonitorExit::Exhausted;
                    }
                },
            },
            _ = &mut stop => {
                shared.teardown().await;
                return MonitorExit::Stopped;
            }
        }
    }
}
