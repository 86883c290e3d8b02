// src/rabbitmq/redial.rs

use std::sync::Arc;

use chrono::Utc;
use lapin::options::BasicConsumeOptions;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use super::driver::{Links, Shared};
use super::errors::{RabbitMQError, Result, Stage};
use super::events::LifecycleEvent;
use super::transport::{Broker, BrokerChannel, BrokerConnection};

/// Manual acks downstream, shared queue, no flags.
pub const CONSUME_OPTIONS: BasicConsumeOptions = BasicConsumeOptions {
    no_local: false,
    no_ack: false,
    exclusive: false,
    nowait: false,
};

impl<B: Broker> Shared<B> {
    /// Dial, declare topology, open both channels, start consuming, refill the publish
    /// slot and hand the deliveries off. Nothing carries over from a failed attempt.
    pub(super) async fn establish(
        &self,
        links: &mut Links<B::Connection>,
    ) -> Result<Arc<B::Connection>> {
        let connection = self
            .broker
            .dial(&self.config.amqp_addr)
            .await
            .map_err(|e| e.at(Stage::Dial))?;
        let connection = links.connection.insert(Arc::new(connection)).clone();

        info!("rabbitmq dial succeed. trying to redeclare queues and subscribers");

        if let Err(e) = self.topology.declare(&connection).await {
            error!(error = %e, "rabbitmq topology declaration failed");
            return Err(e.at(Stage::Topology));
        }

        let consume_channel = connection
            .open_channel()
            .await
            .map_err(|e| e.at(Stage::ConsumeChannel))?;
        let consume_channel = links.consume_channel.insert(consume_channel);
        let publish_channel = connection
            .open_channel()
            .await
            .map_err(|e| e.at(Stage::PublishChannel))?;

        let deliveries = consume_channel
            .consume(&self.config.queue, &self.config.consumer_tag, CONSUME_OPTIONS)
            .await
            .map_err(|e| e.at(Stage::Consume))?;

        // publishers waiting on the slot resume from here
        self.publish_slot.fill(publish_channel).await;
        self.dispatcher.dispatch(deliveries);

        info!(
            queue = %self.config.queue,
            consumer_tag = %self.config.consumer_tag,
            "queues and subscribers redeclared successfully"
        );
        Ok(connection)
    }

    /// One reconnect episode, run while holding the links lock.
    ///
    /// Returns the new connection, or the last attempt's error once the retry budget
    /// is spent.
    pub(super) async fn redial(&self, cause: RabbitMQError) -> Result<Arc<B::Connection>> {
        let observed = Instant::now();
        let started_at = Utc::now();

        let mut links = self.links.lock().await;

        // trash the broken publishing channel
        drop(self.publish_slot.drain().await);
        links.consume_channel = None;
        links.connection = None;

        let pipeline = self.pipeline.borrow().clone();
        self.events.push(LifecycleEvent::pipe_error(&pipeline, &cause));

        let mut backoff = self.backoff.clone();
        backoff.reset();
        let mut attempt: u32 = 0;

        let connection = loop {
            attempt += 1;
            warn!(error = %cause, attempt, "rabbitmq reconnecting");

            let err = match self.establish(&mut links).await {
                Ok(connection) => break connection,
                Err(e) => e,
            };
            match backoff.next_backoff() {
                Some(delay) => {
                    warn!(
                        error = %err,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "rabbitmq reconnect attempt failed"
                    );
                    sleep(delay).await;
                }
                None => return Err(err),
            }
        };

        self.events.push(LifecycleEvent::pipe_active(
            &pipeline,
            started_at,
            observed.elapsed(),
        ));
        info!(
            attempts = attempt,
            elapsed_ms = observed.elapsed().as_millis() as u64,
            "rabbitmq reconnected"
        );
        Ok(connection)
    }

    /// Best-effort close of the publish channel, the consume channel and the connection,
    /// in that order. Failures are logged and do not stop the remaining steps.
    ///
    /// The publish slot is retired, so a channel out on loan to a publisher is closed by
    /// that publisher once it is done and never goes back into the slot.
    pub(super) async fn teardown(&self) {
        let mut links = self.links.lock().await;

        if let Some(channel) = self.publish_slot.retire() {
            if let Err(e) = channel.close().await {
                error!(error = %e, "publish channel close");
            }
        }

        if let Some(channel) = links.consume_channel.take() {
            if let Err(e) = channel.close().await {
                error!(error = %e, "consume channel close");
            }
        }

        if let Some(connection) = links.connection.take() {
            if let Err(e) = connection.close().await {
                error!(error = %e, "amqp connection close");
            }
        }
    }
}
