// src/rabbitmq/mod.rs
// Connection supervision for the AMQP job driver

pub mod errors;
pub mod transport;
pub mod connection; // lapin implementation of the transport traits

pub mod backoff;
pub mod channel_slot;
pub mod dispatch;
pub mod events;
pub mod topology;

mod driver;
mod redial;

// Re-export specific items to simplify imports elsewhere
pub use backoff::ExponentialBackoff;
pub use channel_slot::{ChannelSlot, SlotGuard};
pub use connection::{LapinBroker, LapinChannel, LapinConnection};
pub use dispatch::{Dispatcher, ForwardingDispatcher};
pub use driver::{AmqpDriver, DriverBuilder, MonitorExit, DRIVER_NAME};
pub use errors::{RabbitMQError, Result, Stage};
pub use events::{EventKind, EventSink, LifecycleEvent, LogEvents, Pipeline, PipelineHandle};
pub use redial::CONSUME_OPTIONS;
pub use topology::{NoTopology, QueueTopology, Topology};
pub use transport::{Broker, BrokerChannel, BrokerConnection, Deliveries};
