//! Connection supervision for an AMQP job driver.
//!
//! [`rabbitmq::AmqpDriver`] keeps a broker connection and its consume and publish
//! channels alive across network interruptions: on an unsolicited close it redials with
//! exponential backoff, redeclares topology, reopens both channels and resumes consuming,
//! while publishers simply wait for the fresh publish channel.

pub mod config;
pub mod env;
pub mod rabbitmq;

pub use env::DriverConfig;
