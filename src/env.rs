use std::env;
use std::time::Duration;

use dotenv::dotenv;
use serde::Deserialize;
use uuid::Uuid;

use crate::rabbitmq::RabbitMQError;

/// Settings the driver needs to (re)connect and resume consuming.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct DriverConfig {
    pub amqp_addr: String,

    pub queue: String,

    #[serde(default = "default_consumer_tag")]
    pub consumer_tag: String,

    #[serde(default)]
    pub exchange: String,

    #[serde(default = "default_exchange_type")]
    pub exchange_type: String,

    #[serde(default)]
    pub routing_key: String,

    #[serde(default = "default_pipeline")]
    pub pipeline: String,

    /// Upper bound on one reconnect episode. `0` retries forever.
    #[serde(default = "default_retry_timeout_secs")]
    pub retry_timeout_secs: u64,
}

fn default_consumer_tag() -> String {
    format!("consumer-{}", &Uuid::new_v4().to_string()[..8])
}

fn default_exchange_type() -> String {
    "direct".to_string()
}

fn default_pipeline() -> String {
    "default".to_string()
}

fn default_retry_timeout_secs() -> u64 {
    60
}

impl DriverConfig {
    pub fn new(amqp_addr: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            amqp_addr: amqp_addr.into(),
            queue: queue.into(),
            consumer_tag: default_consumer_tag(),
            exchange: String::new(),
            exchange_type: default_exchange_type(),
            routing_key: String::new(),
            pipeline: default_pipeline(),
            retry_timeout_secs: default_retry_timeout_secs(),
        }
    }

    /// Reads the configuration from the process environment, after `.env`.
    pub fn load() -> Result<Self, RabbitMQError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, RabbitMQError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| {
                RabbitMQError::ConfigError(format!("Environment variable {} is not set", key))
            })
        };

        let config = DriverConfig {
            amqp_addr: required("AMQP_ADDR")?,
            queue: required("AMQP_QUEUE")?,
            consumer_tag: lookup("AMQP_CONSUMER_TAG").unwrap_or_else(default_consumer_tag),
            exchange: lookup("AMQP_EXCHANGE").unwrap_or_default(),
            exchange_type: lookup("AMQP_EXCHANGE_TYPE").unwrap_or_else(default_exchange_type),
            routing_key: lookup("AMQP_ROUTING_KEY").unwrap_or_default(),
            pipeline: lookup("AMQP_PIPELINE").unwrap_or_else(default_pipeline),
            retry_timeout_secs: match lookup("AMQP_RETRY_TIMEOUT_SECONDS") {
                Some(val) => val.parse()?,
                None => default_retry_timeout_secs(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RabbitMQError> {
        if self.amqp_addr.is_empty() {
            return Err(RabbitMQError::ConfigError("amqp_addr cannot be empty".into()));
        }
        if self.queue.is_empty() {
            return Err(RabbitMQError::ConfigError("queue cannot be empty".into()));
        }
        Ok(())
    }

    /// `None` when the driver should retry indefinitely.
    pub fn retry_timeout(&self) -> Option<Duration> {
        match self.retry_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
