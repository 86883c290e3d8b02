use lapin::{message::Delivery, options::BasicAckOptions, ConnectionProperties};
use rabbit_redial::config::load_config;
use rabbit_redial::rabbitmq::{AmqpDriver, ForwardingDispatcher, LapinBroker, QueueTopology};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DELIVERY_BUFFER: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    let topology = QueueTopology::from_config(&config);
    let (dispatcher, deliveries) = ForwardingDispatcher::channel(DELIVERY_BUFFER);

    let driver = AmqpDriver::builder(LapinBroker::new(ConnectionProperties::default()), config)
        .topology(topology)
        .dispatcher(dispatcher)
        .start()
        .await?;

    let worker = tokio::spawn(ack_deliveries(deliveries));

    info!("Service running. Press Ctrl+C to exit.");
    tokio::signal::ctrl_c().await?;

    info!("Stopping AMQP driver...");
    let exit = driver.stop().await;
    info!(?exit, "AMQP driver stopped");

    // deliveries still buffered are redelivered by the broker since they were never acked
    worker.abort();
    Ok(())
}

/// Stand-in for the job pipeline: logs and acknowledges every delivery.
async fn ack_deliveries(mut deliveries: mpsc::Receiver<Delivery>) {
    while let Some(delivery) = deliveries.recv().await {
        let data = String::from_utf8_lossy(&delivery.data);
        info!(delivery_tag = delivery.delivery_tag, "Received message: {}", data);

        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
            error!("Failed to acknowledge message: {}", e);
        }
    }
}
