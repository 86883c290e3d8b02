// src/rabbitmq/dispatch.rs

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::transport::Deliveries;

/// Takes over a fresh delivery stream after every (re)connect.
///
/// Implementations own the stream from here on; the supervisor never waits for them.
pub trait Dispatcher<D>: Send + Sync {
    fn dispatch(&self, deliveries: Deliveries<D>);
}

impl<D, F> Dispatcher<D> for F
where
    F: Fn(Deliveries<D>) + Send + Sync,
{
    fn dispatch(&self, deliveries: Deliveries<D>) {
        self(deliveries)
    }
}

/// Forwards deliveries into a queue read by the job pipeline.
///
/// Each call spawns its own task; the task ends when the stream ends or fails (the
/// connection went away) or when the receiving side is dropped.
pub struct ForwardingDispatcher<D> {
    tx: mpsc::Sender<D>,
}

impl<D> ForwardingDispatcher<D> {
    pub fn new(tx: mpsc::Sender<D>) -> Self {
        Self { tx }
    }

    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<D>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl<D: Send + 'static> Dispatcher<D> for ForwardingDispatcher<D> {
    fn dispatch(&self, mut deliveries: Deliveries<D>) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            while let Some(delivery) = deliveries.next().await {
                match delivery {
                    Ok(delivery) => {
                        if tx.send(delivery).await.is_err() {
                            debug!("Delivery receiver dropped, stopping listener");
                            return;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Error receiving message");
                        return;
                    }
                }
            }
            debug!("Delivery stream ended");
        });
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;
    use crate::rabbitmq::errors::RabbitMQError;

    #[tokio::test]
    async fn forwards_until_stream_ends() {
        let (dispatcher, mut rx) = ForwardingDispatcher::channel(8);
        dispatcher.dispatch(stream::iter(vec![Ok(1), Ok(2)]).boxed());

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        // both the task's sender clone and ours must go for recv to end
        drop(dispatcher);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn stops_on_stream_error() {
        let (dispatcher, mut rx) = ForwardingDispatcher::channel(8);
        dispatcher.dispatch(
            stream::iter(vec![
                Ok(1),
                Err(RabbitMQError::ConsumeError("channel closed".into())),
                Ok(3),
            ])
            .boxed(),
        );
        drop(dispatcher);

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn closures_are_dispatchers() {
        let seen = std::sync::atomic::AtomicBool::new(false);
        let dispatcher = |_d: Deliveries<u8>| seen.store(true, std::sync::atomic::Ordering::SeqCst);
        dispatcher.dispatch(stream::empty().boxed());
        assert!(seen.load(std::sync::atomic::Ordering::SeqCst));
    }
}
