//! Single typed channel between event sources and their consumer.
//!
//! Event sources publish onto an [`InMemoryBus`]; the consumer subscribes
//! once. Nothing else attaches raw observers to the page.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("no subscriber is listening")]
    NoSubscriber,
}

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

#[async_trait]
pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    async fn publish(&self, event: E) -> Result<(), BusError>;
    fn subscribe(&self) -> broadcast::Receiver<E>;
}

/// Broadcast-backed bus. Lagging subscribers lose the oldest events, which is
/// acceptable for signals that are collapsed downstream anyway.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    /// Publish without awaiting; returns how many subscribers saw the event.
    pub fn emit(&self, event: E) -> usize {
        match self.sender.send(event) {
            Ok(count) => count,
            Err(broadcast::error::SendError(event)) => {
                debug!(target: "tubepace-bus", ?event, "signal dropped, no subscriber");
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait]
impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    async fn publish(&self, event: E) -> Result<(), BusError> {
        self.sender
            .send(event)
            .map(|_| ())
            .map_err(|_| BusError::NoSubscriber)
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

/// Materialise an mpsc receiver from the bus subscription so callers can
/// await events without handling broadcast lag themselves.
pub fn to_mpsc<E>(bus: Arc<InMemoryBus<E>>, capacity: usize) -> mpsc::Receiver<E>
where
    E: Event,
{
    let mut rx = bus.subscribe();
    let (tx, out_rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    if tx.send(ev).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(target: "tubepace-bus", skipped, "subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    out_rx
}
