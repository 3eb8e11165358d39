//! # Event Bus Implementation
//!
//! The EventBus is the single channel through which an executor reports to
//! its host. It is a broadcast publish-subscribe hub: every subscriber sees
//! every event, in publication order.
//!
//! ## Delivery
//!
//! Built on Tokio's broadcast channel. Publishing never awaits, so the
//! executor may publish while holding its state lock.
//!
//! A lagging receiver loses the oldest events and gets
//! [`EventError::Lagged`] on its next `recv`.

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::ExecutorEvent;

pub struct EventBus {
    /// Broadcast sender for executor events
    event_sender: broadcast::Sender<ExecutorEvent>,
    /// Maximum number of events that can be buffered
    capacity: usize,
    /// Internal receiver to keep the broadcast channel active
    _internal_receiver: broadcast::Receiver<ExecutorEvent>,
}

impl EventBus {
    /// Creates a new EventBus with the specified buffer capacity.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use umeme::event::EventBus;
    /// let event_bus = EventBus::new(100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (event_sender, event_receiver) = broadcast::channel(capacity.max(1));
        Self {
            event_sender,
            capacity,
            _internal_receiver: event_receiver,
        }
    }

    /// Subscribes to all events published from now on.
    ///
    /// ```rust,no_run
    /// # use umeme::event::EventBus;
    /// # async fn example() {
    /// let event_bus = EventBus::new(100);
    /// let mut event_rx = event_bus.subscribe();
    ///
    /// tokio::spawn(async move {
    ///     while let Ok(event) = event_rx.recv().await {
    ///         println!("{:?}", event);
    ///     }
    /// });
    /// # }
    /// ```
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.event_sender.subscribe())
    }

    /// Publishes an event to all subscribers.
    ///
    /// Never awaits, so it can be called while the executor state lock is held.
    pub fn publish(&self, event: ExecutorEvent) -> EventResult<()> {
        debug_event("Publishing", &event);
        self.event_sender
            .send(event)
            .map_err(|e| EventError::SendFailed {
                message: e.to_string(),
            })?;
        Ok(())
    }

    pub fn queue_size(&self) -> usize {
        self.event_sender.len()
    }

    pub fn subscribers_size(&self) -> usize {
        self.event_sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

pub fn debug_event(prefix: &str, event: &ExecutorEvent) {
    match event {
        ExecutorEvent::LineChanged(_) => trace!("{} Event: {:?}", prefix, event),
        _ => debug!("{} Event: {:?}", prefix, event),
    }
}

pub struct EventReceiver {
    pub receiver: broadcast::Receiver<ExecutorEvent>,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<ExecutorEvent>) -> Self {
        Self { receiver }
    }

    /// Receives the next event. On lag the receiver resubscribes and reports
    /// how many events were skipped; call `recv` again to continue.
    pub async fn recv(&mut self) -> EventResult<ExecutorEvent> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                self.receiver = self.receiver.resubscribe();
                Err(EventError::Lagged { count: n })
            }
            Err(e) => Err(EventError::ReceiveFailed {
                message: e.to_string(),
            }),
        }
    }

    /// Returns the next already-published event, if any.
    pub fn try_recv(&mut self) -> Option<ExecutorEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    debug!("Receiver lagged, skipped {} events", n);
                }
                Err(_) => return None,
            }
        }
    }

    /// Drains every event published so far.
    pub fn drain(&mut self) -> Vec<ExecutorEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Event Send failed: {message}")]
    SendFailed { message: String },

    #[error("Event Receive failed: {message}")]
    ReceiveFailed { message: String },

    #[error("Event lagged: {count}")]
    Lagged { count: u64 },
}

pub type EventResult<T> = Result<T, EventError>;
