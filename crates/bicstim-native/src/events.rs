//! Event dispatch from an implant driver to its subscriber.

use tokio::sync::mpsc;
use tracing::debug;

use crate::implant::ImplantEvent;

/// Receiving half handed to a subscriber.
pub type EventReceiver = mpsc::UnboundedReceiver<ImplantEvent>;

/// Single-subscriber event channel.
///
/// Subscribing again replaces the previous subscriber, whose receiver then
/// sees the channel close.
#[derive(Debug, Default)]
pub struct EventBus {
    sender: Option<mpsc::UnboundedSender<ImplantEvent>>,
}

impl EventBus {
    /// Create a bus without a subscriber.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    pub fn subscribe(&mut self) -> EventReceiver {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.sender = Some(sender);
        receiver
    }

    /// Drop the current subscriber.
    pub fn unsubscribe(&mut self) {
        self.sender = None;
    }

    /// Check if someone is listening.
    #[must_use]
    pub fn has_subscriber(&self) -> bool {
        self.sender.as_ref().is_some_and(|sender| !sender.is_closed())
    }

    /// Deliver an event. Returns false if nobody received it.
    pub fn emit(&mut self, event: ImplantEvent) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        if sender.send(event).is_err() {
            debug!("Event subscriber dropped its receiver");
            self.sender = None;
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscriber() {
        let mut bus = EventBus::new();
        assert!(!bus.has_subscriber());
        assert!(!bus.emit(ImplantEvent::DataProcessingTooSlow));
    }

    #[test]
    fn test_latest_subscriber_wins() {
        let mut bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert!(bus.emit(ImplantEvent::TemperatureChanged(36.5)));
        assert_eq!(second.try_recv().unwrap(), ImplantEvent::TemperatureChanged(36.5));
        // Sender of the first channel was dropped on resubscribe
        assert!(first.try_recv().is_err());
    }

    #[test]
    fn test_unsubscribe_closes_channel() {
        let mut bus = EventBus::new();
        let mut receiver = bus.subscribe();
        assert!(bus.has_subscriber());

        bus.unsubscribe();
        assert!(!bus.has_subscriber());
        assert!(!bus.emit(ImplantEvent::MeasurementStateChanged(true)));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_dropped_receiver_unsubscribes() {
        let mut bus = EventBus::new();
        drop(bus.subscribe());
        assert!(!bus.has_subscriber());
        assert!(!bus.emit(ImplantEvent::StimulationStateChanged(true)));
    }
}
