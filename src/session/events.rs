//! Session notifications
//!
//! The controller reports everything observable to its consumer through a
//! single typed event stream instead of a bag of callbacks. Consumers
//! implement [`EventSink`] (or hand the controller an unbounded channel
//! sender, which already implements it) and route events into their own
//! state handling.

/// One-shot notifications emitted over a session's life
///
/// Events arrive in the order the underlying connection produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The duplex connection is established and configured
    Opened,
    /// The model began streaming audio for the current turn
    ModelStartedSpeaking,
    /// A turn ended and the model's transcript for it is final
    ModelFinishedSpeaking(String),
    /// A turn ended and the user's transcript for it is final
    UserFinishedSpeaking(String),
    /// The server signalled the end of a turn
    TurnComplete,
    /// The session failed; always followed by `Closed`
    Error(String),
    /// The session is closed; no further events follow
    Closed,
}

/// Consumer seam for session notifications
///
/// `emit` is called from the session's event-routing task and must not
/// block for long.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: SessionEvent);
}

impl<T: EventSink + ?Sized> EventSink for std::sync::Arc<T> {
    fn emit(&self, event: SessionEvent) {
        (**self).emit(event);
    }
}

/// Channel senders are sinks: dropped receivers silently discard events,
/// which matches the fire-and-forget notification contract.
impl EventSink for tokio::sync::mpsc::UnboundedSender<SessionEvent> {
    fn emit(&self, event: SessionEvent) {
        if self.send(event).is_err() {
            log::debug!("Event receiver dropped, discarding session event");
        }
    }
}

/// Broadcasts every event to several sinks, in registration order
///
/// Lets a UI sink and a transcript recorder observe the same session.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<std::sync::Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: SessionEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_channel_sender_is_a_sink() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.emit(SessionEvent::Opened);
        tx.emit(SessionEvent::TurnComplete);

        assert_eq!(rx.try_recv().unwrap(), SessionEvent::Opened);
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::TurnComplete);
    }

    #[test]
    fn test_emit_after_receiver_dropped_is_silent() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);
        tx.emit(SessionEvent::Closed); // must not panic
    }

    #[test]
    fn test_arc_forwards_to_inner_sink() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink: Arc<dyn EventSink> = Arc::new(tx);
        sink.emit(SessionEvent::ModelStartedSpeaking);

        assert_eq!(rx.try_recv().unwrap(), SessionEvent::ModelStartedSpeaking);
    }

    #[test]
    fn test_fanout_reaches_every_sink_in_order() {
        let (tx_a, mut rx_a) = tokio::sync::mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = tokio::sync::mpsc::unbounded_channel();
        let fanout = FanoutSink::new(vec![Arc::new(tx_a), Arc::new(tx_b)]);

        fanout.emit(SessionEvent::Opened);

        assert_eq!(rx_a.try_recv().unwrap(), SessionEvent::Opened);
        assert_eq!(rx_b.try_recv().unwrap(), SessionEvent::Opened);
    }
}
