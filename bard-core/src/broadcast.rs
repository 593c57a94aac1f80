use std::sync::Arc;

use bard_types::{ListenerId, SoundEvent};

use crate::timer::Schedule;

/// Delivery of spatial sound events to a set of players.
pub trait AudioBroadcast: Send + Sync {
    fn broadcast(&self, event: &SoundEvent, recipients: &[ListenerId], delay_ms: u64);
}

/// Per-recipient transport, e.g. a network session.
pub trait PacketSink: Send + Sync {
    fn send(&self, recipient: ListenerId, event: &SoundEvent);
}

/// Broadcasts through a [`PacketSink`], deferring delayed events on a timer.
pub struct DelayedBroadcast {
    sink: Arc<dyn PacketSink>,
    timer: Arc<dyn Schedule>,
}

impl DelayedBroadcast {
    pub fn new(sink: Arc<dyn PacketSink>, timer: Arc<dyn Schedule>) -> Self {
        Self { sink, timer }
    }
}

fn deliver(sink: &dyn PacketSink, event: &SoundEvent, recipients: &[ListenerId]) {
    for &recipient in recipients {
        sink.send(recipient, event);
    }
}

impl AudioBroadcast for DelayedBroadcast {
    fn broadcast(&self, event: &SoundEvent, recipients: &[ListenerId], delay_ms: u64) {
        if recipients.is_empty() {
            return;
        }
        if delay_ms == 0 {
            deliver(self.sink.as_ref(), event, recipients);
            return;
        }
        let sink = self.sink.clone();
        let event = event.clone();
        let recipients = recipients.to_vec();
        self.timer.schedule(
            delay_ms,
            Box::new(move || deliver(sink.as_ref(), &event, &recipients)),
        );
    }
}
