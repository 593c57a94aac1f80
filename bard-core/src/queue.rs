//! Per-listener FIFO from input threads into the simulation tick.

use std::collections::HashMap;

use bard_types::ListenerId;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;

/// A note-on as delivered by an input source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveNote {
    pub note: u8,
    pub velocity: u8,
}

struct Lane {
    tx: Sender<LiveNote>,
    rx: Receiver<LiveNote>,
}

impl Lane {
    fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }
}

/// Producer handle bound to one listener's lane. Sends after the lane has been
/// removed are dropped.
#[derive(Clone)]
pub struct NoteSender {
    listener: ListenerId,
    tx: Sender<LiveNote>,
}

impl NoteSender {
    pub fn listener(&self) -> ListenerId {
        self.listener
    }

    pub fn send(&self, note: LiveNote) -> bool {
        self.tx.send(note).is_ok()
    }
}

#[derive(Default)]
pub struct NoteQueue {
    lanes: RwLock<HashMap<ListenerId, Lane>>,
}

impl NoteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or recreate empty) the lane for a listener.
    pub fn register(&self, listener: ListenerId) -> NoteSender {
        let lane = Lane::new();
        let tx = lane.tx.clone();
        self.lanes.write().insert(listener, lane);
        NoteSender { listener, tx }
    }

    pub fn sender(&self, listener: ListenerId) -> Option<NoteSender> {
        self.lanes.read().get(&listener).map(|lane| NoteSender {
            listener,
            tx: lane.tx.clone(),
        })
    }

    pub fn is_registered(&self, listener: ListenerId) -> bool {
        self.lanes.read().contains_key(&listener)
    }

    /// Append a note to a registered listener's lane. Notes for unknown
    /// listeners are dropped.
    pub fn enqueue(&self, listener: ListenerId, note: LiveNote) -> bool {
        match self.lanes.read().get(&listener) {
            Some(lane) => lane.tx.send(note).is_ok(),
            None => false,
        }
    }

    /// Everything queued for the listener at the time of the call, oldest first.
    pub fn drain_all(&self, listener: ListenerId) -> Vec<LiveNote> {
        let rx = match self.lanes.read().get(&listener) {
            Some(lane) => lane.rx.clone(),
            None => return Vec::new(),
        };
        let pending = rx.len();
        let mut notes = Vec::with_capacity(pending);
        for _ in 0..pending {
            match rx.try_recv() {
                Ok(note) => notes.push(note),
                Err(_) => break,
            }
        }
        notes
    }

    pub fn remove(&self, listener: ListenerId) -> bool {
        self.lanes.write().remove(&listener).is_some()
    }

    pub fn len(&self) -> usize {
        self.lanes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.read().is_empty()
    }
}
