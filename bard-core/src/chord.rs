//! Aggregation of near-simultaneous live notes.
//!
//! The first note of a batch captures where the performer is and who can hear
//! them, then arms a single flush. Every note arriving before the flush joins
//! the batch and is played against that same snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bard_types::{BufferedNote, ListenerId, Position};
use parking_lot::Mutex;

use crate::broadcast::AudioBroadcast;
use crate::catalog::SoundCatalog;
use crate::resolver::{resolve, VelocityScale};
use crate::timer::Schedule;

/// Snapshot taken when a batch is armed.
#[derive(Debug, Clone)]
pub struct ChordContext {
    pub position: Position,
    pub recipients: Arc<[ListenerId]>,
}

struct Batch {
    generation: u64,
    notes: Vec<BufferedNote>,
}

struct Shared {
    pending: Mutex<HashMap<ListenerId, Batch>>,
    catalog: Arc<dyn SoundCatalog>,
    broadcast: Arc<dyn AudioBroadcast>,
    note_duration_ms: u32,
}

impl Shared {
    fn flush(&self, listener: ListenerId, generation: u64, ctx: &ChordContext) {
        let notes = {
            let mut pending = self.pending.lock();
            match pending.get(&listener) {
                Some(batch) if batch.generation == generation => {
                    pending.remove(&listener).map(|b| b.notes).unwrap_or_default()
                }
                _ => return,
            }
        };
        log::trace!(target: "chord", "flushing {} notes for {}", notes.len(), listener);
        for note in notes {
            let Some(sound) = resolve(
                self.catalog.as_ref(),
                &note.instrument,
                note.note,
                note.velocity,
                VelocityScale::Midi,
                self.note_duration_ms,
            ) else {
                continue;
            };
            let event = sound.into_event(ctx.position);
            self.broadcast.broadcast(&event, &ctx.recipients, 0);
        }
    }
}

pub struct ChordBuffer {
    shared: Arc<Shared>,
    timer: Arc<dyn Schedule>,
    window_ms: u64,
    next_generation: AtomicU64,
}

impl ChordBuffer {
    pub fn new(
        catalog: Arc<dyn SoundCatalog>,
        broadcast: Arc<dyn AudioBroadcast>,
        timer: Arc<dyn Schedule>,
        window_ms: u64,
        note_duration_ms: u32,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                pending: Mutex::new(HashMap::new()),
                catalog,
                broadcast,
                note_duration_ms,
            }),
            timer,
            window_ms,
            next_generation: AtomicU64::new(0),
        }
    }

    /// Add a note to the listener's batch. `capture` runs on the calling
    /// thread only when this note opens a new batch. Returns whether a flush
    /// was armed.
    pub fn buffer_note(
        &self,
        listener: ListenerId,
        note: BufferedNote,
        capture: impl FnOnce() -> ChordContext,
    ) -> bool {
        let generation = {
            let mut pending = self.shared.pending.lock();
            if let Some(batch) = pending.get_mut(&listener) {
                batch.notes.push(note);
                return false;
            }
            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            pending.insert(
                listener,
                Batch {
                    generation,
                    notes: vec![note],
                },
            );
            generation
        };

        let ctx = capture();
        let shared = self.shared.clone();
        self.timer.schedule(
            self.window_ms,
            Box::new(move || shared.flush(listener, generation, &ctx)),
        );
        true
    }

    /// Drop any pending batch. An already armed flush becomes a no-op.
    pub fn clear(&self, listener: ListenerId) {
        self.shared.pending.lock().remove(&listener);
    }

    pub fn pending_len(&self, listener: ListenerId) -> usize {
        self.shared
            .pending
            .lock()
            .get(&listener)
            .map_or(0, |b| b.notes.len())
    }
}
