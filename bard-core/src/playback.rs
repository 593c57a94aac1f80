//! Melody cursor advancement and note emission.

use std::collections::HashMap;

use bard_types::{ListenerId, Melody, Note, PlaybackProgress, Position};

use crate::broadcast::AudioBroadcast;
use crate::catalog::SoundCatalog;
use crate::resolver::{resolve, VelocityScale};
use crate::world::{listeners_near, SpatialQuery};

/// A note that became due during a tick, with its offset from now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueNote {
    pub note: Note,
    pub delay_ms: u64,
}

/// Moves a melody cursor forward by at most one buffer per tick.
///
/// A tick consumes the time since the previous one, capped at the buffer.
/// Notes in the consumed window are played `buffer_ms` behind real time, so a
/// note at the very end of the window plays after a full buffer and one at the
/// start plays almost immediately.
#[derive(Debug, Clone, Copy)]
pub struct ProgressScheduler {
    buffer_ms: i64,
}

impl ProgressScheduler {
    pub fn new(buffer_ms: u64) -> Self {
        Self {
            buffer_ms: buffer_ms as i64,
        }
    }

    pub fn advance(
        &self,
        progress: &mut PlaybackProgress,
        now_ms: i64,
        melody: &Melody,
    ) -> Vec<DueNote> {
        let elapsed = (now_ms - progress.last_tick_ms).min(self.buffer_ms);
        if elapsed <= 0 {
            return Vec::new();
        }
        let from = progress.cursor_ms;
        let to = from + elapsed;

        let mut due = Vec::new();
        for track in &melody.tracks {
            for note in track.notes_in(from, to) {
                // start >= from and elapsed <= buffer, so the delay is never negative.
                let delay = note.start_ms as i64 - to + self.buffer_ms;
                due.push(DueNote {
                    note: *note,
                    delay_ms: delay.max(0) as u64,
                });
            }
        }
        due.sort_by_key(|d| d.delay_ms);

        progress.cursor_ms = to;
        progress.last_tick_ms = now_ms;
        due
    }

    pub fn finished(progress: &PlaybackProgress, melody: &Melody) -> bool {
        progress.cursor_ms >= melody.length_ms() as i64
    }
}

/// Resolve and broadcast due melody notes from `position`. Recipients are the
/// players within each sound's audible range. Returns how many notes were sent.
pub fn emit_due_notes(
    due: &[DueNote],
    instrument: &str,
    position: Position,
    catalog: &dyn SoundCatalog,
    spatial: &dyn SpatialQuery,
    broadcast: &dyn AudioBroadcast,
) -> usize {
    let mut recipients_by_range: HashMap<u64, Vec<ListenerId>> = HashMap::new();
    let mut sent = 0;
    for d in due {
        let Some(sound) = resolve(
            catalog,
            instrument,
            d.note.pitch,
            d.note.velocity,
            VelocityScale::Melody,
            d.note.duration_ms,
        ) else {
            continue;
        };
        let range = sound.descriptor.max_distance;
        let recipients = recipients_by_range
            .entry(range.to_bits())
            .or_insert_with(|| listeners_near(spatial, position, range));
        if recipients.is_empty() {
            continue;
        }
        let event = sound.into_event(position);
        broadcast.broadcast(&event, recipients, d.delay_ms);
        sent += 1;
    }
    sent
}
