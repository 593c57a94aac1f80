use serde::{Deserialize, Serialize};

use crate::Position;

/// What the catalog knows about a registered sound.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoundDescriptor {
    /// Index of the sound in the host's asset table.
    pub index: u32,
    /// Audible radius; players farther away are not sent the event.
    pub max_distance: f64,
}

/// A resolved, ready-to-send spatial sound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundEvent {
    pub key: String,
    pub sound_index: u32,
    pub volume: f32,
    pub pitch: f32,
    pub position: Position,
}

/// A live note waiting in the chord buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedNote {
    pub instrument: String,
    pub note: u8,
    pub velocity: u8,
}
