//! # bard-types
//!
//! Shared type definitions for the Bard performance engine.
//! Melody data, per-listener playback state and the sound events handed to
//! the broadcast layer live here so both the engine and its hosts can use them
//! without pulling in threads or devices.

pub mod melody;
pub mod progress;
pub mod sound;

pub use melody::{Melody, MelodyRef, Note, Track};
pub use progress::{MidiModeState, PlaybackProgress, SeatedState};
pub use sound::{BufferedNote, SoundDescriptor, SoundEvent};

/// Unique identifier for a listener (one per active performer or observer).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point in world space.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const ORIGIN: Position = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_sq(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }
}
