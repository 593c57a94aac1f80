use std::fmt;

use serde::{Deserialize, Serialize};

/// A single note in a stored melody. Times are milliseconds from the melody start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    #[serde(rename = "Note")]
    pub pitch: u8,
    #[serde(rename = "Velocity")]
    pub velocity: u8,
    #[serde(rename = "Time")]
    pub start_ms: u32,
    #[serde(rename = "Length")]
    pub duration_ms: u32,
}

impl Note {
    pub fn new(pitch: u8, velocity: u8, start_ms: u32, duration_ms: u32) -> Self {
        Self {
            pitch,
            velocity,
            start_ms,
            duration_ms,
        }
    }

    pub fn end_ms(&self) -> u32 {
        self.start_ms.saturating_add(self.duration_ms)
    }
}

#[derive(Deserialize)]
struct RawTrack {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Notes", default)]
    notes: Vec<Note>,
}

/// An ordered sequence of notes. Notes are always sorted by start time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawTrack")]
pub struct Track {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Notes")]
    notes: Vec<Note>,
}

impl From<RawTrack> for Track {
    fn from(raw: RawTrack) -> Self {
        Track::new(raw.name, raw.notes)
    }
}

impl Track {
    /// Build a track, sorting notes by start time (stable, so simultaneous notes keep their order).
    pub fn new(name: impl Into<String>, mut notes: Vec<Note>) -> Self {
        notes.sort_by_key(|n| n.start_ms);
        Self {
            name: name.into(),
            notes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// End of the last note, 0 for an empty track.
    pub fn length_ms(&self) -> u32 {
        self.notes.last().map_or(0, Note::end_ms)
    }

    /// Notes whose start falls in `[from_ms, to_ms)`.
    pub fn notes_in(&self, from_ms: i64, to_ms: i64) -> &[Note] {
        let lo = self.notes.partition_point(|n| (n.start_ms as i64) < from_ms);
        let hi = self.notes.partition_point(|n| (n.start_ms as i64) < to_ms);
        &self.notes[lo..hi.max(lo)]
    }
}

/// An immutable composition made of one or more tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Melody {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Tracks")]
    pub tracks: Vec<Track>,
}

impl Melody {
    pub fn new(name: impl Into<String>, tracks: Vec<Track>) -> Self {
        Self {
            name: name.into(),
            tracks,
        }
    }

    pub fn length_ms(&self) -> u32 {
        self.tracks.iter().map(Track::length_ms).max().unwrap_or(0)
    }

    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }
}

/// Where a melody lives: a bare asset key, or `owner:key` for per-world entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MelodyRef {
    Asset(String),
    World { owner: String, key: String },
}

impl MelodyRef {
    /// Parse a stored reference. Returns `None` for the empty string.
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() {
            return None;
        }
        match s.split_once(':') {
            Some((owner, key)) => Some(MelodyRef::World {
                owner: owner.to_string(),
                key: key.to_string(),
            }),
            None => Some(MelodyRef::Asset(s.to_string())),
        }
    }
}

impl fmt::Display for MelodyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MelodyRef::Asset(key) => write!(f, "{}", key),
            MelodyRef::World { owner, key } => write!(f, "{}:{}", owner, key),
        }
    }
}
