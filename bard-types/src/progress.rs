//! Per-listener state persisted on the held instrument item.

use serde::{Deserialize, Serialize};

use crate::MelodyRef;

/// Playback cursor for one listener.
///
/// `cursor_ms` only moves forward while playing. `last_tick_ms` is the world
/// time of the previous advance and bounds how much time the next tick may
/// consume. `session_start_ms` is the shared anchor handed out by the sync
/// registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackProgress {
    #[serde(rename = "Melody")]
    pub melody: String,
    #[serde(rename = "Time")]
    pub cursor_ms: i64,
    #[serde(rename = "WorldTime")]
    pub last_tick_ms: i64,
    #[serde(rename = "StartWorldTime")]
    pub session_start_ms: i64,
}

impl PlaybackProgress {
    /// Fresh progress for a melody anchored at `anchor_ms`, joining at `now_ms`.
    pub fn anchored(melody: &MelodyRef, anchor_ms: i64, now_ms: i64) -> Self {
        Self {
            melody: melody.to_string(),
            cursor_ms: (now_ms - anchor_ms).max(0),
            last_tick_ms: now_ms,
            session_start_ms: anchor_ms,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.melody.is_empty()
    }

    pub fn melody_ref(&self) -> Option<MelodyRef> {
        MelodyRef::parse(&self.melody)
    }
}

/// Whether raw device/keyboard input is being captured for this listener.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MidiModeState {
    #[serde(rename = "Active")]
    pub active: bool,
}

/// Stored seating flag, used when no live spatial signal is available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeatedState {
    #[serde(rename = "Active")]
    pub sitting: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchored_progress_starts_on_shared_timeline() {
        let melody = MelodyRef::Asset("tune".into());
        let p = PlaybackProgress::anchored(&melody, 1_000, 1_400);
        assert_eq!(p.cursor_ms, 400);
        assert_eq!(p.last_tick_ms, 1_400);
        assert_eq!(p.session_start_ms, 1_000);
        assert_eq!(p.melody_ref(), Some(melody));
    }

    #[test]
    fn anchor_in_the_future_clamps_cursor() {
        let p = PlaybackProgress::anchored(&MelodyRef::Asset("t".into()), 2_000, 1_000);
        assert_eq!(p.cursor_ms, 0);
    }

    #[test]
    fn missing_fields_default() {
        let p: PlaybackProgress = serde_json::from_str(r#"{"Melody":"x"}"#).unwrap();
        assert_eq!(p.melody, "x");
        assert_eq!(p.cursor_ms, 0);
        assert!(PlaybackProgress::default().is_idle());
    }
}
