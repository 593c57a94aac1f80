//! Error types for the fallible edges of the engine: device connection and
//! melody loading. Everything on the per-tick path degrades silently instead.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("MIDI backend unavailable: {0}")]
    Backend(String),
    #[error("no MIDI input devices found")]
    NoDevices,
    #[error("invalid MIDI port index {index} ({available} available)")]
    InvalidPort { index: usize, available: usize },
    #[error("failed to connect to {port}: {reason}")]
    Connect { port: String, reason: String },
    #[error("no input service attached")]
    Unavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum MelodyError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed melody: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("melody {0} has no notes")]
    Empty(String),
}
