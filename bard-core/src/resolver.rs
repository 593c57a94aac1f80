//! Translation of a note and velocity into a catalog sound.
//!
//! The catalog only holds one rendered sample per instrument, octave and
//! duration, each recorded at C. A note is played by picking the octave whose
//! sample is closest and pitching it up by at most a fourth.

use bard_types::{Position, SoundDescriptor, SoundEvent};

use crate::catalog::SoundCatalog;

/// Rendered sample lengths, ascending.
pub const DURATIONS_MS: [u32; 15] = [
    125, 250, 375, 500, 625, 750, 875, 1000, 1250, 1500, 1750, 2000, 2500, 3000, 4000,
];

pub const MIN_OCTAVE: u8 = 1;
pub const MAX_OCTAVE: u8 = 8;

/// MIDI note of the lowest sample (C1).
const BASE_NOTE: i32 = 24;
const FOLD_THRESHOLD: f64 = 4.0 / 3.0;
const VOLUME_BLEND: f64 = 0.5;

/// Velocity reference: raw device input spans 0..127, stored melodies are
/// normalized around 64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VelocityScale {
    Midi,
    Melody,
}

impl VelocityScale {
    pub fn reference(self) -> f64 {
        match self {
            VelocityScale::Midi => 127.0,
            VelocityScale::Melody => 64.0,
        }
    }
}

/// Nearest sample length. Ties go to the shorter one.
pub fn quantize_duration(ms: u32) -> u32 {
    let mut best = DURATIONS_MS[0];
    for &d in &DURATIONS_MS[1..] {
        if d.abs_diff(ms) < best.abs_diff(ms) {
            best = d;
        }
    }
    best
}

/// Octave of the sample to use and the pitch ratio to apply to it.
pub fn fold_pitch(note: u8) -> (u8, f64) {
    let mut ratio = 2f64.powf((note as i32 - BASE_NOTE) as f64 / 12.0);
    let mut octave = MIN_OCTAVE;
    while octave < MAX_OCTAVE && ratio > FOLD_THRESHOLD {
        ratio /= 2.0;
        octave += 1;
    }
    (octave, ratio)
}

/// Loudness compensation: pitched-up and higher samples sound louder, so
/// half of the volume is scaled down by the effective playback rate.
pub fn volume_for(velocity: u8, scale: VelocityScale, octave: u8, pitch: f64) -> f64 {
    let volume = velocity as f64 / scale.reference();
    let rate = pitch * 2f64.powi(octave as i32 - 4);
    let adjusted = volume / rate.sqrt();
    VOLUME_BLEND * volume + (1.0 - VOLUME_BLEND) * adjusted
}

pub fn catalog_key(instrument: &str, octave: u8, duration_ms: u32) -> String {
    format!("{}_C{}_{}ms", instrument, octave, duration_ms)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSound {
    pub key: String,
    pub descriptor: SoundDescriptor,
    pub volume: f32,
    pub pitch: f32,
    pub octave: u8,
}

impl ResolvedSound {
    pub fn into_event(self, position: Position) -> SoundEvent {
        SoundEvent {
            key: self.key,
            sound_index: self.descriptor.index,
            volume: self.volume,
            pitch: self.pitch,
            position,
        }
    }
}

/// Resolve a note against the catalog. Returns `None` when the catalog has
/// no sample for the computed key.
pub fn resolve(
    catalog: &dyn SoundCatalog,
    instrument: &str,
    note: u8,
    velocity: u8,
    scale: VelocityScale,
    duration_ms: u32,
) -> Option<ResolvedSound> {
    let (octave, pitch) = fold_pitch(note);
    let key = catalog_key(instrument, octave, quantize_duration(duration_ms));
    let Some(descriptor) = catalog.lookup(&key) else {
        log::debug!(target: "resolver", "no catalog entry for {}", key);
        return None;
    };
    Some(ResolvedSound {
        volume: volume_for(velocity, scale, octave, pitch) as f32,
        pitch: pitch as f32,
        octave,
        descriptor,
        key,
    })
}
