use std::collections::HashMap;

use bard_types::SoundDescriptor;

use crate::resolver::{catalog_key, DURATIONS_MS, MAX_OCTAVE, MIN_OCTAVE};

/// Lookup of pre-rendered sounds by catalog key.
pub trait SoundCatalog: Send + Sync {
    fn lookup(&self, key: &str) -> Option<SoundDescriptor>;
}

/// Catalog backed by a map. Indices are assigned in registration order.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalog {
    sounds: HashMap<String, SoundDescriptor>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: impl Into<String>, max_distance: f64) -> SoundDescriptor {
        let key = key.into();
        if let Some(existing) = self.sounds.get(&key) {
            return *existing;
        }
        let descriptor = SoundDescriptor {
            index: self.sounds.len() as u32,
            max_distance,
        };
        self.sounds.insert(key, descriptor);
        descriptor
    }

    /// Register every octave and duration for an instrument.
    pub fn register_instrument(&mut self, instrument: &str, max_distance: f64) {
        for octave in MIN_OCTAVE..=MAX_OCTAVE {
            for &duration in &DURATIONS_MS {
                self.register(catalog_key(instrument, octave, duration), max_distance);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty()
    }
}

impl SoundCatalog for InMemoryCatalog {
    fn lookup(&self, key: &str) -> Option<SoundDescriptor> {
        self.sounds.get(key).copied()
    }
}
