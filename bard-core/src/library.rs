//! Melody storage: bundled assets plus per-world entries keyed by owner.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use bard_types::{Melody, MelodyRef};
use parking_lot::RwLock;

use crate::error::MelodyError;

pub trait MelodyLibrary: Send + Sync {
    fn resolve(&self, melody: &MelodyRef) -> Option<Arc<Melody>>;
}

pub fn parse_melody(json: &str) -> Result<Melody, MelodyError> {
    Ok(serde_json::from_str(json)?)
}

pub fn load_melody(path: &Path) -> Result<Melody, MelodyError> {
    let contents = std::fs::read_to_string(path).map_err(|source| MelodyError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let melody = parse_melody(&contents)?;
    if melody.note_count() == 0 {
        return Err(MelodyError::Empty(path.display().to_string()));
    }
    Ok(melody)
}

#[derive(Default)]
pub struct InMemoryLibrary {
    assets: RwLock<HashMap<String, Arc<Melody>>>,
    world: RwLock<HashMap<(String, String), Arc<Melody>>>,
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_asset(&self, key: impl Into<String>, melody: Melody) -> MelodyRef {
        let key = key.into();
        self.assets.write().insert(key.clone(), Arc::new(melody));
        MelodyRef::Asset(key)
    }

    pub fn insert_world(
        &self,
        owner: impl Into<String>,
        key: impl Into<String>,
        melody: Melody,
    ) -> MelodyRef {
        let (owner, key) = (owner.into(), key.into());
        self.world
            .write()
            .insert((owner.clone(), key.clone()), Arc::new(melody));
        MelodyRef::World { owner, key }
    }

    /// Load a melody file as an asset keyed by its file stem.
    pub fn load_asset_file(&self, path: &Path) -> Result<MelodyRef, MelodyError> {
        let melody = load_melody(path)?;
        let key = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| melody.name.clone());
        log::info!(target: "library", "loaded {} ({} notes)", key, melody.note_count());
        Ok(self.insert_asset(key, melody))
    }

    /// Load every `*.json` file in a directory. Malformed files are skipped.
    pub fn load_dir(&self, dir: &Path) -> Result<usize, MelodyError> {
        let entries = std::fs::read_dir(dir).map_err(|source| MelodyError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut loaded = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.load_asset_file(&path) {
                Ok(_) => loaded += 1,
                Err(e) => log::warn!(target: "library", "skipping {}: {}", path.display(), e),
            }
        }
        Ok(loaded)
    }

    pub fn remove(&self, melody: &MelodyRef) -> bool {
        match melody {
            MelodyRef::Asset(key) => self.assets.write().remove(key).is_some(),
            MelodyRef::World { owner, key } => self
                .world
                .write()
                .remove(&(owner.clone(), key.clone()))
                .is_some(),
        }
    }
}

impl MelodyLibrary for InMemoryLibrary {
    fn resolve(&self, melody: &MelodyRef) -> Option<Arc<Melody>> {
        match melody {
            MelodyRef::Asset(key) => self.assets.read().get(key).cloned(),
            MelodyRef::World { owner, key } => self
                .world
                .read()
                .get(&(owner.clone(), key.clone()))
                .cloned(),
        }
    }
}
