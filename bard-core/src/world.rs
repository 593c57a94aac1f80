//! Host world capabilities: spatial lookups and item metadata.

use std::collections::BTreeMap;

use bard_types::{ListenerId, Position};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub const PROGRESS_FIELD: &str = "MelodyProgress";
pub const MIDI_MODE_FIELD: &str = "MidiModeState";
pub const SEATED_FIELD: &str = "SittingOnChair";

/// An entity returned by a spatial query. `listener` is set for players.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityRef {
    pub id: u64,
    pub position: Position,
    pub listener: Option<ListenerId>,
}

pub trait SpatialQuery {
    /// Entities within `radius` of `center`.
    fn find_nearby(&self, center: Position, radius: f64) -> Vec<EntityRef>;
}

/// Players within `radius` of `center`.
pub fn listeners_near(spatial: &dyn SpatialQuery, center: Position, radius: f64) -> Vec<ListenerId> {
    let radius_sq = radius * radius;
    spatial
        .find_nearby(center, radius)
        .into_iter()
        .filter(|e| e.position.distance_sq(&center) <= radius_sq)
        .filter_map(|e| e.listener)
        .collect()
}

/// A held item carrying typed metadata fields. Updates produce a new item.
pub trait ItemMetadata: Clone {
    fn item_id(&self) -> &str;
    fn raw_field(&self, field: &str) -> Option<&Value>;
    fn with_raw_field(&self, field: &str, value: Value) -> Self;

    /// Read a field, falling back to the default when it is missing or malformed.
    fn get_or_default<T: DeserializeOwned + Default>(&self, field: &str) -> T {
        match self.raw_field(field) {
            Some(value) => T::deserialize(value).unwrap_or_else(|e| {
                log::debug!(target: "world", "malformed {} on {}: {}", field, self.item_id(), e);
                T::default()
            }),
            None => T::default(),
        }
    }

    fn with_field<T: Serialize>(&self, field: &str, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(v) => self.with_raw_field(field, v),
            Err(e) => {
                log::warn!(target: "world", "could not encode {}: {}", field, e);
                self.clone()
            }
        }
    }
}

/// Plain item stack with JSON-valued metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, serde::Deserialize)]
pub struct ItemStack {
    pub id: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ItemStack {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata: BTreeMap::new(),
        }
    }
}

impl ItemMetadata for ItemStack {
    fn item_id(&self) -> &str {
        &self.id
    }

    fn raw_field(&self, field: &str) -> Option<&Value> {
        self.metadata.get(field)
    }

    fn with_raw_field(&self, field: &str, value: Value) -> Self {
        let mut next = self.clone();
        next.metadata.insert(field.to_string(), value);
        next
    }
}
