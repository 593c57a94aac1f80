use bard_types::{ListenerId, Position};

use crate::world::SpatialQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatSource {
    /// Only the flag persisted on the item says so.
    Stored,
    /// Confirmed by the world this tick.
    Spatial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seating {
    Seated(SeatSource),
    Standing,
}

impl Seating {
    /// A live spatial signal always wins; the stored flag is used only when
    /// there is none.
    pub fn resolve(stored: bool, spatial: Option<bool>) -> Self {
        match spatial {
            Some(true) => Seating::Seated(SeatSource::Spatial),
            Some(false) => Seating::Standing,
            None if stored => Seating::Seated(SeatSource::Stored),
            None => Seating::Standing,
        }
    }

    pub fn is_seated(self) -> bool {
        matches!(self, Seating::Seated(_))
    }
}

/// Whether something other than the listener (a chair, a bench) is close
/// enough to sit on.
pub fn near_seat(
    spatial: &dyn SpatialQuery,
    listener: ListenerId,
    position: Position,
    distance_sq: f64,
) -> bool {
    spatial
        .find_nearby(position, distance_sq.sqrt())
        .iter()
        .any(|e| e.listener != Some(listener) && e.position.distance_sq(&position) < distance_sq)
}
