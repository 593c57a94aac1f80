//! Shared timelines for players performing the same melody.
//!
//! Each melody id maps to a slot holding its sessions. A session is one
//! timeline (an anchor world time) and the players currently following it.
//! Every mutation for a melody happens under that melody's slot lock, so
//! distinct melodies never contend. A slot whose last session disappears is
//! retired and unlinked; anyone who raced onto a retired slot retries against
//! a fresh one.

use std::collections::HashMap;
use std::sync::Arc;

use bard_types::{ListenerId, Position};
use parking_lot::{Mutex, RwLock};

#[derive(Debug, Clone, PartialEq)]
pub struct ActivePosition {
    pub player: ListenerId,
    pub position: Position,
    pub last_seen_ms: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncSession {
    pub melody_id: String,
    pub anchor_ms: i64,
    pub positions: Vec<ActivePosition>,
}

impl SyncSession {
    fn new(melody_id: &str, anchor_ms: i64, first: ActivePosition) -> Self {
        Self {
            melody_id: melody_id.to_string(),
            anchor_ms,
            positions: vec![first],
        }
    }

    /// Squared distance from `position` to the nearest other player.
    fn nearest_sq(&self, player: ListenerId, position: &Position) -> Option<f64> {
        self.positions
            .iter()
            .filter(|p| p.player != player)
            .map(|p| p.position.distance_sq(position))
            .min_by(f64::total_cmp)
    }
}

#[derive(Default)]
struct MelodySlot {
    retired: bool,
    sessions: Vec<SyncSession>,
}

pub struct SyncRegistry {
    slots: RwLock<HashMap<String, Arc<Mutex<MelodySlot>>>>,
    stale_ms: i64,
    range_sq: f64,
}

impl SyncRegistry {
    pub fn new(stale_ms: u64, sync_range: f64) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            stale_ms: stale_ms as i64,
            range_sq: sync_range * sync_range,
        }
    }

    fn slot(&self, melody_id: &str, create: bool) -> Option<Arc<Mutex<MelodySlot>>> {
        if let Some(slot) = self.slots.read().get(melody_id) {
            return Some(slot.clone());
        }
        if !create {
            return None;
        }
        let mut slots = self.slots.write();
        Some(slots.entry(melody_id.to_string()).or_default().clone())
    }

    fn unlink(&self, melody_id: &str, slot: &Arc<Mutex<MelodySlot>>) {
        let mut slots = self.slots.write();
        if slots.get(melody_id).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            slots.remove(melody_id);
        }
    }

    /// Run `f` on the melody's sessions atomically. Returns `None` only when
    /// `create` is false and the melody has no slot.
    fn with_sessions<R>(
        &self,
        melody_id: &str,
        create: bool,
        mut f: impl FnMut(&mut Vec<SyncSession>) -> R,
    ) -> Option<R> {
        loop {
            let slot = self.slot(melody_id, create)?;
            let mut state = slot.lock();
            if state.retired {
                drop(state);
                self.unlink(melody_id, &slot);
                continue;
            }
            let out = f(&mut state.sessions);
            if state.sessions.is_empty() {
                state.retired = true;
                drop(state);
                self.unlink(melody_id, &slot);
            }
            return Some(out);
        }
    }

    fn prune(&self, sessions: &mut Vec<SyncSession>, now_ms: i64) {
        for session in sessions.iter_mut() {
            session
                .positions
                .retain(|p| now_ms - p.last_seen_ms <= self.stale_ms);
        }
        sessions.retain(|s| !s.positions.is_empty());
    }

    /// Anchor for a player starting `melody_id` at `now_ms`: the timeline of
    /// the nearest running session within range, or a new one starting now.
    pub fn get_or_create_anchor(
        &self,
        player: ListenerId,
        melody_id: &str,
        position: Position,
        now_ms: i64,
        melody_duration_ms: u32,
    ) -> i64 {
        let range_sq = self.range_sq;
        let entry = ActivePosition {
            player,
            position,
            last_seen_ms: now_ms,
        };
        self.with_sessions(melody_id, true, |sessions| {
            self.prune(sessions, now_ms);

            let best = sessions
                .iter()
                .enumerate()
                .filter(|(_, s)| now_ms - s.anchor_ms <= melody_duration_ms as i64)
                .filter_map(|(i, s)| s.nearest_sq(player, &position).map(|d| (i, d)))
                .filter(|&(_, d)| d <= range_sq)
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _)| i);

            for session in sessions.iter_mut() {
                session.positions.retain(|p| p.player != player);
            }

            let anchor = match best {
                Some(i) => {
                    sessions[i].positions.push(entry.clone());
                    sessions[i].anchor_ms
                }
                None => {
                    sessions.push(SyncSession::new(melody_id, now_ms, entry.clone()));
                    now_ms
                }
            };
            sessions.retain(|s| !s.positions.is_empty());
            log::debug!(target: "sync", "{} joins {} at anchor {}", player, melody_id, anchor);
            anchor
        })
        .unwrap_or(now_ms)
    }

    /// Refresh the player's entry in the session anchored at `start_ms`,
    /// recreating that session if it was pruned.
    pub fn keep_alive(
        &self,
        player: ListenerId,
        melody_id: &str,
        start_ms: i64,
        position: Position,
        now_ms: i64,
    ) {
        let entry = ActivePosition {
            player,
            position,
            last_seen_ms: now_ms,
        };
        self.with_sessions(melody_id, true, |sessions| {
            for session in sessions.iter_mut() {
                session.positions.retain(|p| p.player != player);
            }
            match sessions.iter_mut().find(|s| s.anchor_ms == start_ms) {
                Some(session) => session.positions.push(entry.clone()),
                None => sessions.push(SyncSession::new(melody_id, start_ms, entry.clone())),
            }
            self.prune(sessions, now_ms);
        });
    }

    pub fn remove_player(&self, player: ListenerId, melody_id: &str) {
        self.with_sessions(melody_id, false, |sessions| {
            for session in sessions.iter_mut() {
                session.positions.retain(|p| p.player != player);
            }
            sessions.retain(|s| !s.positions.is_empty());
        });
    }

    pub fn session_count(&self, melody_id: &str) -> usize {
        self.sessions(melody_id).len()
    }

    pub fn anchors(&self, melody_id: &str) -> Vec<i64> {
        self.sessions(melody_id).iter().map(|s| s.anchor_ms).collect()
    }

    pub fn sessions(&self, melody_id: &str) -> Vec<SyncSession> {
        match self.slot(melody_id, false) {
            Some(slot) => slot.lock().sessions.clone(),
            None => Vec::new(),
        }
    }

    pub fn melody_count(&self) -> usize {
        self.slots.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: u64) -> ListenerId {
        ListenerId::new(id)
    }

    fn at(x: f64) -> Position {
        Position::new(x, 0.0, 0.0)
    }

    #[test]
    fn lone_player_anchors_now() {
        let reg = SyncRegistry::new(500, 40.0);
        assert_eq!(reg.get_or_create_anchor(p(1), "tune", at(0.0), 1_000, 10_000), 1_000);
        assert_eq!(reg.session_count("tune"), 1);
    }

    #[test]
    fn player_switching_sessions_leaves_the_old_one() {
        let reg = SyncRegistry::new(500, 40.0);
        reg.get_or_create_anchor(p(1), "tune", at(0.0), 1_000, 10_000);
        reg.get_or_create_anchor(p(2), "tune", at(500.0), 1_100, 10_000);
        assert_eq!(reg.session_count("tune"), 2);
        // Player 2 walks over to player 1 and restarts.
        let anchor = reg.get_or_create_anchor(p(2), "tune", at(10.0), 1_200, 10_000);
        assert_eq!(anchor, 1_000);
        assert_eq!(reg.session_count("tune"), 1);
    }

    #[test]
    fn keep_alive_recreates_pruned_session() {
        let reg = SyncRegistry::new(500, 40.0);
        let anchor = reg.get_or_create_anchor(p(1), "tune", at(0.0), 0, 10_000);
        reg.remove_player(p(1), "tune");
        assert_eq!(reg.melody_count(), 0);
        reg.keep_alive(p(1), "tune", anchor, at(0.0), 300);
        assert_eq!(reg.anchors("tune"), vec![0]);
    }

    #[test]
    fn remove_player_on_unknown_melody_is_noop() {
        let reg = SyncRegistry::new(500, 40.0);
        reg.remove_player(p(1), "nothing");
        assert_eq!(reg.melody_count(), 0);
    }

    #[test]
    fn melodies_are_independent() {
        let reg = SyncRegistry::new(500, 40.0);
        reg.get_or_create_anchor(p(1), "a", at(0.0), 0, 10_000);
        let b = reg.get_or_create_anchor(p(2), "b", at(1.0), 50, 10_000);
        assert_eq!(b, 50);
        assert_eq!(reg.melody_count(), 2);
    }
}
