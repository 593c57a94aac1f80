#![allow(dead_code)]
//! Test harness utilities for bard-core integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bard_core::broadcast::AudioBroadcast;
use bard_core::catalog::InMemoryCatalog;
use bard_core::config::EngineSettings;
use bard_core::error::InputError;
use bard_core::library::InMemoryLibrary;
use bard_core::midi::{MidiPortInfo, NoteCallback, NoteInput};
use bard_core::performer::{Performer, Services, TickContext};
use bard_core::queue::LiveNote;
use bard_core::timer::TickTimer;
use bard_core::world::{EntityRef, ItemStack, SpatialQuery};
use bard_types::{ListenerId, Melody, Note, Position, SoundEvent, Track};
use parking_lot::{Mutex, RwLock};

pub const PIANO: &str = "Ymmersive_Melodies_Piano";

pub fn at(x: f64) -> Position {
    Position::new(x, 0.0, 0.0)
}

pub fn id(n: u64) -> ListenerId {
    ListenerId::new(n)
}

/// Entity list with brute-force radius queries.
#[derive(Default)]
pub struct FakeWorld {
    entities: RwLock<Vec<EntityRef>>,
}

impl FakeWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_player(&self, listener: ListenerId, position: Position) {
        self.entities.write().push(EntityRef {
            id: listener.get(),
            position,
            listener: Some(listener),
        });
    }

    pub fn add_prop(&self, entity_id: u64, position: Position) {
        self.entities.write().push(EntityRef {
            id: entity_id,
            position,
            listener: None,
        });
    }

    pub fn move_entity(&self, entity_id: u64, position: Position) {
        for e in self.entities.write().iter_mut() {
            if e.id == entity_id {
                e.position = position;
            }
        }
    }

    pub fn position_of(&self, entity_id: u64) -> Option<Position> {
        self.entities
            .read()
            .iter()
            .find(|e| e.id == entity_id)
            .map(|e| e.position)
    }
}

impl SpatialQuery for FakeWorld {
    fn find_nearby(&self, center: Position, radius: f64) -> Vec<EntityRef> {
        let radius_sq = radius * radius;
        self.entities
            .read()
            .iter()
            .filter(|e| e.position.distance_sq(&center) <= radius_sq)
            .copied()
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub event: SoundEvent,
    pub recipients: Vec<ListenerId>,
    pub delay_ms: u64,
}

/// Broadcaster that records every call.
#[derive(Default)]
pub struct RecordingBroadcast {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingBroadcast {
    pub fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }
}

impl AudioBroadcast for RecordingBroadcast {
    fn broadcast(&self, event: &SoundEvent, recipients: &[ListenerId], delay_ms: u64) {
        let mut recipients = recipients.to_vec();
        recipients.sort();
        self.sent.lock().push(Sent {
            event: event.clone(),
            recipients,
            delay_ms,
        });
    }
}

/// Input source driven by the test instead of a device.
#[derive(Default)]
pub struct FakeInput {
    listeners: RwLock<HashMap<ListenerId, NoteCallback>>,
    connected: AtomicBool,
}

impl FakeInput {
    pub fn press(&self, note: u8, velocity: u8) {
        let callbacks: Vec<NoteCallback> = self.listeners.read().values().cloned().collect();
        for cb in callbacks {
            cb(LiveNote { note, velocity });
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl NoteInput for FakeInput {
    fn devices(&self) -> Vec<MidiPortInfo> {
        vec![MidiPortInfo {
            index: 0,
            name: "Test Keys".into(),
        }]
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn connect(&self, index: usize) -> Result<(), InputError> {
        if index != 0 {
            return Err(InputError::InvalidPort {
                index,
                available: 1,
            });
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn register_listener(&self, listener: ListenerId, callback: NoteCallback) {
        self.listeners.write().insert(listener, callback);
    }

    fn unregister_listener(&self, listener: ListenerId) -> bool {
        self.listeners.write().remove(&listener).is_some()
    }

    fn has_listener(&self, listener: ListenerId) -> bool {
        self.listeners.read().contains_key(&listener)
    }
}

pub fn piano_catalog() -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new();
    catalog.register_instrument("Piano", 40.0);
    catalog
}

/// Melody of one track with a note at each start offset.
pub fn melody(name: &str, starts: &[u32], length_ms: u32) -> Melody {
    Melody::new(
        name,
        vec![Track::new(
            "lead",
            starts
                .iter()
                .map(|&s| Note::new(60, 64, s, length_ms))
                .collect(),
        )],
    )
}

pub struct Harness {
    pub performer: Performer,
    pub timer: Arc<TickTimer>,
    pub broadcast: Arc<RecordingBroadcast>,
    pub library: Arc<InMemoryLibrary>,
    pub input: Arc<FakeInput>,
    pub world: FakeWorld,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(EngineSettings::default())
    }

    pub fn with_settings(settings: EngineSettings) -> Self {
        let timer = Arc::new(TickTimer::new(0));
        let broadcast = Arc::new(RecordingBroadcast::default());
        let library = Arc::new(InMemoryLibrary::new());
        let input = Arc::new(FakeInput::default());
        let performer = Performer::new(
            settings,
            Services {
                catalog: Arc::new(piano_catalog()),
                broadcast: broadcast.clone(),
                library: library.clone(),
                timer: timer.clone(),
                input: Some(input.clone()),
            },
        );
        Self {
            performer,
            timer,
            broadcast,
            library,
            input,
            world: FakeWorld::new(),
        }
    }

    pub fn ctx(&self, listener: ListenerId, now_ms: i64, sitting: Option<bool>) -> TickContext<'_> {
        TickContext {
            listener,
            now_ms,
            position: self.world.position_of(listener.get()),
            sitting,
            spatial: &self.world,
        }
    }

    /// Advance the timer to `now_ms`, then tick the listener and store the result.
    pub fn tick(
        &self,
        item: &mut ItemStack,
        listener: ListenerId,
        now_ms: i64,
        sitting: Option<bool>,
    ) {
        self.timer.advance_to(now_ms as u64);
        if let Some(next) = self
            .performer
            .tick(Some(&*item), &self.ctx(listener, now_ms, sitting))
        {
            *item = next;
        }
    }
}

/// Linear congruential generator for reproducible randomized tests.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    pub fn below(&mut self, n: u64) -> u64 {
        self.next_u64() % n
    }
}
