//! Per-listener orchestration.
//!
//! The host calls [`Performer::tick`] once per simulation tick for every
//! listener holding an item. The performer reads the item's metadata, runs
//! either the live-input path or melody playback, and hands back the updated
//! item for the host to store.

use std::collections::HashMap;
use std::sync::Arc;

use bard_types::{
    BufferedNote, ListenerId, MelodyRef, MidiModeState, PlaybackProgress, Position, SeatedState,
};
use parking_lot::{Mutex, RwLock};

use crate::broadcast::AudioBroadcast;
use crate::catalog::SoundCatalog;
use crate::chord::{ChordBuffer, ChordContext};
use crate::config::{EndPolicy, EngineSettings};
use crate::error::InputError;
use crate::input::{
    keymap, near_seat, next_mode, ConsoleHandler, InputMode, InterceptorRegistry, ModeInputs,
    Seating, TextCapture, Transition,
};
use crate::library::MelodyLibrary;
use crate::midi::{MidiPortInfo, NoteInput};
use crate::playback::{emit_due_notes, ProgressScheduler};
use crate::queue::{LiveNote, NoteQueue};
use crate::sync::SyncRegistry;
use crate::timer::Schedule;
use crate::world::{
    listeners_near, ItemMetadata, SpatialQuery, MIDI_MODE_FIELD, PROGRESS_FIELD, SEATED_FIELD,
};

/// Host capabilities the performer depends on.
#[derive(Clone)]
pub struct Services {
    pub catalog: Arc<dyn SoundCatalog>,
    pub broadcast: Arc<dyn AudioBroadcast>,
    pub library: Arc<dyn MelodyLibrary>,
    pub timer: Arc<dyn Schedule>,
    pub input: Option<Arc<dyn NoteInput>>,
}

/// World view for one listener during one tick.
pub struct TickContext<'a> {
    pub listener: ListenerId,
    pub now_ms: i64,
    /// `None` when the listener's entity is gone; the tick is skipped.
    pub position: Option<Position>,
    /// Seated state reported by the host's movement system, if it has one.
    pub sitting: Option<bool>,
    pub spatial: &'a dyn SpatialQuery,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebugStatus {
    pub holds_instrument: bool,
    pub instrument: Option<String>,
    pub seated: bool,
    pub midi_mode_active: bool,
    pub intercepting: bool,
    pub device_connected: bool,
    pub devices: Vec<MidiPortInfo>,
    pub playing: Option<String>,
}

/// Outcome of feeding a text-capture update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureUpdate {
    pub notes: usize,
    /// The host should clear the capture field.
    pub clear_field: bool,
}

pub struct Performer {
    settings: EngineSettings,
    catalog: Arc<dyn SoundCatalog>,
    broadcast: Arc<dyn AudioBroadcast>,
    library: Arc<dyn MelodyLibrary>,
    input: Option<Arc<dyn NoteInput>>,
    queue: Arc<NoteQueue>,
    chords: ChordBuffer,
    sync: Arc<SyncRegistry>,
    interceptors: Arc<InterceptorRegistry>,
    scheduler: ProgressScheduler,
    console: RwLock<Option<ConsoleHandler>>,
    captures: Mutex<HashMap<ListenerId, TextCapture>>,
}

impl Performer {
    pub fn new(settings: EngineSettings, services: Services) -> Self {
        let chords = ChordBuffer::new(
            services.catalog.clone(),
            services.broadcast.clone(),
            services.timer.clone(),
            settings.chord_window_ms,
            settings.live_note_duration_ms,
        );
        Self {
            sync: Arc::new(SyncRegistry::new(
                settings.stale_threshold_ms,
                settings.sync_range,
            )),
            scheduler: ProgressScheduler::new(settings.playback_buffer_ms),
            catalog: services.catalog,
            broadcast: services.broadcast,
            library: services.library,
            input: services.input,
            queue: Arc::new(NoteQueue::new()),
            interceptors: Arc::new(InterceptorRegistry::new()),
            console: RwLock::new(None),
            captures: Mutex::new(HashMap::new()),
            chords,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn queue(&self) -> &Arc<NoteQueue> {
        &self.queue
    }

    pub fn sync(&self) -> &Arc<SyncRegistry> {
        &self.sync
    }

    pub fn interceptors(&self) -> &Arc<InterceptorRegistry> {
        &self.interceptors
    }

    pub fn chords(&self) -> &ChordBuffer {
        &self.chords
    }

    /// Handler invoked when an instrument holder presses the console key.
    pub fn set_debug_console(&self, handler: ConsoleHandler) {
        *self.console.write() = Some(handler);
    }

    pub fn handle_key_press(&self, listener: ListenerId, key: u16) -> bool {
        self.interceptors.handle_key_press(listener, key)
    }

    pub fn select_device(&self, index: usize) -> Result<(), InputError> {
        self.input
            .as_ref()
            .ok_or(InputError::Unavailable)?
            .connect(index)
    }

    /// Advance one listener by one tick. Returns the item to store, or `None`
    /// when nothing changed.
    pub fn tick<I: ItemMetadata>(&self, item: Option<&I>, ctx: &TickContext<'_>) -> Option<I> {
        let listener = ctx.listener;
        let position = ctx.position?;

        let instrument = item.and_then(|i| self.settings.instrument_for_item(i.item_id()));
        let (Some(item), Some(instrument)) = (item, instrument) else {
            if self.queue.is_registered(listener) {
                log::debug!(target: "performer", "{} put away their instrument", listener);
                self.teardown_live(listener);
            }
            self.interceptors.unregister_debug_console_handler(listener);
            return None;
        };

        self.ensure_console(listener);
        let mut next = item.clone();

        let stored: SeatedState = item.get_or_default(SEATED_FIELD);
        // The chair check always runs when the host has no movement flag, so a
        // listener who walked away reads as standing.
        let spatial_signal = Some(ctx.sitting.unwrap_or_else(|| {
            near_seat(ctx.spatial, listener, position, self.settings.seat_distance_sq)
        }));
        let seated = Seating::resolve(stored.sitting, spatial_signal).is_seated();
        if seated != stored.sitting {
            next = next.with_field(SEATED_FIELD, &SeatedState { sitting: seated });
        }

        let state: MidiModeState = item.get_or_default(MIDI_MODE_FIELD);
        let inputs = ModeInputs {
            holds_instrument: true,
            seated,
            capture_open: self.captures.lock().contains_key(&listener),
            require_capture: self.settings.require_capture_surface,
        };
        let (mode, transition) = next_mode(InputMode::from_active(state.active), inputs);
        match transition {
            Transition::Enter => {
                self.activate(listener);
                next = next.with_field(MIDI_MODE_FIELD, &MidiModeState { active: true });
            }
            Transition::Leave => {
                self.teardown_live(listener);
                next = next.with_field(MIDI_MODE_FIELD, &MidiModeState { active: false });
            }
            Transition::Stay => {
                // Persisted as active but not wired up, e.g. after a restart.
                if mode.is_active() && !self.is_wired(listener) {
                    self.activate(listener);
                }
            }
        }

        if mode.is_active() {
            self.drain_live(listener, instrument, position, ctx.spatial);
            return Some(next);
        }
        Some(self.advance_melody(next, instrument, position, ctx))
    }

    fn advance_melody<I: ItemMetadata>(
        &self,
        item: I,
        instrument: &str,
        position: Position,
        ctx: &TickContext<'_>,
    ) -> I {
        let listener = ctx.listener;
        let mut progress: PlaybackProgress = item.get_or_default(PROGRESS_FIELD);
        let Some(melody_ref) = progress.melody_ref() else {
            return item;
        };
        let Some(melody) = self.library.resolve(&melody_ref) else {
            log::debug!(target: "performer", "unknown melody {}", melody_ref);
            return item;
        };

        let before = progress.cursor_ms;
        let due = self.scheduler.advance(&mut progress, ctx.now_ms, &melody);
        if progress.cursor_ms == before {
            return item;
        }
        emit_due_notes(
            &due,
            instrument,
            position,
            self.catalog.as_ref(),
            ctx.spatial,
            self.broadcast.as_ref(),
        );

        if ProgressScheduler::finished(&progress, &melody) {
            self.sync.remove_player(listener, &progress.melody);
            progress = match self.settings.end_policy {
                EndPolicy::Loop => {
                    let anchor = self.sync.get_or_create_anchor(
                        listener,
                        &progress.melody,
                        position,
                        ctx.now_ms,
                        melody.length_ms(),
                    );
                    PlaybackProgress::anchored(&melody_ref, anchor, ctx.now_ms)
                }
                EndPolicy::Stop => {
                    log::info!(target: "performer", "{} finished {}", listener, melody_ref);
                    PlaybackProgress::default()
                }
            };
        } else {
            self.sync.keep_alive(
                listener,
                &progress.melody,
                progress.session_start_ms,
                position,
                ctx.now_ms,
            );
        }
        item.with_field(PROGRESS_FIELD, &progress)
    }

    /// Begin playing a melody, joining a nearby performance of it if one is
    /// running. Returns `None` when the melody is unknown.
    pub fn start_melody<I: ItemMetadata>(
        &self,
        item: &I,
        listener: ListenerId,
        melody_ref: &MelodyRef,
        position: Position,
        now_ms: i64,
    ) -> Option<I> {
        let Some(melody) = self.library.resolve(melody_ref) else {
            log::warn!(target: "performer", "cannot start unknown melody {}", melody_ref);
            return None;
        };
        let melody_id = melody_ref.to_string();
        let previous: PlaybackProgress = item.get_or_default(PROGRESS_FIELD);
        if !previous.is_idle() && previous.melody != melody_id {
            self.sync.remove_player(listener, &previous.melody);
        }
        let anchor = self.sync.get_or_create_anchor(
            listener,
            &melody_id,
            position,
            now_ms,
            melody.length_ms(),
        );
        let progress = PlaybackProgress::anchored(melody_ref, anchor, now_ms);
        log::info!(
            target: "performer",
            "{} starts {} at {} ms",
            listener,
            melody_id,
            progress.cursor_ms
        );
        Some(item.with_field(PROGRESS_FIELD, &progress))
    }

    pub fn stop_melody<I: ItemMetadata>(&self, item: &I, listener: ListenerId) -> I {
        let progress: PlaybackProgress = item.get_or_default(PROGRESS_FIELD);
        if progress.is_idle() {
            return item.clone();
        }
        self.sync.remove_player(listener, &progress.melody);
        item.with_field(PROGRESS_FIELD, &PlaybackProgress::default())
    }

    pub fn open_capture(&self, listener: ListenerId) {
        self.captures.lock().entry(listener).or_default();
    }

    pub fn close_capture(&self, listener: ListenerId) -> bool {
        self.captures.lock().remove(&listener).is_some()
    }

    /// Feed the current contents of a listener's capture field. New characters
    /// are played through the chord buffer.
    pub fn capture_text<I: ItemMetadata>(
        &self,
        item: &I,
        ctx: &TickContext<'_>,
        text: &str,
    ) -> CaptureUpdate {
        let listener = ctx.listener;
        let (notes, clear_field) = match self.captures.lock().get_mut(&listener) {
            Some(capture) => capture.update(text),
            None => return CaptureUpdate::default(),
        };
        let (Some(position), Some(instrument)) = (
            ctx.position,
            self.settings.instrument_for_item(item.item_id()),
        ) else {
            return CaptureUpdate {
                notes: 0,
                clear_field,
            };
        };
        for &note in &notes {
            self.chords.buffer_note(
                listener,
                BufferedNote {
                    instrument: instrument.to_string(),
                    note,
                    velocity: self.settings.live_velocity,
                },
                || self.capture_context(position, ctx.spatial),
            );
        }
        CaptureUpdate {
            notes: notes.len(),
            clear_field,
        }
    }

    /// Release everything held for a listener. Safe to call repeatedly.
    pub fn disconnect<I: ItemMetadata>(&self, listener: ListenerId, item: Option<&I>) {
        self.teardown_live(listener);
        self.interceptors.remove(listener);
        self.captures.lock().remove(&listener);
        if let Some(item) = item {
            let progress: PlaybackProgress = item.get_or_default(PROGRESS_FIELD);
            if !progress.is_idle() {
                self.sync.remove_player(listener, &progress.melody);
            }
        }
    }

    pub fn debug_status<I: ItemMetadata>(
        &self,
        listener: ListenerId,
        item: Option<&I>,
    ) -> DebugStatus {
        let instrument = item
            .and_then(|i| self.settings.instrument_for_item(i.item_id()))
            .map(str::to_string);
        let seated = item.is_some_and(|i| i.get_or_default::<SeatedState>(SEATED_FIELD).sitting);
        let midi_mode_active =
            item.is_some_and(|i| i.get_or_default::<MidiModeState>(MIDI_MODE_FIELD).active);
        let playing = item
            .map(|i| i.get_or_default::<PlaybackProgress>(PROGRESS_FIELD))
            .filter(|p| !p.is_idle())
            .map(|p| p.melody);
        DebugStatus {
            holds_instrument: instrument.is_some(),
            instrument,
            seated,
            midi_mode_active,
            intercepting: self.interceptors.is_intercepting(listener),
            device_connected: self.input.as_ref().is_some_and(|i| i.is_connected()),
            devices: self
                .input
                .as_ref()
                .map(|i| i.devices())
                .unwrap_or_default(),
            playing,
        }
    }

    fn ensure_console(&self, listener: ListenerId) {
        if self.interceptors.has_debug_console_handler(listener) {
            return;
        }
        if let Some(handler) = self.console.read().clone() {
            self.interceptors
                .register_debug_console_handler(listener, handler);
        }
    }

    fn activate(&self, listener: ListenerId) {
        let sender = self.queue.register(listener);
        let velocity = self.settings.live_velocity;

        let key_sender = sender.clone();
        self.interceptors.enable_interception(
            listener,
            Arc::new(move |key: u16| {
                if let Some(note) = keymap::note_for_key(key) {
                    key_sender.send(LiveNote { note, velocity });
                }
            }),
        );
        if let Some(input) = &self.input {
            input.register_listener(
                listener,
                Arc::new(move |note: LiveNote| {
                    sender.send(note);
                }),
            );
        }
        log::info!(target: "performer", "{} entered live input", listener);
    }

    fn is_wired(&self, listener: ListenerId) -> bool {
        self.queue.is_registered(listener)
            && self.interceptors.is_intercepting(listener)
            && self
                .input
                .as_ref()
                .map_or(true, |input| input.has_listener(listener))
    }

    fn teardown_live(&self, listener: ListenerId) {
        let was_live = self.queue.remove(listener);
        self.interceptors.disable_interception(listener);
        if let Some(input) = &self.input {
            input.unregister_listener(listener);
        }
        self.chords.clear(listener);
        if was_live {
            log::info!(target: "performer", "{} left live input", listener);
        }
    }

    fn drain_live(
        &self,
        listener: ListenerId,
        instrument: &str,
        position: Position,
        spatial: &dyn SpatialQuery,
    ) {
        for note in self.queue.drain_all(listener) {
            self.chords.buffer_note(
                listener,
                BufferedNote {
                    instrument: instrument.to_string(),
                    note: note.note,
                    velocity: note.velocity,
                },
                || self.capture_context(position, spatial),
            );
        }
    }

    fn capture_context(&self, position: Position, spatial: &dyn SpatialQuery) -> ChordContext {
        ChordContext {
            position,
            recipients: listeners_near(spatial, position, self.settings.capture_radius).into(),
        }
    }
}
