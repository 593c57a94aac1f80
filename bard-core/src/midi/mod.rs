//! MIDI device input.
//!
//! One connection is shared by every performer on this host. Note-ons arrive
//! on the backend's thread and are fanned out to registered listener
//! callbacks; callbacks only push into their listener's note queue.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bard_types::ListenerId;
use midir::{MidiInput, MidiInputConnection};
use parking_lot::{Mutex, RwLock};

use crate::error::InputError;
use crate::queue::LiveNote;

const CLIENT_NAME: &str = "bard";

pub type NoteCallback = Arc<dyn Fn(LiveNote) + Send + Sync>;

/// Information about an available MIDI port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiPortInfo {
    pub index: usize,
    pub name: String,
}

/// A source of live note-ons shared between listeners.
pub trait NoteInput: Send + Sync {
    fn devices(&self) -> Vec<MidiPortInfo>;
    fn is_connected(&self) -> bool;
    fn connect(&self, index: usize) -> Result<(), InputError>;
    fn disconnect(&self);
    fn register_listener(&self, listener: ListenerId, callback: NoteCallback);
    fn unregister_listener(&self, listener: ListenerId) -> bool;
    fn has_listener(&self, listener: ListenerId) -> bool;
}

type ListenerMap = RwLock<HashMap<ListenerId, NoteCallback>>;

struct ActiveConnection {
    connection: MidiInputConnection<()>,
    port_name: String,
}

#[derive(Default)]
pub struct MidiInputService {
    active: Mutex<Option<ActiveConnection>>,
    listeners: Arc<ListenerMap>,
    warned: AtomicBool,
}

impl MidiInputService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enumerate_devices() -> Result<Vec<MidiPortInfo>, InputError> {
        let midi_in =
            MidiInput::new(CLIENT_NAME).map_err(|e| InputError::Backend(e.to_string()))?;
        Ok(midi_in
            .ports()
            .iter()
            .enumerate()
            .filter_map(|(index, port)| {
                midi_in
                    .port_name(port)
                    .ok()
                    .map(|name| MidiPortInfo { index, name })
            })
            .collect())
    }

    /// Connect to `device_index` unless already connected. Failure is logged
    /// once; live MIDI is then unavailable but keyboard input still works.
    pub fn initialize(&self, device_index: usize) -> bool {
        if self.is_connected() {
            return true;
        }
        match self.connect(device_index) {
            Ok(()) => true,
            Err(e) => {
                if !self.warned.swap(true, Ordering::Relaxed) {
                    log::warn!(target: "midi", "live MIDI unavailable: {}", e);
                }
                false
            }
        }
    }

    pub fn connected_port_name(&self) -> Option<String> {
        self.active.lock().as_ref().map(|a| a.port_name.clone())
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Close the device and forget every listener.
    pub fn shutdown(&self) {
        self.disconnect();
        self.listeners.write().clear();
    }
}

impl NoteInput for MidiInputService {
    fn devices(&self) -> Vec<MidiPortInfo> {
        Self::enumerate_devices().unwrap_or_else(|e| {
            log::debug!(target: "midi", "cannot list devices: {}", e);
            Vec::new()
        })
    }

    fn is_connected(&self) -> bool {
        self.active.lock().is_some()
    }

    fn connect(&self, index: usize) -> Result<(), InputError> {
        self.disconnect();

        let midi_in =
            MidiInput::new(CLIENT_NAME).map_err(|e| InputError::Backend(e.to_string()))?;
        let ports = midi_in.ports();
        if ports.is_empty() {
            return Err(InputError::NoDevices);
        }
        let port = ports.get(index).ok_or(InputError::InvalidPort {
            index,
            available: ports.len(),
        })?;
        let port_name = midi_in
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let listeners = self.listeners.clone();
        let connection = midi_in
            .connect(
                port,
                "bard-input",
                move |_timestamp, message, _| {
                    if let Some(note) = parse_note_on(message) {
                        dispatch_note(&listeners, note);
                    }
                },
                (),
            )
            .map_err(|e| InputError::Connect {
                port: port_name.clone(),
                reason: e.to_string(),
            })?;

        log::info!(target: "midi", "connected to {}", port_name);
        *self.active.lock() = Some(ActiveConnection {
            connection,
            port_name,
        });
        Ok(())
    }

    fn disconnect(&self) {
        if let Some(active) = self.active.lock().take() {
            active.connection.close();
            log::info!(target: "midi", "disconnected from {}", active.port_name);
        }
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

impl Drop for MidiInputService {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Deliver a note to every listener. Callbacks run outside the lock; a
/// panicking callback is logged and skipped.
pub(crate) fn dispatch_note(listeners: &ListenerMap, note: LiveNote) -> usize {
    let callbacks: Vec<(ListenerId, NoteCallback)> = listeners
        .read()
        .iter()
        .map(|(id, cb)| (*id, cb.clone()))
        .collect();
    let mut delivered = 0;
    for (id, callback) in callbacks {
        if catch_unwind(AssertUnwindSafe(|| callback(note))).is_ok() {
            delivered += 1;
        } else {
            log::error!(target: "midi", "note listener {} panicked", id);
        }
    }
    delivered
}

/// Note-on with non-zero velocity; everything else is ignored.
pub fn parse_note_on(data: &[u8]) -> Option<LiveNote> {
    match data {
        [status, note, velocity, ..] if status & 0xF0 == 0x90 && *velocity > 0 => {
            Some(LiveNote {
                note: *note & 0x7F,
                velocity: *velocity & 0x7F,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_on() {
        let note = parse_note_on(&[0x93, 60, 100]).unwrap();
        assert_eq!(note.note, 60);
        assert_eq!(note.velocity, 100);
    }

    #[test]
    fn test_velocity_zero_and_note_off_are_ignored() {
        assert!(parse_note_on(&[0x90, 60, 0]).is_none());
        assert!(parse_note_on(&[0x80, 60, 64]).is_none());
    }

    #[test]
    fn test_other_messages_are_ignored() {
        assert!(parse_note_on(&[]).is_none());
        assert!(parse_note_on(&[0x90, 60]).is_none());
        assert!(parse_note_on(&[0xB0, 1, 64]).is_none());
        assert!(parse_note_on(&[0xE0, 0x00, 0x40]).is_none());
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let listeners: ListenerMap = RwLock::new(HashMap::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        listeners
            .write()
            .insert(ListenerId::new(1), Arc::new(|_: LiveNote| panic!("listener bug")));
        listeners.write().insert(
            ListenerId::new(2),
            Arc::new(move |n: LiveNote| s.lock().push(n.note)),
        );
        let delivered = dispatch_note(
            &listeners,
            LiveNote {
                note: 64,
                velocity: 90,
            },
        );
        assert_eq!(delivered, 1);
        assert_eq!(*seen.lock(), vec![64]);
    }

    #[test]
    fn test_register_and_unregister() {
        let service = MidiInputService::new();
        service.register_listener(ListenerId::new(5), Arc::new(|_: LiveNote| {}));
        assert_eq!(service.listener_count(), 1);
        assert!(service.unregister_listener(ListenerId::new(5)));
        assert!(!service.unregister_listener(ListenerId::new(5)));
        assert!(!service.is_connected());
    }
}
