mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bard_core::error::InputError;
use bard_core::input::DEBUG_CONSOLE_KEY;
use bard_core::queue::LiveNote;
use bard_core::world::{ItemMetadata, ItemStack, MIDI_MODE_FIELD, SEATED_FIELD};
use bard_types::{ListenerId, MidiModeState, SeatedState};
use common::{at, id, melody, Harness, PIANO};

fn mode(item: &ItemStack) -> bool {
    item.get_or_default::<MidiModeState>(MIDI_MODE_FIELD).active
}

fn seated(item: &ItemStack) -> bool {
    item.get_or_default::<SeatedState>(SEATED_FIELD).sitting
}

#[test]
fn sitting_near_a_chair_enters_live_input() {
    let h = Harness::new();
    h.world.add_player(id(1), at(0.0));
    h.world.add_prop(100, at(1.0));
    let mut item = ItemStack::new(PIANO);

    h.tick(&mut item, id(1), 0, None);
    assert!(seated(&item));
    assert!(mode(&item));
    assert!(h.performer.queue().is_registered(id(1)));
    assert_eq!(h.input.listener_count(), 1);

    h.world.move_entity(1, at(1.2));
    h.tick(&mut item, id(1), 50, None);
    assert!(mode(&item));

    // Walking away from the chair stands them up without any movement flag.
    h.world.move_entity(1, at(500.0));
    for now in (100..=1_000).step_by(50) {
        h.tick(&mut item, id(1), now, None);
    }
    assert!(!seated(&item));
    assert!(!mode(&item));
    assert!(!h.performer.queue().is_registered(id(1)));
    assert!(!h.performer.interceptors().is_intercepting(id(1)));
    assert_eq!(h.input.listener_count(), 0);
    assert!(!h.performer.handle_key_press(id(1), b'/' as u16));
}

#[test]
fn movement_flag_overrides_the_chair() {
    let h = Harness::new();
    h.world.add_player(id(1), at(0.0));
    h.world.add_prop(100, at(1.0));
    let mut item = ItemStack::new(PIANO);

    h.tick(&mut item, id(1), 0, Some(false));
    assert!(!seated(&item));
    assert!(!mode(&item));

    h.world.move_entity(1, at(30.0));
    h.tick(&mut item, id(1), 50, Some(true));
    assert!(seated(&item));
    assert!(mode(&item));
}

#[test]
fn putting_away_the_instrument_tears_down() {
    let h = Harness::new();
    h.world.add_player(id(1), at(0.0));
    let mut item = ItemStack::new(PIANO);
    h.tick(&mut item, id(1), 0, Some(true));
    assert!(h.performer.interceptors().is_intercepting(id(1)));

    let sword = ItemStack::new("Sword");
    assert!(h
        .performer
        .tick(Some(&sword), &h.ctx(id(1), 50, Some(true)))
        .is_none());
    assert!(!h.performer.interceptors().is_intercepting(id(1)));
    assert_eq!(h.input.listener_count(), 0);
}

#[test]
fn persisted_mode_is_restored_after_restart() {
    let h = Harness::new();
    h.world.add_player(id(1), at(0.0));
    let mut item = ItemStack::new(PIANO)
        .with_field(MIDI_MODE_FIELD, &MidiModeState { active: true })
        .with_field(SEATED_FIELD, &SeatedState { sitting: true });
    h.tick(&mut item, id(1), 0, Some(true));
    assert!(h.performer.queue().is_registered(id(1)));
    assert!(h.performer.interceptors().is_intercepting(id(1)));
    assert_eq!(h.input.listener_count(), 1);
}

#[test]
fn early_notes_do_not_block_restoring_live_input() {
    let h = Harness::new();
    h.world.add_player(id(1), at(0.0));
    let mut item = ItemStack::new(PIANO)
        .with_field(MIDI_MODE_FIELD, &MidiModeState { active: true })
        .with_field(SEATED_FIELD, &SeatedState { sitting: true });

    // A note arrives before the first tick after a restart.
    assert!(!h.performer.queue().enqueue(id(1), LiveNote { note: 60, velocity: 100 }));
    assert!(!h.performer.queue().is_registered(id(1)));

    h.tick(&mut item, id(1), 0, Some(true));
    assert!(mode(&item));
    assert!(h.performer.queue().is_registered(id(1)));
    assert!(h.performer.interceptors().is_intercepting(id(1)));
    assert_eq!(h.input.listener_count(), 1);

    h.input.press(64, 90);
    h.tick(&mut item, id(1), 10, Some(true));
    assert_eq!(h.performer.chords().pending_len(id(1)), 1);
}

#[test]
fn partial_wiring_is_restored() {
    let h = Harness::new();
    h.world.add_player(id(1), at(0.0));
    let mut item = ItemStack::new(PIANO);
    h.tick(&mut item, id(1), 0, Some(true));
    assert!(mode(&item));

    // Interception lost while the mode is still persisted as active.
    h.performer.interceptors().disable_interception(id(1));
    h.tick(&mut item, id(1), 50, Some(true));
    assert!(h.performer.interceptors().is_intercepting(id(1)));
    assert_eq!(h.input.listener_count(), 1);
}

#[test]
fn missing_entity_short_circuits() {
    let h = Harness::new();
    let item = ItemStack::new(PIANO);
    assert!(h
        .performer
        .tick(Some(&item), &h.ctx(id(7), 0, Some(true)))
        .is_none());
    assert!(!h.performer.queue().is_registered(id(7)));
}

#[test]
fn capture_surface_gates_live_performance_mode() {
    let mut settings = bard_core::config::EngineSettings::default();
    settings.require_capture_surface = true;
    let h = Harness::with_settings(settings);
    h.world.add_player(id(1), at(0.0));
    let mut item = ItemStack::new(PIANO);

    h.tick(&mut item, id(1), 0, Some(true));
    assert!(!mode(&item));

    h.performer.open_capture(id(1));
    h.tick(&mut item, id(1), 50, Some(true));
    assert!(mode(&item));

    assert!(h.performer.close_capture(id(1)));
    h.tick(&mut item, id(1), 100, Some(true));
    assert!(!mode(&item));
}

#[test]
fn typed_text_is_played_through_the_chord_buffer() {
    let h = Harness::new();
    h.world.add_player(id(1), at(0.0));
    let item = ItemStack::new(PIANO);

    let ctx = h.ctx(id(1), 0, None);
    assert_eq!(h.performer.capture_text(&item, &ctx, "t").notes, 0);

    h.performer.open_capture(id(1));
    let update = h.performer.capture_text(&item, &ctx, "tT");
    assert_eq!(update.notes, 2);
    assert!(!update.clear_field);
    let update = h.performer.capture_text(&item, &ctx, "tTu");
    assert_eq!(update.notes, 1);

    h.timer.advance_to(80);
    let keys: Vec<String> = h.broadcast.take().into_iter().map(|s| s.event.key).collect();
    assert_eq!(keys.len(), 3);
}

#[test]
fn f5_opens_the_debug_console_for_instrument_holders() {
    let h = Harness::new();
    h.world.add_player(id(1), at(0.0));
    let opened = Arc::new(AtomicUsize::new(0));
    let o = opened.clone();
    h.performer.set_debug_console(Arc::new(move |_: ListenerId| {
        o.fetch_add(1, Ordering::SeqCst);
        true
    }));

    assert!(!h.performer.handle_key_press(id(1), DEBUG_CONSOLE_KEY));
    let mut item = ItemStack::new(PIANO);
    h.tick(&mut item, id(1), 0, Some(false));
    assert!(h.performer.handle_key_press(id(1), DEBUG_CONSOLE_KEY));
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    // Not performing, so ordinary keys pass through.
    assert!(!h.performer.handle_key_press(id(1), b'T' as u16));
}

#[test]
fn debug_status_reports_listener_state() {
    let h = Harness::new();
    h.world.add_player(id(1), at(0.0));
    let mut item = ItemStack::new(PIANO);
    h.tick(&mut item, id(1), 0, Some(true));

    let status = h.performer.debug_status(id(1), Some(&item));
    assert!(status.holds_instrument);
    assert_eq!(status.instrument.as_deref(), Some("Piano"));
    assert!(status.seated);
    assert!(status.midi_mode_active);
    assert!(status.intercepting);
    assert!(!status.device_connected);
    assert_eq!(status.devices.len(), 1);
    assert_eq!(status.playing, None);

    h.performer.select_device(0).unwrap();
    assert!(h.performer.debug_status(id(1), Some(&item)).device_connected);
    assert!(matches!(
        h.performer.select_device(4),
        Err(InputError::InvalidPort { index: 4, .. })
    ));
}

#[test]
fn disconnect_is_idempotent() {
    let h = Harness::new();
    h.world.add_player(id(1), at(0.0));
    let tune = h.library.insert_asset("long", melody("long", &[0, 5_000], 500));
    let item = h
        .performer
        .start_melody(&ItemStack::new(PIANO), id(1), &tune, at(0.0), 0)
        .unwrap();
    let mut live = item.clone();
    h.tick(&mut live, id(1), 10, Some(true));
    h.performer.open_capture(id(1));

    h.performer.disconnect(id(1), Some(&item));
    h.performer.disconnect(id(1), Some(&item));
    h.performer.disconnect::<ItemStack>(id(1), None);

    assert!(!h.performer.queue().is_registered(id(1)));
    assert!(!h.performer.interceptors().is_intercepting(id(1)));
    assert!(!h.performer.close_capture(id(1)));
    assert_eq!(h.input.listener_count(), 0);
    assert_eq!(h.performer.sync().melody_count(), 0);
}
