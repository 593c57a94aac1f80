mod common;

use bard_core::world::ItemStack;
use common::{at, id, Harness, PIANO};

/// Seat listener 1 with a piano and bring it into live-input mode.
fn seated_performer(h: &Harness) -> ItemStack {
    h.world.add_player(id(1), at(0.0));
    let mut item = ItemStack::new(PIANO);
    h.tick(&mut item, id(1), 0, Some(true));
    assert!(h.performer.interceptors().is_intercepting(id(1)));
    item
}

#[test]
fn chord_flushes_once_against_first_snapshot() {
    let h = Harness::new();
    h.world.add_player(id(2), at(45.0));
    h.world.add_player(id(3), at(60.0));
    let mut item = seated_performer(&h);

    h.input.press(60, 100);
    h.tick(&mut item, id(1), 10, Some(true));
    assert_eq!(h.performer.chords().pending_len(id(1)), 1);

    // Everyone moves before the second note of the chord.
    h.world.move_entity(1, at(500.0));
    h.world.move_entity(3, at(10.0));
    h.input.press(64, 100);
    h.input.press(62, 100);
    h.tick(&mut item, id(1), 30, Some(true));
    assert_eq!(h.performer.chords().pending_len(id(1)), 3);
    assert_eq!(h.broadcast.len(), 0);

    h.timer.advance_to(89);
    assert_eq!(h.broadcast.len(), 0);
    h.timer.advance_to(90);
    let sent = h.broadcast.take();
    assert_eq!(sent.len(), 3);
    for s in &sent {
        assert_eq!(s.event.position, at(0.0));
        assert_eq!(s.recipients, vec![id(1), id(2)]);
        assert_eq!(s.delay_ms, 0);
    }
    let keys: Vec<&str> = sent.iter().map(|s| s.event.key.as_str()).collect();
    assert_eq!(keys, vec!["Piano_C4_1000ms", "Piano_C4_1000ms", "Piano_C4_1000ms"]);

    h.timer.advance_to(1_000);
    assert_eq!(h.broadcast.len(), 0);
}

#[test]
fn next_note_after_flush_opens_new_batch() {
    let h = Harness::new();
    let mut item = seated_performer(&h);

    h.input.press(60, 100);
    h.tick(&mut item, id(1), 10, Some(true));
    h.timer.advance_to(90);
    assert_eq!(h.broadcast.take().len(), 1);

    h.world.move_entity(1, at(3.0));
    h.input.press(62, 100);
    h.tick(&mut item, id(1), 100, Some(true));
    h.timer.advance_to(180);
    let sent = h.broadcast.take();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].event.position, at(3.0));
}

#[test]
fn standing_up_discards_pending_chord() {
    let h = Harness::new();
    let mut item = seated_performer(&h);

    h.input.press(60, 100);
    h.tick(&mut item, id(1), 10, Some(true));
    h.tick(&mut item, id(1), 20, Some(false));
    assert_eq!(h.performer.chords().pending_len(id(1)), 0);
    h.timer.advance_to(200);
    assert_eq!(h.broadcast.len(), 0);
    assert_eq!(h.input.listener_count(), 0);
}

#[test]
fn keyboard_presses_join_the_chord() {
    let h = Harness::new();
    let mut item = seated_performer(&h);

    assert!(h.performer.handle_key_press(id(1), b'T' as u16));
    assert!(h.performer.handle_key_press(id(1), b'U' as u16));
    // Unmapped keys are still swallowed while performing.
    assert!(h.performer.handle_key_press(id(1), b'/' as u16));
    h.tick(&mut item, id(1), 10, Some(true));
    h.timer.advance_to(90);
    let sent = h.broadcast.take();
    assert_eq!(sent.len(), 2);
    // Live velocity 100 against the device reference of 127 at C4.
    assert!((sent[0].event.volume - 100.0 / 127.0).abs() < 1e-6);
}

#[test]
fn five_notes_in_one_window_flush_once() {
    let h = Harness::new();
    let mut item = seated_performer(&h);

    for (i, note) in (60..65).enumerate() {
        h.input.press(note, 100);
        h.tick(&mut item, id(1), 10 + i as i64 * 15, Some(true));
    }
    assert_eq!(h.performer.chords().pending_len(id(1)), 5);
    assert_eq!(h.timer.pending(), 1);

    h.timer.advance_to(89);
    assert_eq!(h.broadcast.len(), 0);
    h.timer.advance_to(90);
    let sent = h.broadcast.take();
    assert_eq!(sent.len(), 5);
    assert!(sent.iter().all(|s| s.delay_ms == 0 && s.event.position == at(0.0)));
    assert_eq!(h.timer.pending(), 0);

    h.timer.advance_to(1_000);
    assert_eq!(h.broadcast.len(), 0);
}
