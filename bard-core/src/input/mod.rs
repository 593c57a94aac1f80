//! Live input: keyboard layout, key capture, seating and the input mode.

pub mod intercept;
pub mod keymap;
pub mod mode;
pub mod seating;

pub use intercept::{ConsoleHandler, InterceptorRegistry, KeyHandler, DEBUG_CONSOLE_KEY};
pub use keymap::{note_for_combo, note_for_key, notes_for_text, KeyCombo, TextCapture};
pub use mode::{next_mode, InputMode, ModeInputs, Transition};
pub use seating::{near_seat, SeatSource, Seating};
