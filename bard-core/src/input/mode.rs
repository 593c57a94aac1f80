//! Per-listener live-input mode.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Inactive,
    Active,
}

impl InputMode {
    pub fn from_active(active: bool) -> Self {
        if active {
            InputMode::Active
        } else {
            InputMode::Inactive
        }
    }

    pub fn is_active(self) -> bool {
        self == InputMode::Active
    }
}

/// What the listener is doing this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeInputs {
    pub holds_instrument: bool,
    pub seated: bool,
    pub capture_open: bool,
    /// Live-performance mode additionally needs an open capture surface.
    pub require_capture: bool,
}

impl ModeInputs {
    fn wants_active(&self) -> bool {
        self.holds_instrument && self.seated && (self.capture_open || !self.require_capture)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Enter,
    Leave,
    Stay,
}

pub fn next_mode(current: InputMode, inputs: ModeInputs) -> (InputMode, Transition) {
    match (current, inputs.wants_active()) {
        (InputMode::Inactive, true) => (InputMode::Active, Transition::Enter),
        (InputMode::Active, false) => (InputMode::Inactive, Transition::Leave),
        (mode, _) => (mode, Transition::Stay),
    }
}
