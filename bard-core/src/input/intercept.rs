//! Raw key capture for listeners in live-input mode.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bard_types::ListenerId;
use parking_lot::RwLock;

/// F5 opens the debug console, ahead of any key capture.
pub const DEBUG_CONSOLE_KEY: u16 = 116;

pub type KeyHandler = Arc<dyn Fn(u16) + Send + Sync>;
/// Returns whether the console was opened.
pub type ConsoleHandler = Arc<dyn Fn(ListenerId) -> bool + Send + Sync>;

#[derive(Default)]
pub struct InterceptorRegistry {
    keys: RwLock<HashMap<ListenerId, KeyHandler>>,
    consoles: RwLock<HashMap<ListenerId, ConsoleHandler>>,
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_interception(&self, listener: ListenerId, on_key: KeyHandler) {
        self.keys.write().insert(listener, on_key);
    }

    pub fn disable_interception(&self, listener: ListenerId) -> bool {
        self.keys.write().remove(&listener).is_some()
    }

    pub fn is_intercepting(&self, listener: ListenerId) -> bool {
        self.keys.read().contains_key(&listener)
    }

    pub fn register_debug_console_handler(&self, listener: ListenerId, handler: ConsoleHandler) {
        self.consoles.write().insert(listener, handler);
    }

    pub fn unregister_debug_console_handler(&self, listener: ListenerId) -> bool {
        self.consoles.write().remove(&listener).is_some()
    }

    pub fn has_debug_console_handler(&self, listener: ListenerId) -> bool {
        self.consoles.read().contains_key(&listener)
    }

    /// Route a key press. Returns `true` when the key was consumed and the
    /// host should suppress its normal action.
    pub fn handle_key_press(&self, listener: ListenerId, key: u16) -> bool {
        if key == DEBUG_CONSOLE_KEY {
            let console = self.consoles.read().get(&listener).cloned();
            if let Some(console) = console {
                match catch_unwind(AssertUnwindSafe(|| console(listener))) {
                    Ok(true) => return true,
                    Ok(false) => {}
                    Err(_) => {
                        log::error!(target: "input", "debug console handler for {} panicked", listener)
                    }
                }
            }
        }

        let handler = self.keys.read().get(&listener).cloned();
        let Some(handler) = handler else {
            return false;
        };
        if catch_unwind(AssertUnwindSafe(|| handler(key))).is_err() {
            log::error!(target: "input", "key handler for {} panicked on {}", listener, key);
        }
        true
    }

    /// Drop both handlers for a listener.
    pub fn remove(&self, listener: ListenerId) {
        self.disable_interception(listener);
        self.unregister_debug_console_handler(listener);
    }
}
