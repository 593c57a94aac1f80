//! # bard-core
//!
//! Real-time note pipeline and performance sync for Bard. Turns stored
//! melodies and live device input into spatial sound events, and keeps
//! nearby players performing the same melody on one timeline.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bard_core::config::Config;
//! use bard_core::performer::{Performer, Services, TickContext};
//!
//! // 1. Resolve settings from the embedded defaults and the user's config file
//! let settings = Config::load().settings();
//!
//! // 2. Wire host capabilities: catalog, broadcaster, melody library, timer
//! let performer = Performer::new(settings, services);
//!
//! // 3. Start a melody on a held instrument
//! let item = performer.start_melody(&item, listener, &melody_ref, position, now_ms);
//!
//! // 4. Every simulation tick, advance each listener and store the result
//! if let Some(updated) = performer.tick(Some(&item), &ctx) { /* write back */ }
//!
//! // 5. Drive the timer (TickTimer::advance_to, or a TimerThread)
//! ```
//!
//! ## Module Overview
//!
//! - [`resolver`]: note/velocity to catalog key, pitch and volume
//! - [`queue`]: per-listener FIFO from input threads into the tick
//! - [`chord`]: windowed batching of live notes against one snapshot
//! - [`playback`]: melody cursor advancement and note emission
//! - [`sync`]: shared anchors for nearby performances of a melody
//! - [`timer`]: delayed tasks, thread-driven or tick-driven
//! - [`midi`], [`input`]: device input, key capture, seating, input mode
//! - [`performer`]: per-tick orchestration over a held item
//! - [`config`], [`error`]: settings and error types

pub mod broadcast;
pub mod catalog;
pub mod chord;
pub mod config;
pub mod error;
pub mod input;
pub mod library;
pub mod midi;
pub mod performer;
pub mod playback;
pub mod queue;
pub mod resolver;
pub mod sync;
pub mod timer;
pub mod world;

pub use bard_types;
pub use error::{InputError, MelodyError};
