//! A small simulated world for driving the engine from the terminal.
//!
//! Players stand on a line five units apart. Sound events are printed instead
//! of being sent over a network.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bard_core::broadcast::{DelayedBroadcast, PacketSink};
use bard_core::catalog::InMemoryCatalog;
use bard_core::config::{Config, EndPolicy, EngineSettings};
use bard_core::library::InMemoryLibrary;
use bard_core::midi::{MidiInputService, NoteInput};
use bard_core::performer::{Performer, Services, TickContext};
use bard_core::timer::TimerThread;
use bard_core::world::{EntityRef, ItemMetadata, ItemStack, SpatialQuery, PROGRESS_FIELD};
use bard_types::{ListenerId, PlaybackProgress, Position, SoundEvent};

const TICK: Duration = Duration::from_millis(50);
const SPACING: f64 = 5.0;

pub struct PlaybackOptions {
    pub listeners: u64,
    pub looping: bool,
    pub seconds: Option<u64>,
}

struct SimWorld {
    players: Vec<EntityRef>,
}

impl SimWorld {
    fn with_players(count: u64) -> Self {
        let players = (0..count)
            .map(|i| EntityRef {
                id: i + 1,
                position: Position::new(i as f64 * SPACING, 0.0, 0.0),
                listener: Some(ListenerId::new(i + 1)),
            })
            .collect();
        Self { players }
    }

    fn position_of(&self, listener: ListenerId) -> Option<Position> {
        self.players
            .iter()
            .find(|p| p.listener == Some(listener))
            .map(|p| p.position)
    }
}

impl SpatialQuery for SimWorld {
    fn find_nearby(&self, center: Position, radius: f64) -> Vec<EntityRef> {
        let radius_sq = radius * radius;
        self.players
            .iter()
            .filter(|p| p.position.distance_sq(&center) <= radius_sq)
            .copied()
            .collect()
    }
}

/// Prints every delivered event with the time since the run started.
struct ConsoleSink {
    started: Instant,
}

impl PacketSink for ConsoleSink {
    fn send(&self, recipient: ListenerId, event: &SoundEvent) {
        println!(
            "{:>7} ms  -> {:<3} {:<24} vol {:.2}  pitch {:.3}",
            self.started.elapsed().as_millis(),
            recipient,
            event.key,
            event.volume,
            event.pitch
        );
    }
}

fn build_catalog(settings: &EngineSettings) -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new();
    for instrument in &settings.instruments {
        catalog.register_instrument(instrument, settings.default_sound_distance);
    }
    log::debug!("registered {} sounds", catalog.len());
    catalog
}

fn instrument_item(settings: &EngineSettings) -> ItemStack {
    let instrument = settings
        .instruments
        .first()
        .map(String::as_str)
        .unwrap_or("Piano");
    ItemStack::new(format!("{}{}", settings.item_prefix, instrument))
}

fn now_ms(started: Instant) -> i64 {
    started.elapsed().as_millis() as i64
}

/// Play a melody file with `listeners` players joining one after another.
pub fn run_playback(path: &Path, options: PlaybackOptions) -> std::io::Result<()> {
    let mut settings = Config::load().settings();
    if options.looping {
        settings.end_policy = EndPolicy::Loop;
    }

    let library = Arc::new(InMemoryLibrary::new());
    let melody_ref = library
        .load_asset_file(path)
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    let started = Instant::now();
    let timer = Arc::new(TimerThread::spawn()?);
    let sink = Arc::new(ConsoleSink { started });
    let services = Services {
        catalog: Arc::new(build_catalog(&settings)),
        broadcast: Arc::new(DelayedBroadcast::new(sink, timer.clone())),
        library,
        timer,
        input: None,
    };
    let template = instrument_item(&settings);
    let performer = Performer::new(settings, services);
    let world = SimWorld::with_players(options.listeners);

    // Player n picks up the melody n seconds in.
    let mut items: Vec<Option<ItemStack>> = vec![None; options.listeners as usize];
    let deadline = options.seconds.map(|s| started + Duration::from_secs(s));

    println!("playing {} for {} listener(s)", melody_ref, options.listeners);
    loop {
        let now = now_ms(started);
        for (i, slot) in items.iter_mut().enumerate() {
            let listener = ListenerId::new(i as u64 + 1);
            let Some(position) = world.position_of(listener) else {
                continue;
            };
            if slot.is_none() && now >= i as i64 * 1_000 {
                *slot = performer.start_melody(&template, listener, &melody_ref, position, now);
            }
            let Some(item) = slot.as_ref() else {
                continue;
            };
            let ctx = TickContext {
                listener,
                now_ms: now,
                position: Some(position),
                sitting: Some(false),
                spatial: &world,
            };
            if let Some(next) = performer.tick(Some(item), &ctx) {
                *slot = Some(next);
            }
        }

        let all_started = items.iter().all(Option::is_some);
        let all_done = items.iter().flatten().all(|item| {
            item.get_or_default::<PlaybackProgress>(PROGRESS_FIELD)
                .is_idle()
        });
        if all_started && all_done {
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        std::thread::sleep(TICK);
    }

    for (i, item) in items.iter().enumerate() {
        performer.disconnect(ListenerId::new(i as u64 + 1), item.as_ref());
    }
    // Let the last scheduled notes go out.
    std::thread::sleep(Duration::from_millis(performer.settings().playback_buffer_ms));
    Ok(())
}

/// Perform from a MIDI device as a single seated player.
pub fn run_live(device: Option<usize>, seconds: u64) -> std::io::Result<()> {
    let settings = Config::load().settings();
    let device = match device {
        Some(index) => index,
        None if settings.midi_auto_connect => settings.midi_device_index,
        None => {
            eprintln!("MIDI auto-connect is disabled; pass --device N");
            std::process::exit(1);
        }
    };

    let input = Arc::new(MidiInputService::new());
    if !input.initialize(device) {
        eprintln!("could not open MIDI device {} (try --list-devices)", device);
        std::process::exit(1);
    }
    if let Some(name) = input.connected_port_name() {
        println!("listening on {}", name);
    }

    let started = Instant::now();
    let timer = Arc::new(TimerThread::spawn()?);
    let sink = Arc::new(ConsoleSink { started });
    let services = Services {
        catalog: Arc::new(build_catalog(&settings)),
        broadcast: Arc::new(DelayedBroadcast::new(sink, timer.clone())),
        library: Arc::new(InMemoryLibrary::new()),
        timer,
        input: Some(input.clone() as Arc<dyn NoteInput>),
    };
    let mut item = instrument_item(&settings);
    let performer = Performer::new(settings, services);
    let world = SimWorld::with_players(1);
    let listener = ListenerId::new(1);

    let deadline = started + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        let ctx = TickContext {
            listener,
            now_ms: now_ms(started),
            position: world.position_of(listener),
            sitting: Some(true),
            spatial: &world,
        };
        if let Some(next) = performer.tick(Some(&item), &ctx) {
            item = next;
        }
        std::thread::sleep(TICK);
    }

    performer.disconnect(listener, Some(&item));
    input.shutdown();
    Ok(())
}
