use std::path::{Path, PathBuf};

use serde::Deserialize;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    timing: TimingConfig,
    #[serde(default)]
    sync: SyncConfig,
    #[serde(default)]
    spatial: SpatialConfig,
    #[serde(default)]
    input: InputConfig,
    #[serde(default)]
    playback: PlaybackConfig,
}

#[derive(Deserialize, Default)]
struct TimingConfig {
    chord_window_ms: Option<u64>,
    playback_buffer_ms: Option<u64>,
    stale_threshold_ms: Option<u64>,
    live_note_duration_ms: Option<u32>,
}

#[derive(Deserialize, Default)]
struct SyncConfig {
    sync_range: Option<f64>,
}

#[derive(Deserialize, Default)]
struct SpatialConfig {
    capture_radius: Option<f64>,
    seat_distance_sq: Option<f64>,
    default_sound_distance: Option<f64>,
}

#[derive(Deserialize, Default)]
struct InputConfig {
    item_prefix: Option<String>,
    instruments: Option<Vec<String>>,
    live_velocity: Option<u8>,
    midi_auto_connect: Option<bool>,
    midi_device_index: Option<usize>,
    require_capture_surface: Option<bool>,
}

#[derive(Deserialize, Default)]
struct PlaybackConfig {
    loop_playback: Option<bool>,
}

/// What happens when a melody's cursor runs past its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndPolicy {
    Stop,
    Loop,
}

/// Resolved engine tunables. Every field has a value; missing config keys
/// fall back to the built-in defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub chord_window_ms: u64,
    pub playback_buffer_ms: u64,
    pub stale_threshold_ms: u64,
    pub live_note_duration_ms: u32,
    pub sync_range: f64,
    pub capture_radius: f64,
    pub seat_distance_sq: f64,
    pub default_sound_distance: f64,
    pub item_prefix: String,
    pub instruments: Vec<String>,
    pub live_velocity: u8,
    pub midi_auto_connect: bool,
    pub midi_device_index: usize,
    pub require_capture_surface: bool,
    pub end_policy: EndPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            chord_window_ms: 80,
            playback_buffer_ms: 150,
            stale_threshold_ms: 500,
            live_note_duration_ms: 1000,
            sync_range: 40.0,
            capture_radius: 50.0,
            seat_distance_sq: 2.5,
            default_sound_distance: 40.0,
            item_prefix: "Ymmersive_Melodies_".to_string(),
            instruments: [
                "Piano",
                "Flute",
                "Lute",
                "Trumpet",
                "Bagpipe",
                "Vielle",
                "Handpan",
                "Didgeridoo",
                "Tiny_Drum",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            live_velocity: 100,
            midi_auto_connect: true,
            midi_device_index: 0,
            require_capture_surface: false,
            end_policy: EndPolicy::Stop,
        }
    }
}

impl EngineSettings {
    /// Instrument name for a held item id, if the item is a playable instrument.
    pub fn instrument_for_item<'a>(&self, item_id: &'a str) -> Option<&'a str> {
        let name = item_id.strip_prefix(self.item_prefix.as_str())?;
        self.instruments.iter().any(|i| i == name).then_some(name)
    }
}

pub struct Config {
    file: ConfigFile,
}

impl Config {
    /// Embedded defaults overlaid with `~/.config/bard/config.toml` when present.
    pub fn load() -> Self {
        let mut config = Self::embedded();
        if let Some(path) = user_config_path() {
            if path.exists() {
                config.overlay_file(&path);
            }
        }
        config
    }

    /// Embedded defaults overlaid with an explicit file.
    pub fn load_from(path: &Path) -> Self {
        let mut config = Self::embedded();
        config.overlay_file(path);
        config
    }

    /// Embedded defaults overlaid with a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        let user: ConfigFile = toml::from_str(contents)?;
        let mut config = Self::embedded();
        config.merge(user);
        Ok(config)
    }

    fn embedded() -> Self {
        let file = toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
            log::error!(target: "config", "embedded config.toml is malformed: {}", e);
            ConfigFile::default()
        });
        Config { file }
    }

    fn overlay_file(&mut self, path: &Path) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                Ok(user) => self.merge(user),
                Err(e) => {
                    log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                }
            },
            Err(e) => {
                log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
            }
        }
    }

    fn merge(&mut self, user: ConfigFile) {
        merge_timing(&mut self.file.timing, user.timing);
        merge_sync(&mut self.file.sync, user.sync);
        merge_spatial(&mut self.file.spatial, user.spatial);
        merge_input(&mut self.file.input, user.input);
        if user.playback.loop_playback.is_some() {
            self.file.playback.loop_playback = user.playback.loop_playback;
        }
    }

    pub fn settings(&self) -> EngineSettings {
        let fallback = EngineSettings::default();
        let timing = &self.file.timing;
        let spatial = &self.file.spatial;
        let input = &self.file.input;
        EngineSettings {
            chord_window_ms: timing.chord_window_ms.unwrap_or(fallback.chord_window_ms),
            playback_buffer_ms: timing
                .playback_buffer_ms
                .unwrap_or(fallback.playback_buffer_ms),
            stale_threshold_ms: timing
                .stale_threshold_ms
                .unwrap_or(fallback.stale_threshold_ms),
            live_note_duration_ms: timing
                .live_note_duration_ms
                .unwrap_or(fallback.live_note_duration_ms),
            sync_range: positive(self.file.sync.sync_range).unwrap_or(fallback.sync_range),
            capture_radius: positive(spatial.capture_radius).unwrap_or(fallback.capture_radius),
            seat_distance_sq: positive(spatial.seat_distance_sq)
                .unwrap_or(fallback.seat_distance_sq),
            default_sound_distance: positive(spatial.default_sound_distance)
                .unwrap_or(fallback.default_sound_distance),
            item_prefix: input.item_prefix.clone().unwrap_or(fallback.item_prefix),
            instruments: input.instruments.clone().unwrap_or(fallback.instruments),
            live_velocity: input
                .live_velocity
                .map(|v| v.min(127))
                .unwrap_or(fallback.live_velocity),
            midi_auto_connect: input
                .midi_auto_connect
                .unwrap_or(fallback.midi_auto_connect),
            midi_device_index: input
                .midi_device_index
                .unwrap_or(fallback.midi_device_index),
            require_capture_surface: input
                .require_capture_surface
                .unwrap_or(fallback.require_capture_surface),
            end_policy: match self.file.playback.loop_playback {
                Some(true) => EndPolicy::Loop,
                Some(false) => EndPolicy::Stop,
                None => fallback.end_policy,
            },
        }
    }
}

pub fn user_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bard"))
}

fn user_config_path() -> Option<PathBuf> {
    user_config_dir().map(|d| d.join("config.toml"))
}

fn positive(v: Option<f64>) -> Option<f64> {
    v.filter(|v| v.is_finite() && *v > 0.0)
}

fn merge_timing(base: &mut TimingConfig, user: TimingConfig) {
    if user.chord_window_ms.is_some() {
        base.chord_window_ms = user.chord_window_ms;
    }
    if user.playback_buffer_ms.is_some() {
        base.playback_buffer_ms = user.playback_buffer_ms;
    }
    if user.stale_threshold_ms.is_some() {
        base.stale_threshold_ms = user.stale_threshold_ms;
    }
    if user.live_note_duration_ms.is_some() {
        base.live_note_duration_ms = user.live_note_duration_ms;
    }
}

fn merge_sync(base: &mut SyncConfig, user: SyncConfig) {
    if user.sync_range.is_some() {
        base.sync_range = user.sync_range;
    }
}

fn merge_spatial(base: &mut SpatialConfig, user: SpatialConfig) {
    if user.capture_radius.is_some() {
        base.capture_radius = user.capture_radius;
    }
    if user.seat_distance_sq.is_some() {
        base.seat_distance_sq = user.seat_distance_sq;
    }
    if user.default_sound_distance.is_some() {
        base.default_sound_distance = user.default_sound_distance;
    }
}

fn merge_input(base: &mut InputConfig, user: InputConfig) {
    if user.item_prefix.is_some() {
        base.item_prefix = user.item_prefix;
    }
    if user.instruments.is_some() {
        base.instruments = user.instruments;
    }
    if user.live_velocity.is_some() {
        base.live_velocity = user.live_velocity;
    }
    if user.midi_auto_connect.is_some() {
        base.midi_auto_connect = user.midi_auto_connect;
    }
    if user.midi_device_index.is_some() {
        base.midi_device_index = user.midi_device_index;
    }
    if user.require_capture_surface.is_some() {
        base.require_capture_surface = user.require_capture_surface;
    }
}
