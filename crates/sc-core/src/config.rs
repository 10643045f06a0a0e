//! `sc_settings.json` loading.
//!
//! The file carries an `sc1000` object with engine/input tuning, the
//! `gpio_mapping` and `midi_mapping` arrays, and `audio_interfaces` in
//! priority order. Unknown keys are ignored; an invalid entry is logged
//! and skipped; a missing or unparsable file falls back to defaults.
//! Flag fields accept both JSON booleans and the 0/1 integers older
//! configs used.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use crate::audio::AudioInterfaceConfig;
use crate::control::{ActionType, EventType, Mapping, MappingRegistry, MappingSource};
use sc_midi::MidiCommand;

fn flexible_bool<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flexible {
        Bool(bool),
        Int(i64),
    }
    Ok(match Flexible::deserialize(de)? {
        Flexible::Bool(b) => b,
        Flexible::Int(i) => i != 0,
    })
}

fn d_period_size() -> u32 {
    256
}
fn d_buffer_period_factor() -> u32 {
    4
}
fn d_sample_rate() -> u32 {
    48_000
}
fn d_fader_open_point() -> u32 {
    10
}
fn d_fader_close_point() -> u32 {
    2
}
fn d_update_rate() -> u32 {
    2_000
}
fn d_true() -> bool {
    true
}
fn d_platter_speed() -> i32 {
    2275
}
fn d_debounce_time() -> i32 {
    5
}
fn d_hold_time() -> i32 {
    100
}
fn d_slippiness() -> f64 {
    200.0
}
fn d_brake_speed() -> f64 {
    3000.0
}
fn d_pitch_range() -> i32 {
    50
}
fn d_midi_init_delay() -> u32 {
    5
}
fn d_audio_init_delay() -> u32 {
    2
}
fn d_volume_amount() -> f64 {
    0.03
}
fn d_volume_amount_held() -> f64 {
    0.001
}
fn d_initial_volume() -> f64 {
    0.125
}
fn d_max_volume() -> f64 {
    1.0
}
fn d_loop_max_seconds() -> u32 {
    60
}
fn d_importer() -> PathBuf {
    PathBuf::from("/root/xwax-import")
}
fn d_root_path() -> PathBuf {
    PathBuf::from("/media/sda")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub period_size: u32,
    pub buffer_period_factor: u32,
    pub sample_rate: u32,
    /// ADC value that opens a closed fader side
    pub fader_open_point: u32,
    /// ADC value that closes an open fader side
    pub fader_close_point: u32,
    /// Input loop iteration delay in microseconds
    pub update_rate: u32,
    #[serde(deserialize_with = "flexible_bool")]
    pub platter_enabled: bool,
    /// Encoder ticks per second of audio
    pub platter_speed: i32,
    /// GPIO debounce, in input loop iterations
    pub debounce_time: i32,
    /// Press-to-hold threshold, in input loop iterations
    pub hold_time: i32,
    /// Slipmat: higher is slippier
    pub slippiness: f64,
    /// Brake: higher takes longer to stop
    pub brake_speed: f64,
    /// Pitch fader range in percent (legacy mode)
    pub pitch_range: i32,
    /// Seconds before MIDI enumeration starts
    pub midi_init_delay: u32,
    pub audio_init_delay: u32,
    #[serde(deserialize_with = "flexible_bool")]
    pub disable_volume_adc: bool,
    #[serde(deserialize_with = "flexible_bool")]
    pub disable_pic_buttons: bool,
    pub volume_amount: f64,
    pub volume_amount_held: f64,
    pub initial_volume: f64,
    pub max_volume: f64,
    #[serde(deserialize_with = "flexible_bool")]
    pub jog_reverse: bool,
    /// 0 = off, 1 = side A cuts the beat deck, 2 = side B cuts it
    pub cut_beats: i32,
    pub loop_max_seconds: u32,
    pub importer: PathBuf,

    #[serde(skip)]
    pub audio_interfaces: Vec<AudioInterfaceConfig>,
    #[serde(skip, default = "d_root_path")]
    pub root_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            period_size: d_period_size(),
            buffer_period_factor: d_buffer_period_factor(),
            sample_rate: d_sample_rate(),
            fader_open_point: d_fader_open_point(),
            fader_close_point: d_fader_close_point(),
            update_rate: d_update_rate(),
            platter_enabled: d_true(),
            platter_speed: d_platter_speed(),
            debounce_time: d_debounce_time(),
            hold_time: d_hold_time(),
            slippiness: d_slippiness(),
            brake_speed: d_brake_speed(),
            pitch_range: d_pitch_range(),
            midi_init_delay: d_midi_init_delay(),
            audio_init_delay: d_audio_init_delay(),
            disable_volume_adc: false,
            disable_pic_buttons: false,
            volume_amount: d_volume_amount(),
            volume_amount_held: d_volume_amount_held(),
            initial_volume: d_initial_volume(),
            max_volume: d_max_volume(),
            jog_reverse: false,
            cut_beats: 0,
            loop_max_seconds: d_loop_max_seconds(),
            importer: d_importer(),
            audio_interfaces: Vec::new(),
            root_path: d_root_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DeckName {
    Beats,
    Scratch,
}

impl DeckName {
    fn index(self) -> usize {
        match self {
            DeckName::Beats => 0,
            DeckName::Scratch => 1,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GpioMappingEntry {
    event: EventType,
    port: u8,
    pin: u8,
    #[serde(default = "d_true", deserialize_with = "flexible_bool")]
    pull_up: bool,
    deck: DeckName,
    action: ActionType,
    #[serde(default)]
    parameter: u8,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum MidiStatusKind {
    MidiNoteOn,
    MidiNoteOff,
    MidiCc,
    MidiPb,
}

impl MidiStatusKind {
    fn status(self, channel: u8) -> u8 {
        let nibble = match self {
            MidiStatusKind::MidiNoteOn => 0x90,
            MidiStatusKind::MidiNoteOff => 0x80,
            MidiStatusKind::MidiCc => 0xb0,
            MidiStatusKind::MidiPb => 0xe0,
        };
        nibble | (channel & 0x0f)
    }
}

#[derive(Debug, Deserialize)]
struct MidiMappingEntry {
    #[serde(rename = "type")]
    kind: MidiStatusKind,
    #[serde(default, deserialize_with = "flexible_bool")]
    shifted: bool,
    channel: u8,
    parameter1: u8,
    #[serde(default)]
    parameter2: u8,
    deck: DeckName,
    action: ActionType,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    sc1000: Option<Settings>,
    #[serde(default)]
    gpio_mapping: Vec<serde_json::Value>,
    #[serde(default)]
    midi_mapping: Vec<serde_json::Value>,
    #[serde(default)]
    audio_interfaces: Vec<serde_json::Value>,
}

fn add_gpio_mapping(registry: &mut MappingRegistry, entry: GpioMappingEntry) {
    registry.add(Mapping {
        source: MappingSource::Gpio {
            port: entry.port,
            pin: entry.pin,
            pullup: entry.pull_up,
        },
        edge: entry.event,
        deck_no: entry.deck.index(),
        action: entry.action,
        parameter: entry.parameter,
    });
}

fn add_midi_mapping(registry: &mut MappingRegistry, entry: MidiMappingEntry) {
    let edge = if entry.shifted {
        EventType::ButtonPressedShifted
    } else {
        EventType::ButtonPressed
    };
    let status = entry.kind.status(entry.channel);

    // parameter1 == 255 on a note-on maps every note
    if matches!(entry.kind, MidiStatusKind::MidiNoteOn) && entry.parameter1 == 255 {
        for note in 0..128u8 {
            let parameter = if entry.action == ActionType::Note {
                note
            } else {
                0
            };
            registry.add(Mapping {
                source: MappingSource::Midi {
                    command: MidiCommand::new(status, note, 0),
                },
                edge,
                deck_no: entry.deck.index(),
                action: entry.action,
                parameter,
            });
        }
        return;
    }

    registry.add(Mapping {
        source: MappingSource::Midi {
            command: MidiCommand::new(status, entry.parameter1, 0),
        },
        edge,
        deck_no: entry.deck.index(),
        action: entry.action,
        parameter: entry.parameter2,
    });
}

/// Settings plus the mapping registry built from the same file.
pub struct LoadedConfig {
    pub settings: Settings,
    pub registry: MappingRegistry,
}

/// Parse one configuration document.
pub fn parse_config(text: &str) -> LoadedConfig {
    let file: ConfigFile = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            log::error!("config parse error: {e}; using defaults");
            ConfigFile::default()
        }
    };

    let mut settings = file.sc1000.unwrap_or_default();
    let mut registry = MappingRegistry::new();

    for value in file.gpio_mapping {
        match serde_json::from_value::<GpioMappingEntry>(value) {
            Ok(entry) => add_gpio_mapping(&mut registry, entry),
            Err(e) => log::warn!("invalid gpio_mapping entry: {e}"),
        }
    }
    for value in file.midi_mapping {
        match serde_json::from_value::<MidiMappingEntry>(value) {
            Ok(entry) => add_midi_mapping(&mut registry, entry),
            Err(e) => log::warn!("invalid midi_mapping entry: {e}"),
        }
    }
    for value in file.audio_interfaces {
        match serde_json::from_value::<AudioInterfaceConfig>(value) {
            Ok(interface) => settings.audio_interfaces.push(interface),
            Err(e) => log::warn!("invalid audio_interfaces entry: {e}"),
        }
    }

    log::info!(
        "config: {} mappings, {} audio interfaces",
        registry.len(),
        settings.audio_interfaces.len()
    );

    LoadedConfig { settings, registry }
}

/// Load `sc_settings.json`, looking under the root path first, then the
/// baked-in copy, then the working directory (native runs).
pub fn load_config(root: &Path) -> LoadedConfig {
    let candidates = [
        root.join("sc_settings.json"),
        PathBuf::from("/var/sc_settings.json"),
        PathBuf::from("../sc_settings.json"),
        PathBuf::from("sc_settings.json"),
    ];

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                log::info!("loading settings from {}", path.display());
                let mut config = parse_config(&text);
                config.settings.root_path = root.to_path_buf();
                return config;
            }
            Err(_) => continue,
        }
    }

    log::warn!("no settings file found, using defaults");
    let mut config = LoadedConfig {
        settings: Settings::default(),
        registry: MappingRegistry::new(),
    };
    config.settings.root_path = root.to_path_buf();
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_firmware() {
        let s = Settings::default();
        assert_eq!(s.period_size, 256);
        assert_eq!(s.sample_rate, 48_000);
        assert_eq!(s.platter_speed, 2275);
        assert_eq!(s.slippiness, 200.0);
        assert_eq!(s.brake_speed, 3000.0);
        assert_eq!(s.pitch_range, 50);
        assert_eq!(s.volume_amount, 0.03);
        assert_eq!(s.initial_volume, 0.125);
        assert_eq!(s.max_volume, 1.0);
        assert_eq!(s.loop_max_seconds, 60);
        assert_eq!(s.cut_beats, 0);
    }

    #[test]
    fn parses_settings_and_mappings() {
        let config = parse_config(
            r#"{
                "sc1000": {"platter_speed": 4096, "platter_enabled": 1, "unknown_key": 5},
                "gpio_mapping": [
                    {"event": "button_pressed", "port": 1, "pin": 4, "pull_up": true,
                     "deck": "scratch", "action": "record"},
                    {"bad": "entry"}
                ],
                "midi_mapping": [
                    {"type": "midi_note_on", "shifted": false, "channel": 0,
                     "parameter1": 64, "parameter2": 0, "deck": "scratch", "action": "cue"},
                    {"type": "midi_pb", "channel": 1, "parameter1": 0, "deck": "beats",
                     "action": "pitch"}
                ],
                "audio_interfaces": [
                    {"device": "hw:0", "input_channels": 2}
                ]
            }"#,
        );

        assert_eq!(config.settings.platter_speed, 4096);
        assert!(config.settings.platter_enabled);
        assert_eq!(config.settings.audio_interfaces.len(), 1);

        // The malformed GPIO entry is skipped, the rest survive
        assert_eq!(config.registry.len(), 3);
        assert!(config
            .registry
            .find_gpio(1, 4, EventType::ButtonPressed)
            .is_some());
        assert!(config
            .registry
            .find_midi(&MidiCommand::new(0x90, 64, 100), EventType::ButtonPressed)
            .is_some());
        // Pitch bend matches regardless of value bytes
        assert!(config
            .registry
            .find_midi(&MidiCommand::new(0xe1, 0x33, 0x44), EventType::ButtonPressed)
            .is_some());
    }

    #[test]
    fn all_note_ons_expand() {
        let config = parse_config(
            r#"{
                "midi_mapping": [
                    {"type": "midi_note_on", "channel": 2, "parameter1": 255,
                     "deck": "scratch", "action": "note"}
                ]
            }"#,
        );
        assert_eq!(config.registry.len(), 128);
        let idx = config
            .registry
            .find_midi(&MidiCommand::new(0x92, 0x40, 0x7f), EventType::ButtonPressed)
            .unwrap();
        assert_eq!(config.registry.get(idx).parameter, 0x40);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let config = parse_config("not json at all");
        assert_eq!(config.settings.period_size, 256);
        assert!(config.registry.is_empty());
    }
}
