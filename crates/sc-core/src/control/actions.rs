//! Action dispatch: routes a fired mapping to the target deck.

use std::sync::atomic::Ordering;

use sc_midi::MidiCommand;

use crate::audio::EngineHandle;
use crate::config::Settings;
use crate::engine::BeepType;
use crate::player::Deck;

use super::mapping::{ActionType, Mapping, MappingSource};

/// Global control-thread state shared across mappings.
#[derive(Debug, Default)]
pub struct InputState {
    pub shifted: bool,
    /// 0 = off, otherwise target deck number + 1
    pub pitch_mode: i32,
    pub jog_reverse: bool,
}

pub struct DispatchContext<'a> {
    pub decks: [&'a mut Deck; 2],
    pub engine: &'a EngineHandle,
    pub settings: &'a Settings,
    pub state: &'a mut InputState,
}

fn semitone_pitch(note: u8) -> f64 {
    2f64.powf((note as f64 - 0x3c as f64) / 12.0)
}

/// Cue label for a mapping: MIDI uses the note/CC number, GPIO gets a
/// per-pin label above the MIDI range.
fn cue_label(mapping: &Mapping) -> u32 {
    match mapping.source {
        MappingSource::Midi { command } => command.data1 as u32,
        MappingSource::Gpio { port, pin, .. } => (port as u32) * 32 + pin as u32 + 128,
    }
}

/// Execute a fired mapping. `midi` carries the live bytes for value-bearing
/// actions (volume, pitch).
pub fn dispatch_event(mapping: &Mapping, midi: Option<&MidiCommand>, ctx: &mut DispatchContext<'_>) {
    let deck = &mut *ctx.decks[mapping.deck_no];
    let input = &deck.player.input;

    match mapping.action {
        ActionType::Record => deck.record(ctx.engine),
        ActionType::LoopErase => {
            deck.erase_loop(ctx.engine);
            // Erase feedback reuses the error beep
            deck.player.input.request_beep(BeepType::RecordingError);
        }
        ActionType::LoopRecall => {
            if deck.recall_loop() {
                deck.player.input.request_beep(BeepType::RecordingStart);
            } else {
                deck.player.input.request_beep(BeepType::RecordingError);
            }
        }
        ActionType::Cue => deck.cue(cue_label(mapping), ctx.engine),
        ActionType::DeleteCue => deck.unset_cue(cue_label(mapping)),
        ActionType::Note => {
            let pitch = semitone_pitch(mapping.parameter);
            input.pitch_note.store(pitch, Ordering::Relaxed);
            log::debug!("note {} -> pitch {:.3}", mapping.parameter, pitch);
        }
        ActionType::Bend => {
            // Temporary bend on top of the other pitch factors
            input
                .pitch_bend
                .store(semitone_pitch(mapping.parameter), Ordering::Relaxed);
        }
        ActionType::StartStop => {
            let stopped = input.stopped.load(Ordering::Relaxed);
            input.stopped.store(!stopped, Ordering::Relaxed);
        }
        ActionType::ShiftOn => ctx.state.shifted = true,
        ActionType::ShiftOff => ctx.state.shifted = false,
        ActionType::NextFile => deck.next_file(ctx.engine),
        ActionType::PrevFile => deck.prev_file(ctx.engine),
        ActionType::RandomFile => deck.random_file(),
        ActionType::NextFolder => deck.next_folder(),
        ActionType::PrevFolder => deck.prev_folder(),
        ActionType::Volume => {
            if let Some(cmd) = midi {
                input
                    .volume_knob
                    .store(cmd.data2 as f64 / 128.0, Ordering::Relaxed);
            }
        }
        ActionType::Pitch => {
            if let Some(cmd) = midi {
                input
                    .pitch_fader
                    .store(pitch_from_midi(cmd, mapping.parameter, ctx.settings), Ordering::Relaxed);
            }
        }
        ActionType::JogPit => {
            ctx.state.pitch_mode = mapping.deck_no as i32 + 1;
            log::debug!("pitch mode {}", ctx.state.pitch_mode);
        }
        ActionType::JogPstop => ctx.state.pitch_mode = 0,
        ActionType::VolumeUp => adjust_volume(deck, ctx.settings.volume_amount),
        ActionType::VolumeDown => adjust_volume(deck, -ctx.settings.volume_amount),
        ActionType::VolumeUpHold => adjust_volume(deck, ctx.settings.volume_amount_held),
        ActionType::VolumeDownHold => adjust_volume(deck, -ctx.settings.volume_amount_held),
        ActionType::JogReverse => {
            ctx.state.jog_reverse = !ctx.state.jog_reverse;
            log::debug!("jog reverse -> {}", ctx.state.jog_reverse);
        }
        ActionType::Sc500 => log::debug!("sc500 strap detected"),
        ActionType::Gnd | ActionType::Nothing => {}
    }
}

fn adjust_volume(deck: &Deck, amount: f64) {
    let input = &deck.player.input;
    let volume = (input.volume_knob.load(Ordering::Relaxed) + amount).clamp(0.0, 1.0);
    input.volume_knob.store(volume, Ordering::Relaxed);
}

/// Pitch fader value from a MIDI message. A nonzero mapping parameter
/// selects semitone-range mode, otherwise the legacy percentage range
/// applies. Pitch bend carries 14 bits, CC 7 bits.
fn pitch_from_midi(cmd: &MidiCommand, semitone_range: u8, settings: &Settings) -> f64 {
    let normalized = if cmd.is_pitch_bend() {
        cmd.pitch_bend_normalized()
    } else {
        (cmd.data2 as f64 - 64.0) / 64.0
    };

    if semitone_range > 0 {
        let semitones = normalized * semitone_range as f64;
        2f64.powf(semitones / 12.0)
    } else {
        normalized * (settings.pitch_range as f64 / 100.0) + 1.0
    }
}
