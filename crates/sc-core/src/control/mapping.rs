//! Input mappings with indexed lookup.
//!
//! The registry owns the configured mappings in a contiguous vector, with
//! two hash indices for O(1) lookup: `(port, pin, edge)` for GPIO and the
//! MIDI command key (status-only for pitch bend, status+data1 otherwise).
//! Per-button runtime state lives in a vector parallel to the mappings.

use std::collections::HashMap;

use sc_midi::MidiCommand;
use serde::Deserialize;

/// Which edge of a control fires a mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ButtonPressed,
    ButtonPressedShifted,
    ButtonReleased,
    ButtonHolding,
    ButtonHoldingShifted,
}

/// Everything a mapping can do to a deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Cue,
    DeleteCue,
    Note,
    StartStop,
    ShiftOn,
    ShiftOff,
    NextFile,
    PrevFile,
    RandomFile,
    NextFolder,
    PrevFolder,
    Volume,
    Pitch,
    JogPit,
    JogPstop,
    VolumeUp,
    VolumeDown,
    VolumeUpHold,
    VolumeDownHold,
    JogReverse,
    Bend,
    Record,
    LoopErase,
    LoopRecall,
    Sc500,
    Gnd,
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingSource {
    Gpio { port: u8, pin: u8, pullup: bool },
    Midi { command: MidiCommand },
}

/// One configured binding, immutable after load.
#[derive(Debug, Clone, Copy)]
pub struct Mapping {
    pub source: MappingSource,
    pub edge: EventType,
    pub deck_no: usize,
    pub action: ActionType,
    pub parameter: u8,
}

/// Runtime state of a mapped button, parallel to the mapping vector.
#[derive(Debug, Clone, Copy, Default)]
pub struct ButtonState {
    /// 0 idle; counting up through debounce and hold while pressed;
    /// negative while debouncing the release edge
    pub debounce: i32,
    pub shifted_at_press: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GpioKey {
    port: u8,
    pin: u8,
    edge: EventType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MidiKey {
    command: MidiCommand,
    edge: EventType,
}

#[derive(Default)]
pub struct MappingRegistry {
    mappings: Vec<Mapping>,
    buttons: Vec<ButtonState>,
    gpio_index: HashMap<GpioKey, usize>,
    midi_index: HashMap<MidiKey, usize>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, mapping: Mapping) {
        let idx = self.mappings.len();
        match mapping.source {
            MappingSource::Gpio { port, pin, .. } => {
                self.gpio_index.insert(
                    GpioKey {
                        port,
                        pin,
                        edge: mapping.edge,
                    },
                    idx,
                );
            }
            MappingSource::Midi { command } => {
                // Stored raw: a note-on binding is configured with zero
                // velocity and must not collapse into its note-off
                self.midi_index.insert(
                    MidiKey {
                        command,
                        edge: mapping.edge,
                    },
                    idx,
                );
            }
        }
        self.mappings.push(mapping);
        self.buttons.push(ButtonState::default());
    }

    pub fn clear(&mut self) {
        self.mappings.clear();
        self.buttons.clear();
        self.gpio_index.clear();
        self.midi_index.clear();
    }

    pub fn find_gpio(&self, port: u8, pin: u8, edge: EventType) -> Option<usize> {
        self.gpio_index.get(&GpioKey { port, pin, edge }).copied()
    }

    /// Look up a MIDI command. Note-on with velocity zero is normalized to
    /// note-off before the lookup.
    pub fn find_midi(&self, command: &MidiCommand, edge: EventType) -> Option<usize> {
        self.midi_index
            .get(&MidiKey {
                command: command.normalized(),
                edge,
            })
            .copied()
    }

    pub fn get(&self, idx: usize) -> &Mapping {
        &self.mappings[idx]
    }

    pub fn button_mut(&mut self, idx: usize) -> &mut ButtonState {
        &mut self.buttons[idx]
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Indices of all GPIO mappings, for the input scan.
    pub fn gpio_indices(&self) -> Vec<usize> {
        self.mappings
            .iter()
            .enumerate()
            .filter(|(_, m)| matches!(m.source, MappingSource::Gpio { .. }))
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gpio(port: u8, pin: u8, edge: EventType, action: ActionType) -> Mapping {
        Mapping {
            source: MappingSource::Gpio {
                port,
                pin,
                pullup: true,
            },
            edge,
            deck_no: 1,
            action,
            parameter: 0,
        }
    }

    #[test]
    fn gpio_lookup_is_keyed_on_port_pin_edge() {
        let mut registry = MappingRegistry::new();
        registry.add(gpio(1, 4, EventType::ButtonPressed, ActionType::Record));
        registry.add(gpio(1, 4, EventType::ButtonHolding, ActionType::LoopErase));

        let pressed = registry.find_gpio(1, 4, EventType::ButtonPressed).unwrap();
        assert_eq!(registry.get(pressed).action, ActionType::Record);

        let held = registry.find_gpio(1, 4, EventType::ButtonHolding).unwrap();
        assert_eq!(registry.get(held).action, ActionType::LoopErase);

        assert!(registry.find_gpio(2, 4, EventType::ButtonPressed).is_none());
        assert!(registry.find_gpio(1, 5, EventType::ButtonPressed).is_none());
    }

    #[test]
    fn midi_lookup_normalizes_note_off() {
        let mut registry = MappingRegistry::new();
        registry.add(Mapping {
            source: MappingSource::Midi {
                command: MidiCommand::new(0x80, 0x40, 0),
            },
            edge: EventType::ButtonPressed,
            deck_no: 0,
            action: ActionType::StartStop,
            parameter: 0,
        });

        // A note-on with velocity zero resolves to the note-off mapping
        let idx = registry
            .find_midi(&MidiCommand::new(0x90, 0x40, 0), EventType::ButtonPressed)
            .unwrap();
        assert_eq!(registry.get(idx).action, ActionType::StartStop);

        assert!(registry
            .find_midi(&MidiCommand::new(0x90, 0x40, 0x50), EventType::ButtonPressed)
            .is_none());
    }

    #[test]
    fn button_state_is_parallel_to_mappings() {
        let mut registry = MappingRegistry::new();
        registry.add(gpio(0, 1, EventType::ButtonPressed, ActionType::Cue));
        registry.button_mut(0).debounce = 7;
        assert_eq!(registry.button_mut(0).debounce, 7);
        assert_eq!(registry.gpio_indices(), vec![0]);
    }
}
