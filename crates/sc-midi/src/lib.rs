//! MIDI controller support for the SC1000.
//!
//! Raw controller bytes are parsed on midir's reader thread, normalized
//! into [`MidiCommand`]s and pushed onto a bounded lock-free queue per
//! connection; the input thread drains the queues and dispatches mapped
//! actions.

pub mod command;
pub mod connection;
pub mod queue;

pub use command::MidiCommand;
pub use connection::{MidiConnection, MidiError, MidiSystem};
pub use queue::{midi_event_queue, MidiEventReceiver, MidiEventSender, MIDI_QUEUE_CAPACITY};
