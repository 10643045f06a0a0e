//! Bounded lock-free SPSC queue carrying parsed MIDI commands from a
//! controller's reader thread to the input thread.

use crate::command::MidiCommand;

/// Fixed queue capacity; the queue never grows.
pub const MIDI_QUEUE_CAPACITY: usize = 64;

pub struct MidiEventSender {
    producer: rtrb::Producer<MidiCommand>,
    dropped: u64,
}

pub struct MidiEventReceiver {
    consumer: rtrb::Consumer<MidiCommand>,
}

/// Create a bounded command queue.
pub fn midi_event_queue() -> (MidiEventSender, MidiEventReceiver) {
    let (producer, consumer) = rtrb::RingBuffer::new(MIDI_QUEUE_CAPACITY);
    (
        MidiEventSender {
            producer,
            dropped: 0,
        },
        MidiEventReceiver { consumer },
    )
}

impl MidiEventSender {
    /// Push a command; a full queue drops the event with a warning.
    pub fn push(&mut self, command: MidiCommand) {
        if self.producer.push(command).is_err() {
            self.dropped += 1;
            log::warn!(
                "MIDI queue full, dropping event {:02x} {:02x} {:02x} ({} dropped)",
                command.status,
                command.data1,
                command.data2,
                self.dropped
            );
        }
    }
}

impl MidiEventReceiver {
    pub fn pop(&mut self) -> Option<MidiCommand> {
        self.consumer.pop().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_delivers_in_order() {
        let (mut tx, mut rx) = midi_event_queue();
        tx.push(MidiCommand::new(0x90, 1, 100));
        tx.push(MidiCommand::new(0x80, 1, 0));

        assert_eq!(rx.pop().unwrap().status, 0x90);
        assert_eq!(rx.pop().unwrap().status, 0x80);
        assert!(rx.pop().is_none());
    }

    #[test]
    fn full_queue_drops_instead_of_growing() {
        let (mut tx, mut rx) = midi_event_queue();
        for i in 0..(MIDI_QUEUE_CAPACITY + 10) as u8 {
            tx.push(MidiCommand::new(0xb0, i, 0));
        }

        let mut drained = 0;
        while rx.pop().is_some() {
            drained += 1;
        }
        assert_eq!(drained, MIDI_QUEUE_CAPACITY);
    }
}
