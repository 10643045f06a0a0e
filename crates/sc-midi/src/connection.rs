//! midir-backed controller connections with hot-plug.
//!
//! Each connected port gets its own reader thread (inside midir) and its
//! own bounded queue, so every queue keeps a single producer. The input
//! thread polls all connections round-robin.

use midir::{Ignore, MidiInput, MidiInputConnection};
use midly::live::LiveEvent;
use thiserror::Error;

use crate::command::MidiCommand;
use crate::queue::{midi_event_queue, MidiEventReceiver};

#[derive(Debug, Error)]
pub enum MidiError {
    #[error("MIDI init failed: {0}")]
    Init(#[from] midir::InitError),
    #[error("failed to connect to {port}: {message}")]
    Connect { port: String, message: String },
}

pub struct MidiConnection {
    port_name: String,
    receiver: MidiEventReceiver,
    _connection: MidiInputConnection<()>,
}

impl MidiConnection {
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn poll(&mut self) -> Option<MidiCommand> {
        self.receiver.pop()
    }
}

/// All connected controllers.
#[derive(Default)]
pub struct MidiSystem {
    connections: Vec<MidiConnection>,
}

impl MidiSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connections(&self) -> &[MidiConnection] {
        &self.connections
    }

    /// Enumerate input ports and connect any we have not seen yet.
    /// Returns the number of newly connected ports.
    pub fn scan(&mut self) -> usize {
        let mut input = match MidiInput::new("sc1000") {
            Ok(i) => i,
            Err(e) => {
                log::warn!("MIDI enumeration failed: {e}");
                return 0;
            }
        };
        input.ignore(Ignore::None);

        let mut added = 0;
        for port in input.ports() {
            let name = match input.port_name(&port) {
                Ok(n) => n,
                Err(_) => continue,
            };
            // The ALSA loopback port would echo our own traffic
            if name.contains("Midi Through") {
                continue;
            }
            if self.connections.iter().any(|c| c.port_name == name) {
                continue;
            }
            match connect_port(&name, &port) {
                Ok(connection) => {
                    log::info!("MIDI device connected: {name}");
                    self.connections.push(connection);
                    added += 1;
                }
                Err(e) => log::warn!("{e}"),
            }
        }
        added
    }

    /// Drain one pending command, scanning connections round-robin.
    pub fn poll(&mut self) -> Option<MidiCommand> {
        for connection in &mut self.connections {
            if let Some(command) = connection.poll() {
                return Some(command);
            }
        }
        None
    }
}

fn connect_port(
    name: &str,
    port: &midir::MidiInputPort,
) -> Result<MidiConnection, MidiError> {
    let mut input = MidiInput::new("sc1000")?;
    input.ignore(Ignore::None);

    let (mut sender, receiver) = midi_event_queue();
    let connection = input
        .connect(
            port,
            "sc1000-in",
            move |_timestamp, message, _| {
                // Channel voice messages only; midly rejects malformed or
                // partial packets
                if matches!(LiveEvent::parse(message), Ok(LiveEvent::Midi { .. })) {
                    sender.push(MidiCommand::from_bytes(message).normalized());
                }
            },
            (),
        )
        .map_err(|e| MidiError::Connect {
            port: name.to_string(),
            message: e.to_string(),
        })?;

    Ok(MidiConnection {
        port_name: name.to_string(),
        receiver,
        _connection: connection,
    })
}
