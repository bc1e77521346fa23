//! MIDI input transport - manuals wired straight to a MIDI port

use anyhow::{Context, Result};
use midir::{MidiInput, MidiInputConnection, MidiInputPort};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{Inbound, OrganEvent};
use crate::midi::{format_hex, MidiMessage};

/// Map a MIDI message from a manual to an organ event
pub fn note_event(manual: usize, message: &MidiMessage) -> Option<OrganEvent> {
    match *message {
        MidiMessage::NoteOn { note, velocity, .. } => Some(OrganEvent::Note {
            manual: manual as i64,
            note: note as i64,
            velocity: velocity as i64,
        }),
        MidiMessage::NoteOff { note, .. } => Some(OrganEvent::Note {
            manual: manual as i64,
            note: note as i64,
            velocity: 0,
        }),
        _ => None,
    }
}

/// Open connection from one manual's MIDI port
pub struct MidiManualInput {
    _conn: MidiInputConnection<()>,
    port_name: String,
    manual: usize,
}

impl MidiManualInput {
    /// Find an input port by case-insensitive substring match
    fn find_input_port(midi_in: &MidiInput, pattern: &str) -> Option<(MidiInputPort, String)> {
        let pattern = pattern.to_lowercase();
        for port in midi_in.ports() {
            if let Ok(name) = midi_in.port_name(&port) {
                if name.to_lowercase().contains(&pattern) {
                    debug!("Found port '{}' matching pattern '{}'", name, pattern);
                    return Some((port, name));
                }
            }
        }
        None
    }

    /// Connect `manual` to the first input port matching `pattern`
    pub fn connect(pattern: &str, manual: usize, tx: mpsc::Sender<Inbound>) -> Result<Self> {
        let midi_in = MidiInput::new("organsound-input").context("Failed to create MIDI input")?;

        let (port, port_name) = Self::find_input_port(&midi_in, pattern)
            .ok_or_else(|| anyhow::anyhow!("Input port '{}' not found", pattern))?;

        info!("Connecting manual {} to input port: {}", manual, port_name);

        let conn = midi_in
            .connect(
                &port,
                "organsound-manual",
                move |_timestamp, data, _| {
                    let Some(message) = MidiMessage::parse(data) else {
                        debug!("Ignoring MIDI: {}", format_hex(data));
                        return;
                    };
                    if let Some(event) = note_event(manual, &message) {
                        // Don't block the MIDI thread; drop on overflow
                        if let Err(e) = tx.try_send(Inbound::Events(vec![event])) {
                            warn!("Dropping manual {} event: {}", manual, e);
                        }
                    }
                },
                (),
            )
            .map_err(|e| anyhow::anyhow!("Failed to connect to input port '{}': {}", port_name, e))?;

        Ok(Self {
            _conn: conn,
            port_name,
            manual,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn manual(&self) -> usize {
        self.manual
    }
}
