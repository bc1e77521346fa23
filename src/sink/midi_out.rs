//! MIDI output sink - drives an external synthesizer over a MIDI port

use midir::{MidiOutput, MidiOutputConnection, MidiOutputPort};
use tracing::{debug, info, warn};

use super::{SinkError, SoundSink};
use crate::midi::{bank_bytes, format_hex, MidiMessage, CC_ALL_NOTES_OFF, CC_BANK_SELECT, CC_BANK_SELECT_LSB};
use crate::organ::CHANNELS;

/// Sends organ notes to the first output port whose name contains a pattern
pub struct MidiOutSink {
    port_pattern: String,
    conn: Option<MidiOutputConnection>,
}

impl MidiOutSink {
    pub fn new(port_pattern: impl Into<String>) -> Self {
        Self {
            port_pattern: port_pattern.into(),
            conn: None,
        }
    }

    /// Find an output port by case-insensitive substring match
    fn find_output_port(midi_out: &MidiOutput, pattern: &str) -> Option<(MidiOutputPort, String)> {
        let pattern = pattern.to_lowercase();
        for port in midi_out.ports() {
            if let Ok(name) = midi_out.port_name(&port) {
                if name.to_lowercase().contains(&pattern) {
                    debug!("Found port '{}' matching pattern '{}'", name, pattern);
                    return Some((port, name));
                }
            }
        }
        None
    }

    fn send(&mut self, message: MidiMessage) {
        let Some(conn) = self.conn.as_mut() else {
            debug!("MIDI output not connected, dropping {}", message);
            return;
        };
        let data = message.encode();
        match conn.send(&data) {
            Ok(()) => debug!("Sent: {} | {}", format_hex(&data), message),
            Err(e) => warn!("Failed to send {}: {}", message, e),
        }
    }
}

impl SoundSink for MidiOutSink {
    fn start(&mut self) -> Result<(), SinkError> {
        let midi_out =
            MidiOutput::new("organsound-output").map_err(|e| SinkError::Midi(e.to_string()))?;

        let (port, name) = Self::find_output_port(&midi_out, &self.port_pattern).ok_or_else(|| {
            SinkError::Midi(format!("output port '{}' not found", self.port_pattern))
        })?;

        info!("Connecting to MIDI output port: {}", name);
        let conn = midi_out
            .connect(&port, "organsound")
            .map_err(|e| SinkError::Midi(e.to_string()))?;
        self.conn = Some(conn);
        Ok(())
    }

    fn trigger_note(&mut self, channel: u8, note: u8, velocity: u8) {
        self.send(MidiMessage::NoteOn { channel, note, velocity });
    }

    fn release_note(&mut self, channel: u8, note: u8) {
        self.send(MidiMessage::NoteOff { channel, note, velocity: 0 });
    }

    fn select_program(&mut self, channel: u8, bank: u16, patch: u8) {
        let (msb, lsb) = bank_bytes(bank);
        self.send(MidiMessage::ControlChange { channel, cc: CC_BANK_SELECT, value: msb });
        self.send(MidiMessage::ControlChange { channel, cc: CC_BANK_SELECT_LSB, value: lsb });
        self.send(MidiMessage::ProgramChange { channel, program: patch });
    }

    fn shutdown(&mut self) -> Result<(), SinkError> {
        for channel in CHANNELS {
            self.send(MidiMessage::ControlChange { channel, cc: CC_ALL_NOTES_OFF, value: 0 });
        }
        if let Some(conn) = self.conn.take() {
            conn.close();
            info!("MIDI output disconnected");
        }
        Ok(())
    }
}
