//! MIDI channel messages used by the organ
//!
//! Parses note messages coming from manuals and encodes the note, bank and
//! program messages sent to an external tone generator.

use std::fmt;

/// Bank select, most significant byte
pub const CC_BANK_SELECT: u8 = 0x00;

/// Bank select, least significant byte
pub const CC_BANK_SELECT_LSB: u8 = 0x20;

/// All notes off (channel mode message)
pub const CC_ALL_NOTES_OFF: u8 = 0x7B;

/// MIDI channel messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (1-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Program Change: channel (0-15), program (0-127)
    ProgramChange { channel: u8, program: u8 },
}

impl MidiMessage {
    /// Parse a channel message from raw bytes. Other messages yield `None`.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let (&status, rest) = data.split_first()?;
        if !(0x80..0xF0).contains(&status) {
            return None;
        }
        let channel = status & 0x0F;

        match status & 0xF0 {
            0x80 => {
                let [note, velocity, ..] = *rest else { return None };
                Some(MidiMessage::NoteOff {
                    channel,
                    note: note & 0x7F,
                    velocity: velocity & 0x7F,
                })
            }
            0x90 => {
                // Note On with velocity 0 is a Note Off
                let [note, velocity, ..] = *rest else { return None };
                let (note, velocity) = (note & 0x7F, velocity & 0x7F);
                if velocity == 0 {
                    Some(MidiMessage::NoteOff { channel, note, velocity: 0 })
                } else {
                    Some(MidiMessage::NoteOn { channel, note, velocity })
                }
            }
            0xB0 => {
                let [cc, value, ..] = *rest else { return None };
                Some(MidiMessage::ControlChange {
                    channel,
                    cc: cc & 0x7F,
                    value: value & 0x7F,
                })
            }
            0xC0 => {
                let &program = rest.first()?;
                Some(MidiMessage::ProgramChange {
                    channel,
                    program: program & 0x7F,
                })
            }
            _ => None,
        }
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                vec![0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                vec![0xB0 | (channel & 0x0F), cc & 0x7F, value & 0x7F]
            }
            MidiMessage::ProgramChange { channel, program } => {
                vec![0xC0 | (channel & 0x0F), program & 0x7F]
            }
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::ProgramChange { channel, program } => {
                write!(f, "ProgramChange ch:{} p:{}", channel + 1, program)
            }
        }
    }
}

/// Split a 14-bit bank number into (MSB, LSB) controller values
pub fn bank_bytes(bank: u16) -> (u8, u8) {
    (((bank >> 7) & 0x7F) as u8, (bank & 0x7F) as u8)
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
