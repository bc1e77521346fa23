//! Tone generator back ends
//!
//! The organ engine drives a [`SoundSink`]. Note commands are fire-and-forget:
//! a sink logs its own delivery problems instead of reporting them back, and
//! must tolerate duplicate triggers and releases of the same note.

pub mod console;
pub mod midi_out;
pub mod soundfont;

use std::path::{Path, PathBuf};
use thiserror::Error;

pub use console::{ConsoleSink, SinkCommand};
pub use midi_out::MidiOutSink;
pub use soundfont::SoundfontSink;

/// Errors from sink lifecycle operations
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("audio output unavailable: {0}")]
    Audio(String),

    #[error("failed to load soundfont {}: {reason}", .path.display())]
    Soundfont { path: PathBuf, reason: String },

    #[error("MIDI output error: {0}")]
    Midi(String),
}

/// Capability interface of a polyphonic tone generator
pub trait SoundSink {
    /// Open the output. Called once before any other command.
    fn start(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Load the instrument soundfont at the given output gain
    fn load_soundfont(&mut self, path: &Path, gain: f32) -> Result<(), SinkError> {
        let _ = (path, gain);
        Ok(())
    }

    /// Start (or restart) a note
    fn trigger_note(&mut self, channel: u8, note: u8, velocity: u8);

    /// Stop a note; releasing a silent note is harmless
    fn release_note(&mut self, channel: u8, note: u8);

    fn select_program(&mut self, channel: u8, bank: u16, patch: u8);

    /// Close the output. Callers silence everything first.
    fn shutdown(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<S: SoundSink + ?Sized> SoundSink for Box<S> {
    fn start(&mut self) -> Result<(), SinkError> {
        (**self).start()
    }

    fn load_soundfont(&mut self, path: &Path, gain: f32) -> Result<(), SinkError> {
        (**self).load_soundfont(path, gain)
    }

    fn trigger_note(&mut self, channel: u8, note: u8, velocity: u8) {
        (**self).trigger_note(channel, note, velocity)
    }

    fn release_note(&mut self, channel: u8, note: u8) {
        (**self).release_note(channel, note)
    }

    fn select_program(&mut self, channel: u8, bank: u16, patch: u8) {
        (**self).select_program(channel, bank, patch)
    }

    fn shutdown(&mut self) -> Result<(), SinkError> {
        (**self).shutdown()
    }
}
