//! Console sink - logs every command and tracks what would be sounding
//!
//! Useful for:
//! - Running the server without audio hardware
//! - Checking stop/channel assignments from the log
//! - Tests that assert on the notes reaching the tone generator

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{SinkError, SoundSink};

/// A command as received by the sink
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCommand {
    Trigger { channel: u8, note: u8, velocity: u8 },
    Release { channel: u8, note: u8 },
    Program { channel: u8, bank: u16, patch: u8 },
    LoadSoundfont { path: PathBuf, gain: f32 },
}

/// Sink that records commands instead of making sound
#[derive(Debug, Default)]
pub struct ConsoleSink {
    started: bool,
    history: Vec<SinkCommand>,
    /// Sounding (channel, note) pairs and their velocity
    sounding: BTreeMap<(u8, u8), u8>,
    /// (bank, patch) selected per channel
    programs: BTreeMap<u8, (u16, u8)>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn history(&self) -> &[SinkCommand] {
        &self.history
    }

    /// Drain the recorded commands
    pub fn take_history(&mut self) -> Vec<SinkCommand> {
        std::mem::take(&mut self.history)
    }

    /// Sounding notes as (channel, note) pairs, in order
    pub fn sounding(&self) -> Vec<(u8, u8)> {
        self.sounding.keys().copied().collect()
    }

    /// Velocity a sounding note was (last) started with
    pub fn velocity_of(&self, channel: u8, note: u8) -> Option<u8> {
        self.sounding.get(&(channel, note)).copied()
    }

    pub fn program(&self, channel: u8) -> Option<(u16, u8)> {
        self.programs.get(&channel).copied()
    }
}

impl SoundSink for ConsoleSink {
    fn start(&mut self) -> Result<(), SinkError> {
        self.started = true;
        info!("🔌 Console sink started");
        Ok(())
    }

    fn load_soundfont(&mut self, path: &Path, gain: f32) -> Result<(), SinkError> {
        info!("Console sink: soundfont {} (gain {})", path.display(), gain);
        // A real synth starts from scratch with a new soundfont
        self.sounding.clear();
        self.programs.clear();
        self.history.push(SinkCommand::LoadSoundfont {
            path: path.to_path_buf(),
            gain,
        });
        Ok(())
    }

    fn trigger_note(&mut self, channel: u8, note: u8, velocity: u8) {
        debug!(channel, note, velocity, "🎵 Note on");
        self.sounding.insert((channel, note), velocity);
        self.history.push(SinkCommand::Trigger {
            channel,
            note,
            velocity,
        });
    }

    fn release_note(&mut self, channel: u8, note: u8) {
        debug!(channel, note, "Note off");
        self.sounding.remove(&(channel, note));
        self.history.push(SinkCommand::Release { channel, note });
    }

    fn select_program(&mut self, channel: u8, bank: u16, patch: u8) {
        info!("Console sink: channel {} → bank {} patch {}", channel, bank, patch);
        self.programs.insert(channel, (bank, patch));
        self.history.push(SinkCommand::Program {
            channel,
            bank,
            patch,
        });
    }

    fn shutdown(&mut self) -> Result<(), SinkError> {
        info!(
            "Console sink shut down ({} commands, {} notes still sounding)",
            self.history.len(),
            self.sounding.len()
        );
        self.started = false;
        Ok(())
    }
}
