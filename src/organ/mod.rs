//! Organ engine - turns key and stop state into synth note commands
//!
//! Input events mutate the key and stop state; nothing sounds until
//! [`Organ::commit`] reconciles that state with the previous commit and
//! sends the resulting note commands to the [`SoundSink`].
//!
//! The engine is single-threaded. Callers that receive events from several
//! sources serialize them into one queue before they reach the organ.

mod diff;
mod keys;
mod profile;
mod stops;

#[cfg(test)]
mod tests;

pub use diff::{ChangeDetector, CommitSummary, Voicing};
pub use keys::{
    active_keys, is_active_key, KeyMap, KeySnapshot, KeyStateAggregator, FIRST_KEY, LAST_KEY,
    NUM_KEYS,
};
pub use profile::{InstrumentProfile, ProfileError, ProfileSource, Stop, CHANNELS, DEFAULT_BANK};
pub use stops::StopRegister;

use thiserror::Error;
use tracing::{debug, info};

use crate::sink::{SinkError, SoundSink};

/// Velocity used until `set_volume` is called
pub const DEFAULT_VOLUME: u8 = 127;

/// Highest MIDI velocity
pub const MAX_VOLUME: u8 = 127;

/// Errors surfaced by the organ engine
#[derive(Debug, Error)]
pub enum OrganError {
    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl OrganError {
    /// Whether the organ is unusable after this error
    pub fn is_fatal(&self) -> bool {
        !matches!(self, OrganError::Profile(ProfileError::UnknownMode { .. }))
    }
}

/// Organ console engine driving one sound sink
pub struct Organ<S: SoundSink> {
    sink: S,
    profiles: Box<dyn ProfileSource>,
    keys: KeyStateAggregator,
    stops: StopRegister,
    detector: ChangeDetector,
    profile: InstrumentProfile,
    mode_index: usize,
    transpose: i32,
    volume: u8,
}

impl<S: SoundSink> Organ<S> {
    /// Start the sink and load the first instrument mode.
    ///
    /// Fails if there is no mode, the sink cannot start or the first profile
    /// is invalid; no note can be played in any of these cases.
    pub fn new(
        mut sink: S,
        profiles: Box<dyn ProfileSource>,
        num_keyboards: usize,
    ) -> Result<Self, OrganError> {
        if profiles.mode_count() == 0 {
            return Err(ProfileError::NoModes.into());
        }
        sink.start()?;

        let mut organ = Self {
            sink,
            profiles,
            keys: KeyStateAggregator::new(num_keyboards),
            stops: StopRegister::default(),
            detector: ChangeDetector::new(0),
            profile: InstrumentProfile::silent(),
            mode_index: 0,
            transpose: 0,
            volume: DEFAULT_VOLUME,
        };
        organ.set_instrument(0)?;
        Ok(organ)
    }

    pub fn key_down(&mut self, manual: usize, key: u8) {
        debug!(manual, key, "Key down");
        self.keys.key_down(manual, key);
    }

    pub fn key_up(&mut self, manual: usize, key: u8) {
        debug!(manual, key, "Key up");
        self.keys.key_up(manual, key);
    }

    pub fn stop_on(&mut self, stop: usize) {
        if let Some(s) = self.profile.stop(stop) {
            debug!(stop, patch = s.patch, name = %s.name, "Stop on");
        }
        self.stops.stop_on(stop);
    }

    pub fn stop_off(&mut self, stop: usize) {
        if let Some(s) = self.profile.stop(stop) {
            debug!(stop, patch = s.patch, name = %s.name, "Stop off");
        }
        self.stops.stop_off(stop);
    }

    pub fn toggle_stop(&mut self, stop: usize) {
        if self.stops.is_on(stop) {
            self.stop_off(stop);
        } else {
            self.stop_on(stop);
        }
    }

    /// Release every key and push in every stop. Takes effect at the next commit.
    pub fn all_off(&mut self) {
        self.keys.clear();
        self.stops.clear();
    }

    /// Reconcile the buffered state changes into note commands
    pub fn commit(&mut self) -> CommitSummary {
        let voicing = Voicing {
            transpose: self.transpose,
            velocity: self.volume,
        };
        let summary = self.detector.commit(
            &self.keys,
            &self.stops,
            &self.profile,
            voicing,
            &mut self.sink,
        );
        if !summary.is_empty() {
            debug!(
                triggered = summary.triggered,
                released = summary.released,
                "Commit"
            );
        }
        summary
    }

    /// Switch to instrument mode `index`.
    ///
    /// Everything is silenced under the old profile first. The new profile's
    /// stops all start off and each stop's program is selected once.
    pub fn set_instrument(&mut self, index: usize) -> Result<(), OrganError> {
        let count = self.profiles.mode_count();
        if index >= count {
            return Err(ProfileError::UnknownMode { index, count }.into());
        }

        self.all_off();
        self.commit();

        let profile = self.profiles.load_profile(index)?;
        info!(
            "Loading instrument '{}' ({} stops from {}, gain {})",
            profile.mode(),
            profile.stop_count(),
            profile.soundfont().display(),
            profile.gain()
        );
        self.sink.load_soundfont(profile.soundfont(), profile.gain())?;

        for stop in profile.stops() {
            self.sink.select_program(stop.channel, DEFAULT_BANK, stop.patch);
            debug!(
                "Configured stop {} to use patch {} ({})",
                stop.index, stop.patch, stop.name
            );
        }

        self.stops.reset(profile.stop_count());
        self.detector.reset_stops(profile.stop_count());
        self.profile = profile;
        self.mode_index = index;
        Ok(())
    }

    /// Set the pitch offset in semitones.
    ///
    /// Held notes are released under the old offset right away; the keys stay
    /// held and sound again at the new pitch on the next commit.
    pub fn transpose(&mut self, amount: i32) {
        debug!(amount, "Transpose");
        let held = self.keys.snapshot();
        self.keys.clear();
        self.commit();
        self.keys.restore(held);
        self.transpose = amount;
    }

    /// Velocity for notes started from now on; sounding notes are untouched
    pub fn set_volume(&mut self, velocity: u8) {
        self.volume = velocity.min(MAX_VOLUME);
        debug!(volume = self.volume, "Volume changed");
    }

    /// Silence everything and close the sink
    pub fn shutdown(&mut self) -> Result<(), OrganError> {
        self.all_off();
        self.commit();
        self.sink.shutdown()?;
        info!("Organ sound output closed");
        Ok(())
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn profile(&self) -> &InstrumentProfile {
        &self.profile
    }

    pub fn mode_index(&self) -> usize {
        self.mode_index
    }

    pub fn mode_count(&self) -> usize {
        self.profiles.mode_count()
    }

    pub fn transpose_amount(&self) -> i32 {
        self.transpose
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn num_keyboards(&self) -> usize {
        self.keys.num_manuals()
    }

    pub fn stop_states(&self) -> &[bool] {
        self.stops.states()
    }

    /// Keys held on any manual right now (not yet necessarily committed)
    pub fn held_keys(&self) -> Vec<u8> {
        let agg = self.keys.aggregate();
        active_keys().filter(|k| agg[*k as usize]).collect()
    }

    /// Keys that were sounding at the last commit
    pub fn sounding_keys(&self) -> Vec<u8> {
        self.detector.sounding_keys().collect()
    }
}
