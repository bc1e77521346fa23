//! Edge detection between successive commits
//!
//! Each commit compares the aggregate key state and the stop state with the
//! previous commit and turns every rising or falling edge into note commands.
//! The key pass always runs before the stop pass. When a key and a stop change
//! in the same batch the two passes can send the same command twice; sinks
//! treat repeats as harmless.

use tracing::debug;

use super::keys::{active_keys, KeyMap, KeyStateAggregator, NUM_KEYS};
use super::profile::{InstrumentProfile, Stop};
use super::stops::StopRegister;
use crate::sink::SoundSink;

/// Pitch offset and velocity applied to the notes of one commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voicing {
    pub transpose: i32,
    pub velocity: u8,
}

/// Number of note commands issued by a commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub triggered: usize,
    pub released: usize,
}

impl CommitSummary {
    pub fn is_empty(&self) -> bool {
        self.triggered == 0 && self.released == 0
    }
}

/// Remembers the state seen by the previous commit
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    prev_keys: KeyMap,
    prev_stops: Vec<bool>,
}

impl ChangeDetector {
    pub fn new(num_stops: usize) -> Self {
        Self {
            prev_keys: [false; NUM_KEYS],
            prev_stops: vec![false; num_stops],
        }
    }

    /// Forget stop history after an instrument change
    pub fn reset_stops(&mut self, num_stops: usize) {
        self.prev_stops = vec![false; num_stops];
    }

    fn was_on(&self, stop: usize) -> bool {
        self.prev_stops.get(stop).copied().unwrap_or(false)
    }

    /// Keys that were held at the last commit
    pub fn sounding_keys(&self) -> impl Iterator<Item = u8> + '_ {
        active_keys().filter(|k| self.prev_keys[*k as usize])
    }

    /// Reconcile current state against the previous commit and drive `sink`
    pub fn commit<S: SoundSink + ?Sized>(
        &mut self,
        keys: &KeyStateAggregator,
        stops: &StopRegister,
        profile: &InstrumentProfile,
        voicing: Voicing,
        sink: &mut S,
    ) -> CommitSummary {
        let current = keys.aggregate();
        let mut summary = CommitSummary::default();

        // Key edges. A released key is silenced on every stop that was drawn
        // at either commit, so a stop pushed in during the same batch can't
        // leave it hanging.
        for key in active_keys() {
            let k = key as usize;
            if current[k] == self.prev_keys[k] {
                continue;
            }
            for stop in profile.stops() {
                if current[k] {
                    if stops.is_on(stop.index) {
                        summary.triggered += trigger(sink, stop, key, voicing);
                    }
                } else if stops.is_on(stop.index) || self.was_on(stop.index) {
                    summary.released += release(sink, stop, key, voicing);
                }
            }
        }

        // Stop edges, applied to every held key
        for stop in profile.stops() {
            let now = stops.is_on(stop.index);
            let before = self.was_on(stop.index);
            if now == before {
                continue;
            }
            for key in active_keys().filter(|k| current[*k as usize]) {
                if now {
                    summary.triggered += trigger(sink, stop, key, voicing);
                } else {
                    summary.released += release(sink, stop, key, voicing);
                }
            }
        }

        self.prev_keys = current;
        self.prev_stops = stops.states().to_vec();
        summary
    }
}

/// Transposed note number, if it is still a valid MIDI note
fn transposed(key: u8, transpose: i32) -> Option<u8> {
    i32::from(key)
        .checked_add(transpose)
        .and_then(|note| u8::try_from(note).ok())
        .filter(|note| *note < NUM_KEYS as u8)
}

fn trigger<S: SoundSink + ?Sized>(sink: &mut S, stop: &Stop, key: u8, voicing: Voicing) -> usize {
    match transposed(key, voicing.transpose) {
        Some(note) => {
            debug!(channel = stop.channel, note, stop = %stop.name, "Start note");
            sink.trigger_note(stop.channel, note, voicing.velocity);
            1
        }
        None => {
            debug!(key, transpose = voicing.transpose, "Transposed note out of range, not started");
            0
        }
    }
}

fn release<S: SoundSink + ?Sized>(sink: &mut S, stop: &Stop, key: u8, voicing: Voicing) -> usize {
    match transposed(key, voicing.transpose) {
        Some(note) => {
            debug!(channel = stop.channel, note, stop = %stop.name, "Stop note");
            sink.release_note(stop.channel, note);
            1
        }
        None => 0,
    }
}
