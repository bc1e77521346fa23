//! Instrument profiles: which stops a mode offers and where they sound

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Synth channels available to stops, in assignment order (channel 9 is left to drums)
pub const CHANNELS: [u8; 15] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 12, 13, 14, 15];

/// Bank used for every program select
pub const DEFAULT_BANK: u16 = 0;

/// Errors raised while building an instrument profile
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    #[error("no instrument modes are configured")]
    NoModes,

    #[error("instrument mode {index} is not configured ({count} modes available)")]
    UnknownMode { index: usize, count: usize },

    #[error("instrument mode '{0}' has no instrument section")]
    MissingInstrument(String),

    #[error("instrument '{mode}' declares {declared} stops but only {available} channels are available")]
    TooManyStops {
        mode: String,
        declared: usize,
        available: usize,
    },

    #[error("instrument '{mode}' declares {declared} stops but only defines {defined}")]
    MissingStops {
        mode: String,
        declared: usize,
        defined: usize,
    },
}

/// A selectable voice, bound to one synth channel and one patch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stop {
    pub index: usize,
    pub channel: u8,
    pub patch: u8,
    pub name: String,
}

/// Everything needed to voice one instrument mode
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentProfile {
    mode: String,
    soundfont: PathBuf,
    gain: f32,
    stops: Vec<Stop>,
}

impl InstrumentProfile {
    /// Build a profile from `(patch, name)` pairs.
    ///
    /// `declared` is the stop count the configuration asks for; it defaults to
    /// the number of pairs given. Extra pairs beyond the declared count are
    /// ignored. Fails when the declared count exceeds [`CHANNELS`] or when fewer
    /// pairs than declared are supplied.
    pub fn build<I>(
        mode: &str,
        soundfont: impl Into<PathBuf>,
        gain: f32,
        declared: Option<usize>,
        stops: I,
    ) -> Result<Self, ProfileError>
    where
        I: IntoIterator<Item = (u8, String)>,
    {
        let defined: Vec<(u8, String)> = stops.into_iter().collect();
        let declared = declared.unwrap_or(defined.len());

        if declared > CHANNELS.len() {
            return Err(ProfileError::TooManyStops {
                mode: mode.to_string(),
                declared,
                available: CHANNELS.len(),
            });
        }
        if defined.len() < declared {
            return Err(ProfileError::MissingStops {
                mode: mode.to_string(),
                declared,
                defined: defined.len(),
            });
        }

        let stops = defined
            .into_iter()
            .take(declared)
            .enumerate()
            .map(|(index, (patch, name))| Stop {
                index,
                channel: CHANNELS[index],
                patch,
                name,
            })
            .collect();

        Ok(Self {
            mode: mode.to_string(),
            soundfont: soundfont.into(),
            gain,
            stops,
        })
    }

    /// Profile with no stops, used before the first instrument is loaded
    pub fn silent() -> Self {
        Self {
            mode: String::new(),
            soundfont: PathBuf::new(),
            gain: 0.0,
            stops: Vec::new(),
        }
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn soundfont(&self) -> &Path {
        &self.soundfont
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn stops(&self) -> &[Stop] {
        &self.stops
    }

    pub fn stop(&self, index: usize) -> Option<&Stop> {
        self.stops.get(index)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.len()
    }
}

/// Source of instrument profiles, one per configured mode
pub trait ProfileSource {
    fn mode_count(&self) -> usize;

    fn mode_name(&self, index: usize) -> Option<&str>;

    /// Build the profile for mode `index`
    fn load_profile(&self, index: usize) -> Result<InstrumentProfile, ProfileError>;
}
