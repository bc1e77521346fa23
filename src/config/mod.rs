//! Configuration management for the organ sound server
//!
//! Handles loading, parsing and validating the YAML console configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::organ::{InstrumentProfile, ProfileError, ProfileSource};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub global: GlobalConfig,
    pub local: LocalConfig,
    pub consoles: Vec<ConsoleConfig>,
    #[serde(default)]
    pub synth: SynthConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manuals: Vec<ManualInputConfig>,
}

/// Settings shared by every console of the organ
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Number of manuals feeding the aggregate key state
    pub num_keyboards: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt: Option<MqttConfig>,
}

/// MQTT broker connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_broker")]
    pub broker: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
}

/// Settings for the machine this server runs on
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalConfig {
    /// Index of the console section this server voices
    pub this_console: u32,
}

/// One console: its topic and instrument modes
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ConsoleConfig {
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Mode names, in the order `M <mode>` selects them
    pub modes: Vec<String>,
    #[serde(default)]
    pub instruments: HashMap<String, InstrumentConfig>,
}

/// Sound of one instrument mode
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstrumentConfig {
    pub soundfont: PathBuf,
    #[serde(default = "default_gain")]
    pub gain: f32,
    /// Number of stops to use; defaults to the number listed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_stops: Option<usize>,
    #[serde(default)]
    pub stops: Vec<StopConfig>,
}

/// A stop: soundfont patch and display name
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StopConfig {
    pub patch: u8,
    #[serde(default)]
    pub name: String,
}

/// Tone generator selection
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SynthConfig {
    #[serde(default)]
    pub backend: SynthBackend,
    /// Output port name pattern for the MIDI backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub midi_port: Option<String>,
}

/// Tone generator back end
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SynthBackend {
    #[default]
    Soundfont,
    Midi,
    Console,
}

/// A manual connected through a MIDI input port
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManualInputConfig {
    /// Input port name pattern
    pub port: String,
    pub manual: usize,
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse and validate configuration from YAML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// The console section selected by `local.this_console`
    pub fn local_console(&self) -> Result<&ConsoleConfig> {
        self.consoles
            .iter()
            .find(|c| c.index == self.local.this_console)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "No console section with index {} (local.this_console)",
                    self.local.this_console
                )
            })
    }

    /// Name used for this console on the broker, e.g. `Console0`
    pub fn console_section_name(&self) -> String {
        format!("Console{}", self.local.this_console)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.global.num_keyboards == 0 {
            anyhow::bail!("global.num_keyboards must be at least 1");
        }

        let console = self.local_console()?;
        if console.modes.is_empty() {
            anyhow::bail!("Console {} must list at least one mode", console.index);
        }

        for mode in &console.modes {
            let instrument = console.instruments.get(mode).with_context(|| {
                format!("Mode '{}' of console {} has no instrument section", mode, console.index)
            })?;

            if self.synth.backend == SynthBackend::Soundfont
                && instrument.soundfont.as_os_str().is_empty()
            {
                anyhow::bail!("Instrument '{}' has an empty soundfont path", mode);
            }
            if instrument.gain.is_nan() || instrument.gain <= 0.0 {
                anyhow::bail!(
                    "Instrument '{}' has invalid gain {} (must be positive)",
                    mode,
                    instrument.gain
                );
            }
        }

        if self.global.mqtt.is_some() && console.topic.as_deref().unwrap_or("").is_empty() {
            anyhow::bail!(
                "Console {} needs a topic when an MQTT broker is configured",
                console.index
            );
        }

        for input in &self.manuals {
            if input.port.is_empty() {
                anyhow::bail!("MIDI manual {} port cannot be empty", input.manual);
            }
            if input.manual >= self.global.num_keyboards {
                anyhow::bail!(
                    "MIDI manual {} is out of range (num_keyboards = {})",
                    input.manual,
                    self.global.num_keyboards
                );
            }
        }

        if self.synth.backend == SynthBackend::Midi
            && self.synth.midi_port.as_deref().unwrap_or("").is_empty()
        {
            anyhow::bail!("synth.midi_port is required for the midi backend");
        }

        Ok(())
    }
}

impl ProfileSource for ConsoleConfig {
    fn mode_count(&self) -> usize {
        self.modes.len()
    }

    fn mode_name(&self, index: usize) -> Option<&str> {
        self.modes.get(index).map(String::as_str)
    }

    fn load_profile(&self, index: usize) -> Result<InstrumentProfile, ProfileError> {
        let mode = self.modes.get(index).ok_or(ProfileError::UnknownMode {
            index,
            count: self.modes.len(),
        })?;
        let instrument = self
            .instruments
            .get(mode)
            .ok_or_else(|| ProfileError::MissingInstrument(mode.clone()))?;

        InstrumentProfile::build(
            mode,
            &instrument.soundfont,
            instrument.gain,
            instrument.num_stops,
            instrument.stops.iter().map(|s| (s.patch, s.name.clone())),
        )
    }
}

// Default value functions
fn default_mqtt_broker() -> String { "localhost".to_string() }
fn default_mqtt_port() -> u16 { 1883 }
fn default_gain() -> f32 { 0.2 }
