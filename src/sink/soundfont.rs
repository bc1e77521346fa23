//! SoundFont sink - renders stops through a software synthesizer
//!
//! The synthesizer lives behind a lock shared with the audio callback. Loading
//! a new instrument swaps in a fresh synthesizer built from the new soundfont.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use rustysynth::{SoundFont, Synthesizer, SynthesizerSettings};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{SinkError, SoundSink};
use crate::midi::{bank_bytes, CC_BANK_SELECT, CC_BANK_SELECT_LSB};

const DEFAULT_SAMPLE_RATE: u32 = 44_100;

type SharedSynth = Arc<Mutex<Option<Synthesizer>>>;

/// Software synthesizer playing through the default audio output
pub struct SoundfontSink {
    synth: SharedSynth,
    stream: Option<cpal::Stream>,
    sample_rate: u32,
}

impl SoundfontSink {
    pub fn new() -> Self {
        Self {
            synth: Arc::new(Mutex::new(None)),
            stream: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    fn with_synth(&self, f: impl FnOnce(&mut Synthesizer)) {
        match self.synth.lock().as_mut() {
            Some(synth) => f(synth),
            None => debug!("No soundfont loaded, dropping command"),
        }
    }
}

impl Default for SoundfontSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Fill an interleaved output buffer from the synthesizer
fn render(synth: &SharedSynth, data: &mut [f32], channels: usize, left: &mut Vec<f32>, right: &mut Vec<f32>) {
    let frames = data.len() / channels;
    if left.len() < frames {
        left.resize(frames, 0.0);
        right.resize(frames, 0.0);
    }

    {
        let mut guard = synth.lock();
        let Some(synth) = guard.as_mut() else {
            data.fill(0.0);
            return;
        };
        synth.render(&mut left[..frames], &mut right[..frames]);
    }

    for (i, frame) in data.chunks_mut(channels).enumerate() {
        if frame.len() == 1 {
            frame[0] = 0.5 * (left[i] + right[i]);
        } else {
            frame[0] = left[i];
            frame[1] = right[i];
            frame[2..].fill(0.0);
        }
    }
}

impl SoundSink for SoundfontSink {
    fn start(&mut self) -> Result<(), SinkError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| SinkError::Audio("no default output device available".to_string()))?;
        let config = device
            .default_output_config()
            .map_err(|e| SinkError::Audio(format!("failed to fetch default output config: {}", e)))?;

        if config.sample_format() != cpal::SampleFormat::F32 {
            return Err(SinkError::Audio(format!(
                "unsupported sample format {:?}",
                config.sample_format()
            )));
        }

        self.sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;
        info!(
            "Audio output: {} Hz, {} channels",
            self.sample_rate, channels
        );

        let synth = Arc::clone(&self.synth);
        let mut left = Vec::new();
        let mut right = Vec::new();
        let stream = device
            .build_output_stream(
                &config.into(),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    render(&synth, data, channels, &mut left, &mut right);
                },
                |err| warn!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| SinkError::Audio(e.to_string()))?;
        stream.play().map_err(|e| SinkError::Audio(e.to_string()))?;

        self.stream = Some(stream);
        Ok(())
    }

    fn load_soundfont(&mut self, path: &Path, gain: f32) -> Result<(), SinkError> {
        let failed = |reason: String| SinkError::Soundfont {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| failed(e.to_string()))?;
        let font = SoundFont::new(&mut BufReader::new(file)).map_err(|e| failed(format!("{:?}", e)))?;
        let settings = SynthesizerSettings::new(self.sample_rate as i32);
        let mut synth =
            Synthesizer::new(&Arc::new(font), &settings).map_err(|e| failed(format!("{:?}", e)))?;
        synth.set_master_volume(gain);

        *self.synth.lock() = Some(synth);
        info!("Loaded soundfont {} (gain {})", path.display(), gain);
        Ok(())
    }

    fn trigger_note(&mut self, channel: u8, note: u8, velocity: u8) {
        self.with_synth(|s| s.note_on(channel as i32, note as i32, velocity as i32));
    }

    fn release_note(&mut self, channel: u8, note: u8) {
        self.with_synth(|s| s.note_off(channel as i32, note as i32));
    }

    fn select_program(&mut self, channel: u8, bank: u16, patch: u8) {
        let (msb, lsb) = bank_bytes(bank);
        self.with_synth(|s| {
            let ch = channel as i32;
            s.process_midi_message(ch, 0xB0, CC_BANK_SELECT as i32, msb as i32);
            s.process_midi_message(ch, 0xB0, CC_BANK_SELECT_LSB as i32, lsb as i32);
            s.process_midi_message(ch, 0xC0, patch as i32, 0);
        });
    }

    fn shutdown(&mut self) -> Result<(), SinkError> {
        self.with_synth(|s| s.note_off_all(false));
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Failed to pause audio stream: {}", e);
            }
        }
        *self.synth.lock() = None;
        info!("Soundfont synthesizer stopped");
        Ok(())
    }
}
