#[cfg(feature = "audio")]
mod output;
mod voice;

#[cfg(feature = "audio")]
pub use output::CpalVoice;
pub use voice::{AdsrConfig, EnvelopeStage, Tone};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub fn midi_to_freq(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Seconds the note is held before release
    pub duration: f64,
    /// 0.0 -> 1.0
    pub loudness: f32,
}

impl VoiceConfig {
    /// Used for keys pressed by hand.
    pub const MANUAL: VoiceConfig = VoiceConfig {
        duration: 2.5,
        loudness: 1.0,
    };
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self::MANUAL
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AudioStatus {
    Ready,
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output device")]
    NoDevice,
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("built without audio support")]
    Disabled,
}

/// Audio trigger effect. An engine that is not ready treats `play` as a no-op.
pub trait AudioVoice {
    fn status(&self) -> AudioStatus;
    fn play(&mut self, pitch: u8, config: VoiceConfig);
}

impl<T: AudioVoice + ?Sized> AudioVoice for Box<T> {
    fn status(&self) -> AudioStatus {
        (**self).status()
    }

    fn play(&mut self, pitch: u8, config: VoiceConfig) {
        (**self).play(pitch, config)
    }
}

/// Stand-in when no output is available; playback carries on without sound.
#[derive(Debug, Clone)]
pub struct SilentVoice {
    reason: String,
}

impl SilentVoice {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl AudioVoice for SilentVoice {
    fn status(&self) -> AudioStatus {
        AudioStatus::Unavailable(self.reason.clone())
    }

    fn play(&mut self, _pitch: u8, _config: VoiceConfig) {}
}

/// Opens the default output, falling back to silence on any failure.
pub fn open_voice() -> Box<dyn AudioVoice> {
    match open_output() {
        Ok(voice) => {
            info!("Audio output ready");
            voice
        }
        Err(e) => {
            warn!("Audio unavailable, continuing without sound: {}", e);
            Box::new(SilentVoice::new(e.to_string()))
        }
    }
}

#[cfg(feature = "audio")]
fn open_output() -> Result<Box<dyn AudioVoice>, AudioError> {
    Ok(Box::new(CpalVoice::open()?))
}

#[cfg(not(feature = "audio"))]
fn open_output() -> Result<Box<dyn AudioVoice>, AudioError> {
    Err(AudioError::Disabled)
}
