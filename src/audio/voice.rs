use super::{VoiceConfig, midi_to_freq};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdsrConfig {
    /// Seconds
    pub attack: f32,
    /// Seconds
    pub decay: f32,
    /// 0.0 -> 1.0
    pub sustain: f32,
    /// Seconds
    pub release: f32,
}

impl Default for AdsrConfig {
    fn default() -> Self {
        Self {
            attack: 0.005,
            decay: 0.3,
            sustain: 0.4,
            release: 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnvelopeStage {
    Attack { time: f32 },
    Decay { time: f32 },
    Sustain,
    Release { time: f32, from: f32 },
    Done,
}

/// One struck note: a sine at the key's pitch, held for the configured duration.
#[derive(Debug, Clone)]
pub struct Tone {
    freq: f32,
    gain: f32,
    phase: f32,
    held: f32,
    hold_for: f32,
    level: f32,
    stage: EnvelopeStage,
    adsr: AdsrConfig,
}

impl Tone {
    pub fn new(pitch: u8, config: VoiceConfig, adsr: AdsrConfig) -> Self {
        Self {
            freq: midi_to_freq(pitch),
            gain: config.loudness.clamp(0.0, 1.0),
            phase: 0.0,
            held: 0.0,
            hold_for: config.duration.max(0.0) as f32,
            level: 0.0,
            stage: EnvelopeStage::Attack { time: 0.0 },
            adsr,
        }
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn is_done(&self) -> bool {
        self.stage == EnvelopeStage::Done
    }

    pub fn next_sample(&mut self, sample_rate: f32) -> f32 {
        if self.is_done() {
            return 0.0;
        }
        let dt = 1.0 / sample_rate;
        self.level = self.envelope();
        let sample = (self.phase * std::f32::consts::TAU).sin() * self.level * self.gain;

        self.phase += self.freq * dt;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        self.advance(dt);
        sample
    }

    fn envelope(&self) -> f32 {
        let adsr = &self.adsr;
        match self.stage {
            EnvelopeStage::Attack { time } => {
                if adsr.attack == 0.0 {
                    1.0
                } else {
                    (time / adsr.attack).min(1.0)
                }
            }
            EnvelopeStage::Decay { time } => {
                let progress = if adsr.decay == 0.0 {
                    1.0
                } else {
                    (time / adsr.decay).min(1.0)
                };
                1.0 - (1.0 - adsr.sustain) * progress
            }
            EnvelopeStage::Sustain => adsr.sustain,
            EnvelopeStage::Release { time, from } => {
                let progress = if adsr.release == 0.0 {
                    1.0
                } else {
                    (time / adsr.release).min(1.0)
                };
                from * (1.0 - progress)
            }
            EnvelopeStage::Done => 0.0,
        }
    }

    fn advance(&mut self, dt: f32) {
        self.held += dt;
        if self.held >= self.hold_for
            && !matches!(
                self.stage,
                EnvelopeStage::Release { .. } | EnvelopeStage::Done
            )
        {
            self.stage = EnvelopeStage::Release {
                time: 0.0,
                from: self.level,
            };
            return;
        }

        self.stage = match self.stage {
            EnvelopeStage::Attack { time } if time + dt >= self.adsr.attack => {
                EnvelopeStage::Decay { time: 0.0 }
            }
            EnvelopeStage::Attack { time } => EnvelopeStage::Attack { time: time + dt },
            EnvelopeStage::Decay { time } if time + dt >= self.adsr.decay => {
                EnvelopeStage::Sustain
            }
            EnvelopeStage::Decay { time } => EnvelopeStage::Decay { time: time + dt },
            EnvelopeStage::Release { time, .. } if time + dt >= self.adsr.release => {
                EnvelopeStage::Done
            }
            EnvelopeStage::Release { time, from } => EnvelopeStage::Release {
                time: time + dt,
                from,
            },
            other => other,
        };
    }
}
