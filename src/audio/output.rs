use super::{AdsrConfig, AudioError, AudioStatus, AudioVoice, Tone, VoiceConfig};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};
use tracing::{error, info, warn};

const MAX_TONES: usize = 32;
const MASTER_GAIN: f32 = 0.2;

#[derive(Debug, Clone, Copy)]
struct Strike {
    pitch: u8,
    config: VoiceConfig,
}

/// Default output device fed through a lock-free queue of strikes.
pub struct CpalVoice {
    _stream: cpal::Stream,
    producer: HeapProd<Strike>,
}

impl CpalVoice {
    pub fn open() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;
        let config: cpal::StreamConfig = device
            .default_output_config()
            .map_err(|e| AudioError::Stream(e.to_string()))?
            .into();

        let sample_rate = config.sample_rate as f32;
        let num_channels = usize::from(config.channels);
        info!("Audio output: {} channels, {} Hz", num_channels, sample_rate);

        let (producer, mut consumer) = HeapRb::<Strike>::new(256).split();
        let adsr = AdsrConfig::default();
        let mut tones: Vec<Tone> = Vec::with_capacity(MAX_TONES);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    while let Some(strike) = consumer.try_pop() {
                        if tones.len() == MAX_TONES {
                            tones.remove(0);
                        }
                        tones.push(Tone::new(strike.pitch, strike.config, adsr));
                    }

                    for frame in data.chunks_mut(num_channels) {
                        let sample: f32 = tones
                            .iter_mut()
                            .map(|tone| tone.next_sample(sample_rate))
                            .sum();
                        frame.fill(sample * MASTER_GAIN);
                    }
                    tones.retain(|tone| !tone.is_done());
                },
                |err| error!("Audio error: {}", err),
                None,
            )
            .map_err(|e| AudioError::Stream(e.to_string()))?;
        stream
            .play()
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            producer,
        })
    }
}

impl AudioVoice for CpalVoice {
    fn status(&self) -> AudioStatus {
        AudioStatus::Ready
    }

    fn play(&mut self, pitch: u8, config: VoiceConfig) {
        if self.producer.try_push(Strike { pitch, config }).is_err() {
            warn!("Audio queue full, dropping pitch {}", pitch);
        }
    }
}
