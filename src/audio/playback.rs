//! Audio playback to speakers

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, StreamConfig};

use crate::{Error, Result};

/// A device that accepts a sample buffer and emits it audibly
///
/// `play` blocks the calling context until emission completes. The pipeline
/// serializes access through its playback lock; implementations do not need
/// to be re-entrant.
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play mono f32 samples at the given rate, returning once they have
    /// finished sounding
    ///
    /// # Errors
    ///
    /// Returns error if the output device rejects the stream
    async fn play(&self, samples: &[f32], sample_rate: u32) -> Result<()>;
}

/// Plays audio to the default output device
pub struct AudioPlayback {
    _private: (),
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );

        Ok(Self { _private: () })
    }

    /// Find an output config that supports `sample_rate` natively
    ///
    /// Prefers mono, falls back to stereo.
    fn native_config(device: &Device, sample_rate: u32) -> Option<StreamConfig> {
        let rate = SampleRate(sample_rate);
        let supported = device
            .supported_output_configs()
            .ok()?
            .find(|c| c.channels() == 1 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
            .or_else(|| {
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2 && c.min_sample_rate() <= rate && c.max_sample_rate() >= rate
                })
            })?;

        Some(supported.with_sample_rate(rate).config())
    }

    /// Play samples in a blocking manner
    fn play_blocking(samples: &[f32], sample_rate: u32) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;

        // Resample if the device cannot do the synthesizer's rate natively
        let (config, samples) = match Self::native_config(&device, sample_rate) {
            Some(config) => (config, samples.to_vec()),
            None => {
                let fallback = device
                    .default_output_config()
                    .map_err(|e| Error::Audio(e.to_string()))?;
                let device_rate = fallback.sample_rate().0;
                tracing::debug!(
                    requested = sample_rate,
                    device = device_rate,
                    "output device lacks requested rate, resampling"
                );
                (
                    fallback.config(),
                    super::resample(samples, sample_rate, device_rate)?,
                )
            }
        };

        let playback_rate = config.sample_rate.0;
        let channels = config.channels as usize;

        let samples = Arc::new(samples);
        let position = Arc::new(Mutex::new(0usize));
        let finished = Arc::new(Mutex::new(false));

        let samples_clone = Arc::clone(&samples);
        let position_clone = Arc::clone(&position);
        let finished_clone = Arc::clone(&finished);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position_clone.lock().unwrap();

                    for frame in data.chunks_mut(channels) {
                        let sample = if *pos < samples_clone.len() {
                            samples_clone[*pos]
                        } else {
                            *finished_clone.lock().unwrap() = true;
                            0.0
                        };

                        for out in frame.iter_mut() {
                            *out = sample;
                        }

                        if *pos < samples_clone.len() {
                            *pos += 1;
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        // Wait for playback to finish, bounded by the buffer's duration
        let duration_ms = (samples.len() as u64 * 1000) / u64::from(playback_rate.max(1));
        let start = Instant::now();
        let timeout = Duration::from_millis(duration_ms + 500);

        while !*finished.lock().unwrap() {
            if start.elapsed() > timeout {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        // Small delay to let the device ring out
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = samples.len(), "playback complete");

        Ok(())
    }
}

#[async_trait]
impl AudioSink for AudioPlayback {
    async fn play(&self, samples: &[f32], sample_rate: u32) -> Result<()> {
        Self::play_blocking(samples, sample_rate)
    }
}
