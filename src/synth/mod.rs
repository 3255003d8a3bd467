//! Speech synthesis
//!
//! Two-step synthesis contract: text is first phonemized, then the phoneme
//! sequence is rendered to audio for a given voice. The concrete backend is
//! a local Kokoro server; the model itself is assumed non-reentrant, so the
//! pipeline serializes access through its synthesis lock.

use async_trait::async_trait;

use crate::audio::{mp3_to_samples, wav_to_samples};
use crate::{Error, Result};

/// Audio produced by the synthesizer
#[derive(Debug, Clone, Default)]
pub struct SynthesizedSpeech {
    /// Mono f32 samples
    pub samples: Vec<f32>,
    /// Sample rate of `samples`
    pub sample_rate: u32,
}

impl SynthesizedSpeech {
    /// True when synthesis produced no audio
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Converts answer text to audible speech
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Convert text to a phoneme sequence
    ///
    /// # Errors
    ///
    /// Returns error if phonemization fails
    async fn phonemize(&self, text: &str) -> Result<String>;

    /// Render a phoneme sequence as audio for the given voice
    ///
    /// May legitimately return empty audio; callers skip playback then.
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    async fn synthesize(&self, phonemes: &str, voice: &str) -> Result<SynthesizedSpeech>;
}

#[derive(serde::Serialize)]
struct PhonemizeRequest<'a> {
    text: &'a str,
    language: &'a str,
}

#[derive(serde::Deserialize)]
struct PhonemizeResponse {
    phonemes: String,
}

#[derive(serde::Serialize)]
struct GenerateRequest<'a> {
    phonemes: &'a str,
    voice: &'a str,
    speed: f32,
}

/// Kokoro TTS served over HTTP (kokoro-fastapi)
pub struct KokoroSynthesizer {
    client: reqwest::Client,
    base_url: String,
    language: String,
    speed: f32,
}

impl KokoroSynthesizer {
    /// Create a new synthesizer client
    #[must_use]
    pub fn new(base_url: String, language: String, speed: f32) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            language,
            speed,
        }
    }
}

#[async_trait]
impl Synthesizer for KokoroSynthesizer {
    async fn phonemize(&self, text: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/dev/phonemize", self.base_url))
            .json(&PhonemizeRequest {
                text,
                language: &self.language,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("phonemize error {status}: {body}")));
        }

        let result: PhonemizeResponse = response.json().await?;
        Ok(result.phonemes)
    }

    async fn synthesize(&self, phonemes: &str, voice: &str) -> Result<SynthesizedSpeech> {
        let response = self
            .client
            .post(format!("{}/dev/generate_from_phonemes", self.base_url))
            .json(&GenerateRequest {
                phonemes,
                voice,
                speed: self.speed,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("synthesis error {status}: {body}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("audio/wav")
            .to_string();

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Ok(SynthesizedSpeech::default());
        }

        let (samples, sample_rate) = if content_type.contains("mpeg") {
            mp3_to_samples(&audio)?
        } else {
            wav_to_samples(&audio)?
        };

        tracing::debug!(
            samples = samples.len(),
            sample_rate,
            "synthesis complete"
        );

        Ok(SynthesizedSpeech {
            samples,
            sample_rate,
        })
    }
}
