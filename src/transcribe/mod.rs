//! Speech transcription
//!
//! [`Transcriber`] is the contract the pipeline consumes: captured audio is
//! fed in chunk by chunk, and finalized transcripts are pulled out by
//! polling. [`RemoteTranscriber`] implements it with local energy-based
//! endpointing in front of a hosted STT API.

mod segmenter;

pub use segmenter::{SegmenterState, UtteranceSegmenter};

use std::sync::Mutex;

use async_trait::async_trait;

use crate::audio::{SAMPLE_RATE, samples_to_wav};
use crate::{Error, Result};

/// Consumes fed audio chunks and produces finalized transcripts on demand
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Feed a chunk of captured audio
    ///
    /// Fire-and-forget. Called from the capture callback thread; must stay
    /// cheap and must not block on I/O.
    fn feed(&self, samples: &[f32]);

    /// Poll for a finalized transcript
    ///
    /// Returns `Ok(None)` while nothing has finalized; polling repeatedly
    /// with no new audio is side-effect free.
    async fn poll(&self) -> Result<Option<String>>;
}

/// STT provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SttProvider {
    Whisper,
    Deepgram,
}

/// Response from an OpenAI-compatible transcription endpoint
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from the Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// HTTP speech-to-text client
pub struct SttClient {
    client: reqwest::Client,
    provider: SttProvider,
    base_url: String,
    api_key: String,
    model: String,
}

impl SttClient {
    /// Create a client for an OpenAI-compatible Whisper endpoint
    ///
    /// `base_url` defaults to the hosted OpenAI API; point it at a local
    /// whisper server to transcribe offline.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn whisper(base_url: Option<String>, api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            provider: SttProvider::Whisper,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
            model,
        })
    }

    /// Create a client for the Deepgram API
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn deepgram(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Deepgram API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            provider: SttProvider::Deepgram,
            base_url: "https://api.deepgram.com/v1".to_string(),
            api_key,
            model,
        })
    }

    /// Transcribe WAV audio bytes to text
    ///
    /// # Errors
    ///
    /// Returns error if the request or response parsing fails
    pub async fn transcribe(&self, wav: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), provider = ?self.provider, "transcribing");

        match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(wav).await,
            SttProvider::Deepgram => self.transcribe_deepgram(wav).await,
        }
    }

    async fn transcribe_whisper(&self, wav: &[u8]) -> Result<String> {
        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav.to_vec())
                    .file_name("utterance.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await?;
        Ok(result.text)
    }

    async fn transcribe_deepgram(&self, wav: &[u8]) -> Result<String> {
        let url = format!(
            "{}/listen?model={}&punctuate=true",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(wav.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Stt(format!("Deepgram API error {status}: {body}")));
        }

        let result: DeepgramResponse = response.json().await?;

        Ok(result
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.clone())
            .unwrap_or_default())
    }
}

/// Endpointing segmenter in front of a remote STT backend
pub struct RemoteTranscriber {
    segmenter: Mutex<UtteranceSegmenter>,
    stt: SttClient,
}

impl RemoteTranscriber {
    /// Create a transcriber over the given STT client
    #[must_use]
    pub fn new(stt: SttClient) -> Self {
        Self {
            segmenter: Mutex::new(UtteranceSegmenter::new()),
            stt,
        }
    }
}

#[async_trait]
impl Transcriber for RemoteTranscriber {
    fn feed(&self, samples: &[f32]) {
        if let Ok(mut segmenter) = self.segmenter.lock() {
            segmenter.push(samples);
        }
    }

    async fn poll(&self) -> Result<Option<String>> {
        // Take the utterance out first; the guard must not span the request
        let utterance = self
            .segmenter
            .lock()
            .map_or(None, |mut segmenter| segmenter.take_utterance());

        let Some(samples) = utterance else {
            return Ok(None);
        };

        let wav = samples_to_wav(&samples, SAMPLE_RATE)?;
        let text = self.stt.transcribe(&wav).await?;
        let text = text.trim();

        if text.is_empty() {
            Ok(None)
        } else {
            tracing::info!(transcript = %text, "transcription complete");
            Ok(Some(text.to_string()))
        }
    }
}
