//! Chatterbox - hands-free voice assistant that answers spoken questions aloud
//!
//! This library provides the core functionality for the chatterbox loop:
//! - Microphone capture and speaker playback (cpal)
//! - Utterance endpointing and speech-to-text
//! - Knowledge agent querying (OpenAI-compatible chat API)
//! - Phoneme-based speech synthesis (Kokoro)
//! - The duplex pipeline coordinator that ties them together
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  Microphone ──▶ capture feed gate ──▶ Transcriber    │
//! │                    ▲ closed while          │ poll    │
//! │                    │ audio plays           ▼         │
//! │  Speaker ◀── playback ◀── synthesis ◀── worker pool  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The coordinator owns two atomic flags (playback gate, shutdown signal) and
//! two mutexes (synthesis model, speaker device). Transcripts are dispatched
//! in the order they finalize; playback happens in completion order, since
//! answer latency varies per question.

pub mod agent;
pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod synth;
pub mod transcribe;

pub use agent::{HttpKnowledgeAgent, KnowledgeAgent};
pub use audio::{AudioCapture, AudioPlayback, AudioSink, SAMPLE_RATE};
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{CaptureFeed, Pipeline, PipelineConfig, PlaybackGate, ShutdownSignal};
pub use synth::{KokoroSynthesizer, SynthesizedSpeech, Synthesizer};
pub use transcribe::{RemoteTranscriber, SttClient, Transcriber, UtteranceSegmenter};
