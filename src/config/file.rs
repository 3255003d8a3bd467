//! TOML configuration file loading
//!
//! Supports `~/.config/chatterbox/config.toml` as a persistent config
//! source. All fields are optional — the file is a partial overlay on top of
//! defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ChatterboxConfigFile {
    /// Speech-to-text configuration
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Knowledge agent configuration
    #[serde(default)]
    pub agent: AgentFileConfig,

    /// Speech synthesis configuration
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Pipeline tuning
    #[serde(default)]
    pub pipeline: PipelineFileConfig,
}

/// Speech-to-text configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// Provider ("whisper" or "deepgram")
    pub provider: Option<String>,

    /// Base URL override (e.g. a local whisper server)
    pub base_url: Option<String>,

    /// API key (env vars take precedence)
    pub api_key: Option<String>,

    /// Model identifier (e.g. "whisper-1", "nova-2")
    pub model: Option<String>,
}

/// Knowledge agent configuration
#[derive(Debug, Default, Deserialize)]
pub struct AgentFileConfig {
    /// OpenAI-compatible chat endpoint base URL
    pub base_url: Option<String>,

    /// API key, if the endpoint requires one
    pub api_key: Option<String>,

    /// Model identifier (e.g. "llama3.1:8b")
    pub model: Option<String>,

    /// System prompt override
    pub system_prompt: Option<String>,

    /// Max tokens per answer
    pub max_tokens: Option<u32>,
}

/// Speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// Kokoro server base URL
    pub base_url: Option<String>,

    /// Voice identifier (e.g. "af_heart")
    pub voice: Option<String>,

    /// Phonemization language code (e.g. "a" for American English)
    pub language: Option<String>,

    /// Speed multiplier
    pub speed: Option<f32>,
}

/// Pipeline tuning
#[derive(Debug, Default, Deserialize)]
pub struct PipelineFileConfig {
    /// Concurrent response workers
    pub workers: Option<usize>,

    /// Transcript poll interval in milliseconds
    pub poll_interval_ms: Option<u64>,

    /// Shutdown drain timeout in seconds
    pub drain_timeout_secs: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ChatterboxConfigFile::default()` if the file doesn't exist or
/// can't be parsed.
pub fn load_config_file() -> ChatterboxConfigFile {
    let Some(path) = config_file_path() else {
        return ChatterboxConfigFile::default();
    };

    if !path.exists() {
        return ChatterboxConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ChatterboxConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ChatterboxConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/chatterbox/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("chatterbox").join("config.toml"))
}
