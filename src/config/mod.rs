//! Configuration management for chatterbox
//!
//! Values layer as env > TOML file > default.

pub mod file;

/// Which STT backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SttProviderKind {
    /// OpenAI-compatible Whisper endpoint
    #[default]
    Whisper,
    /// Deepgram
    Deepgram,
}

impl SttProviderKind {
    fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "whisper" | "openai" => Some(Self::Whisper),
            "deepgram" => Some(Self::Deepgram),
            _ => None,
        }
    }
}

/// Speech-to-text configuration
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// Provider backend
    pub provider: SttProviderKind,

    /// Base URL override (e.g. a local whisper server)
    pub base_url: Option<String>,

    /// API key for the provider
    pub api_key: Option<String>,

    /// Model identifier
    pub model: String,
}

/// Knowledge agent configuration
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// OpenAI-compatible chat endpoint base URL
    pub base_url: String,

    /// API key, if the endpoint requires one
    pub api_key: Option<String>,

    /// Model identifier
    pub model: String,

    /// System prompt override
    pub system_prompt: Option<String>,

    /// Max tokens per answer
    pub max_tokens: u32,
}

/// Speech synthesis configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    /// Kokoro server base URL
    pub base_url: String,

    /// Voice identifier
    pub voice: String,

    /// Phonemization language code
    pub language: String,

    /// Speed multiplier
    pub speed: f32,
}

/// Pipeline tuning
#[derive(Debug, Clone)]
pub struct PipelineTuning {
    /// Concurrent response workers
    pub workers: usize,

    /// Transcript poll interval in milliseconds
    pub poll_interval_ms: u64,

    /// Shutdown drain timeout in seconds
    pub drain_timeout_secs: u64,
}

/// Chatterbox configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Speech-to-text configuration
    pub stt: SttConfig,

    /// Knowledge agent configuration
    pub agent: AgentConfig,

    /// Speech synthesis configuration
    pub tts: TtsConfig,

    /// Pipeline tuning
    pub pipeline: PipelineTuning,
}

impl Config {
    /// Load configuration (env > TOML > default)
    #[must_use]
    pub fn load() -> Self {
        let fc = file::load_config_file();

        let provider = std::env::var("CHATTERBOX_STT_PROVIDER")
            .ok()
            .or(fc.stt.provider)
            .and_then(|s| {
                let parsed = SttProviderKind::parse(&s);
                if parsed.is_none() {
                    tracing::warn!(provider = %s, "unknown STT provider, using whisper");
                }
                parsed
            })
            .unwrap_or_default();

        let stt_api_key = match provider {
            SttProviderKind::Whisper => std::env::var("OPENAI_API_KEY").ok(),
            SttProviderKind::Deepgram => std::env::var("DEEPGRAM_API_KEY").ok(),
        }
        .or(fc.stt.api_key);

        let stt = SttConfig {
            provider,
            base_url: std::env::var("CHATTERBOX_STT_URL").ok().or(fc.stt.base_url),
            api_key: stt_api_key,
            model: std::env::var("CHATTERBOX_STT_MODEL")
                .ok()
                .or(fc.stt.model)
                .unwrap_or_else(|| match provider {
                    SttProviderKind::Whisper => "whisper-1".to_string(),
                    SttProviderKind::Deepgram => "nova-2".to_string(),
                }),
        };

        let agent = AgentConfig {
            base_url: std::env::var("CHATTERBOX_AGENT_URL")
                .ok()
                .or(fc.agent.base_url)
                .unwrap_or_else(|| "http://localhost:11434/v1".to_string()),
            api_key: std::env::var("CHATTERBOX_AGENT_API_KEY")
                .ok()
                .or(fc.agent.api_key),
            model: std::env::var("CHATTERBOX_AGENT_MODEL")
                .ok()
                .or(fc.agent.model)
                .unwrap_or_else(|| "llama3.1:8b".to_string()),
            system_prompt: fc.agent.system_prompt,
            max_tokens: std::env::var("CHATTERBOX_AGENT_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.agent.max_tokens)
                .unwrap_or(1024),
        };

        let tts = TtsConfig {
            base_url: std::env::var("CHATTERBOX_TTS_URL")
                .ok()
                .or(fc.tts.base_url)
                .unwrap_or_else(|| "http://localhost:8880".to_string()),
            voice: std::env::var("CHATTERBOX_TTS_VOICE")
                .ok()
                .or(fc.tts.voice)
                .unwrap_or_else(|| "af_heart".to_string()),
            language: std::env::var("CHATTERBOX_TTS_LANGUAGE")
                .ok()
                .or(fc.tts.language)
                .unwrap_or_else(|| "a".to_string()),
            speed: std::env::var("CHATTERBOX_TTS_SPEED")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.tts.speed)
                .unwrap_or(1.0),
        };

        let pipeline = PipelineTuning {
            workers: std::env::var("CHATTERBOX_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.pipeline.workers)
                .unwrap_or(2),
            poll_interval_ms: std::env::var("CHATTERBOX_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.pipeline.poll_interval_ms)
                .unwrap_or(100),
            drain_timeout_secs: std::env::var("CHATTERBOX_DRAIN_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .or(fc.pipeline.drain_timeout_secs)
                .unwrap_or(10),
        };

        Self {
            stt,
            agent,
            tts,
            pipeline,
        }
    }
}
