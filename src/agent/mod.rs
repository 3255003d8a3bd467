//! Knowledge agent client
//!
//! The agent answers natural-language questions. Its reasoning and tool use
//! live behind an OpenAI-compatible chat-completions endpoint (a local
//! Ollama, or any hosted provider); the pipeline only ever calls [`ask`].
//!
//! [`ask`]: KnowledgeAgent::ask

use async_trait::async_trait;

use crate::{Error, Result};

/// Default system prompt. Answers are spoken aloud, so the agent is told to
/// keep them short and free of characters the synthesizer would stumble on.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a knowledge assistant that answers questions concisely. \
     Provide a clear conversational response in one or two sentences. \
     Do not use special characters or emojis in your responses; \
     they will be read aloud.";

/// Default max tokens for answers
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Answers questions posed as text
#[async_trait]
pub trait KnowledgeAgent: Send + Sync {
    /// Ask a question, returning the answer text
    ///
    /// # Errors
    ///
    /// Returns error if the agent is unreachable or produces no answer
    async fn ask(&self, question: &str) -> Result<String>;
}

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    max_tokens: u32,
}

#[derive(serde::Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(serde::Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(serde::Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Knowledge agent reached over an OpenAI-compatible chat API
pub struct HttpKnowledgeAgent {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    system_prompt: String,
    max_tokens: u32,
}

impl HttpKnowledgeAgent {
    /// Create a new agent client
    ///
    /// `api_key` may be `None` for local endpoints that skip auth.
    #[must_use]
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Override the system prompt
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: String) -> Self {
        self.system_prompt = prompt;
        self
    }

    /// Override the answer token budget
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl KnowledgeAgent for HttpKnowledgeAgent {
    async fn ask(&self, question: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: question,
                },
            ],
            stream: false,
            max_tokens: self.max_tokens,
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Agent(format!("chat API error {status}: {body}")));
        }

        let result: ChatResponse = response.json().await?;
        let answer = result
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or_default()
            .trim()
            .to_string();

        if answer.is_empty() {
            return Err(Error::Agent("agent returned an empty answer".to_string()));
        }

        Ok(answer)
    }
}
