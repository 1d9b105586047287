//! A summarizer using an OpenAI compatible chat completion API, Groq by
//! default.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, trace};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{cve_prompt, writeup_prompt, Summarizer};
use crate::error::{AdapterError, ConfigError};
use crate::http;

/// The default chat completion endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";

/// The default model.
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

/// The sampling temperature used for every prompt.
const TEMPERATURE: f64 = 0.4;

/// Asks a hosted language model to summarize.
pub struct GroqSummarizer {
    api_key: String,
    model: String,
    endpoint: String,
    client: Client,
}

impl GroqSummarizer {
    /// Creates a new GroqSummarizer.
    pub fn new(
        api_key: &str,
        model: &str,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            endpoint: endpoint.to_string(),
            client: http::build_client(timeout)?,
        })
    }

    /// The chat completion request for one prompt.
    fn payload(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": TEMPERATURE,
        })
    }

    /// Sends one prompt and returns the answer of the model.
    async fn try_ask(&self, prompt: &str) -> Result<String, AdapterError> {
        trace!("Running GroqSummarizer::try_ask()");
        let payload = self.payload(prompt);
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        let response = http::ensure_success(response).await?;
        let completion: Completion = serde_json::from_slice(&response.bytes().await?)?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| AdapterError::Malformed("the completion has no choice".to_string()))
    }

    /// Sends one prompt. Errors are returned as text.
    async fn ask(&self, prompt: &str) -> String {
        match self.try_ask(prompt).await {
            Ok(answer) => {
                debug!("The summarizer answered {} chars", answer.len());
                answer
            }
            Err(e) => {
                error!("Summarizer error: {}", e);
                format!("Summarizer error: {}", e)
            }
        }
    }
}

#[async_trait]
impl Summarizer for GroqSummarizer {
    async fn summarize(&self, cve_id: &str, description: &str) -> String {
        trace!("Running GroqSummarizer::summarize() for {}", cve_id);
        self.ask(&cve_prompt(cve_id, description)).await
    }

    async fn classify_writeup(&self, title: &str, content: &str, tags: &[String]) -> String {
        trace!("Running GroqSummarizer::classify_writeup()");
        self.ask(&writeup_prompt(title, content, tags)).await
    }
}

/// The part of a chat completion we read.
#[derive(Debug, Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}
