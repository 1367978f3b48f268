use crate::types::{ChatRequest, ChatResponse, ErrorResponse, Message};
use anyhow::{Context, Result};
use secrecy::ExposeSecret;
use std::sync::{Arc, Mutex};

mod config;
mod consts;
mod stats;

pub use config::{Config, ConfigBuilder};
pub use stats::Stats;

/// HTTP client for chat completions. Usage is tracked across requests.
pub struct Client {
    http: reqwest::Client,
    config: Config,
    stats: Arc<Mutex<Stats>>,
}

impl Client {
    fn new(config: Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            stats: Arc::new(Mutex::new(Stats::new())),
        }
    }

    pub fn model(&self) -> &str {
        self.config.model()
    }

    /// Sends one chat completion request and returns the first choice's text.
    pub async fn chat(&self, messages: &[Message]) -> Result<String> {
        let request = ChatRequest {
            model: self.config.model(),
            messages,
            temperature: self.config.temperature(),
        };

        let response = self
            .http
            .post(self.config.chat_completions_url())
            .bearer_auth(self.config.api_key().expose_secret())
            .json(&request)
            .send()
            .await
            .context("Failed to reach chat completions endpoint")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            tracing::error!("chat completion failed: {} {}", status, message);
            return Err(anyhow::anyhow!("chat completion failed ({status}): {message}"));
        }

        let response: ChatResponse = response
            .json()
            .await
            .context("Failed to deserialize chat completion")?;

        if let Some(usage) = response.usage {
            if let Ok(mut stats_guard) = self.stats.lock() {
                stats_guard.update_usage(
                    usage.total_tokens,
                    usage.prompt_tokens,
                    usage.completion_tokens,
                );
            } else {
                tracing::error!("failed to update stats");
            }
            tracing::debug!(
                "total_tokens: {}, prompt_tokens: {}, completion_tokens: {}",
                usage.total_tokens,
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }

        response
            .first_content()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("No response from LLM"))
    }

    /// Snapshot of accumulated token usage.
    pub fn stats(&self) -> Result<Stats> {
        if let Ok(stats_guard) = self.stats.lock() {
            Ok(stats_guard.clone())
        } else {
            Err(anyhow::anyhow!("failed to get stats"))
        }
    }
}

pub fn connect_with_config(config: Config) -> Client {
    Client::new(config)
}

/// Client with default settings and the key from the environment.
pub fn connect() -> Client {
    connect_with_config(Config::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "calls the live OpenAI API; needs OPENAI_API_KEY"]
    async fn test_live_chat_completion() -> Result<()> {
        dotenvy::dotenv().ok();
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init()
            .ok();

        let client = connect();
        let reply = client
            .chat(&[
                Message::system("Answer with a single word."),
                Message::user("What colour is the sky on a clear day?"),
            ])
            .await?;
        assert!(!reply.trim().is_empty());
        assert_eq!(client.stats()?.requests(), 1);
        Ok(())
    }
}
