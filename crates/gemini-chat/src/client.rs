use crate::types::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Role,
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// A client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

/// Creates a client for `model`, or [`DEFAULT_MODEL`] when `None`.
pub fn connect(api_key: &str, model: Option<&str>) -> GeminiClient {
    tracing::info!("Using Gemini model {}", model.unwrap_or(DEFAULT_MODEL));
    GeminiClient {
        http: reqwest::Client::new(),
        api_key: SecretString::from(api_key.to_string()),
        model: model.unwrap_or(DEFAULT_MODEL).to_string(),
        base_url: BASE_URL.to_string(),
    }
}

impl GeminiClient {
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// Generates one model turn for the conversation in `contents`.
    ///
    /// The conversation must open with a user turn; a leading model turn is
    /// preceded by a short user placeholder.
    pub async fn generate(&self, system_instruction: &str, contents: Vec<Content>) -> Result<String> {
        let request = GenerateContentRequest {
            system_instruction: Some(Content::system(system_instruction)),
            contents: normalize_contents(contents),
            generation_config: GenerationConfig { temperature: 0.7 },
        };

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .context("Failed to reach Gemini generateContent")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Gemini request failed: {} {}", status, body);
            return Err(anyhow::anyhow!("Gemini request failed ({status}): {body}"));
        }

        let response: GenerateContentResponse = response
            .json()
            .await
            .context("Failed to deserialize Gemini response")?;

        if let Some(usage) = response.usage_metadata {
            tracing::debug!(
                "total_tokens: {}, prompt_tokens: {}, candidate_tokens: {}",
                usage.total_token_count,
                usage.prompt_token_count,
                usage.candidates_token_count
            );
        }

        response
            .text()
            .ok_or_else(|| anyhow::anyhow!("Gemini returned no candidates"))
    }
}

fn normalize_contents(mut contents: Vec<Content>) -> Vec<Content> {
    if contents.first().and_then(|c| c.role) != Some(Role::User) {
        contents.insert(0, Content::new(Role::User, "Hello."));
    }
    contents
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_model_turn_gets_user_placeholder() {
        let contents = normalize_contents(vec![
            Content::new(Role::Model, "Welcome"),
            Content::new(Role::User, "Hi"),
        ]);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0].role, Some(Role::User));

        let untouched = normalize_contents(vec![Content::new(Role::User, "Hi")]);
        assert_eq!(untouched.len(), 1);
    }

    #[test]
    fn test_endpoint_includes_model() {
        let client = connect("key", Some("gemini-test")).with_base_url("http://localhost:9000/");
        assert_eq!(
            client.endpoint(),
            "http://localhost:9000/models/gemini-test:generateContent"
        );
    }

    #[tokio::test]
    #[ignore = "calls the live Gemini API; needs GEMINI_API_KEY"]
    async fn test_live_generate() -> Result<()> {
        dotenvy::dotenv().ok();
        let key = std::env::var("GEMINI_API_KEY")?;
        let client = connect(&key, None);
        let reply = client
            .generate(
                "Answer with a single word.",
                vec![Content::new(Role::User, "What colour is the sky on a clear day?")],
            )
            .await?;
        assert!(!reply.trim().is_empty());
        Ok(())
    }
}
