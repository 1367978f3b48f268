use anyhow::Result;
use async_trait::async_trait;
use gemini_chat::GeminiClient;
use gemini_chat::types::{Content, Role};
use interview_core::{ChatRole, ChatTurn, ModelGateway};

/// Implements [`ModelGateway`] on top of `gemini_chat::GeminiClient`.
pub struct GeminiAdapter {
    client: GeminiClient,
}

impl GeminiAdapter {
    pub fn new(api_key: &str, model: Option<&str>) -> Self {
        Self {
            client: gemini_chat::connect(api_key, model),
        }
    }
}

pub fn to_contents(turns: &[ChatTurn]) -> Vec<Content> {
    turns
        .iter()
        .map(|turn| {
            let role = match turn.role {
                ChatRole::User => Role::User,
                ChatRole::Model => Role::Model,
            };
            Content::new(role, turn.text.as_str())
        })
        .collect()
}

#[async_trait]
impl ModelGateway for GeminiAdapter {
    async fn generate(&self, system_instruction: &str, turns: &[ChatTurn]) -> Result<String> {
        tracing::debug!("Sending {} turns to {}", turns.len(), self.client.model());
        self.client
            .generate(system_instruction, to_contents(turns))
            .await
    }
}
