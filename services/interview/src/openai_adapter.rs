use anyhow::Result;
use async_trait::async_trait;
use interview_core::{ChatRole, ChatTurn, ModelGateway};
use openai_chat::types::Message;

/// Implements [`ModelGateway`] on top of `openai_chat::Client`.
pub struct OpenAIAdapter {
    client: openai_chat::Client,
}

impl OpenAIAdapter {
    pub fn new(api_key: &str, model: &str) -> Self {
        let config = openai_chat::Config::builder()
            .with_api_key(api_key)
            .with_model(model)
            .build();
        Self {
            client: openai_chat::connect_with_config(config),
        }
    }

    pub fn stats(&self) -> Result<openai_chat::Stats> {
        self.client.stats()
    }
}

/// System instruction first, then the conversation in order.
pub fn to_messages(system_instruction: &str, turns: &[ChatTurn]) -> Vec<Message> {
    std::iter::once(Message::system(system_instruction))
        .chain(turns.iter().map(|turn| match turn.role {
            ChatRole::User => Message::user(turn.text.as_str()),
            ChatRole::Model => Message::assistant(turn.text.as_str()),
        }))
        .collect()
}

#[async_trait]
impl ModelGateway for OpenAIAdapter {
    async fn generate(&self, system_instruction: &str, turns: &[ChatTurn]) -> Result<String> {
        let messages = to_messages(system_instruction, turns);
        tracing::debug!(
            "Sending {} messages to {}",
            messages.len(),
            self.client.model()
        );
        self.client.chat(&messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openai_chat::types::MessageRole;

    #[test]
    fn test_to_messages_maps_roles() {
        let turns = [ChatTurn::model("Welcome"), ChatTurn::user("Hi")];
        let messages = to_messages("Be an interviewer", &turns);
        let roles: Vec<MessageRole> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![MessageRole::System, MessageRole::Assistant, MessageRole::User]
        );
        assert_eq!(messages[0].content, "Be an interviewer");
        assert_eq!(messages[2].content, "Hi");
    }
}
