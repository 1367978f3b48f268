use secrecy::SecretString;

use super::consts;

pub struct Config {
    base_url: String,
    api_key: SecretString,
    model: String,
    temperature: f32,
}

pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.config.api_key = SecretString::from(api_key.to_string());
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.config.model = model.to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Defaults, with the key read from `OPENAI_API_KEY` when set.
    pub fn new() -> Self {
        Self {
            base_url: consts::BASE_URL.to_string(),
            api_key: std::env::var(consts::OPENAI_API_KEY)
                .unwrap_or_default()
                .into(),
            model: consts::DEFAULT_MODEL.to_string(),
            temperature: consts::DEFAULT_TEMPERATURE,
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}{}", self.base_url, consts::CHAT_COMPLETIONS_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = Config::builder()
            .with_base_url("http://localhost:8080/v1/")
            .with_api_key("sk-test")
            .with_model("gpt-test")
            .with_temperature(0.1)
            .build();

        assert_eq!(config.api_key().expose_secret(), "sk-test");
        assert_eq!(config.model(), "gpt-test");
        assert_eq!(config.temperature(), 0.1);
        assert_eq!(
            config.chat_completions_url(),
            "http://localhost:8080/v1/chat/completions"
        );
    }
}
