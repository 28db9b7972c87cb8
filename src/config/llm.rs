// src/config/llm.rs
use serde::{Deserialize, Serialize};
use std::env;

fn default_provider() -> String {
    "groq".to_string()
}
fn default_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_temperature() -> f32 {
    0.2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "groq" | "openai" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Chat-completions URL; defaults per provider.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// "ENV" means: read from GROQ_API_KEY / OPENAI_API_KEY (by provider).
    /// Empty after resolution = no credential.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            endpoint: None,
            api_key: default_api_key(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
        }
    }
}

impl LlmConfig {
    /// Normalize provider, resolve an "ENV" key, apply `LLM_MODEL` / `LLM_API_KEY`.
    /// A missing key is not an error: the client degrades to "please configure".
    pub fn resolve(mut self) -> Self {
        self.provider = self.provider.trim().to_lowercase();

        if let Ok(key) = env::var("LLM_API_KEY") {
            self.api_key = key;
        } else if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = env::var(self.key_env_var()).unwrap_or_default();
        }
        self.api_key = self.api_key.trim().to_string();

        if let Ok(model) = env::var("LLM_MODEL") {
            if !model.trim().is_empty() {
                self.model = model.trim().to_string();
            }
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            self.temperature = default_temperature();
        }
        self
    }

    pub fn key_env_var(&self) -> &'static str {
        match self.provider.as_str() {
            "openai" => "OPENAI_API_KEY",
            _ => "GROQ_API_KEY",
        }
    }

    pub fn endpoint(&self) -> String {
        if let Some(e) = &self.endpoint {
            return e.clone();
        }
        match self.provider.as_str() {
            "openai" => "https://api.openai.com/v1/chat/completions".to_string(),
            _ => "https://api.groq.com/openai/v1/chat/completions".to_string(),
        }
    }

    pub fn has_credential(&self) -> bool {
        !self.api_key.is_empty() && !self.api_key.eq_ignore_ascii_case("env")
    }
}
