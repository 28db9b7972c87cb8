//! LLM adapter: completion-client abstraction, the chat-completions provider,
//! and the disabled / mock clients used when no credential is configured or
//! under test.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{AgentError, Result};

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// Text-in / text-out completion service.
pub trait LlmClient: Send + Sync {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;

    /// False when every call would fail with `CredentialMissing`.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Convenient alias used by callers.
pub type DynLlm = Arc<dyn LlmClient>;

/// Factory: build a client according to config and environment variables.
///
/// * If `LLM_TEST_MODE=mock`, returns an echoing mock client.
/// * Else if no credential is configured, returns a disabled client.
/// * Else builds the chat-completions provider.
pub fn build_client(config: &LlmConfig) -> DynLlm {
    if std::env::var("LLM_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockLlm::echo());
    }

    if !config.has_credential() {
        tracing::warn!(
            target: "llm",
            env = config.key_env_var(),
            "no LLM credential configured; LLM-backed answers are disabled"
        );
        return Arc::new(DisabledClient);
    }

    match ChatCompletionsClient::new(config) {
        Ok(c) => Arc::new(c),
        Err(e) => {
            tracing::error!(target: "llm", error = %e, "failed to build LLM client");
            Arc::new(DisabledClient)
        }
    }
}

// ------------------------------------------------------------
// Chat-completions provider (Groq / OpenAI compatible)
// ------------------------------------------------------------

pub struct ChatCompletionsClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    temperature: f32,
    provider: &'static str,
}

impl ChatCompletionsClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("econ-insight-agent/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| AgentError::Config(format!("reqwest client: {e}")))?;
        let provider = match config.provider.as_str() {
            "openai" => "openai",
            _ => "groq",
        };
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            endpoint: config.endpoint(),
            temperature: config.temperature,
            provider,
        })
    }

    async fn complete_impl(&self, prompt: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(AgentError::CredentialMissing);
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let req = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let t0 = Instant::now();
        counter!("llm_calls_total").increment(1);
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .inspect_err(|_| counter!("llm_errors_total").increment(1))?;

        let status = resp.status();
        if !status.is_success() {
            counter!("llm_errors_total").increment(1);
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(AgentError::TransientServiceFailure(format!(
                "{} returned {status}: {snippet}",
                self.provider
            )));
        }

        let body: Resp = resp
            .json()
            .await
            .inspect_err(|_| counter!("llm_errors_total").increment(1))?;
        histogram!("llm_latency_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let cleaned = tidy_completion(&content);
        if cleaned.is_empty() {
            return Err(AgentError::TransientServiceFailure(
                "empty completion".to_string(),
            ));
        }
        Ok(cleaned)
    }
}

impl LlmClient for ChatCompletionsClient {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.complete_impl(prompt))
    }
    fn provider_name(&self) -> &'static str {
        self.provider
    }
}

/// Used when no credential is configured; every call is `CredentialMissing`.
pub struct DisabledClient;

impl LlmClient for DisabledClient {
    fn complete<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async { Err(AgentError::CredentialMissing) })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
    fn is_configured(&self) -> bool {
        false
    }
}

// ------------------------------------------------------------
// Mock client for tests/local runs
// ------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum MockMode {
    /// Always return this text.
    Fixed(String),
    /// Return the prompt itself.
    Echo,
    /// Pop scripted replies in order, echo once exhausted.
    Scripted(VecDeque<String>),
    /// Fail like a missing credential.
    Unavailable,
    /// Fail like a network error.
    Failing(String),
}

/// Deterministic client that records every prompt it receives.
pub struct MockLlm {
    mode: Mutex<MockMode>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn new(mode: MockMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn fixed(reply: impl Into<String>) -> Self {
        Self::new(MockMode::Fixed(reply.into()))
    }

    pub fn echo() -> Self {
        Self::new(MockMode::Echo)
    }

    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(MockMode::Scripted(
            replies.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn unavailable() -> Self {
        Self::new(MockMode::Unavailable)
    }

    pub fn failing(msg: impl Into<String>) -> Self {
        Self::new(MockMode::Failing(msg.into()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts().pop()
    }

    fn reply(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(prompt.to_string());

        let mut mode = self.mode.lock().unwrap_or_else(|p| p.into_inner());
        match &mut *mode {
            MockMode::Fixed(s) => Ok(s.clone()),
            MockMode::Echo => Ok(prompt.to_string()),
            MockMode::Scripted(q) => Ok(q.pop_front().unwrap_or_else(|| prompt.to_string())),
            MockMode::Unavailable => Err(AgentError::CredentialMissing),
            MockMode::Failing(msg) => Err(AgentError::TransientServiceFailure(msg.clone())),
        }
    }
}

impl LlmClient for MockLlm {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        let out = self.reply(prompt);
        Box::pin(async move { out })
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
    fn is_configured(&self) -> bool {
        !matches!(
            *self.mode.lock().unwrap_or_else(|p| p.into_inner()),
            MockMode::Unavailable
        )
    }
}

// ------------------------------------------------------------
// Sanitization
// ------------------------------------------------------------

/// Trim and strip a Markdown code fence wrapped around the whole completion.
pub fn tidy_completion(input: &str) -> String {
    let t = input.trim();
    if let Some(rest) = t.strip_prefix("```") {
        let body = rest
            .split_once('\n')
            .map(|(_lang, body)| body)
            .unwrap_or(rest);
        return body.trim_end().trim_end_matches("```").trim().to_string();
    }
    t.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_client_reports_missing_credential() {
        let c = DisabledClient;
        assert!(!c.is_configured());
        let err = c.complete("hi").await.unwrap_err();
        assert!(matches!(err, AgentError::CredentialMissing));
    }

    #[tokio::test]
    async fn scripted_mock_pops_then_echoes() {
        let m = MockLlm::scripted(["first"]);
        assert_eq!(m.complete("p1").await.unwrap(), "first");
        assert_eq!(m.complete("p2").await.unwrap(), "p2");
        assert_eq!(m.calls(), 2);
        assert_eq!(m.prompts(), vec!["p1".to_string(), "p2".to_string()]);
    }

    #[test]
    fn tidy_strips_fences() {
        assert_eq!(tidy_completion("```markdown\n# Report\nbody\n```"), "# Report\nbody");
        assert_eq!(tidy_completion("  SUMMARY \n"), "SUMMARY");
    }

    #[serial_test::serial]
    #[test]
    fn factory_degrades_without_credential() {
        std::env::remove_var("LLM_TEST_MODE");
        let cfg = LlmConfig {
            api_key: String::new(),
            ..Default::default()
        };
        let c = build_client(&cfg);
        assert_eq!(c.provider_name(), "disabled");
        assert!(!c.is_configured());
    }
}
