use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::warn;

use loanbot_core::config::LlmConfig;
use loanbot_core::domain::conversation::Message;

use crate::extraction::{ExtractionResult, Extractor};
use crate::fallback::RuleBasedExtractor;

/// Fixed instruction prefixed to every extraction call. The output
/// contract mirrors `ExtractionResult`.
pub const SYSTEM_PROMPT: &str = r#"You are a loan intake assistant. Your job is to collect the following fields:
- applicant_name (string)
- applicant_email (string email)
- amount (number)
- purpose (string brief purpose)

Rules:
1. Respond ONLY with minified JSON: {"action":"ask|save","question": "...", "missing":[...], "collected": {...}}
2. If any field is missing, set action="ask" and provide a concise follow-up question to get the next missing field.
3. If all fields are present, set action="save" and no question.
4. Keep "missing" ordered by priority: applicant_name, applicant_email, amount, purpose.
5. "collected" must contain every field you already know.
"#;

const EXTRACTION_TEMPERATURE: f32 = 0.2;
const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";

/// Chat-completion client seam. Pluggable so tests can script responses
/// without a network.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, messages: &[Message], temperature: f32) -> Result<String>;
}

/// Minimal OpenAI-compatible chat client. Works with local runtimes such
/// as Ollama/llama.cpp that expose `/v1/chat/completions`. Exactly one
/// attempt per call with a bounded timeout; retry policy is deliberately
/// absent, callers recover through the fallback extractor.
pub struct OpenAiChatClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
}

impl OpenAiChatClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("failed to build LLM http client")?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self { client, base_url, model: config.model.clone(), api_key: config.api_key.clone() })
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    async fn chat(&self, messages: &[Message], temperature: f32) -> Result<String> {
        let payload = ChatCompletionRequest { model: &self.model, messages, temperature };

        let mut request =
            self.client.post(format!("{}/chat/completions", self.base_url)).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .context("LLM request failed")?
            .error_for_status()
            .context("LLM endpoint returned non-success status")?;

        let body: ChatCompletionResponse =
            response.json().await.context("LLM response body was not valid JSON")?;

        let choice = body.choices.into_iter().next().context("LLM response had no choices")?;
        Ok(choice.message.content)
    }
}

/// Extraction gateway backed by an LLM, with an absolute availability
/// guarantee: any transport or shape failure is recovered locally and the
/// caller always receives a usable result.
pub struct LlmExtractor<C = OpenAiChatClient> {
    client: C,
    fallback: RuleBasedExtractor,
}

impl<C> LlmExtractor<C>
where
    C: LlmClient,
{
    pub fn new(client: C) -> Self {
        Self { client, fallback: RuleBasedExtractor::new() }
    }
}

#[async_trait]
impl<C> Extractor for LlmExtractor<C>
where
    C: LlmClient,
{
    async fn extract(&self, transcript: &[Message]) -> ExtractionResult {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(Message::system(SYSTEM_PROMPT));
        messages.extend_from_slice(transcript);

        match self.client.chat(&messages, EXTRACTION_TEMPERATURE).await {
            Ok(content) => ExtractionResult::parse(&content),
            Err(error) => {
                warn!(
                    event_name = "agent.extraction.fallback",
                    error = %error,
                    "LLM extraction unavailable, using rule-based extractor"
                );
                self.fallback.extract(transcript).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use loanbot_core::config::LlmConfig;
    use loanbot_core::domain::conversation::{Message, Role};
    use serde_json::json;

    use super::{LlmClient, LlmExtractor, OpenAiChatClient, SYSTEM_PROMPT};
    use crate::extraction::{ExtractionAction, Extractor};

    struct ScriptedClient {
        reply: Result<String, String>,
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn chat(&self, messages: &[Message], _temperature: f32) -> Result<String> {
            assert_eq!(messages.first().map(|m| m.role), Some(Role::System));
            assert_eq!(messages.first().map(|m| m.content.as_str()), Some(SYSTEM_PROMPT));
            self.reply.clone().map_err(|message| anyhow!(message))
        }
    }

    #[tokio::test]
    async fn well_formed_model_output_is_parsed() {
        let extractor = LlmExtractor::new(ScriptedClient {
            reply: Ok(r#"{"action":"save","missing":[],"collected":{"applicant_name":"Alex"}}"#
                .to_string()),
        });

        let result = extractor.extract(&[Message::user("I'm Alex")]).await;
        assert_eq!(result.action, ExtractionAction::Save);
        assert_eq!(result.collected.get("applicant_name"), Some(&json!("Alex")));
    }

    #[tokio::test]
    async fn malformed_model_output_degrades_to_ask_everything() {
        let extractor =
            LlmExtractor::new(ScriptedClient { reply: Ok("I think the name is Alex".to_string()) });

        let result = extractor.extract(&[Message::user("I'm Alex")]).await;
        assert_eq!(result.action, ExtractionAction::Ask);
        assert_eq!(result.missing.len(), 4);
    }

    #[tokio::test]
    async fn transport_failure_uses_rule_based_extractor() {
        let extractor =
            LlmExtractor::new(ScriptedClient { reply: Err("connection refused".to_string()) });

        let transcript = vec![Message::user(r#"{"applicant_name":"Alex"}"#)];
        let result = extractor.extract(&transcript).await;

        assert_eq!(result.action, ExtractionAction::Ask);
        assert_eq!(result.collected.get("applicant_name"), Some(&json!("Alex")));
        assert_eq!(result.missing, vec!["applicant_email", "amount", "purpose"]);
    }

    #[tokio::test]
    async fn refused_connection_still_yields_a_usable_result() {
        // Port 9 (discard) is expected to refuse connections outright.
        let config = LlmConfig {
            provider: loanbot_core::config::LlmProvider::Ollama,
            api_key: None,
            base_url: Some("http://127.0.0.1:9/v1".to_string()),
            model: "llama3".to_string(),
            timeout_secs: 2,
        };
        let client = OpenAiChatClient::new(&config).expect("client should build");
        let extractor = LlmExtractor::new(client);

        let result = extractor.extract(&[Message::user("hello")]).await;
        assert_eq!(result.action, ExtractionAction::Ask);
        assert!(!result.missing.is_empty());
    }
}
