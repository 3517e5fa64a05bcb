use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, error, info};

use shared_config::AppConfig;

use crate::models::{ConversationTurn, TurnPart, TurnRole};

/// An external model that, given an instruction, the conversation so far and a
/// set of callable tools, answers with text and/or tool requests.
#[async_trait]
pub trait ConversationModel: Send + Sync {
    async fn generate(
        &self,
        system_instruction: &str,
        contents: &[ConversationTurn],
        tools: &[Value],
    ) -> Result<ConversationTurn>;
}

/// Google Gemini `generateContent` client.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
            api_key: config.gemini_api_key.clone(),
        }
    }

    fn build_request_body(system_instruction: &str, contents: &[ConversationTurn], tools: &[Value]) -> Value {
        let mut body = json!({
            "system_instruction": { "parts": [{ "text": system_instruction }] },
            "contents": contents,
        });
        if !tools.is_empty() {
            body["tools"] = json!([{ "function_declarations": tools }]);
        }
        body
    }

    fn parse_response(data: &Value) -> Result<ConversationTurn> {
        let Some(candidate) = data.get("candidates").and_then(|c| c.get(0)) else {
            let reason = data
                .pointer("/promptFeedback/blockReason")
                .and_then(Value::as_str)
                .unwrap_or("no candidates returned");
            bail!("Gemini returned no answer ({})", reason);
        };

        // Parts we do not model (inline data, code execution) are skipped.
        let parts: Vec<TurnPart> = candidate
            .pointer("/content/parts")
            .and_then(Value::as_array)
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| serde_json::from_value(part.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        if parts.is_empty() {
            let reason = candidate
                .get("finishReason")
                .and_then(Value::as_str)
                .unwrap_or("UNKNOWN");
            bail!("Gemini returned an empty answer (finishReason: {})", reason);
        }

        Ok(ConversationTurn { role: TurnRole::Model, parts })
    }
}

#[async_trait]
impl ConversationModel for GeminiClient {
    async fn generate(
        &self,
        system_instruction: &str,
        contents: &[ConversationTurn],
        tools: &[Value],
    ) -> Result<ConversationTurn> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = Self::build_request_body(system_instruction, contents, tools);

        info!(model = %self.model, turns = contents.len(), tools = tools.len(), "Calling Gemini");

        // Key goes in a header so it never shows up in logged URLs.
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini request failed: {}", e);
                anyhow!("Gemini request failed: {}", e)
            })?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!(status = %status, "Gemini API error: {}", text);
            bail!("Gemini API error ({}): {}", status, text);
        }

        let data: Value = serde_json::from_str(&text)
            .map_err(|e| anyhow!("Malformed Gemini response: {}", e))?;
        let turn = Self::parse_response(&data)?;
        debug!("Gemini answered with {} parts", turn.parts.len());
        Ok(turn)
    }
}
