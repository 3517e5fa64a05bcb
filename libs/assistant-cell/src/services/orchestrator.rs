use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;
use shared_models::auth::Caller;

use crate::models::{AssistantReply, ConversationTurn, FunctionResponse, ToolResults};
use crate::services::advice::extract_advice;
use crate::services::gemini::{ConversationModel, GeminiClient};
use crate::services::prompt;
use crate::services::tools::{BookingTool, ToolExecutor};

const INCOMPLETE_REPLY: &str =
    "I'm sorry, I couldn't finish that request. Could you tell me again what you'd like to do?";

/// Drives one conversational turn: the model asks for tools, the tools run as
/// the authenticated patient, and the results go back until the model answers
/// in plain text.
pub struct BookingOrchestrator {
    model: Arc<dyn ConversationModel>,
    tools: ToolExecutor,
    max_tool_rounds: usize,
    prompt_path: String,
}

impl BookingOrchestrator {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_parts(
            Arc::new(GeminiClient::new(config)),
            ToolExecutor::new(config),
            config.assistant_max_tool_rounds,
            config.assistant_prompt_path.clone(),
        )
    }

    pub fn with_parts(
        model: Arc<dyn ConversationModel>,
        tools: ToolExecutor,
        max_tool_rounds: usize,
        prompt_path: String,
    ) -> Self {
        Self {
            model,
            tools,
            max_tool_rounds: max_tool_rounds.max(1),
            prompt_path,
        }
    }

    pub async fn handle_turn(
        &self,
        caller: &Caller,
        patient_name: &str,
        message: &str,
        history: Vec<ConversationTurn>,
    ) -> AssistantReply {
        self.handle_turn_on(caller, patient_name, message, history, Utc::now().date_naive())
            .await
    }

    pub async fn handle_turn_on(
        &self,
        caller: &Caller,
        patient_name: &str,
        message: &str,
        history: Vec<ConversationTurn>,
        today: NaiveDate,
    ) -> AssistantReply {
        let instruction = prompt::system_instruction(&self.prompt_path, patient_name, today);
        let declarations = BookingTool::declarations();
        let mut results = ToolResults::default();

        let mut contents = history;
        contents.push(ConversationTurn::user_text(message));

        let mut response = match self.model.generate(&instruction, &contents, &declarations).await {
            Ok(turn) => turn,
            Err(e) => return apology(e, results, contents),
        };

        let mut rounds = 0;
        let text = loop {
            let calls = response.function_calls();
            if calls.is_empty() {
                let text = response.text();
                contents.push(response);
                break text;
            }

            if rounds >= self.max_tool_rounds {
                warn!(
                    "Model still requesting {} tools after {} rounds; stopping for caller {}",
                    calls.len(), rounds, caller.id
                );
                let text = response.text();
                // Unanswered tool requests would poison the next turn's history,
                // so only the text the caller sees is kept.
                match response.without_function_calls() {
                    Some(turn) if !text.trim().is_empty() => {
                        contents.push(turn);
                        break text;
                    }
                    _ => {
                        contents.push(ConversationTurn::model_text(INCOMPLETE_REPLY));
                        break INCOMPLETE_REPLY.to_string();
                    }
                }
            }
            rounds += 1;

            contents.push(response);

            // Writes must stay ordered, so the batch runs one call at a time.
            let mut responses = Vec::with_capacity(calls.len());
            for call in &calls {
                let payload = match self.tools.execute(caller, call).await {
                    Ok(outcome) => {
                        let payload = json!({ "result": outcome.payload() });
                        outcome.record(&mut results);
                        payload
                    }
                    Err(e) => {
                        info!("Tool {} failed for caller {}: {}", call.name, caller.id, e);
                        json!({ "error": e.to_string() })
                    }
                };
                responses.push(FunctionResponse { name: call.name.clone(), response: payload });
            }
            contents.push(ConversationTurn::function_responses(responses));

            debug!("Returning {} tool results to the model (round {})", calls.len(), rounds);
            response = match self.model.generate(&instruction, &contents, &declarations).await {
                Ok(turn) => turn,
                Err(e) => return apology(e, results, contents),
            };
        };

        let (text, advice) = extract_advice(&text);
        AssistantReply { text, advice, results, history: contents }
    }
}

fn apology(err: anyhow::Error, results: ToolResults, history: Vec<ConversationTurn>) -> AssistantReply {
    error!("Conversation model call failed: {}", err);
    AssistantReply {
        text: format!(
            "I'm sorry, I'm having trouble reaching the booking assistant right now. Please try again in a moment. (Details: {})",
            err
        ),
        advice: None,
        results,
        history,
    }
}

