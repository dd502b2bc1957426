use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{ChatCompletionRequestMessage, CreateChatCompletionRequestArgs},
};
use async_trait::async_trait;
use tracing::debug;

use crate::{
    ai_utils::{self, extract_json_object},
    error::{Error, Result},
    quiz::QuizPayload,
};

pub const QUIZ_INSTRUCTION: &str = "You are an educational assistant. Analyze the provided content and:\n\
1. DECIDE whether it teaches concepts. Set has_quiz=false for intros, outros, vlogs, announcements and previews; \
set has_quiz=true for lessons, tutorials, explanations and lectures.\n\
2. If has_quiz=true, write exactly 5 multiple-choice questions, each with exactly 4 options and the text of the correct option as answer.\n\
If has_quiz=false, questions must be an empty list. Always give a brief reason.";

/// Primary inference backend: builds a quiz verdict from transcript text.
#[async_trait]
pub trait QuizInference: Send + Sync {
    async fn infer(&self, text: &str) -> Result<QuizPayload>;
}

pub struct OpenAiQuizClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiQuizClient {
    pub fn new(client: Client<OpenAIConfig>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl QuizInference for OpenAiQuizClient {
    async fn infer(&self, text: &str) -> Result<QuizPayload> {
        let tool = ai_utils::extract_tool::<QuizPayload>(None);
        let tool_choice = ai_utils::named_tool_choice(&tool);
        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(vec![
                ChatCompletionRequestMessage::System(QUIZ_INSTRUCTION.into()),
                ChatCompletionRequestMessage::User(
                    format!("Analyze this transcript:\n\n{text}").into(),
                ),
            ])
            .tools(vec![tool])
            .tool_choice(tool_choice)
            .temperature(0.7)
            .max_completion_tokens(2000u32)
            .build()
            .map_err(|e| Error::Fatal(e.into()))?;
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| Error::ExternalBackend(format!("OpenAI request failed: {e}")))?;
        let message = &response
            .choices
            .first()
            .ok_or_else(|| Error::MalformedResponse("no choices in OpenAI response".to_string()))?
            .message;
        let raw = message
            .tool_calls
            .as_ref()
            .and_then(|calls| calls.first())
            .map(|call| call.function.arguments.as_str())
            .or(message.content.as_deref())
            .ok_or_else(|| Error::MalformedResponse("empty OpenAI response".to_string()))?;
        debug!(len = raw.len(), "quiz verdict received");
        parse_verdict(raw)
    }
}

/// Parse the structured verdict. Models sometimes wrap the object in prose or fences.
pub fn parse_verdict(raw: &str) -> Result<QuizPayload> {
    let json = extract_json_object(raw).unwrap_or(raw);
    let payload: QuizPayload = serde_json::from_str(json)
        .map_err(|e| Error::MalformedResponse(format!("quiz verdict is not valid JSON: {e}")))?;
    Ok(payload.normalize())
}
