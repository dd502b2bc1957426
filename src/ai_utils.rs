use async_openai::{
    Client,
    types::{
        ChatCompletionNamedToolChoice, ChatCompletionTool, ChatCompletionToolChoiceOption,
        ChatCompletionToolType, FunctionName, FunctionObject,
    },
};
use schemars::{JsonSchema, schema_for};
use serde_json::json;

use crate::config::OpenAIConfig;

/// Build the chat client owned by the composition root.
pub fn build_client(config: &OpenAIConfig) -> Client<async_openai::config::OpenAIConfig> {
    Client::with_config(config.into())
}

pub fn extract_tool<T: JsonSchema>(strict: Option<bool>) -> ChatCompletionTool {
    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: FunctionObject {
            name: T::schema_name(),
            description: None,
            parameters: Some(json!(schema_for!(T))),
            strict,
        },
    }
}

/// Force the model to answer through `tool`.
pub fn named_tool_choice(tool: &ChatCompletionTool) -> ChatCompletionToolChoiceOption {
    ChatCompletionToolChoiceOption::Named(ChatCompletionNamedToolChoice {
        r#type: ChatCompletionToolType::Function,
        function: FunctionName {
            name: tool.function.name.clone(),
        },
    })
}

/// Find the first balanced `{...}` span in free-form model output.
///
/// Braces inside JSON string literals are ignored. Returns `None` when no object
/// opens, or when the first one never closes.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
