use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<Delta>,
}

/// One `data:` payload of a chat completion stream.
///
/// Every field is optional: a payload without `choices[0].delta.content` is an
/// empty delta, not an error.
#[derive(Debug, Default, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<Choice>,
}

impl ChatCompletionChunk {
    /// Content delta of the first choice, empty when absent.
    pub fn into_content_delta(self) -> String {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .unwrap_or_default()
    }
}

/// Extract an error message carried inside a stream payload or error body.
pub fn extract_api_error_message(event_json: &Value) -> Option<String> {
    let error = event_json.get("error")?;
    if error.is_null() {
        return None;
    }
    if let Some(message) = error.get("message").and_then(|value| value.as_str()) {
        return Some(message.to_string());
    }
    if let Some(message) = error.as_str() {
        return Some(message.to_string());
    }
    Some("An error occurred during streaming".to_string())
}

/// Body of the non-streaming alternate endpoint.
#[derive(Debug, Deserialize)]
pub struct DirectReply {
    #[serde(default)]
    reply: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

impl DirectReply {
    pub fn into_text(self) -> Option<String> {
        self.reply.or(self.content)
    }
}
