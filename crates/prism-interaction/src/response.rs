//! Response parsing for the OpenRouter-compatible API.
//!
//! Every function here takes the raw JSON body and either returns a typed
//! value or a [`PrismError`]; nothing downstream inspects raw payloads.

use prism_core::error::{PrismError, Result};
use prism_core::generation::{Balance, GenerationPayload, GenerationResult, ModelInfo};
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    message: ResponseMessage,
}

#[derive(Deserialize, Default)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<MessageContent>,
    #[serde(default)]
    images: Option<Vec<Value>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    fn into_text(self) -> String {
        match self {
            MessageContent::Text(text) => text,
            MessageContent::Parts(parts) => parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

#[derive(Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<Value>,
}

#[derive(Deserialize)]
struct ModelsResponse {
    data: Vec<WireModel>,
}

#[derive(Deserialize)]
struct WireModel {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    architecture: Option<Architecture>,
}

#[derive(Deserialize)]
struct Architecture {
    #[serde(default)]
    output_modalities: Vec<String>,
}

#[derive(Deserialize)]
struct CreditsResponse {
    data: Balance,
}

fn invalid_body(what: &str, err: serde_json::Error) -> PrismError {
    PrismError::api(None, format!("Unexpected {} response: {}", what, err), false)
}

/// Validates a chat completion body into a [`GenerationResult`].
///
/// Images from all choices are collected in order. `response_data` is the body
/// with each message's `images` removed so it can be persisted cheaply.
pub fn parse_generation_response(body: Value) -> Result<GenerationResult> {
    let parsed: ChatCompletionResponse =
        serde_json::from_value(body.clone()).map_err(|e| invalid_body("generation", e))?;

    if let Some(error) = parsed.error {
        let status = error
            .code
            .as_ref()
            .and_then(Value::as_u64)
            .and_then(|c| u16::try_from(c).ok());
        return Err(PrismError::api(status, error.message, false));
    }

    let mut texts = Vec::new();
    let mut images = Vec::new();
    for choice in parsed.choices {
        if let Some(content) = choice.message.content {
            let text = content.into_text();
            if !text.trim().is_empty() {
                texts.push(text);
            }
        }
        images.extend(
            choice
                .message
                .images
                .unwrap_or_default()
                .iter()
                .filter_map(image_url),
        );
    }

    let text = if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n"))
    };
    let payload = match (images.is_empty(), text) {
        (false, text) => GenerationPayload::Images { text, images },
        (true, Some(text)) => GenerationPayload::TextOnly { text },
        (true, None) => GenerationPayload::Empty,
    };

    Ok(GenerationResult {
        id: parsed.id,
        payload,
        response_data: strip_images(body),
    })
}

// Items without a usable url are dropped on their own.
fn image_url(item: &Value) -> Option<String> {
    item.get("image_url")
        .and_then(|image| image.get("url"))
        .and_then(Value::as_str)
        .filter(|url| !url.trim().is_empty())
        .map(str::to_string)
}

/// Removes the base64 image payloads from a chat completion body.
pub fn strip_images(mut body: Value) -> Value {
    if let Some(choices) = body.get_mut("choices").and_then(Value::as_array_mut) {
        for choice in choices {
            if let Some(message) = choice.get_mut("message").and_then(Value::as_object_mut) {
                message.remove("images");
            }
        }
    }
    body
}

/// Extracts the first text answer of a chat completion, cleaned up as a title.
pub fn parse_title_response(body: Value) -> Result<String> {
    let parsed: ChatCompletionResponse =
        serde_json::from_value(body).map_err(|e| invalid_body("title", e))?;
    if let Some(error) = parsed.error {
        return Err(PrismError::api(None, error.message, false));
    }
    parsed
        .choices
        .into_iter()
        .filter_map(|choice| choice.message.content)
        .map(|content| clean_title(&content.into_text()))
        .find(|title| !title.is_empty())
        .ok_or_else(|| PrismError::api(None, "Title model returned no text", false))
}

/// First non-empty line, without surrounding quotes or a trailing period.
pub fn clean_title(raw: &str) -> String {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");
    let unquoted = line
        .trim_matches(|c| c == '"' || c == '\'' || c == '`' || c == '*')
        .trim();
    unquoted.trim_end_matches('.').trim().to_string()
}

/// Models whose architecture advertises image output.
pub fn parse_models_response(body: Value) -> Result<Vec<ModelInfo>> {
    let parsed: ModelsResponse =
        serde_json::from_value(body).map_err(|e| invalid_body("models", e))?;
    Ok(parsed
        .data
        .into_iter()
        .map(|model| ModelInfo {
            name: model.name.unwrap_or_else(|| model.id.clone()),
            id: model.id,
            description: model.description,
            output_modalities: model
                .architecture
                .map(|a| a.output_modalities)
                .unwrap_or_default(),
        })
        .filter(ModelInfo::supports_image_output)
        .collect())
}

pub fn parse_balance_response(body: Value) -> Result<Balance> {
    let parsed: CreditsResponse =
        serde_json::from_value(body).map_err(|e| invalid_body("credits", e))?;
    Ok(parsed.data)
}

/// Usage/cost payload of a generation. The API wraps it in `data`.
pub fn parse_generation_info(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Maps a non-success HTTP status and its body to an API error.
pub fn map_http_error(status: u16, body: &str) -> PrismError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                format!("HTTP {}", status)
            } else {
                body.to_string()
            }
        });

    let retryable = matches!(status, 408 | 429 | 500 | 502 | 503 | 504);
    PrismError::api(Some(status), message, retryable)
}
