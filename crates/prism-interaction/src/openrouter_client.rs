//! OpenRouterClient - REST client for an OpenRouter-compatible inference API.
//!
//! Image generation goes through `chat/completions` with the `image` output
//! modality. The API key is passed per call because it lives in the user's
//! preferences and may change between calls.

use crate::response::{
    map_http_error, parse_balance_response, parse_generation_info, parse_generation_response,
    parse_models_response, parse_title_response,
};
use async_trait::async_trait;
use prism_core::config::ApiConfig;
use prism_core::error::{PrismError, Result};
use prism_core::generation::{
    Balance, ChatRole, GenerationRequest, GenerationResult, ImageGenerationApi, ModelInfo,
};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde_json::Value;

const TITLE_MAX_TOKENS: u32 = 32;

/// Client for the remote inference API.
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    base_url: String,
    referer: Option<String>,
    app_title: Option<String>,
}

impl OpenRouterClient {
    /// Creates a client for `base_url` (e.g. `https://openrouter.ai/api/v1`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            referer: None,
            app_title: None,
        }
    }

    pub fn from_config(config: &ApiConfig) -> Self {
        let mut client = Self::new(config.base_url.clone());
        client.referer = config.referer.clone().filter(|r| !r.trim().is_empty());
        client.app_title = Some(config.app_title.clone()).filter(|t| !t.trim().is_empty());
        client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder, api_key: &str) -> RequestBuilder {
        let mut builder = builder
            .bearer_auth(api_key)
            .header("accept", "application/json");
        if let Some(referer) = &self.referer {
            builder = builder.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.app_title {
            builder = builder.header("X-Title", title);
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Value> {
        let response = builder.send().await.map_err(|err| {
            PrismError::api(
                None,
                format!("{} request failed: {}", what, err),
                err.is_connect() || err.is_timeout(),
            )
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| format!("Failed to read {} error body", what));
            tracing::warn!(status = status.as_u16(), "{} request rejected", what);
            return Err(map_http_error(status.as_u16(), &body_text));
        }

        response.json::<Value>().await.map_err(|err| {
            PrismError::api(
                Some(status.as_u16()),
                format!("Failed to parse {} response: {}", what, err),
                false,
            )
        })
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        api_key: &str,
        body: &B,
        what: &str,
    ) -> Result<Value> {
        let builder = self.authorized(self.client.post(self.url(path)), api_key).json(body);
        self.send(builder, what).await
    }

    async fn get_json(
        &self,
        path: &str,
        api_key: &str,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<Value> {
        let builder = self
            .authorized(self.client.get(self.url(path)), api_key)
            .query(query);
        self.send(builder, what).await
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    modalities: Option<[&'static str; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<WireImageConfig<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct WireImageConfig<'a> {
    image_size: String,
    aspect_ratio: &'a str,
}

#[derive(Serialize)]
struct ChatMessage {
    role: ChatRole,
    content: MessageContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

/// Builds the message list: system prompt, prior turns, then the new prompt.
fn build_messages(request: &GenerationRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    if !request.system_prompt.trim().is_empty() {
        messages.push(ChatMessage {
            role: ChatRole::System,
            content: MessageContent::Text(request.system_prompt.clone()),
        });
    }
    messages.extend(request.history.iter().map(|turn| ChatMessage {
        role: turn.role,
        content: MessageContent::Text(turn.content.clone()),
    }));

    let content = match &request.image_input {
        Some(url) => MessageContent::Parts(vec![
            ContentPart::Text {
                text: request.prompt.clone(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl { url: url.clone() },
            },
        ]),
        None => MessageContent::Text(request.prompt.clone()),
    };
    messages.push(ChatMessage {
        role: ChatRole::User,
        content,
    });
    messages
}

fn generation_body(request: &GenerationRequest) -> ChatCompletionRequest<'_> {
    ChatCompletionRequest {
        model: &request.model,
        messages: build_messages(request),
        modalities: Some(["image", "text"]),
        image_config: Some(WireImageConfig {
            image_size: request.image_config.image_size.to_string(),
            aspect_ratio: &request.image_config.aspect_ratio,
        }),
        seed: request.seed,
        max_tokens: None,
    }
}

#[async_trait]
impl ImageGenerationApi for OpenRouterClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        tracing::info!(
            model = %request.model,
            size = %request.image_config.image_size,
            seed = ?request.seed,
            history = request.history.len(),
            "Requesting image generation"
        );
        let body = generation_body(request);
        let value = self
            .post_json("chat/completions", &request.api_key, &body, "generation")
            .await?;
        parse_generation_response(value)
    }

    async fn fetch_models(&self, api_key: &str) -> Result<Vec<ModelInfo>> {
        let value = self.get_json("models", api_key, &[], "models").await?;
        parse_models_response(value)
    }

    async fn fetch_balance(&self, api_key: &str) -> Result<Balance> {
        let value = self.get_json("credits", api_key, &[], "credits").await?;
        parse_balance_response(value)
    }

    async fn generation_info(&self, api_key: &str, generation_id: &str) -> Result<Value> {
        let value = self
            .get_json("generation", api_key, &[("id", generation_id)], "generation info")
            .await?;
        Ok(parse_generation_info(value))
    }

    async fn generate_title(
        &self,
        api_key: &str,
        prompt: &str,
        system_prompt: &str,
        model: &str,
    ) -> Result<String> {
        let body = ChatCompletionRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: ChatRole::System,
                    content: MessageContent::Text(system_prompt.to_string()),
                },
                ChatMessage {
                    role: ChatRole::User,
                    content: MessageContent::Text(prompt.to_string()),
                },
            ],
            modalities: None,
            image_config: None,
            seed: None,
            max_tokens: Some(TITLE_MAX_TOKENS),
        };
        let value = self
            .post_json("chat/completions", api_key, &body, "title")
            .await?;
        parse_title_response(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::conversation::Resolution;
    use prism_core::generation::{ChatTurn, ImageConfig};

    fn request(image_input: Option<&str>) -> GenerationRequest {
        GenerationRequest {
            api_key: "sk-test".to_string(),
            prompt: "a cat".to_string(),
            model: "google/gemini-2.5-flash-image".to_string(),
            system_prompt: "be vivid".to_string(),
            history: vec![
                ChatTurn::new(ChatRole::User, "a dog"),
                ChatTurn::new(ChatRole::Assistant, "Here is a dog"),
            ],
            image_config: ImageConfig {
                image_size: Resolution::TwoK,
                aspect_ratio: "16:9".to_string(),
            },
            seed: Some(42),
            image_input: image_input.map(str::to_string),
        }
    }

    #[test]
    fn test_generation_body_shape() {
        let req = request(None);
        let json = serde_json::to_value(generation_body(&req)).unwrap();

        assert_eq!(json["model"], "google/gemini-2.5-flash-image");
        assert_eq!(json["modalities"], serde_json::json!(["image", "text"]));
        assert_eq!(json["image_config"]["image_size"], "2K");
        assert_eq!(json["image_config"]["aspect_ratio"], "16:9");
        assert_eq!(json["seed"], 42);
        assert!(json.get("max_tokens").is_none());

        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "a dog");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[3]["role"], "user");
        assert_eq!(messages[3]["content"], "a cat");
    }

    #[test]
    fn test_image_input_becomes_content_parts() {
        let req = request(Some("data:image/png;base64,aGk="));
        let json = serde_json::to_value(generation_body(&req)).unwrap();
        let last = json["messages"].as_array().unwrap().last().unwrap().clone();

        assert_eq!(last["content"][0]["type"], "text");
        assert_eq!(last["content"][0]["text"], "a cat");
        assert_eq!(last["content"][1]["type"], "image_url");
        assert_eq!(last["content"][1]["image_url"]["url"], "data:image/png;base64,aGk=");
    }

    #[test]
    fn test_empty_system_prompt_is_omitted() {
        let mut req = request(None);
        req.system_prompt = "   ".to_string();
        req.history.clear();
        let json = serde_json::to_value(generation_body(&req)).unwrap();
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_from_config_trims_base_url() {
        let config = ApiConfig {
            base_url: "http://localhost:9000/v1/".to_string(),
            referer: Some(String::new()),
            app_title: "Prism".to_string(),
        };
        let client = OpenRouterClient::from_config(&config);
        assert_eq!(client.base_url(), "http://localhost:9000/v1");
        assert_eq!(client.url("models"), "http://localhost:9000/v1/models");
        assert!(client.referer.is_none());
        assert_eq!(client.app_title.as_deref(), Some("Prism"));
    }
}
