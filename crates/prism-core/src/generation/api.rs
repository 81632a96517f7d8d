//! Remote inference API contract.
//!
//! Responses are validated at the client boundary into [`GenerationResult`],
//! so the rest of the system never walks an untyped payload to find images.

use crate::conversation::Resolution;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a turn in the model context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One role-tagged turn of model context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Image output parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    pub image_size: Resolution,
    pub aspect_ratio: String,
}

/// Everything needed for one image generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub api_key: String,
    pub prompt: String,
    pub model: String,
    pub system_prompt: String,
    /// Prior turns, oldest first. Does not include `prompt`.
    pub history: Vec<ChatTurn>,
    pub image_config: ImageConfig,
    pub seed: Option<i64>,
    /// Source image (data URL) for edit-style requests such as upscaling.
    pub image_input: Option<String>,
}

/// What a generation call produced.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationPayload {
    /// At least one image, optionally with accompanying text.
    Images {
        text: Option<String>,
        images: Vec<String>,
    },
    /// The model answered in text only.
    TextOnly { text: String },
    /// Neither text nor images.
    Empty,
}

/// Validated response of a generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    /// Generation id, used to look up usage and cost later.
    pub id: Option<String>,
    pub payload: GenerationPayload,
    /// The raw response body with image payloads stripped out.
    pub response_data: Value,
}

impl GenerationResult {
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            GenerationPayload::Images { text, .. } => text.as_deref(),
            GenerationPayload::TextOnly { text } => Some(text),
            GenerationPayload::Empty => None,
        }
    }
}

/// A model advertised by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub output_modalities: Vec<String>,
}

impl ModelInfo {
    pub fn supports_image_output(&self) -> bool {
        self.output_modalities.iter().any(|m| m == "image")
    }
}

/// Account credit state.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub total_credits: f64,
    pub total_usage: f64,
}

impl Balance {
    pub fn remaining(&self) -> f64 {
        self.total_credits - self.total_usage
    }
}

/// The remote inference API as seen by the orchestrator.
#[async_trait]
pub trait ImageGenerationApi: Send + Sync {
    /// Runs an image generation. May take arbitrarily long; no timeout is imposed here.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult>;

    /// Models able to produce images.
    async fn fetch_models(&self, api_key: &str) -> Result<Vec<ModelInfo>>;

    async fn fetch_balance(&self, api_key: &str) -> Result<Balance>;

    /// Usage and cost data for a finished generation. Usually available only
    /// some time after the generation returned.
    async fn generation_info(&self, api_key: &str, generation_id: &str) -> Result<Value>;

    /// Short text completion used for conversation titles.
    async fn generate_title(
        &self,
        api_key: &str,
        prompt: &str,
        system_prompt: &str,
        model: &str,
    ) -> Result<String>;
}
