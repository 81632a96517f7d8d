//! Application configuration model.
//!
//! Loaded from `config.toml` by the infrastructure layer. Every section has
//! serde defaults so a partial (or empty) file is valid.

use crate::conversation::Resolution;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_TITLE_MODEL: &str = "google/gemini-2.5-flash-lite";
pub const DEFAULT_TITLE_SYSTEM_PROMPT: &str = "You name image-generation conversations. \
Reply with a short title of at most five words for the user's request. \
Reply with the title only, without quotes or punctuation at the end.";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub title: TitleConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Overrides the namespace root. Defaults to `<data_dir>/prism/store`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Sent as `HTTP-Referer` for attribution on the provider side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    /// Sent as `X-Title`.
    #[serde(default = "default_app_title")]
    pub app_title: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            referer: None,
            app_title: default_app_title(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default)]
    pub default_resolution: Resolution,
    #[serde(default = "default_aspect_ratio")]
    pub default_aspect_ratio: String,
    #[serde(default)]
    pub default_system_prompt: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_resolution: Resolution::default(),
            default_aspect_ratio: default_aspect_ratio(),
            default_system_prompt: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleConfig {
    #[serde(default = "default_title_model")]
    pub model: String,
    #[serde(default = "default_title_system_prompt")]
    pub system_prompt: String,
    /// The prompt is truncated to this many characters before being sent.
    #[serde(default = "default_title_max_prompt_chars")]
    pub max_prompt_chars: usize,
}

impl Default for TitleConfig {
    fn default() -> Self {
        Self {
            model: default_title_model(),
            system_prompt: default_title_system_prompt(),
            max_prompt_chars: default_title_max_prompt_chars(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl EnrichmentConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_app_title() -> String {
    "Prism".to_string()
}

fn default_aspect_ratio() -> String {
    "1:1".to_string()
}

fn default_title_model() -> String {
    DEFAULT_TITLE_MODEL.to_string()
}

fn default_title_system_prompt() -> String {
    DEFAULT_TITLE_SYSTEM_PROMPT.to_string()
}

fn default_title_max_prompt_chars() -> usize {
    500
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    2000
}
