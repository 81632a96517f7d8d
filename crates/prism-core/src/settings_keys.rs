//! Canonical preference keys.
//!
//! Use these instead of raw string literals to prevent typo-based key mismatches.
//! Each key is a leaf name under the `preferences` directory.

/// Remote inference API key.
pub const API_KEY: &str = "apiKey";

/// Identifier of the image model picked by the user.
pub const SELECTED_MODEL: &str = "selectedModel";

/// System prompt sent with every generation request.
pub const SYSTEM_PROMPT: &str = "systemPrompt";

/// Last selected output resolution (`1K`, `2K`, `4K`).
pub const RESOLUTION: &str = "resolution";

/// Last selected aspect ratio (e.g. `16:9`).
pub const ASPECT_RATIO: &str = "aspectRatio";
