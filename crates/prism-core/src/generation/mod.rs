//! Contracts with the remote inference API and the rendering layer.

mod api;
mod render;

pub use api::{
    Balance, ChatRole, ChatTurn, GenerationPayload, GenerationRequest, GenerationResult,
    ImageConfig, ImageGenerationApi, ModelInfo,
};
pub use render::{NullRenderSink, RenderSink};
