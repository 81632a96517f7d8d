//! Best-effort follow-ups of a generation.
//!
//! Everything here runs on the background task registry. Failures are logged
//! and never reach the user.

use crate::context::SessionContext;
use prism_core::config::{EnrichmentConfig, TitleConfig};
use prism_core::generation::ImageGenerationApi;
use std::sync::Arc;

/// Recomputes counts and patches the conversation's list item.
pub(crate) async fn reconcile_counts(ctx: Arc<SessionContext>, timestamp: i64) {
    match ctx.recompute_summary(timestamp, None).await {
        Some(summary) => ctx.sink.on_summary_updated(timestamp, &summary),
        None => tracing::debug!(timestamp, "Skipping summary for missing conversation"),
    }
}

/// First entry of a conversation: create its summary, show it in the list,
/// then ask a cheap text model for a title.
pub(crate) async fn reconcile_new_conversation(
    ctx: Arc<SessionContext>,
    api: Arc<dyn ImageGenerationApi>,
    config: TitleConfig,
    api_key: String,
    prompt: String,
    timestamp: i64,
) {
    ctx.initialize_summary(timestamp).await;
    if let Some(summary) = ctx.recompute_summary(timestamp, None).await {
        ctx.sink.on_summary_updated(timestamp, &summary);
    }
    ctx.sink.on_conversations_changed();

    let prompt: String = prompt.chars().take(config.max_prompt_chars).collect();
    let title = match api
        .generate_title(&api_key, &prompt, &config.system_prompt, &config.model)
        .await
    {
        Ok(title) if !title.trim().is_empty() => title.trim().to_string(),
        Ok(_) => {
            tracing::debug!(timestamp, "Title model returned an empty title");
            return;
        }
        Err(e) => {
            tracing::warn!(timestamp, "Title generation failed: {}", e);
            return;
        }
    };

    tracing::debug!(timestamp, title = %title, "Generated conversation title");
    if let Some(summary) = ctx.recompute_summary(timestamp, Some(title)).await {
        ctx.sink.on_summary_updated(timestamp, &summary);
    }
}

/// Polls usage/cost data for `generation_id` and attaches it to its entry.
///
/// Each attempt is preceded by the configured fixed delay; the data usually
/// is not available right after the generation returns.
pub(crate) async fn enrich_generation(
    ctx: Arc<SessionContext>,
    api: Arc<dyn ImageGenerationApi>,
    config: EnrichmentConfig,
    api_key: String,
    timestamp: i64,
    generation_id: String,
) {
    for attempt in 1..=config.max_attempts {
        tokio::time::sleep(config.retry_delay()).await;

        let data = match api.generation_info(&api_key, &generation_id).await {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(
                    timestamp,
                    attempt,
                    generation_id = %generation_id,
                    "Generation info not available yet: {}",
                    e
                );
                continue;
            }
        };

        let attached = ctx
            .update_conversation(timestamp, |conversation| {
                match conversation
                    .entries
                    .iter_mut()
                    .find(|entry| entry.generation_id() == Some(generation_id.as_str()))
                {
                    Some(entry) => {
                        entry.response.generation_data = Some(data);
                        true
                    }
                    None => false,
                }
            })
            .await;

        match attached {
            Some((_, true)) => tracing::debug!(timestamp, attempt, "Attached generation data"),
            _ => tracing::debug!(timestamp, "Entry for generation data is gone"),
        }
        return;
    }

    tracing::warn!(
        timestamp,
        generation_id = %generation_id,
        "Giving up on generation data after {} attempts",
        config.max_attempts
    );
}

pub(crate) async fn refresh_balance(
    ctx: Arc<SessionContext>,
    api: Arc<dyn ImageGenerationApi>,
    api_key: String,
) {
    match api.fetch_balance(&api_key).await {
        Ok(balance) => ctx.sink.on_balance_updated(&balance),
        Err(e) => tracing::debug!("Balance refresh failed: {}", e),
    }
}
