use crate::app::App;
use anyhow::Result;
use colored::Colorize;
use prism_application::RegenerateMode;
use prism_core::conversation::Resolution;
use std::process::ExitCode;

/// Per-invocation settings that take precedence over stored preferences.
#[derive(Debug, Default)]
pub struct Overrides {
    pub resolution: Option<Resolution>,
    pub aspect_ratio: Option<String>,
    pub system_prompt: Option<String>,
}

pub async fn run(
    app: &App,
    prompt: &str,
    conversation: Option<i64>,
    overrides: Overrides,
) -> Result<ExitCode> {
    if let Some(timestamp) = conversation {
        app.orchestrator.open_conversation(timestamp).await?;
    }

    let mut settings = app.orchestrator.generation_settings().await;
    if let Some(resolution) = overrides.resolution {
        settings.resolution = resolution;
    }
    if let Some(aspect_ratio) = overrides.aspect_ratio {
        settings.aspect_ratio = aspect_ratio;
    }
    if let Some(system_prompt) = overrides.system_prompt {
        settings.system_prompt = system_prompt;
    }

    // Failures were already printed by the render sink.
    let Ok(outcome) = app.orchestrator.submit_with_settings(prompt, settings).await else {
        return Ok(ExitCode::FAILURE);
    };

    println!(
        "{} conversation {} entry #{} (seed {})",
        "✓".green().bold(),
        outcome.timestamp,
        outcome.entry_index,
        outcome.seed
    );
    if let Some(text) = outcome.text.as_deref().filter(|t| !t.trim().is_empty()) {
        println!("  {}", text.italic());
    }
    for index in &outcome.image_indices {
        println!("  {}", app.image_path(outcome.timestamp, *index).display());
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn regenerate(
    app: &App,
    timestamp: i64,
    entry: usize,
    image: usize,
    upscale: bool,
) -> Result<ExitCode> {
    let mode = if upscale {
        RegenerateMode::Upscale
    } else {
        RegenerateMode::NewSeed
    };
    let Ok(indices) = app
        .orchestrator
        .regenerate(timestamp, entry, image, mode)
        .await
    else {
        return Ok(ExitCode::FAILURE);
    };

    if indices.is_empty() {
        println!("Image is already at 4K, nothing to do");
        return Ok(ExitCode::SUCCESS);
    }
    println!("{} entry #{} of conversation {}", "✓".green().bold(), entry, timestamp);
    for index in &indices {
        println!("  {}", app.image_path(timestamp, *index).display());
    }
    Ok(ExitCode::SUCCESS)
}
