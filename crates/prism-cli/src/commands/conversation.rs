use crate::app::App;
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use colored::Colorize;
use prism_core::conversation::{ConversationEntry, ConversationRepository};
use std::path::Path;
use std::process::ExitCode;

pub async fn list(app: &App) -> Result<ExitCode> {
    let conversations = app.orchestrator.list_conversations().await;
    if conversations.is_empty() {
        println!("No conversations yet");
        return Ok(ExitCode::SUCCESS);
    }

    for (timestamp, summary) in conversations {
        println!(
            "{}  {}  {} {}",
            timestamp.to_string().cyan(),
            format_time(summary.updated).dimmed(),
            summary.title.bold(),
            format!(
                "({} entries, {} images)",
                summary.entry_count, summary.image_count
            )
            .dimmed()
        );
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn show(app: &App, timestamp: i64) -> Result<ExitCode> {
    let conversation = app.orchestrator.open_conversation(timestamp).await?;
    println!(
        "{} {}",
        "Conversation".bold(),
        format!("{} ({})", timestamp, format_time(timestamp)).cyan()
    );
    for (index, entry) in conversation.entries.iter().enumerate() {
        print_entry(app, timestamp, index, entry);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_entry(app: &App, timestamp: i64, index: usize, entry: &ConversationEntry) {
    let seed = entry
        .message
        .seed
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "\n#{} {} {}",
        index,
        entry.message.text.bold(),
        format!("[seed {}]", seed).dimmed()
    );
    if !entry.message.system_prompt.is_empty() {
        println!("   system: {}", entry.message.system_prompt.dimmed());
    }
    if let Some(text) = entry.response.text.as_deref().filter(|t| !t.trim().is_empty()) {
        println!("   {}", text.italic());
    }

    let resolutions = &entry.response.image_resolutions;
    for (position, filename) in entry.response.image_filenames.iter().enumerate() {
        let resolution = resolutions
            .get(position)
            .map(ToString::to_string)
            .unwrap_or_default();
        match filename.parse::<u32>() {
            Ok(image) => println!(
                "   [{}] {} {}",
                position,
                app.image_path(timestamp, image).display(),
                resolution.dimmed()
            ),
            Err(_) => println!("   [{}] {} {}", position, filename, resolution.dimmed()),
        }
    }

    let cost = entry
        .response
        .generation_data
        .as_ref()
        .and_then(|data| data.get("total_cost"))
        .and_then(serde_json::Value::as_f64);
    if let Some(cost) = cost {
        println!("   {}", format!("cost ${:.4}", cost).dimmed());
    }
}

pub async fn delete(app: &App, timestamp: i64) -> Result<ExitCode> {
    app.orchestrator.delete_conversation(timestamp).await?;
    println!("{} Deleted conversation {}", "✓".green().bold(), timestamp);
    Ok(ExitCode::SUCCESS)
}

pub async fn delete_image(
    app: &App,
    timestamp: i64,
    entry: usize,
    position: usize,
) -> Result<ExitCode> {
    app.orchestrator
        .delete_image(timestamp, entry, position)
        .await?;
    println!(
        "{} Deleted image [{}] of entry #{}",
        "✓".green().bold(),
        position,
        entry
    );
    Ok(ExitCode::SUCCESS)
}

pub async fn export_image(
    app: &App,
    timestamp: i64,
    index: u32,
    output: &Path,
) -> Result<ExitCode> {
    let Some(bytes) = app.repository.get_image(timestamp, index).await else {
        bail!("No image {} in conversation {}", index, timestamp);
    };
    tokio::fs::write(output, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "{} Wrote {} bytes to {}",
        "✓".green().bold(),
        bytes.len(),
        output.display()
    );
    Ok(ExitCode::SUCCESS)
}

fn format_time(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|utc| {
            utc.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|| timestamp.to_string())
}
