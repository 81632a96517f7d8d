use crate::app::App;
use anyhow::Result;
use colored::Colorize;
use std::process::ExitCode;

pub async fn models(app: &App, select: Option<String>) -> Result<ExitCode> {
    if let Some(model) = select {
        app.orchestrator.select_model(&model).await?;
        println!("{} Selected {}", "✓".green().bold(), model.trim());
        return Ok(ExitCode::SUCCESS);
    }

    let selected = app.orchestrator.selected_model().await;
    let models = app.orchestrator.available_models().await?;
    if models.is_empty() {
        println!("No image models available");
    }
    for model in models {
        let marker = if selected.as_deref() == Some(model.id.as_str()) {
            "*".green().bold()
        } else {
            " ".normal()
        };
        println!("{} {}  {}", marker, model.id.cyan(), model.name.dimmed());
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn balance(app: &App) -> Result<ExitCode> {
    let balance = app.orchestrator.balance().await?;
    println!(
        "${:.4} remaining ({:.4} used of {:.4})",
        balance.remaining(),
        balance.total_usage,
        balance.total_credits
    );
    Ok(ExitCode::SUCCESS)
}
