use crate::PrefAction;
use crate::app::App;
use crate::render::mask_secret;
use anyhow::{Result, bail};
use colored::Colorize;
use prism_core::preference::PreferenceStore;
use prism_core::settings_keys;
use std::process::ExitCode;

pub async fn run(app: &App, action: PrefAction) -> Result<ExitCode> {
    let preferences = &app.preferences;
    match action {
        PrefAction::Get { key } => match preferences.get(&key, None).await {
            Some(value) => println!("{}", value),
            None => return Ok(ExitCode::FAILURE),
        },
        PrefAction::Set { key, value } => {
            if !preferences.set(&key, &value).await {
                bail!("Failed to store preference '{}'", key);
            }
            println!("{} {} updated", "✓".green().bold(), key);
        }
        PrefAction::Delete { key } => {
            if !preferences.delete(&key).await {
                bail!("Failed to delete preference '{}'", key);
            }
            println!("{} {} deleted", "✓".green().bold(), key);
        }
        PrefAction::List => {
            for key in preferences.list().await {
                let value = preferences.get(&key, None).await.unwrap_or_default();
                let shown = if key == settings_keys::API_KEY {
                    mask_secret(&value)
                } else {
                    value
                };
                println!("{} = {}", key.cyan(), shown);
            }
        }
        PrefAction::Clear => {
            if !preferences.clear().await {
                bail!("Failed to clear preferences");
            }
            println!("{} Preferences cleared", "✓".green().bold());
        }
    }
    Ok(ExitCode::SUCCESS)
}
