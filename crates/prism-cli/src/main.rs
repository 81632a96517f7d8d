use anyhow::Result;
use clap::{Parser, Subcommand};
use prism_core::conversation::Resolution;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;

mod app;
mod commands;
mod logging;
mod render;

use app::App;

#[derive(Parser)]
#[command(name = "prism")]
#[command(about = "Prism - prompt-to-image generation with a durable conversation history", long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print debug logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate images for a prompt
    Generate {
        prompt: String,
        /// Continue this conversation instead of starting a new one
        #[arg(long)]
        conversation: Option<i64>,
        /// Output resolution (1K, 2K, 4K)
        #[arg(long, value_parser = parse_resolution)]
        resolution: Option<Resolution>,
        /// Aspect ratio such as 16:9
        #[arg(long)]
        aspect_ratio: Option<String>,
        #[arg(long)]
        system_prompt: Option<String>,
    },
    /// List conversations, most recent first
    List,
    /// Show the entries of a conversation
    Show { timestamp: i64 },
    /// Delete a conversation and its images
    Delete { timestamp: i64 },
    /// Regenerate one image of an entry with a new seed
    Regenerate {
        timestamp: i64,
        entry: usize,
        /// Position of the image within the entry
        #[arg(long, default_value_t = 0)]
        image: usize,
        /// Re-render the image at 4K with its original seed
        #[arg(long)]
        upscale: bool,
    },
    /// Delete one image of an entry
    DeleteImage {
        timestamp: i64,
        entry: usize,
        image: usize,
    },
    /// Write a stored image to a file
    ExportImage {
        timestamp: i64,
        index: u32,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// List image-capable models, or select one
    Models {
        #[arg(long)]
        select: Option<String>,
    },
    /// Show the remaining account credit
    Balance,
    /// Manage stored preferences
    Pref {
        #[command(subcommand)]
        action: PrefAction,
    },
}

#[derive(Subcommand)]
enum PrefAction {
    Get { key: String },
    Set { key: String, value: String },
    Delete { key: String },
    List,
    Clear,
}

fn parse_resolution(value: &str) -> std::result::Result<Resolution, String> {
    Resolution::from_str(value).map_err(|_| format!("expected 1K, 2K or 4K, got '{}'", value))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            render::print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let app = App::build(cli.config).await?;

    let code = match cli.command {
        Commands::Generate {
            prompt,
            conversation,
            resolution,
            aspect_ratio,
            system_prompt,
        } => {
            let overrides = commands::generate::Overrides {
                resolution,
                aspect_ratio,
                system_prompt,
            };
            commands::generate::run(&app, &prompt, conversation, overrides).await?
        }
        Commands::List => commands::conversation::list(&app).await?,
        Commands::Show { timestamp } => commands::conversation::show(&app, timestamp).await?,
        Commands::Delete { timestamp } => commands::conversation::delete(&app, timestamp).await?,
        Commands::Regenerate {
            timestamp,
            entry,
            image,
            upscale,
        } => commands::generate::regenerate(&app, timestamp, entry, image, upscale).await?,
        Commands::DeleteImage {
            timestamp,
            entry,
            image,
        } => commands::conversation::delete_image(&app, timestamp, entry, image).await?,
        Commands::ExportImage {
            timestamp,
            index,
            output,
        } => commands::conversation::export_image(&app, timestamp, index, &output).await?,
        Commands::Models { select } => commands::account::models(&app, select).await?,
        Commands::Balance => commands::account::balance(&app).await?,
        Commands::Pref { action } => commands::preference::run(&app, action).await?,
    };

    // Titles, summaries and usage data finish in the background.
    app.orchestrator.wait_idle().await;
    Ok(code)
}
