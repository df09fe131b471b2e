// Postboard - blog posts with image uploads
// Entry point and application setup

use anyhow::Context;
use postboard::app::AppState;
use postboard::commands;
use postboard::config::AppConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Initialize logging; stdout is reserved for command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "postboard=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let matches = commands::cli().get_matches();

    let mut config = AppConfig::from_env().context("Failed to load configuration")?;
    if let Some(dir) = matches.get_one::<PathBuf>("data-dir") {
        config.data_dir = dir.clone();
    }

    tracing::info!("Starting Postboard");

    let state = AppState::initialize(config)
        .await
        .context("Failed to initialize application")?;

    match commands::dispatch(&state, &matches).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!("Command failed: {}", e);
            println!("{}", serde_json::to_string_pretty(&commands::error_output(&e))?);
            Ok(ExitCode::from(commands::exit_code(&e)))
        }
    }
}
