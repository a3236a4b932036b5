mod cli;
mod commands;
mod config;
mod foreground;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::commands::Session;
use crate::config::{Config, DEFAULT_CONFIG_PATH};
use crate::foreground::PromptMode;

fn run_onboarding() -> Result<Config> {
    use dialoguer::{theme::ColorfulTheme, Input};

    println!("Welcome to the UHF Editor!");
    println!("It looks like you don't have a configuration file yet.");
    println!("Let's get you set up.\n");

    let default_dir: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Default channel directory")
        .default(".".to_string())
        .interact_text()?;

    let ffprobe_path: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("ffprobe executable")
        .default("ffprobe".to_string())
        .interact_text()?;

    let config_content = format!(
        r#"[channel]
default_dir = "{}"

[probe]
ffprobe_path = "{}"
fallback_extensions = ["mkv"]
supported_extensions = ["avi", "mov", "mkv", "mp4", "m4v"]

[logging]
level = "info"
"#,
        default_dir.replace('\\', "\\\\").replace('"', "\\\""),
        ffprobe_path.replace('\\', "\\\\").replace('"', "\\\"")
    );

    println!("\nGenerating configuration file: {}", DEFAULT_CONFIG_PATH);
    std::fs::write(DEFAULT_CONFIG_PATH, &config_content)?;
    println!("Configuration saved successfully!");
    println!("----------------------------------------\n");

    let config: Config = toml::from_str(&config_content)?;
    Ok(config)
}

fn load_config(cli: &Cli) -> Result<Config> {
    if let Some(path) = &cli.config {
        return Config::load(path);
    }
    if std::fs::metadata(DEFAULT_CONFIG_PATH).is_ok() {
        return Config::load(DEFAULT_CONFIG_PATH);
    }
    if console::user_attended() {
        return run_onboarding();
    }
    Ok(Config::default())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI args
    let mut cli = Cli::parse();

    if cli.generate_config {
        println!("{}", Config::default_template());
        return Ok(());
    }

    let Some(command) = cli.command.take() else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = load_config(&cli)?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let channel_dir = cli
        .channel
        .clone()
        .or_else(|| config.channel.default_dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    tracing::debug!("Using channel directory {:?}", channel_dir);

    let prompt_mode = if cli.decline_missing {
        PromptMode::Decline
    } else {
        PromptMode::Interactive
    };
    let session = Session::new(config.probe.clone(), prompt_mode);

    commands::run(command, &channel_dir, &session).await
}
