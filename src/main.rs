//! ochat - chat with local Ollama models from the terminal.
//!
//! Reads lines from the terminal, forwards each one to a locally
//! running Ollama server, and prints the reply. The conversation so
//! far rides along with every request so the model keeps context.

mod chat;
mod config;
mod ollama;
mod panel;
mod transcript;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process::Command as ProcessCommand;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ochat")]
#[command(author, version, about = "Chat with local Ollama models from the terminal")]
#[command(long_about = "Starts an interactive chat with a locally running Ollama server.\n\nEach line you type is sent to the model together with the conversation so far. Type 'quit' to exit.")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with several personas answering side by side
    Panel,
    /// List configured personas
    Personas,
    /// Open configuration file in $EDITOR
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they never mix with the conversation.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("ochat=warn".parse().unwrap())
                .add_directive("reqwest=warn".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Panel) => {
            let config = config::Config::load().context("Failed to load configuration")?;
            panel::run(config).await
        }
        Some(Commands::Personas) => handle_personas(),
        Some(Commands::Config) => handle_config(),
        None => {
            let config = config::Config::load().context("Failed to load configuration")?;
            chat::run(config).await
        }
    }
}

/// Handle the personas subcommand.
fn handle_personas() -> Result<()> {
    let config = config::Config::load()?;

    println!("Configured Personas");
    println!("===================\n");

    for (name, persona) in &config.personas {
        let default_marker = if *name == config.default_persona {
            " (default)"
        } else {
            ""
        };
        println!("  {}{}\n    model: {}", name, default_marker, persona.model);
        if let Some(prompt) = &persona.system_prompt {
            println!("    system prompt: {}", prompt);
        }
        println!();
    }

    println!("Usage:");
    println!("  ochat        # chat with one persona");
    println!("  ochat panel  # chat with several personas at once");

    Ok(())
}

/// Handle the config command.
fn handle_config() -> Result<()> {
    let config_path = config::Config::config_path()?;

    // Ensure config directory exists
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Create default config if it doesn't exist
    if !config_path.exists() {
        let default_config = config::Config::default();
        default_config.save()?;
        println!("Created default config at {}", config_path.display());
    }

    // Open in editor
    let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    let status = ProcessCommand::new(&editor)
        .arg(&config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        eprintln!("Editor exited with non-zero status");
    }

    Ok(())
}
