//! Configuration management for ochat.
//!
//! Configuration is loaded from `~/.config/ochat/config.toml`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ollama host URL (default: http://localhost:11434).
    #[serde(default = "default_host")]
    pub host: String,
    /// Persona used when none is chosen at the prompt.
    #[serde(default = "default_persona_name")]
    pub default_persona: String,
    /// Chat behavior settings.
    #[serde(default)]
    pub chat: ChatSettings,
    /// Named personas, each binding a model to an optional system prompt.
    #[serde(default = "default_personas")]
    pub personas: BTreeMap<String, Persona>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            default_persona: default_persona_name(),
            chat: ChatSettings::default(),
            personas: default_personas(),
        }
    }
}

/// A persona: a model plus the system prompt that shapes its replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    /// Model name as known to Ollama (e.g. llama3.2, qwen3:4b).
    pub model: String,
    /// System prompt sent as the first message of every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// Settings that apply to every chat exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    /// Stream replies token by token (default: true).
    #[serde(default = "default_true")]
    pub stream: bool,
    /// Sampling temperature passed to the model (default: 0.7).
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            stream: true,
            temperature: default_temperature(),
        }
    }
}

fn default_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_persona_name() -> String {
    "assistant".to_string()
}

fn default_personas() -> BTreeMap<String, Persona> {
    let mut personas = BTreeMap::new();
    personas.insert(
        "assistant".to_string(),
        Persona {
            model: "llama3.2".to_string(),
            system_prompt: Some("You are a helpful assistant.".to_string()),
        },
    );
    personas
}

fn default_true() -> bool {
    true
}

fn default_temperature() -> f32 {
    0.7
}

impl Config {
    /// Get the config directory path.
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("ochat"))
            .context("Could not determine config directory")
    }

    /// Get the config file path.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, using defaults if not found.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}
