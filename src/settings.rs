//! Startup configuration
//!
//! Loaded once from a YAML (or JSON, which YAML subsumes) file and handed
//! to the core as an immutable struct. Missing fields take defaults, so a
//! minimal file only names what it changes.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use log::debug;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Model identifier passed to the endpoint
    #[serde(default = "default_model")]
    pub model: String,

    /// System prompt sent with every request
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// Base URL of the LLM endpoint
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env_var")]
    pub api_key_env_var: String,

    /// Character budget for context extracted around the focus
    #[serde(default = "default_context_char_budget")]
    pub context_char_budget: usize,

    /// Character budget for the whole assembled prompt
    #[serde(default = "default_prompt_char_budget")]
    pub prompt_char_budget: usize,

    /// How many past turns may be replayed into a prompt
    #[serde(default = "default_history_turn_limit")]
    pub history_turn_limit: usize,

    /// Bound on the wait for the first response byte
    #[serde(default = "default_first_byte_timeout_ms")]
    pub first_byte_timeout_ms: u64,

    /// UI font size passthrough; the core does not interpret it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<u16>,
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_system_prompt() -> String {
    "You are a helpful assistant for someone reading a document. \
     Answer concisely and stick to what the provided excerpt supports."
        .to_string()
}

fn default_max_output_tokens() -> u32 {
    1024
}

fn default_api_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_api_key_env_var() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_context_char_budget() -> usize {
    6000
}

fn default_prompt_char_budget() -> usize {
    24_000
}

fn default_history_turn_limit() -> usize {
    8
}

fn default_first_byte_timeout_ms() -> u64 {
    30_000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: default_model(),
            system_prompt: default_system_prompt(),
            max_output_tokens: default_max_output_tokens(),
            api_endpoint: default_api_endpoint(),
            api_key_env_var: default_api_key_env_var(),
            context_char_budget: default_context_char_budget(),
            prompt_char_budget: default_prompt_char_budget(),
            history_turn_limit: default_history_turn_limit(),
            first_byte_timeout_ms: default_first_byte_timeout_ms(),
            font_size: None,
        }
    }
}

impl Settings {
    #[must_use]
    pub fn first_byte_timeout(&self) -> Duration {
        Duration::from_millis(self.first_byte_timeout_ms)
    }
}

pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file {path:?}"))?;
    let settings: Settings = serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse settings file {path:?}"))?;
    debug!("loaded settings from {path:?}: {settings:?}");
    Ok(settings)
}
