//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::chat::params::keys;
use crate::chat::ParameterSet;

/// Root configuration for gpp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Parameters used when neither the user, the persona nor the
    /// continued conversation set them
    #[serde(default)]
    pub defaults: GenerationDefaults,
    /// API target: `openai`, `azure` or a base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
    /// Number of conversations `gpp list` shows without an argument
    #[serde(default = "default_list_count")]
    pub list_count: usize,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_list_count() -> usize {
    7
}

impl Default for Config {
    fn default() -> Self {
        Self {
            defaults: GenerationDefaults::default(),
            api: None,
            list_count: default_list_count(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Built-in generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationDefaults {
    /// Default model
    pub model: String,
    /// Maximum tokens in a reply
    pub max_tokens: u32,
    /// Temperature
    pub temperature: f64,
    /// Nucleus sampling threshold
    pub top_p: f64,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            max_tokens: 3072,
            temperature: 0.3,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

impl GenerationDefaults {
    /// The defaults as the lowest-precedence parameter set
    pub fn to_parameter_set(&self) -> ParameterSet {
        ParameterSet::new()
            .with(keys::MODEL, self.model.clone())
            .with(keys::MAX_TOKENS, self.max_tokens)
            .with(keys::TEMPERATURE, self.temperature)
            .with(keys::TOP_P, self.top_p)
            .with(keys::FREQUENCY_PENALTY, self.frequency_penalty)
            .with(keys::PRESENCE_PENALTY, self.presence_penalty)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for log files, relative paths are below the gpp home
    #[serde(default = "default_log_dir")]
    pub dir: String,
    /// Module-specific overrides
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            dir: default_log_dir(),
            overrides: HashMap::new(),
        }
    }
}
