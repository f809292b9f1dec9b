//! Configuration validation rules.

use super::schema::Config;

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &Config) -> crate::Result<()> {
    let mut errors = Vec::new();
    let defaults = &config.defaults;

    if defaults.model.trim().is_empty() {
        errors.push("defaults.model must not be empty".to_string());
    }
    if defaults.max_tokens == 0 {
        errors.push("defaults.max_tokens must be > 0".to_string());
    }
    if !(0.0..=3.0).contains(&defaults.temperature) {
        errors.push("defaults.temperature must be in [0.0, 3.0]".to_string());
    }
    if !(0.0..=1.0).contains(&defaults.top_p) {
        errors.push("defaults.top_p must be in [0.0, 1.0]".to_string());
    }
    if !(-2.0..=2.0).contains(&defaults.frequency_penalty) {
        errors.push("defaults.frequency_penalty must be in [-2.0, 2.0]".to_string());
    }
    if !(-2.0..=2.0).contains(&defaults.presence_penalty) {
        errors.push("defaults.presence_penalty must be in [-2.0, 2.0]".to_string());
    }
    if let Some(api) = &config.api {
        if api.trim().is_empty() {
            errors.push("api must not be empty when set".to_string());
        }
    }
    if config.list_count == 0 {
        errors.push("list_count must be > 0".to_string());
    }
    if !matches!(config.logging.format.to_lowercase().as_str(), "text" | "json") {
        errors.push("logging.format must be 'text' or 'json'".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Config(errors.join("; ")))
    }
}
