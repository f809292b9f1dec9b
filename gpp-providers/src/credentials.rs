//! API key lookup

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::base::{ProviderError, ProviderResult};

/// Environment variable holding the OpenAI API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Key file below the gpp home, used when the variable is unset
pub const API_KEY_FILE: &str = "openai-key.txt";

/// Read the OpenAI API key from the environment or `<home>/openai-key.txt`
pub fn load_api_key(home: &Path) -> ProviderResult<String> {
    resolve_api_key(std::env::var(API_KEY_ENV).ok(), &home.join(API_KEY_FILE))
}

fn resolve_api_key(from_env: Option<String>, key_file: &PathBuf) -> ProviderResult<String> {
    if let Some(key) = from_env.filter(|k| !k.is_empty()) {
        return Ok(key);
    }

    match std::fs::read_to_string(key_file) {
        Ok(content) => {
            debug!("Using API key from {}", key_file.display());
            let key = content.strip_suffix('\n').unwrap_or(&content);
            let key = key.strip_suffix('\r').unwrap_or(key);
            Ok(key.to_string())
        }
        Err(_) => Err(ProviderError::MissingCredential {
            env: API_KEY_ENV.to_string(),
            path: key_file.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_environment_wins() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join(API_KEY_FILE);
        std::fs::write(&file, "sk-file\n").unwrap();

        let key = resolve_api_key(Some("sk-env".to_string()), &file).unwrap();
        assert_eq!(key, "sk-env");
    }

    #[test]
    fn test_file_strips_one_trailing_newline() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join(API_KEY_FILE);
        std::fs::write(&file, "sk-file\n").unwrap();

        assert_eq!(resolve_api_key(None, &file).unwrap(), "sk-file");
        assert_eq!(resolve_api_key(Some(String::new()), &file).unwrap(), "sk-file");
    }

    #[test]
    fn test_missing_everywhere() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join(API_KEY_FILE);

        let err = resolve_api_key(None, &file).unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredential { .. }));
        assert!(err.to_string().contains(API_KEY_ENV));
    }
}
