//! Where requests go: OpenAI, Azure OpenAI or any compatible server

use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use crate::base::{ProviderError, ProviderResult};
use crate::credentials::load_api_key;
use crate::openai::{Auth, OpenAiClient};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
/// Azure settings file below the gpp home
pub const AZURE_CONF_FILE: &str = "azure-conf.json";
pub const AZURE_DEFAULT_API_VERSION: &str = "2023-12-01-preview";

/// API selected by `--api` / `GPP_API`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiTarget {
    OpenAi,
    Azure,
    /// Base URL of an OpenAI-compatible server
    Custom(String),
}

impl ApiTarget {
    /// Interpret the `--api` value; without one, Azure is chosen when its
    /// settings file exists
    pub fn resolve(api: Option<&str>, home: &Path) -> Self {
        match api.map(str::trim) {
            Some("openai") => ApiTarget::OpenAi,
            Some("azure") => ApiTarget::Azure,
            Some(url) if !url.is_empty() => ApiTarget::Custom(url.to_string()),
            _ if home.join(AZURE_CONF_FILE).exists() => ApiTarget::Azure,
            _ => ApiTarget::OpenAi,
        }
    }

    /// Build a client for this target.
    ///
    /// `model` names the Azure deployment when the settings file does not.
    pub fn client(&self, home: &Path, model: &str) -> ProviderResult<OpenAiClient> {
        match self {
            ApiTarget::OpenAi => Ok(OpenAiClient::new(
                OPENAI_API_BASE,
                Auth::Bearer(load_api_key(home)?),
            )),
            ApiTarget::Azure => AzureConfig::load(home)?.client(model),
            // Local servers do not check the key
            ApiTarget::Custom(base) => Ok(OpenAiClient::new(base, Auth::None)),
        }
    }
}

/// Contents of `azure-conf.json`
#[derive(Debug, Clone, Deserialize)]
pub struct AzureConfig {
    pub azure_endpoint: String,
    pub api_key: String,
    #[serde(default)]
    pub azure_deployment: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
}

impl AzureConfig {
    pub fn load(home: &Path) -> ProviderResult<Self> {
        let path = home.join(AZURE_CONF_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            ProviderError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Deployment to call; dots are not allowed in deployment names, so the
    /// model id is used without them
    pub fn deployment_for(&self, model: &str) -> String {
        self.azure_deployment
            .clone()
            .unwrap_or_else(|| model.replace('.', ""))
    }

    pub fn client(&self, model: &str) -> ProviderResult<OpenAiClient> {
        let deployment = self.deployment_for(model);
        let api_version = self
            .api_version
            .as_deref()
            .unwrap_or(AZURE_DEFAULT_API_VERSION);
        let base = format!(
            "{}/openai/deployments/{}",
            self.azure_endpoint.trim_end_matches('/'),
            deployment
        );
        debug!("Azure deployment {} (api-version {})", deployment, api_version);
        Ok(OpenAiClient::new(base, Auth::ApiKeyHeader(self.api_key.clone()))
            .with_query("api-version", api_version))
    }
}
