use crate::ragtools::SearchFields;
use secrecy::SecretString;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Connection details for the knowledge-base search index.
#[derive(Debug)]
pub struct SearchConfig {
    pub endpoint: String,
    pub index: String,
    pub api_key: Option<SecretString>,
    pub fields: SearchFields,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub openai_endpoint: String,
    pub openai_deployment: String,
    pub openai_api_key: Option<SecretString>,
    pub voice_choice: String,
    pub search: SearchConfig,
    pub tenant_id: Option<String>,
    pub static_dir: PathBuf,
    pub prompts_dir: PathBuf,
    pub progress_dir: PathBuf,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Outside production (`RUNNING_IN_PRODUCTION` unset) a `.env` file in the current
    /// directory is loaded first. Recognized variables:
    ///
    /// *   `BIND_ADDRESS`: address to listen on. Defaults to "127.0.0.1:8765".
    /// *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    /// *   `AZURE_OPENAI_ENDPOINT`, `AZURE_OPENAI_REALTIME_DEPLOYMENT`: required.
    /// *   `AZURE_OPENAI_API_KEY`: (Optional) Azure CLI credentials are used when absent.
    /// *   `AZURE_OPENAI_REALTIME_VOICE_CHOICE`: Defaults to "alloy".
    /// *   `AZURE_SEARCH_ENDPOINT`, `AZURE_SEARCH_INDEX`: required.
    /// *   `AZURE_SEARCH_API_KEY`: (Optional) Azure CLI credentials are used when absent.
    /// *   `AZURE_SEARCH_IDENTIFIER_FIELD`, `AZURE_SEARCH_CONTENT_FIELD`, `AZURE_SEARCH_EMBEDDING_FIELD`,
    ///     `AZURE_SEARCH_TITLE_FIELD`: index field names.
    /// *   `AZURE_SEARCH_USE_VECTOR_QUERY`: "false" turns off the vector query. Defaults to true.
    /// *   `AZURE_TENANT_ID`: (Optional) tenant for Azure CLI tokens.
    /// *   `STATIC_DIR`, `PROMPTS_DIR`, `PROGRESS_DIR`: filesystem locations.
    pub fn from_env() -> Result<Self, ConfigError> {
        if std::env::var_os("RUNNING_IN_PRODUCTION").is_none() {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| var(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()));
        let or_default = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let bind_address_str = or_default("BIND_ADDRESS", "127.0.0.1:8765");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let log_level_str = or_default("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let use_vector_query = match var("AZURE_SEARCH_USE_VECTOR_QUERY") {
            None => true,
            Some(value) => parse_flag(&value).ok_or_else(|| {
                ConfigError::InvalidValue(
                    "AZURE_SEARCH_USE_VECTOR_QUERY".to_string(),
                    format!("'{}' is not a boolean", value),
                )
            })?,
        };

        let search = SearchConfig {
            endpoint: required("AZURE_SEARCH_ENDPOINT")?,
            index: required("AZURE_SEARCH_INDEX")?,
            api_key: var("AZURE_SEARCH_API_KEY").map(SecretString::from),
            fields: SearchFields {
                identifier: or_default("AZURE_SEARCH_IDENTIFIER_FIELD", "chunk_id"),
                content: or_default("AZURE_SEARCH_CONTENT_FIELD", "chunk"),
                embedding: or_default("AZURE_SEARCH_EMBEDDING_FIELD", "text_vector"),
                title: or_default("AZURE_SEARCH_TITLE_FIELD", "title"),
                use_vector_query,
            },
        };

        Ok(Self {
            bind_address,
            log_level,
            openai_endpoint: required("AZURE_OPENAI_ENDPOINT")?,
            openai_deployment: required("AZURE_OPENAI_REALTIME_DEPLOYMENT")?,
            openai_api_key: var("AZURE_OPENAI_API_KEY").map(SecretString::from),
            voice_choice: or_default("AZURE_OPENAI_REALTIME_VOICE_CHOICE", "alloy"),
            search,
            tenant_id: var("AZURE_TENANT_ID"),
            static_dir: PathBuf::from(or_default("STATIC_DIR", "static")),
            prompts_dir: PathBuf::from(or_default("PROMPTS_DIR", "prompts")),
            progress_dir: PathBuf::from(or_default("PROGRESS_DIR", "progress_data")),
        })
    }

    /// Whether any service lacks an API key and needs Azure CLI tokens.
    pub fn needs_token_credentials(&self) -> bool {
        self.openai_api_key.is_none() || self.search.api_key.is_none()
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
