use crate::evaluation::{ApiStyle, ClaudeModel, UnknownApiStyle, UnknownModel};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// No API key is configured, so analysis stays disabled.
    #[error(
        "No API key configured. Set ANTHROPIC_API_KEY (environment or .env) to enable analysis."
    )]
    MissingCredential,
}

/// Secret credential for the text-generation service.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a raw key, treating blank input as absent.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Expose the secret for request signing.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Runtime configuration for the evaluator.
#[derive(Debug, Clone)]
pub struct Config {
    /// Credential for the text-generation service; `None` disables analysis.
    pub api_key: Option<ApiKey>,
    /// Base URL of the text-generation service.
    pub api_base_url: String,
    /// Request/response shape spoken by the configured service.
    pub api_style: ApiStyle,
    /// Model used when a request does not pick one.
    pub default_model: ClaudeModel,
    /// Replacement for the built-in default rubric; `None` uses the compiled-in resource.
    pub rubric_path: Option<PathBuf>,
    /// Upper bound on one outbound evaluation call.
    pub request_timeout: Duration,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: load_env_optional("ANTHROPIC_API_KEY").and_then(ApiKey::new),
            api_base_url: load_env_optional("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_style: load_env_optional("ANTHROPIC_API_STYLE")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|error: UnknownApiStyle| {
                            ConfigError::InvalidValue(format!("ANTHROPIC_API_STYLE: {error}"))
                        })
                })
                .transpose()?
                .unwrap_or_default(),
            default_model: load_env_optional("EVALUATION_MODEL")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|error: UnknownModel| {
                            ConfigError::InvalidValue(format!("EVALUATION_MODEL: {error}"))
                        })
                })
                .transpose()?
                .unwrap_or_default(),
            rubric_path: load_env_optional("RUBRIC_PATH").map(PathBuf::from),
            request_timeout: load_env_optional("REQUEST_TIMEOUT_SECS")
                .map(|value| {
                    value
                        .parse::<u64>()
                        .map_err(|_| ConfigError::InvalidValue("REQUEST_TIMEOUT_SECS".into()))
                })
                .transpose()?
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }

    /// Return the credential, or the diagnostic that keeps analysis disabled.
    pub fn require_api_key(&self) -> Result<&ApiKey, ConfigError> {
        self.api_key.as_ref().ok_or(ConfigError::MissingCredential)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: DEFAULT_BASE_URL.to_string(),
            api_style: ApiStyle::default(),
            default_model: ClaudeModel::default(),
            rubric_path: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            server_port: None,
        }
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from the environment (and `.env`) and install it in the global cache.
///
/// The first successful load wins; later calls return the cached instance.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        base_url = %config.api_base_url,
        api_style = ?config.api_style,
        default_model = %config.default_model,
        rubric_path = ?config.rubric_path.as_deref().map(std::path::Path::display),
        credential_present = config.api_key.is_some(),
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}
