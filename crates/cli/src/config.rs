//! Configuration loading from charla.toml.

use capabilities::CapabilitiesConfig;
use runtime::DEFAULT_FOLLOWUP_TEMPERATURE;
use runtime::providers::{DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Looked up in the working directory when `--config` is not given.
pub const CONFIG_FILE: &str = "charla.toml";

/// Overrides `[model] name`.
pub const MODEL_ENV: &str = "CHARLA_MODEL";
/// Overrides `[model] url`, same variable the Ollama CLI reads.
pub const HOST_ENV: &str = "OLLAMA_HOST";
/// Overrides `[tools] aemet_api_key`, keeping the key out of the file.
pub const AEMET_KEY_ENV: &str = "AEMET_API_KEY";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub model: ModelConfig,
    pub history: HistoryConfig,
    /// Enabled tools, endpoints and keyword overrides.
    pub tools: CapabilitiesConfig,
}

/// The Ollama model and how it is called.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub url: String,
    #[serde(alias = "model")]
    pub name: String,
    pub timeout_secs: u64,
    /// Temperature of the first call of a turn. Unset leaves the model default.
    pub temperature: Option<f32>,
    pub followup_temperature: f32,
    pub keep_alive: Option<String>,
    /// Replaces the built-in prompt for sessions without a persona profile.
    pub system_prompt: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BASE_URL.to_string(),
            name: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            temperature: None,
            followup_temperature: DEFAULT_FOLLOWUP_TEMPERATURE,
            keep_alive: None,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    #[default]
    File,
    Sqlite,
}

/// Where conversation histories and persona profiles live.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub backend: HistoryBackend,
    /// History directory. Defaults to the user data directory.
    pub dir: Option<PathBuf>,
    /// Directory of `<persona>.json` profiles.
    pub contexts_dir: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: HistoryBackend::File,
            dir: None,
            contexts_dir: PathBuf::from("contextos"),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `explicit` if given, else `./charla.toml` if present, else
    /// defaults. Returns the file that was read, if any.
    pub fn discover(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }
        let local = Path::new(CONFIG_FILE);
        if local.is_file() {
            return Ok((Self::load(local)?, Some(local.to_path_buf())));
        }
        Ok((Self::default(), None))
    }

    /// Apply `CHARLA_MODEL`, `OLLAMA_HOST` and `AEMET_API_KEY` as read by `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(model) = var(MODEL_ENV).filter(|v| !v.trim().is_empty()) {
            self.model.name = model.trim().to_string();
        }
        if let Some(host) = var(HOST_ENV).filter(|v| !v.trim().is_empty()) {
            self.model.url = normalize_host(&host);
        }
        if let Some(key) = var(AEMET_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.tools.aemet_api_key = Some(key.trim().to_string());
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.timeout_secs == 0 {
            return Err(ConfigError::Invalid("model.timeout_secs must be positive".into()));
        }
        if self.tools.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid("tools.call_timeout_secs must be positive".into()));
        }
        let temperatures = self
            .model
            .temperature
            .into_iter()
            .chain([self.model.followup_temperature]);
        for t in temperatures {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::Invalid(format!(
                    "temperature {t} is outside 0.0..=2.0"
                )));
            }
        }
        Ok(())
    }
}

/// `OLLAMA_HOST` is often given as `host:port` without a scheme.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
