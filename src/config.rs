//! Configuration loading and validation.
//!
//! Settings come from an optional `mathpath.toml` (or `$MATHPATH_CONFIG`)
//! overlaid by environment variables. A `.env` file, when present, is loaded
//! into the environment by the binary before this runs.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::citations::CitationPolicy;
use crate::credentials::CredentialsProvider;
use crate::prompt::PromptRules;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "MATHPATH_CONFIG";
/// Environment variable holding the knowledge-base id.
pub const KNOWLEDGE_BASE_ID_ENV: &str = "KNOWLEDGE_BASE_ID";
/// Environment variable holding the generation model id.
pub const MODEL_ID_ENV: &str = "BEDROCK_MODEL_ID";

const DEFAULT_CONFIG_FILE: &str = "mathpath.toml";

/// Configuration failures. All are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        /// Config path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The config file is not valid TOML for [`Config`].
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        /// Config path.
        path: PathBuf,
        /// Underlying parse error.
        source: toml::de::Error,
    },
    /// Required settings are absent.
    #[error("missing required settings: {}", .0.join(", "))]
    MissingSettings(Vec<&'static str>),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Knowledge-base connection.
    pub retrieval: RetrievalConfig,
    /// Student data source.
    pub data: DataConfig,
    /// Prompt rules source.
    pub prompt: PromptConfig,
    /// Citation filtering and fallback table.
    pub citations: CitationPolicy,
    /// Log output.
    pub logging: LoggingConfig,
}

/// Knowledge-base connection settings, possibly incomplete.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// AWS region.
    pub region: String,
    /// Knowledge-base id (required).
    pub knowledge_base_id: Option<String>,
    /// Generation model id or ARN (required).
    pub model_id: Option<String>,
    /// Profile in the shared credentials file.
    pub profile: Option<String>,
    /// Endpoint override (VPC endpoints, local testing).
    pub endpoint_url: Option<String>,
    /// Whole-request timeout.
    pub timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            region: "us-west-2".to_owned(),
            knowledge_base_id: None,
            model_id: None,
            profile: None,
            endpoint_url: None,
            timeout_secs: 60,
        }
    }
}

/// Validated knowledge-base connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalSettings {
    /// AWS region.
    pub region: String,
    /// Knowledge-base id.
    pub knowledge_base_id: String,
    /// Generation model id or ARN.
    pub model_id: String,
    /// Endpoint override.
    pub endpoint_url: Option<String>,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Student data source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// JSON document keyed by email.
    pub students_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            students_path: PathBuf::from("mock_students.json"),
        }
    }
}

/// Prompt rules source.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Rules file replacing the built-in rules.
    pub rules_path: Option<PathBuf>,
}

/// Log output settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for chat session logs (default `~/.mathpath/logs`).
    pub logs_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// A missing config file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file exists but cannot be read
    /// or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// [`Config::load`] with a custom env resolver (for testing).
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let path = env(CONFIG_PATH_ENV)
            .filter(|p| !p.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from);
        let mut config = Self::load_file(&path)?;
        config.apply_overrides(env);
        Ok(config)
    }

    /// Load a file the user named explicitly, then apply env overrides.
    ///
    /// Unlike [`Config::load_file`], a missing file is an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file is missing or unreadable,
    /// [`ConfigError::Parse`] if it is not valid TOML.
    pub fn load_required(
        path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loading config from file");
        let mut config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.apply_overrides(env);
        Ok(config)
    }

    /// Load from a TOML file only; defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or parsed.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                info!(path = %path.display(), "loading config from file");
                toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parse a TOML string into config (for testing).
    ///
    /// # Errors
    ///
    /// Returns the TOML parse error.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Apply environment variable overrides. Blank values are ignored.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("AWS_DEFAULT_REGION").or_else(|| get("AWS_REGION")) {
            self.retrieval.region = v;
        }
        if let Some(v) = get(KNOWLEDGE_BASE_ID_ENV) {
            self.retrieval.knowledge_base_id = Some(v);
        }
        if let Some(v) = get(MODEL_ID_ENV) {
            self.retrieval.model_id = Some(v);
        }
        if let Some(v) = get("AWS_PROFILE") {
            self.retrieval.profile = Some(v);
        }
        if let Some(v) = get("BEDROCK_ENDPOINT_URL") {
            self.retrieval.endpoint_url = Some(v);
        }
        if let Some(v) = get("MATHPATH_TIMEOUT_SECS") {
            match v.trim().parse() {
                Ok(n) => self.retrieval.timeout_secs = n,
                Err(_) => warn!(
                    var = "MATHPATH_TIMEOUT_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }

        if let Some(v) = get("MATHPATH_STUDENTS_PATH") {
            self.data.students_path = PathBuf::from(v);
        }
        if let Some(v) = get("MATHPATH_RULES_PATH") {
            self.prompt.rules_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("MATHPATH_CANONICAL_URI") {
            self.citations.canonical_uri = v;
        }
        if let Some(v) = get("MATHPATH_REQUIRE_HTTPS") {
            match v.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.citations.require_https = true,
                "0" | "false" | "no" | "off" => self.citations.require_https = false,
                _ => warn!(
                    var = "MATHPATH_REQUIRE_HTTPS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = get("MATHPATH_LOGS_DIR") {
            self.logging.logs_dir = Some(PathBuf::from(v));
        }
    }

    /// Validate the knowledge-base connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSettings`] naming every absent
    /// required setting.
    pub fn retrieval_settings(&self) -> Result<RetrievalSettings, ConfigError> {
        let present = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };
        let kb = present(&self.retrieval.knowledge_base_id);
        let model = present(&self.retrieval.model_id);

        match (kb, model) {
            (Some(knowledge_base_id), Some(model_id)) => Ok(RetrievalSettings {
                region: self.retrieval.region.clone(),
                knowledge_base_id,
                model_id,
                endpoint_url: self.retrieval.endpoint_url.clone(),
                timeout_secs: self.retrieval.timeout_secs,
            }),
            (kb, model) => {
                let mut missing = Vec::new();
                if kb.is_none() {
                    missing.push(KNOWLEDGE_BASE_ID_ENV);
                }
                if model.is_none() {
                    missing.push(MODEL_ID_ENV);
                }
                Err(ConfigError::MissingSettings(missing))
            }
        }
    }

    /// Credential chain for the configured profile.
    pub fn credentials_provider(&self) -> CredentialsProvider {
        CredentialsProvider::chain(self.retrieval.profile.clone())
    }

    /// Prompt rules: the configured file, or the built-in rules.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured rules file cannot be loaded.
    pub fn prompt_rules(&self) -> anyhow::Result<PromptRules> {
        match &self.prompt.rules_path {
            Some(path) => PromptRules::load(path),
            None => Ok(PromptRules::builtin()),
        }
    }

    /// Directory for chat session logs.
    ///
    /// # Errors
    ///
    /// Returns an error if no directory is configured and the home directory
    /// cannot be determined.
    pub fn logs_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.logging.logs_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(config_dir()?.join("logs")),
        }
    }
}

/// Resolve the per-user state directory (`~/.mathpath/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".mathpath"))
}
