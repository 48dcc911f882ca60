//! AWS credential resolution for signing knowledge-base requests.
//!
//! Credentials are resolved on every request rather than once at startup, so
//! a rotated credentials file or a refreshed session token is picked up
//! without a restart and a missing credential only fails the question that
//! needed it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Environment variable holding the access key id.
pub const ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
/// Environment variable holding the secret access key.
pub const SECRET_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";
/// Environment variable holding an optional session token.
pub const SESSION_TOKEN_ENV: &str = "AWS_SESSION_TOKEN";
/// Environment variable overriding the shared credentials file location.
pub const SHARED_CREDENTIALS_FILE_ENV: &str = "AWS_SHARED_CREDENTIALS_FILE";

const DEFAULT_PROFILE: &str = "default";

/// Errors raised while resolving credentials.
#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    /// No source provided credentials.
    #[error("no AWS credentials found in environment or profile '{profile}'")]
    NotFound {
        /// Profile that was consulted.
        profile: String,
    },
    /// The shared credentials file exists but could not be read.
    #[error("failed to read AWS credentials file {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The profile exists but is missing a required key.
    #[error("AWS profile '{profile}' is missing {key}")]
    Incomplete {
        /// Profile name.
        profile: String,
        /// Missing key.
        key: &'static str,
    },
}

/// A resolved AWS key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    /// Access key id (not secret, appears in the signed request).
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token for temporary credentials.
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl AwsCredentials {
    /// Build credentials from explicit values.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: session_token.filter(|t| !t.trim().is_empty()),
        }
    }

    /// Secret values to scrub from error text.
    pub fn secret_values(&self) -> Vec<String> {
        let mut secrets = vec![self.secret_access_key.clone()];
        if let Some(token) = &self.session_token {
            secrets.push(token.clone());
        }
        secrets
    }
}

/// Where credentials come from.
#[derive(Debug, Clone)]
pub enum CredentialsProvider {
    /// Fixed credentials (tests, or values injected by an embedding app).
    Static(AwsCredentials),
    /// Environment variables, then the shared credentials file.
    Chain {
        /// Profile to read from the shared credentials file.
        profile: Option<String>,
    },
}

impl CredentialsProvider {
    /// The default chain for an optional profile name.
    pub fn chain(profile: Option<String>) -> Self {
        Self::Chain { profile }
    }

    /// Resolve credentials now.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError`] when no source yields a usable key pair.
    pub fn resolve(&self) -> Result<AwsCredentials, CredentialsError> {
        match self {
            Self::Static(creds) => Ok(creds.clone()),
            Self::Chain { profile } => {
                resolve_chain(profile.as_deref(), |key| std::env::var(key).ok())
            }
        }
    }
}

/// Resolve credentials using a priority chain.
///
/// Resolution order:
/// 1. `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` (+ `AWS_SESSION_TOKEN`)
///    when no explicit profile is requested
/// 2. The profile (or `default`) in the shared credentials file
///
/// Takes an env resolver so tests do not touch the process environment.
///
/// # Errors
///
/// Returns [`CredentialsError`] when no source yields a usable key pair.
pub fn resolve_chain(
    profile: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<AwsCredentials, CredentialsError> {
    let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    if profile.is_none() {
        if let (Some(id), Some(secret)) = (non_empty(ACCESS_KEY_ENV), non_empty(SECRET_KEY_ENV)) {
            debug!("using AWS credentials from environment");
            return Ok(AwsCredentials::new(id, secret, non_empty(SESSION_TOKEN_ENV)));
        }
    }

    let profile = profile.unwrap_or(DEFAULT_PROFILE);
    let path = match non_empty(SHARED_CREDENTIALS_FILE_ENV) {
        Some(p) => Some(PathBuf::from(p)),
        None => default_credentials_file(),
    };
    let Some(path) = path else {
        return Err(CredentialsError::NotFound {
            profile: profile.to_owned(),
        });
    };
    load_profile(&path, profile)
}

/// `~/.aws/credentials`, if a home directory exists.
pub fn default_credentials_file() -> Option<PathBuf> {
    let base = directories::BaseDirs::new()?;
    Some(base.home_dir().join(".aws").join("credentials"))
}

/// Read one profile from a shared credentials file.
///
/// # Errors
///
/// Returns [`CredentialsError::NotFound`] if the file or profile is absent,
/// [`CredentialsError::Incomplete`] if a required key is missing.
pub fn load_profile(path: &Path, profile: &str) -> Result<AwsCredentials, CredentialsError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "shared credentials file not found");
            return Err(CredentialsError::NotFound {
                profile: profile.to_owned(),
            });
        }
        Err(source) => {
            return Err(CredentialsError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let sections = parse_ini(&contents);
    let Some(section) = sections.get(profile) else {
        return Err(CredentialsError::NotFound {
            profile: profile.to_owned(),
        });
    };
    let require = |key: &'static str| {
        section
            .get(key)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| CredentialsError::Incomplete {
                profile: profile.to_owned(),
                key,
            })
    };
    let id = require("aws_access_key_id")?;
    let secret = require("aws_secret_access_key")?;
    debug!(profile, path = %path.display(), "using AWS credentials from profile");
    Ok(AwsCredentials::new(
        id,
        secret,
        section.get("aws_session_token").cloned(),
    ))
}

/// Minimal INI reader for the shared credentials file format.
fn parse_ini(contents: &str) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let mut current: Option<String> = None;
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim();
            // `config`-style headers read `[profile name]`.
            let name = name.strip_prefix("profile ").unwrap_or(name).trim();
            sections.entry(name.to_owned()).or_default();
            current = Some(name.to_owned());
            continue;
        }
        if let (Some(section), Some((key, value))) = (current.as_ref(), line.split_once('=')) {
            sections
                .entry(section.clone())
                .or_default()
                .insert(key.trim().to_lowercase(), value.trim().to_owned());
        }
    }
    sections
}
