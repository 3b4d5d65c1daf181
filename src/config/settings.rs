//! TOML-based configuration for tributary.
//!
//! Supports a config file (tributary.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 4417
//! cors = true
//!
//! [schema]
//! path = "${TRIBUTARY_HOME}/schema.toml"
//!
//! [data]
//! path = "./data/rental.json"
//!
//! [registry]
//! path = "./queries.json"
//!
//! [client]
//! base_url = "http://127.0.0.1:4417"
//! timeout_secs = 30
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Errors reading `tributary.toml`.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("No config file at {0}")]
    FileNotFound(PathBuf),

    #[error("Could not read config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Environment variable {0} is referenced but not set")]
    MissingEnvVar(String),
}

/// Everything `tributary.toml` can set. Missing sections take their defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub schema: PathSettings,
    pub data: PathSettings,
    pub registry: PathSettings,
    pub client: ClientSettings,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Allow cross-origin requests from any origin.
    pub cors: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4417,
            cors: true,
        }
    }
}

impl ServerSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A section that only names a file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PathSettings {
    /// Path to the file (supports ${ENV_VAR} expansion).
    pub path: Option<String>,
}

impl PathSettings {
    /// The path with environment variables expanded, if one is configured.
    pub fn resolved_path(&self) -> Result<Option<PathBuf>, SettingsError> {
        self.path
            .as_deref()
            .map(|path| expand_env_vars(path).map(PathBuf::from))
            .transpose()
    }
}

/// Client settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Server base URL (supports ${ENV_VAR} expansion).
    pub base_url: String,

    /// Connect timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4417".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ClientSettings {
    pub fn resolved_base_url(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.base_url)
    }
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }
        Ok(toml::from_str(&fs::read_to_string(path)?)?)
    }

    /// Find and load the config file.
    ///
    /// `$TRIBUTARY_CONFIG` wins if set (and must exist). Otherwise the first of
    /// `./tributary.toml` and `<config dir>/tributary/config.toml` that exists
    /// is used, and with neither present the defaults apply.
    pub fn load() -> Result<Self, SettingsError> {
        if let Some(path) = env::var_os("TRIBUTARY_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let candidates = std::iter::once(PathBuf::from("tributary.toml")).chain(
            dirs::config_dir().map(|dir| dir.join("tributary").join("config.toml")),
        );
        for candidate in candidates {
            if candidate.is_file() {
                log::debug!("Using config file {}", candidate.display());
                return Self::from_file(&candidate);
            }
        }
        Ok(Self::default())
    }
}

/// Substitute `${NAME}` and `$NAME` with the value of the environment variable.
///
/// A `$` not followed by a name is kept literally.
pub fn expand_env_vars(input: &str) -> Result<String, SettingsError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(dollar) = rest.find('$') {
        out.push_str(&rest[..dollar]);
        let after = &rest[dollar + 1..];

        let (name, consumed) = match after.strip_prefix('{') {
            Some(braced) => {
                let close = braced.find('}').unwrap_or(braced.len());
                let consumed = (close + 2).min(after.len());
                (&braced[..close], consumed)
            }
            None => {
                let len = after
                    .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                    .unwrap_or(after.len());
                (&after[..len], len)
            }
        };

        if name.is_empty() && !after.starts_with('{') {
            out.push('$');
        } else {
            let value =
                env::var(name).map_err(|_| SettingsError::MissingEnvVar(name.to_string()))?;
            out.push_str(&value);
        }
        rest = &after[consumed..];
    }

    out.push_str(rest);
    Ok(out)
}
