//! Client configuration: a TOML file holding the service URL and the API
//! credentials, overridable from the environment.
//!
//! The file carries a secret, so on unix it must not be readable by group or
//! other users. A missing file is created with owner-only permissions and
//! placeholder credentials.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use habit_core::{ClientConfig, DEFAULT_APIDOC_URL};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_URL: &str = "https://habitica.com";
const PLACEHOLDER_LOGIN: &str = "your-login-for-api-here";
const PLACEHOLDER_PASSWORD: &str = "your-password-for-api-here";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{} can be read by other users, run `chmod 600 \"{}\"`", path.display(), path.display())]
    Insecure { path: PathBuf },

    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot write config {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },

    #[error("no config directory on this platform, pass --config")]
    NoConfigDir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the service, without the `/api/v3` prefix.
    pub url: String,
    /// User id sent as `x-api-user`.
    pub login: String,
    /// API token sent as `x-api-key`.
    pub password: String,
    pub apidoc_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apidoc_cache: Option<PathBuf>,
    pub timeout_secs: u64,
    /// Treat an undocumented success status as an error.
    pub strict: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            login: PLACEHOLDER_LOGIN.to_string(),
            password: PLACEHOLDER_PASSWORD.to_string(),
            apidoc_url: DEFAULT_APIDOC_URL.to_string(),
            apidoc_cache: None,
            timeout_secs: 30,
            strict: false,
        }
    }
}

/// `<config dir>/habitipy/config.toml`.
pub fn default_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("habitipy").join("config.toml"))
        .ok_or(ConfigError::NoConfigDir)
}

impl Config {
    /// Read `path`, creating it with defaults when absent, then apply
    /// `HABITICA_*` environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_or_init(path)?;
        config.apply_env(|name| std::env::var(name).ok());
        if !config.credentials_configured() {
            tracing::warn!(path = %path.display(), "your credentials may be unconfigured");
        }
        Ok(config)
    }

    fn read_or_init(path: &Path) -> Result<Self, ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if !path.exists() {
            let config = Self::default();
            config.write_new(path)?;
            tracing::info!(path = %path.display(), "created config file");
            return Ok(config);
        }
        check_permissions(path)?;
        let text = fs::read_to_string(path).map_err(io_err)?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the config to a new file readable only by its owner.
    pub fn write_new(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        let text = toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path).map_err(io_err)?;
        file.write_all(text.as_bytes()).map_err(io_err)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("HABITICA_URL") {
            self.url = url;
        }
        if let Some(user) = lookup("HABITICA_USER") {
            self.login = user;
        }
        if let Some(key) = lookup("HABITICA_KEY") {
            self.password = key;
        }
    }

    pub fn credentials_configured(&self) -> bool {
        self.login != PLACEHOLDER_LOGIN && self.password != PLACEHOLDER_PASSWORD
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_path(&self) -> PathBuf {
        self.apidoc_cache.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("habitipy")
                .join("apidoc.txt")
        })
    }

    pub fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new(&self.url).with_credentials(&self.login, &self.password);
        client.timeout = self.timeout();
        client.strict = self.strict;
        client
    }
}

#[cfg(unix)]
fn check_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;

    let meta = fs::metadata(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if meta.permissions().mode() & 0o077 != 0 {
        return Err(ConfigError::Insecure {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}
