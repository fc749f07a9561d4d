//! Reading and writing the configuration file.
//!
//! The file lives at `~/.audittrail.toml` unless the `AUDITTRAIL_CONFIG`
//! environment variable names another path. A missing file is not an error:
//! `load_or_default` returns the built-in defaults.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use audittrail_contracts::{AuditResult, AuditTrailError};

use crate::settings::AuditConfig;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV_VAR: &str = "AUDITTRAIL_CONFIG";

/// File name of the config inside the home directory.
pub const CONFIG_FILE_NAME: &str = ".audittrail.toml";

impl AuditConfig {
    /// Parse `s` as TOML.
    ///
    /// Returns `AuditTrailError::Configuration` if the TOML is malformed or a
    /// key has the wrong type.
    pub fn from_toml_str(s: &str) -> AuditResult<Self> {
        toml::from_str(s).map_err(|e| {
            AuditTrailError::configuration(format!("failed to parse config TOML: {}", e))
        })
    }

    /// Read and parse the file at `path`.
    pub fn from_file(path: &Path) -> AuditResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AuditTrailError::configuration(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::from_toml_str(&contents)?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Like `from_file`, but a file that does not exist yields the defaults.
    pub fn load_or_default(path: &Path) -> AuditResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        Self::from_file(path)
    }

    /// Load from `default_config_path()`.
    pub fn load() -> AuditResult<Self> {
        Self::load_or_default(&default_config_path()?)
    }

    /// Write this config to `path` as TOML, replacing any existing file.
    pub fn save(&self, path: &Path) -> AuditResult<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| {
            AuditTrailError::configuration(format!("failed to serialize config: {}", e))
        })?;
        std::fs::write(path, contents).map_err(|e| {
            AuditTrailError::configuration(format!(
                "failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        info!(path = %path.display(), "config saved");
        Ok(())
    }

    /// The default ledger file with `~` expanded.
    pub fn ledger_path(&self) -> PathBuf {
        expand_home(&self.ledger.path)
    }

    /// The configured key file with `~` expanded, if one is set.
    pub fn key_file(&self) -> Option<PathBuf> {
        self.encryption.key_file.as_deref().map(expand_home)
    }
}

/// Where the config file is read from and written to.
///
/// Returns `AuditTrailError::Configuration` when `AUDITTRAIL_CONFIG` is unset
/// and the home directory cannot be determined.
pub fn default_config_path() -> AuditResult<PathBuf> {
    resolve_config_path(std::env::var_os(CONFIG_ENV_VAR), dirs::home_dir())
}

fn resolve_config_path(env: Option<OsString>, home: Option<PathBuf>) -> AuditResult<PathBuf> {
    match env {
        Some(value) if !value.is_empty() => Ok(expand_home(Path::new(&value))),
        _ => home
            .map(|home| home.join(CONFIG_FILE_NAME))
            .ok_or_else(|| {
                AuditTrailError::configuration(format!(
                    "cannot locate home directory; set {} to a config file path",
                    CONFIG_ENV_VAR
                ))
            }),
    }
}

/// Replace a leading `~` component with the user's home directory.
///
/// Paths without one, and every path when the home directory is unknown, are
/// returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    expand_home_with(path, dirs::home_dir())
}

fn expand_home_with(path: &Path, home: Option<PathBuf>) -> PathBuf {
    let mut components = path.components();
    match (components.next(), home) {
        (Some(Component::Normal(first)), Some(home)) if first == "~" => {
            let rest = components.as_path();
            if rest.as_os_str().is_empty() {
                home
            } else {
                home.join(rest)
            }
        }
        _ => path.to_path_buf(),
    }
}
