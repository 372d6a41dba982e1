// Service Access Configuration Module
//
// Works out which file and which section to read, and loads the optional
// YAML defaults used by the command line tool.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, ServiceAccessError};
use crate::store::RetryPolicy;

/// Environment variable naming the service access file.
pub const SERVICES_ENV: &str = "DES_SERVICES";

/// File name used in the home directory when nothing else is given.
pub const DEFAULT_FILE_NAME: &str = ".desservices.ini";

/// Name of the variable holding the default section for `tag`,
/// e.g. `DES_DB_SECTION` for `db`.
pub fn section_env_var(tag: &str) -> String {
    format!("DES_{}_SECTION", tag.to_uppercase())
}

/// Snapshot of the environment used for resolution.
///
/// Kept as a value so callers and tests decide what the lookup sees.
/// Values are kept as `OsString`, so non-Unicode variables elsewhere in the
/// environment do not get in the way.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<OsString, OsString>,
    home: Option<PathBuf>,
}

impl Environment {
    pub fn new(home: Option<PathBuf>) -> Self {
        Self {
            vars: HashMap::new(),
            home,
        }
    }

    /// The real process environment and home directory.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars_os().collect(),
            home: dirs::home_dir(),
        }
    }

    pub fn with_var<V: AsRef<OsStr>>(mut self, key: &str, value: V) -> Self {
        self.vars
            .insert(OsString::from(key), value.as_ref().to_os_string());
        self
    }

    /// Non-empty value of `key`.
    pub fn var(&self, key: &str) -> Option<&OsStr> {
        self.vars
            .get(OsStr::new(key))
            .map(OsString::as_os_str)
            .filter(|v| !v.is_empty())
    }

    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }
}

/// What the caller asked for; any part may be left to the environment.
#[derive(Debug, Clone, Default)]
pub struct Lookup {
    pub file: Option<PathBuf>,
    pub section: Option<String>,
    pub tag: Option<String>,
}

impl Lookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file<P: Into<PathBuf>>(mut self, file: P) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn section(mut self, section: &str) -> Self {
        self.section = Some(section.to_string());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    /// File to read: explicit path, then `$DES_SERVICES`, then
    /// `<home>/.desservices.ini`.
    pub fn resolve_file(&self, env: &Environment) -> Result<PathBuf> {
        if let Some(file) = self.file.as_ref().filter(|f| !f.as_os_str().is_empty()) {
            return Ok(file.clone());
        }
        if let Some(file) = env.var(SERVICES_ENV) {
            return Ok(PathBuf::from(file));
        }
        env.home()
            .map(|home| home.join(DEFAULT_FILE_NAME))
            .ok_or_else(|| ServiceAccessError::Io {
                path: PathBuf::from(DEFAULT_FILE_NAME),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "home directory could not be determined",
                ),
            })
    }

    /// Section to read: explicit non-empty name, then `DES_<TAG>_SECTION`.
    pub fn resolve_section(&self, env: &Environment) -> Result<String> {
        if let Some(section) = self.section.as_deref().filter(|s| !s.is_empty()) {
            return Ok(section.to_string());
        }
        // Section names are text; a non-Unicode value cannot name one.
        self.tag
            .as_deref()
            .and_then(|tag| env.var(&section_env_var(tag)))
            .and_then(OsStr::to_str)
            .map(str::to_string)
            .ok_or(ServiceAccessError::MissingSection)
    }
}

/// Retry settings as written in YAML.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default)]
    pub delay_secs: u64,
}

fn default_attempts() -> u32 {
    1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_secs: 0,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            attempts: config.attempts,
            delay: Duration::from_secs(config.delay_secs),
        }
    }
}

/// Defaults for the command line tool.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AccessConfig {
    /// Service access file; `~` is expanded to the home directory
    #[serde(default)]
    pub services_file: Option<String>,

    /// Tag used to find `DES_<TAG>_SECTION`
    #[serde(default)]
    pub tag: Option<String>,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl AccessConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config_err = |reason: String| ServiceAccessError::Config {
            path: path.to_path_buf(),
            reason,
        };

        let content = std::fs::read_to_string(path).map_err(|e| config_err(e.to_string()))?;
        let config: AccessConfig =
            serde_yaml::from_str(&content).map_err(|e| config_err(e.to_string()))?;

        config.validate().map_err(|reason| config_err(reason.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), &'static str> {
        if self.retry.attempts == 0 {
            return Err("retry.attempts must be at least 1");
        }
        if matches!(self.tag.as_deref(), Some("")) {
            return Err("tag cannot be empty");
        }
        if matches!(self.services_file.as_deref(), Some("")) {
            return Err("services_file cannot be empty");
        }
        Ok(())
    }

    /// `services_file` with a bare `~` or leading `~/` expanded. `~user`
    /// forms are left as written.
    pub fn services_path(&self, env: &Environment) -> Option<PathBuf> {
        let file = self.services_file.as_deref()?;
        let home = match env.home() {
            Some(home) => home,
            None => return Some(PathBuf::from(file)),
        };
        if file == "~" {
            return Some(home.to_path_buf());
        }
        match file.strip_prefix("~/") {
            Some(rest) => Some(home.join(rest)),
            None => Some(PathBuf::from(file)),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }
}
