//! Configuration for submit.
//!
//! The configuration lives in `config.ron` inside the configuration
//! directory. The directory is chosen with the following precedence:
//!
//! 1. an explicit directory (the `-C` command line option)
//! 2. the `SUBMIT_CONFIG_DIR` environment variable
//! 3. `~/.submit`
//!
//! The whole [`Config`] is serializable because the frontend hands a snapshot
//! of it to the daemon with every submission.

mod method;

use std::{
    collections::HashMap,
    fs::File,
    io,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::{Deserialize, Serialize};

pub use self::method::{DEFAULT_KIND, Method};
use crate::error::ConfigError;

/// Name of the configuration file inside the configuration directory
pub const CONFIG_FILE: &str = "config.ron";

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "SUBMIT_CONFIG_DIR";

/// Socket file name used when `general.socket` is not set
pub const DEFAULT_SOCKET: &str = "socket";

/// Password cache lifetime in minutes used when no `expire` is configured
pub const DEFAULT_EXPIRE_MINUTES: u64 = 60;

const GENERAL_SECTION: &str = "general";

/// Settings that are not bound to a delivery method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct General {
    /// Path to the daemon socket, relative to the configuration directory
    pub socket: Option<String>,
    /// Minutes a cached password survives without being used
    pub expire: Option<u64>,
    /// Always deliver through the daemon, starting it if needed
    pub force_daemon: bool,
    /// `From:` header added to messages that lack one
    pub default_from: Option<String>,
    /// File receiving the daemon's log output
    pub log_file: Option<String>,
    /// Free-form settings, readable with [`Config::get_general`]
    pub settings: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: General,
    /// Delivery methods in the order they were declared
    pub methods: Vec<Method>,
    /// Directory the configuration was loaded from; relative paths resolve
    /// against it.
    pub directory: PathBuf,
}

impl Config {
    /// Load the configuration from `directory`, or from the default location
    /// when `None`.
    ///
    /// A missing file in the default location yields the default
    /// configuration, while a missing file in an explicitly named directory
    /// is an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(directory: Option<&Path>) -> Result<Self, ConfigError> {
        let (directory, explicit) = match directory {
            Some(dir) => (dir.to_path_buf(), true),
            None => match std::env::var_os(CONFIG_DIR_ENV) {
                Some(dir) => (PathBuf::from(dir), true),
                None => (default_directory()?, false),
            },
        };

        let path = directory.join(CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content, &path, directory),
            Err(e) if e.kind() == io::ErrorKind::NotFound && !explicit => {
                tracing::debug!("No configuration at {}, using defaults", path.display());
                Ok(Self {
                    directory,
                    ..Self::default()
                })
            }
            Err(source) => Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Parse configuration text as if read from `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if `content` is not a valid configuration.
    pub fn parse(content: &str, path: &Path, directory: PathBuf) -> Result<Self, ConfigError> {
        let mut config: Self = ron::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.directory = directory;
        Ok(config)
    }

    /// Names of all configured delivery methods, in declaration order
    pub fn get_methods(&self) -> Vec<&str> {
        self.methods.iter().map(|m| m.name.as_str()).collect()
    }

    /// The configuration section of `name`, if one was declared
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Look up a free-form setting in `section`, which is either `general`
    /// or the name of a delivery method, and parse it as `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if the setting exists but cannot be parsed as `T`.
    pub fn get<T: FromStr>(&self, section: &str, key: &str) -> Result<Option<T>, ConfigError> {
        let settings = if section == GENERAL_SECTION {
            Some(&self.general.settings)
        } else {
            self.method(section).map(|m| &m.settings)
        };

        let Some(value) = settings.and_then(|s| s.get(key)) else {
            return Ok(None);
        };

        value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                section: section.to_string(),
                key: key.to_string(),
                value: value.clone(),
            })
    }

    /// # Errors
    ///
    /// See [`Config::get`].
    pub fn get_general<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.get(GENERAL_SECTION, key)
    }

    /// # Errors
    ///
    /// See [`Config::get`].
    pub fn get_method<T: FromStr>(&self, method: &str, key: &str) -> Result<Option<T>, ConfigError> {
        self.get(method, key)
    }

    /// How long the passwords of `method` stay cached after their last use
    pub fn expire_timeout(&self, method: &str) -> Duration {
        let minutes = self
            .method(method)
            .and_then(|m| m.expire)
            .filter(|&m| m > 0)
            .or(self.general.expire)
            .unwrap_or(DEFAULT_EXPIRE_MINUTES);
        Duration::from_secs(minutes.saturating_mul(60))
    }

    /// Location of the daemon socket
    pub fn socket_path(&self) -> PathBuf {
        self.path(self.general.socket.as_deref().unwrap_or(DEFAULT_SOCKET))
    }

    /// Resolve `filename` against the configuration directory.
    ///
    /// A leading `~/` expands to the home directory; absolute paths are
    /// returned unchanged.
    pub fn path(&self, filename: &str) -> PathBuf {
        let expanded = match filename.strip_prefix("~/") {
            Some(rest) => directories::BaseDirs::new()
                .map_or_else(|| PathBuf::from(filename), |dirs| dirs.home_dir().join(rest)),
            None => PathBuf::from(filename),
        };

        if expanded.is_absolute() {
            expanded
        } else {
            self.directory.join(expanded)
        }
    }

    /// Open `filename`, resolved with [`Config::path`], for reading
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn file(&self, filename: &str) -> io::Result<File> {
        File::open(self.path(filename))
    }
}

/// `~/.submit`
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_directory() -> Result<PathBuf, ConfigError> {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".submit"))
        .ok_or(ConfigError::NoHomeDirectory)
}
