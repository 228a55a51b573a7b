//! Built-in delivery backends

use std::{fmt, str::FromStr};

use submit_common::{Config, ConfigError, config::DEFAULT_KIND};

use crate::{Deliverer, sendmail::SendmailDeliverer};

/// Backend tags accepted by a method's `type` setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelivererKind {
    Sendmail,
}

impl DelivererKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sendmail => "sendmail",
        }
    }
}

impl fmt::Display for DelivererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DelivererKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "sendmail" => Ok(Self::Sendmail),
            other => Err(ConfigError::UnknownDeliveryType(other.to_string())),
        }
    }
}

/// Creates the [`Deliverer`] for a delivery method.
pub trait DelivererFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the method's backend is unknown or its settings
    /// are invalid.
    fn create(&self, config: &Config, method: &str) -> Result<Box<dyn Deliverer>, ConfigError>;
}

/// The factory for the built-in backends
#[derive(Debug, Default, Clone, Copy)]
pub struct Registry;

impl Registry {
    /// The backend configured for `method`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownDeliveryType`] for unknown `type` values.
    pub fn kind(config: &Config, method: &str) -> Result<DelivererKind, ConfigError> {
        config
            .method(method)
            .map_or(DEFAULT_KIND, |m| m.kind.as_str())
            .parse()
    }
}

impl DelivererFactory for Registry {
    fn create(&self, config: &Config, method: &str) -> Result<Box<dyn Deliverer>, ConfigError> {
        match Self::kind(config, method)? {
            DelivererKind::Sendmail => Ok(Box::new(SendmailDeliverer::from_config(config, method)?)),
        }
    }
}
