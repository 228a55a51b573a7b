//! Error types shared across submit.
//!
//! [`UserError`] is the family of failures worth showing to the person who
//! submitted a message. It carries a message template and named parameters
//! rather than a formatted string so that the frontend can render it in
//! whatever way its interface prefers.

use std::{fmt, io};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which stage of a submission a [`UserError`] originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserErrorKind {
    /// Credentials could not be obtained or were refused.
    Authentication,
    /// The backend refused or failed to transmit the message.
    Delivery,
    /// The configuration is unusable.
    Config,
}

/// An error of potential interest to the user.
///
/// `template` uses `{name}` placeholders that are filled from `params` by
/// [`UserError::render`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub struct UserError {
    pub kind: UserErrorKind,
    pub template: String,
    pub params: Vec<(String, String)>,
}

impl UserError {
    pub fn new(kind: UserErrorKind, template: impl Into<String>) -> Self {
        Self {
            kind,
            template: template.into(),
            params: Vec::new(),
        }
    }

    pub fn authentication(template: impl Into<String>) -> Self {
        Self::new(UserErrorKind::Authentication, template)
    }

    pub fn delivery(template: impl Into<String>) -> Self {
        Self::new(UserErrorKind::Delivery, template)
    }

    pub fn config(template: impl Into<String>) -> Self {
        Self::new(UserErrorKind::Config, template)
    }

    /// Add a substitution parameter
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    /// Substitute every `{name}` in the template with its parameter.
    ///
    /// Placeholders without a matching parameter are left untouched.
    pub fn render(&self) -> String {
        self.params
            .iter()
            .fold(self.template.clone(), |text, (name, value)| {
                text.replace(&format!("{{{name}}}"), value)
            })
    }

    pub const fn is_authentication(&self) -> bool {
        matches!(self.kind, UserErrorKind::Authentication)
    }
}

impl fmt::Display for UserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Errors raised while loading or querying the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Malformed configuration file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("Invalid value for {section}.{key}: {value:?}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },

    #[error("The delivery type \"{0}\" is not defined.")]
    UnknownDeliveryType(String),

    #[error("Unable to determine the home directory")]
    NoHomeDirectory,
}

impl From<ConfigError> for UserError {
    fn from(error: ConfigError) -> Self {
        match error {
            ConfigError::UnknownDeliveryType(kind) => {
                Self::config("The delivery type \"{type}\" is not defined.").with("type", kind)
            }
            other => Self::config("{details}").with("details", other),
        }
    }
}

/// Errors raised while composing a [`Message`](crate::Message) from raw input.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Unable to parse message headers: {0}")]
    Headers(#[from] mailparse::MailParseError),
}
