//! Typed error handling for delivery operations.
//!
//! Failures fall in two groups: those worth presenting to the user (a
//! [`UserError`], a cancelled authentication, a configuration mistake) and
//! everything else, which is reported as an internal error.

use submit_auth::AuthError;
use submit_common::{ConfigError, UserError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Authentication or delivery failed in a way the user should hear about
    #[error(transparent)]
    User(#[from] UserError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeliveryError {
    /// Split off the errors that are presented to the user; everything else
    /// is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `self` if this is not a user-facing error.
    pub fn into_user_error(self) -> Result<UserError, Self> {
        match self {
            Self::User(error) => Ok(error),
            Self::Config(error) => Ok(error.into()),
            Self::Auth(error) => error.user_error().ok_or(Self::Auth(error)),
            other => Err(other),
        }
    }
}
