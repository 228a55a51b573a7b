//! The contract a user interface fulfils for submit: asking for passwords
//! and presenting errors.

use thiserror::Error;

use crate::{LOCAL_METHOD, REMOTE_METHOD, Secret, error::UserError};

#[derive(Debug, Error)]
pub enum InterfaceError {
    /// The interface cannot be used in the current environment
    #[error("User interface not available: {0}")]
    Unavailable(String),

    #[error("User interface I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A way of talking to the person submitting a message.
pub trait Interface: Send + Sync {
    /// Ask for the secret `key` of the delivery `method`, presenting
    /// `prompt`. `first` is false once an earlier answer was rejected.
    ///
    /// Returns `Ok(None)` when the user declines to answer.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface is unable to ask at all.
    fn ask_password(
        &self,
        method: &str,
        key: &str,
        prompt: &str,
        first: bool,
    ) -> Result<Option<Secret>, InterfaceError>;

    fn show_error(&self, error: &UserError);

    /// Whether the interface keeps passwords itself (for example in a
    /// keyring), making the daemon's password cache unnecessary.
    fn stores_passwords(&self) -> bool;
}

/// Title for a password query, taking the implicit methods into account
pub fn password_title(method: &str) -> String {
    match method {
        LOCAL_METHOD => "Supply credentials for local mail delivery".to_string(),
        REMOTE_METHOD => "Supply credentials for mail delivery to remote hosts".to_string(),
        other => format!("Supply credentials for mail delivery via \"{other}\""),
    }
}
