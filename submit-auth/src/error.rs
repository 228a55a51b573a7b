use thiserror::Error;
use submit_common::UserError;

/// Message shown when the user declines to enter a password
pub const CANCELLED: &str = "Aborted on user request.";

#[derive(Debug, Error)]
pub enum AuthError {
    /// The user declined to provide a password
    #[error("{CANCELLED}")]
    Cancelled,

    /// Asking for the password failed
    #[error("Password query failed: {0}")]
    Query(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl AuthError {
    pub fn query(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Query(Box::new(error))
    }

    /// The error as presented to the user, if it is one the user caused
    pub fn user_error(&self) -> Option<UserError> {
        match self {
            Self::Cancelled => Some(UserError::authentication(CANCELLED)),
            Self::Query(_) => None,
        }
    }
}
