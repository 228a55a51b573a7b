//! Packets exchanged between a frontend and the daemon
//!
//! A conversation always follows the same shape:
//!
//! 1. daemon → frontend: [`Packet::ConfigRequest`]
//! 2. frontend → daemon: [`Packet::Probe`], [`Packet::ShutdownRequest`] or
//!    [`Packet::Config`]
//! 3. daemon → frontend: [`Packet::MessageRequest`] (only after a config)
//! 4. frontend → daemon: [`Packet::Message`] or [`Packet::UnlockRequest`]
//! 5. any number of [`Packet::PasswordRequest`]s, each answered with
//!    [`Packet::PasswordResponse`] or [`Packet::AuthCancelled`]
//! 6. daemon → frontend: [`Packet::DeliverySuccess`], [`Packet::UserError`],
//!    [`Packet::InternalError`] or [`Packet::CloseRequest`]

use serde::{Deserialize, Serialize};
use submit_common::{Config, Message, Secret, UserError};

/// Version the daemon announces in its [`Packet::ConfigRequest`]
pub const PROTOCOL_VERSION: &str = submit_common::VERSION;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
    /// Ask for a configuration snapshot and announce the daemon's version
    ConfigRequest { version: String },
    /// Connection test; the daemon answers with [`Packet::CloseRequest`]
    Probe,
    /// Configuration snapshot for this submission
    Config(Box<Config>),
    /// Ask the daemon to stop accepting connections
    ShutdownRequest,
    /// Ask for the message (or unlock request) to submit
    MessageRequest,
    Message(Message),
    /// Authenticate `method`, or every configured method when `None`,
    /// without delivering anything
    UnlockRequest { method: Option<String> },
    /// Ask the frontend's user for a password
    PasswordRequest {
        method: String,
        key: String,
        prompt: String,
        first: bool,
    },
    PasswordResponse { secret: Secret },
    /// The user refused to answer a [`Packet::PasswordRequest`]
    AuthCancelled,
    DeliverySuccess,
    UserError(UserError),
    /// An unexpected failure in the daemon
    InternalError { cause: String },
    /// End of the conversation
    CloseRequest,
}

impl Packet {
    /// Short name of the packet type, for logging without leaking secrets
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ConfigRequest { .. } => "ConfigRequest",
            Self::Probe => "Probe",
            Self::Config(_) => "Config",
            Self::ShutdownRequest => "ShutdownRequest",
            Self::MessageRequest => "MessageRequest",
            Self::Message(_) => "Message",
            Self::UnlockRequest { .. } => "UnlockRequest",
            Self::PasswordRequest { .. } => "PasswordRequest",
            Self::PasswordResponse { .. } => "PasswordResponse",
            Self::AuthCancelled => "AuthCancelled",
            Self::DeliverySuccess => "DeliverySuccess",
            Self::UserError(_) => "UserError",
            Self::InternalError { .. } => "InternalError",
            Self::CloseRequest => "CloseRequest",
        }
    }

    /// The answer to a password request: the secret, or a refusal
    pub fn password_response(secret: Option<Secret>) -> Self {
        secret.map_or(Self::AuthCancelled, |secret| Self::PasswordResponse { secret })
    }
}
