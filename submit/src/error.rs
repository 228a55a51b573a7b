use submit_channel::ChannelError;
use submit_common::{ConfigError, MessageError};
use submit_daemon::DaemonError;
use submit_delivery::DeliveryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error(
        "The version numbers of submit ({ours}) and the daemon process ({daemon}) do not match. \
         Please check your installation."
    )]
    VersionMismatch { ours: String, daemon: String },

    #[error("Unable to reach the daemon: {0}")]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Launch(#[from] DaemonError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An unexpected failure reported by the daemon
    #[error("Internal error: {0}")]
    Internal(String),
}
