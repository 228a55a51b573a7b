use submit_auth::AuthError;
use submit_channel::ChannelError;
use submit_delivery::DeliveryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The detached daemon did not report that it is ready
    #[error("Unable to start the daemon: {0}")]
    Launch(String),
}

impl DaemonError {
    /// Whether the frontend went away; nobody is left to report this to.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Channel(e) => matches!(e, ChannelError::Eof),
            Self::Delivery(DeliveryError::Auth(AuthError::Query(source))) => source
                .downcast_ref::<ChannelError>()
                .is_some_and(|e| matches!(e, ChannelError::Eof)),
            _ => false,
        }
    }
}
