//! Error types for channel operations

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    /// Nobody is listening on the socket path
    #[error("channel does not exist")]
    Unavailable,

    /// A socket exists but the connection was refused
    #[error("channel refuses connection")]
    Refused,

    /// The peer went away before finishing a packet
    #[error("connection closed")]
    Eof,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("Protocol error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Packet too large: {0} bytes")]
    TooLarge(usize),

    /// The peer sent a packet that is not valid at this point of the exchange
    #[error("Unexpected packet: {0}")]
    Unexpected(String),
}

impl ChannelError {
    /// Whether the daemon could not be reached at all, as opposed to a
    /// failure in the middle of a conversation.
    pub const fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unavailable | Self::Refused)
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
