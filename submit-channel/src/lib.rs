//! The channel between submit frontends and the daemon.
//!
//! Frontends and the daemon talk over a Unix domain stream socket. Every
//! logical [`Packet`] is serialized with bincode and written as a sequence
//! of length-prefixed chunks terminated by an empty chunk, so one connection
//! can carry many packets in both directions.

pub mod channel;
pub mod error;
pub mod protocol;

pub use channel::{Channel, MAX_CHUNK_LEN, MAX_PACKET_LEN, listen};
pub use error::{ChannelError, Result};
pub use protocol::{PROTOCOL_VERSION, Packet};
