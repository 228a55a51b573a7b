//! Types shared by every part of submit: configuration, messages, errors,
//! the user interface contract and logging.

pub mod config;
pub mod error;
pub mod host;
pub mod interface;
pub mod logging;
pub mod message;

pub use config::{Config, General, Method};
pub use error::{ConfigError, MessageError, UserError, UserErrorKind};
pub use interface::{Interface, InterfaceError};
pub use message::Message;
pub use tracing;
pub use zeroize::Zeroizing;

/// A password, wiped from memory once dropped
pub type Secret = Zeroizing<String>;

/// Version announced by the daemon and checked by every frontend.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Names of the two delivery methods that always exist.
pub const LOCAL_METHOD: &str = "local";
pub const REMOTE_METHOD: &str = "remote";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
