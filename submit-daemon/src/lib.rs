//! The submit daemon
//!
//! The daemon keeps passwords cached between submissions. Frontends connect
//! over a UNIX socket, hand over a configuration snapshot and a message (or
//! an unlock request), and answer password requests while the daemon
//! delivers on their behalf.

pub mod context;
pub mod daemon;
pub mod error;
pub mod launcher;
pub mod session;

pub use context::DaemonContext;
pub use daemon::{Daemon, handle_signals};
pub use error::DaemonError;
pub use launcher::{Launcher, notify_ready};
pub use session::{ChannelQuery, Session};
