//! The submit frontend
//!
//! `submit` is a sendmail-compatible program. It reads a message, works out
//! which delivery methods carry which recipients, and either delivers
//! directly or hands the message to a daemon that keeps passwords cached
//! between invocations.

pub mod error;
pub mod frontend;
pub mod ui;

pub use error::FrontendError;
pub use frontend::{Frontend, Launch, Outcome, ProcessLauncher};
