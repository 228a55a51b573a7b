//! User interfaces for password queries and error messages

pub mod tty;

use submit_common::{Config, Interface};
use tracing::{debug, warn};

pub use self::tty::TtyInterface;

/// Interfaces tried when the configuration does not name any
const DEFAULT_INTERFACES: &str = "tty";

/// The first usable interface among those listed in the `ui` setting
pub fn detect(config: &Config) -> Option<Box<dyn Interface>> {
    let names = config
        .get_general::<String>("ui")
        .unwrap_or_else(|e| {
            warn!("{e}");
            None
        })
        .unwrap_or_else(|| DEFAULT_INTERFACES.to_string());

    for name in names.split(',').map(str::trim) {
        match name {
            "tty" => match TtyInterface::new() {
                Ok(tty) => return Some(Box::new(tty)),
                Err(e) => debug!("{e}"),
            },
            other => debug!("Unknown user interface: {other}"),
        }
    }

    None
}
