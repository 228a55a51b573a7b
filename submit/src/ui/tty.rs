use std::io::{self, IsTerminal};

use submit_common::{Interface, InterfaceError, Secret, UserError, interface::password_title};

/// Asks on the controlling terminal
#[derive(Debug)]
pub struct TtyInterface;

impl TtyInterface {
    /// # Errors
    ///
    /// Returns [`InterfaceError::Unavailable`] unless standard input is a
    /// terminal.
    pub fn new() -> Result<Self, InterfaceError> {
        if io::stdin().is_terminal() {
            Ok(Self)
        } else {
            Err(InterfaceError::Unavailable(
                "standard input is not a terminal".to_string(),
            ))
        }
    }
}

impl Interface for TtyInterface {
    fn ask_password(
        &self,
        method: &str,
        _key: &str,
        prompt: &str,
        _first: bool,
    ) -> Result<Option<Secret>, InterfaceError> {
        eprintln!("*** {}", password_title(method));
        match rpassword::prompt_password(format!("{prompt} ")) {
            Ok(secret) => Ok(Some(Secret::new(secret))),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn show_error(&self, error: &UserError) {
        eprintln!("{error}");
    }

    fn stores_passwords(&self) -> bool {
        false
    }
}
