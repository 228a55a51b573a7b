//! Delivery through a sendmail-compatible program

use std::{
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use submit_auth::Authenticate;
use submit_common::{Config, ConfigError, Message, UserError};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::{debug, warn};

use crate::{Deliverer, DeliveryError};

const DEFAULT_ARGUMENTS: &str = "-oem -oi";
const SEARCH_DIRS: [&str; 2] = ["/usr/sbin", "/usr/lib"];
const SEARCH_NAMES: [&str; 2] = ["sendmail.notsubmit", "sendmail"];

/// The system's MTA sendmail program.
///
/// `submit` may itself be installed as `sendmail`, in which case
/// `sendmail.notsubmit` is the real one. Candidates resolving to a file called
/// `submit` are skipped.
pub fn default_sendmail() -> Option<PathBuf> {
    SEARCH_DIRS
        .iter()
        .flat_map(|dir| SEARCH_NAMES.iter().map(move |name| Path::new(dir).join(name)))
        .filter_map(|candidate| std::fs::canonicalize(candidate).ok())
        .filter(|path| path.file_name().is_none_or(|name| name != "submit"))
        .find(|path| is_executable(path))
}

fn is_executable(path: &Path) -> bool {
    std::fs::metadata(path)
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

/// Pipes messages into a sendmail-compatible program
#[derive(Debug)]
pub struct SendmailDeliverer {
    method: String,
    program: Option<String>,
    arguments: Vec<String>,
}

impl SendmailDeliverer {
    /// Read the `program` and `arguments` settings of `method`
    ///
    /// # Errors
    ///
    /// Returns an error if a setting cannot be read.
    pub fn from_config(config: &Config, method: &str) -> Result<Self, ConfigError> {
        let program = config
            .get_method::<String>(method, "program")?
            .filter(|program| !program.trim().is_empty())
            .or_else(|| default_sendmail().map(|path| path.display().to_string()));
        let arguments = config
            .get_method::<String>(method, "arguments")?
            .unwrap_or_else(|| DEFAULT_ARGUMENTS.to_string());

        Ok(Self {
            method: method.to_string(),
            program,
            arguments: arguments.split_whitespace().map(ToString::to_string).collect(),
        })
    }

    fn command(&self, message: &Message, recipients: &[String]) -> Result<Command, UserError> {
        let program = self
            .program
            .as_deref()
            .ok_or_else(|| UserError::delivery("Unable to find sendmail program."))?;
        let mut words = program.split_whitespace();
        let executable = words
            .next()
            .ok_or_else(|| UserError::delivery("Unable to find sendmail program."))?;

        let mut command = Command::new(executable);
        command
            .args(words)
            .args(&self.arguments)
            .arg("-f")
            .arg(message.envelope_from())
            .args(recipients)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(command)
    }

    fn failed(&self, details: &str) -> UserError {
        let program = self.program.as_deref().unwrap_or_default();
        let details = details.trim();
        if details.is_empty() {
            UserError::delivery("\"{program}\" failed with unknown error.").with("program", program)
        } else {
            UserError::delivery("\"{program}\" failed: {details}.")
                .with("program", program)
                .with("details", details)
        }
    }
}

#[async_trait]
impl Deliverer for SendmailDeliverer {
    fn method(&self) -> &str {
        &self.method
    }

    fn needs_authentication(&self) -> bool {
        false
    }

    async fn authenticate(&mut self, _auth: &mut dyn Authenticate) -> Result<(), DeliveryError> {
        Ok(())
    }

    async fn deliver(
        &mut self,
        message: &Message,
        recipients: &[String],
    ) -> Result<(), DeliveryError> {
        let mut command = self.command(message, recipients)?;
        debug!(
            "Delivering via {} to {} recipient(s) for {}",
            self.program.as_deref().unwrap_or_default(),
            recipients.len(),
            self.method
        );

        let mut child = command
            .spawn()
            .map_err(|e| self.failed(&e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            // The program may exit before reading everything; its exit
            // status tells what happened.
            if let Err(e) = stdin.write_all(message.body()).await {
                warn!("Unable to write the whole message to sendmail: {e}");
            }
            drop(stdin);
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(self.failed(&String::from_utf8_lossy(&output.stderr)).into())
        }
    }

    async fn abort(&mut self) {}
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{fs, os::unix::fs::PermissionsExt};

    use submit_common::Method;

    use super::*;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn config(program: &Path, arguments: Option<&str>) -> Config {
        let mut method = Method::new("local");
        method
            .settings
            .insert("program".to_string(), program.display().to_string());
        if let Some(arguments) = arguments {
            method
                .settings
                .insert("arguments".to_string(), arguments.to_string());
        }
        Config {
            methods: vec![method],
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_delivers_body_and_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let program = script(
            dir.path(),
            "sendmail",
            &format!(
                "echo \"$@\" > {out}.args\ncat > {out}",
                out = out.display()
            ),
        );

        let config = config(&program, None);
        let mut deliverer = SendmailDeliverer::from_config(&config, "local").unwrap();
        let message = Message::new("me@example.com", ["bob"], "Subject: hi\n\nhello\n");

        deliverer
            .deliver(&message, &["bob".to_string(), "alice".to_string()])
            .await
            .unwrap();

        assert_eq!(fs::read_to_string(&out).unwrap(), "Subject: hi\n\nhello\n");
        assert_eq!(
            fs::read_to_string(dir.path().join("out.args")).unwrap(),
            "-oem -oi -f me@example.com bob alice\n"
        );
    }

    #[tokio::test]
    async fn test_failure_with_details() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(
            dir.path(),
            "sendmail",
            "cat > /dev/null\necho 'no such user' >&2\nexit 67",
        );

        let config = config(&program, Some("-i"));
        let mut deliverer = SendmailDeliverer::from_config(&config, "local").unwrap();
        let message = Message::new("me@example.com", ["nobody"], "hi\n");

        let err = deliverer
            .deliver(&message, &["nobody".to_string()])
            .await
            .unwrap_err()
            .into_user_error()
            .unwrap();
        assert_eq!(
            err.render(),
            format!("\"{}\" failed: no such user.", program.display())
        );
    }

    #[tokio::test]
    async fn test_failure_without_details() {
        let dir = tempfile::tempdir().unwrap();
        let program = script(dir.path(), "sendmail", "cat > /dev/null\nexit 1");

        let config = config(&program, None);
        let mut deliverer = SendmailDeliverer::from_config(&config, "local").unwrap();
        let message = Message::new("me@example.com", ["nobody"], "hi\n");

        let err = deliverer
            .deliver(&message, &["nobody".to_string()])
            .await
            .unwrap_err()
            .into_user_error()
            .unwrap();
        assert_eq!(
            err.render(),
            format!("\"{}\" failed with unknown error.", program.display())
        );
    }

    #[tokio::test]
    async fn test_missing_program() {
        let mut deliverer = SendmailDeliverer {
            method: "local".to_string(),
            program: None,
            arguments: Vec::new(),
        };
        let message = Message::new("me@example.com", ["bob"], "hi\n");

        let err = deliverer
            .deliver(&message, &["bob".to_string()])
            .await
            .unwrap_err()
            .into_user_error()
            .unwrap();
        assert_eq!(err.render(), "Unable to find sendmail program.");
    }
}
