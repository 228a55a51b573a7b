//! Starting a detached daemon
//!
//! The daemon is the current executable re-run in daemon mode. The child
//! starts a new session, leaves the working directory and detaches from the
//! terminal. Once it is listening it writes a single byte to its stdout,
//! which is a pipe to the launching process; [`Launcher::launch`] returns
//! only after reading that byte.

use std::{
    ffi::{OsStr, OsString},
    fs::OpenOptions,
    io::{self, Write},
    os::fd::AsRawFd,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use submit_common::internal;
use tokio::{io::AsyncReadExt, process::Command};

use crate::DaemonError;

/// Byte written by a daemon that is ready for connections
pub const READY: u8 = b'.';

/// How long to wait for a launched daemon to become ready
const READY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Launcher {
    program: PathBuf,
    args: Vec<OsString>,
    log_file: Option<PathBuf>,
}

impl Launcher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            log_file: None,
        }
    }

    /// A launcher re-running the current executable
    ///
    /// # Errors
    ///
    /// Returns an error if the path of the current executable is unknown.
    pub fn current() -> io::Result<Self> {
        std::env::current_exe().map(Self::new)
    }

    #[must_use]
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Append the daemon's log output to `path` instead of discarding it
    #[must_use]
    pub fn log_file(mut self, path: Option<impl AsRef<Path>>) -> Self {
        self.log_file = path.map(|p| p.as_ref().to_path_buf());
        self
    }

    fn stderr(&self) -> io::Result<Stdio> {
        match &self.log_file {
            Some(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Ok(Stdio::from(file))
            }
            None => Ok(Stdio::null()),
        }
    }

    /// Start the daemon and wait until it accepts connections.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Launch`] if the daemon exits or stays silent
    /// instead of reporting that it is ready.
    pub async fn launch(&self) -> Result<(), DaemonError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir("/")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(self.stderr()?);

        // SAFETY: setsid is async-signal-safe and touches no memory of the
        // parent.
        unsafe {
            command.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let mut child = command.spawn()?;
        internal!(
            level = DEBUG,
            "Launched daemon {} (pid {:?})",
            self.program.display(),
            child.id()
        );

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| DaemonError::Launch("no pipe to the daemon".to_string()))?;

        let mut byte = [0u8; 1];
        let read = tokio::time::timeout(READY_TIMEOUT, stdout.read(&mut byte))
            .await
            .map_err(|_| DaemonError::Launch("timed out waiting for the daemon".to_string()))??;

        if read == 1 && byte[0] == READY {
            Ok(())
        } else {
            let status = child.wait().await?;
            Err(DaemonError::Launch(format!(
                "daemon exited before it was ready ({status})"
            )))
        }
    }
}

/// Tell the launching process that the daemon is ready, then detach stdout
/// from the pipe so the launcher is not kept waiting for it to close.
///
/// # Errors
///
/// Returns an error if the byte cannot be written or stdout cannot be
/// redirected.
pub fn notify_ready() -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(&[READY])?;
    stdout.flush()?;

    let devnull = OpenOptions::new().write(true).open("/dev/null")?;
    // SAFETY: both descriptors are open for the duration of the call.
    if unsafe { libc::dup2(devnull.as_raw_fd(), libc::STDOUT_FILENO) } == -1 {
        return Err(io::Error::last_os_error());
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ready_byte_completes_launch() {
        Launcher::new("/bin/sh")
            .arg("-c")
            .arg("printf . ; sleep 0")
            .launch()
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_exit_without_ready_byte_fails() {
        let err = Launcher::new("/bin/sh")
            .arg("-c")
            .arg("exit 3")
            .launch()
            .await
            .unwrap_err();
        assert!(matches!(err, DaemonError::Launch(_)));
    }

    #[tokio::test]
    async fn test_log_file_receives_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("daemon.log");

        let err = Launcher::new("/bin/sh")
            .arg("-c")
            .arg("echo failing >&2; exit 1")
            .log_file(Some(&log))
            .launch()
            .await
            .unwrap_err();

        assert!(matches!(err, DaemonError::Launch(_)));
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "failing\n");
    }
}
