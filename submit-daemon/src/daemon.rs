//! Accepting frontend connections

use std::{
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
    sync::Arc,
};

use submit_channel::Channel;
use submit_common::{Signal, internal};
use tokio::{net::UnixListener, sync::broadcast, task::JoinHandle};
use tracing::{debug, error};

use crate::{DaemonContext, DaemonError, Session};

/// A bound daemon socket with the state its sessions share
pub struct Daemon {
    listener: UnixListener,
    path: PathBuf,
    inode: u64,
    context: Arc<DaemonContext>,
    shutdown: broadcast::Receiver<Signal>,
}

impl Daemon {
    /// Listen on `path`, replacing a stale socket file.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub async fn bind(path: impl AsRef<Path>, context: Arc<DaemonContext>) -> Result<Self, DaemonError> {
        let path = path.as_ref().to_path_buf();
        let listener = submit_channel::listen(&path).await?;
        let inode = tokio::fs::metadata(&path).await?.ino();
        let shutdown = context.subscribe();

        Ok(Self {
            listener,
            path,
            inode,
            context,
            shutdown,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn context(&self) -> &Arc<DaemonContext> {
        &self.context
    }

    /// Accept connections until shutdown is requested, serving each in its
    /// own task. Running sessions are left to finish on their own. The
    /// socket file is removed on the way out, unless a newer daemon has
    /// replaced it in the meantime.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket file cannot be removed.
    pub async fn serve(mut self) -> Result<(), DaemonError> {
        internal!(level = INFO, "Daemon accepting connections on {}", self.path.display());

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, _addr)) => {
                            let session = Session::new(Channel::new(stream), Arc::clone(&self.context));
                            tokio::spawn(session.run());
                        }
                        Err(e) => {
                            error!("Error accepting connection: {e}");
                        }
                    }
                }
                sig = self.shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) => {
                            internal!(level = INFO, "Daemon shutting down");
                            break;
                        }
                        Err(e) => {
                            error!("Daemon shutdown channel error: {e}");
                            break;
                        }
                    }
                }
            }
        }

        drop(self.listener);
        Self::remove_socket(&self.path, self.inode).await
    }

    async fn remove_socket(path: &Path, inode: u64) -> Result<(), DaemonError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.ino() == inode => {
                tokio::fs::remove_file(path).await?;
                debug!("Removed socket file: {}", path.display());
                Ok(())
            }
            Ok(_) => {
                debug!("Socket file {} belongs to another daemon", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Shut the daemon down on SIGTERM or SIGINT.
///
/// # Errors
///
/// Returns an error if the signal handlers cannot be installed.
pub fn handle_signals(context: Arc<DaemonContext>) -> Result<JoinHandle<()>, DaemonError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => {
                internal!(level = INFO, "Interrupt signal received, shutting down");
            }
            _ = terminate.recv() => {
                internal!(level = INFO, "Terminate signal received, shutting down");
            }
        }
        context.shutdown();
    }))
}
