//! Driving a submission from the command line
//!
//! The [`Frontend`] talks to a running daemon if there is one. Otherwise it
//! delivers directly, unless a password is likely to be needed and the user
//! interface cannot remember passwords itself; then it launches the daemon
//! first so the password is cached for the next submission.

use std::sync::Arc;

use async_trait::async_trait;
use submit_auth::{AuthError, Credential, QueryPassword};
use submit_channel::{Channel, ChannelError, PROTOCOL_VERSION, Packet};
use submit_common::{Config, Interface, InterfaceError, Secret, UserError};
use submit_daemon::Launcher;
use submit_delivery::{DelivererFactory, FreshStores, Registry, Submission, execute};
use tokio::net::UnixStream;
use tracing::{debug, info, warn};

use crate::FrontendError;

const NO_INTERFACE: &str = "\
Mail submission has been cancelled because you have to supply a password, but
there is no way to ask you for it.  This happens, for example, if you run a
mail client like Mutt on a console.

Please run \"submit --unlock all\" on another virtual terminal and try again.";

/// How a submission ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// The failure has already been shown to the user
    Failure,
}

/// Starts a daemon listening on the configured socket.
#[async_trait]
pub trait Launch: Send + Sync {
    /// Returns once the daemon accepts connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon could not be started.
    async fn launch(&self, config: &Config) -> Result<(), FrontendError>;
}

/// Runs the daemon as a detached copy of the current executable
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

#[async_trait]
impl Launch for ProcessLauncher {
    async fn launch(&self, config: &Config) -> Result<(), FrontendError> {
        let log_file = config.general.log_file.as_deref().map(|file| config.path(file));

        let mut launcher = Launcher::current()?
            .arg("--serve")
            .arg("--socket")
            .arg(config.socket_path());
        if let Some(log_file) = &log_file {
            launcher = launcher.arg("--log-file").arg(log_file);
        }
        launcher.log_file(log_file).launch().await?;

        info!("Daemon started on {}", config.socket_path().display());
        Ok(())
    }
}

pub struct Frontend {
    config: Config,
    interface: Option<Arc<dyn Interface>>,
    launcher: Box<dyn Launch>,
    factory: Box<dyn DelivererFactory>,
    channel: Option<Channel<UnixStream>>,
}

impl Frontend {
    pub fn new(config: Config, interface: Option<Box<dyn Interface>>) -> Self {
        Self {
            config,
            interface: interface.map(Arc::from),
            launcher: Box::new(ProcessLauncher),
            factory: Box::new(Registry),
            channel: None,
        }
    }

    #[must_use]
    pub fn with_launcher(mut self, launcher: impl Launch + 'static) -> Self {
        self.launcher = Box::new(launcher);
        self
    }

    #[must_use]
    pub fn with_factory(mut self, factory: impl DelivererFactory + 'static) -> Self {
        self.factory = Box::new(factory);
        self
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }

    pub const fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Connect to a running daemon, returning whether there is one.
    ///
    /// A daemon announcing a different version is asked to shut down and
    /// replaced by a fresh one, once.
    ///
    /// # Errors
    ///
    /// Returns [`FrontendError::VersionMismatch`] if the replacement still
    /// announces a different version.
    pub async fn connect(&mut self) -> Result<bool, FrontendError> {
        if self.channel.is_some() {
            return Ok(true);
        }

        let Some((mut channel, version)) = self.open().await? else {
            return Ok(false);
        };

        if version != PROTOCOL_VERSION {
            warn!("Daemon runs version {version}, replacing it");
            channel.send(&Packet::ShutdownRequest).await?;
            channel.close().await;

            self.launcher.launch(&self.config).await?;
            let (replacement, version) = self.open().await?.ok_or(ChannelError::Unavailable)?;
            if version != PROTOCOL_VERSION {
                return Err(FrontendError::VersionMismatch {
                    ours: PROTOCOL_VERSION.to_string(),
                    daemon: version,
                });
            }
            channel = replacement;
        }

        self.channel = Some(channel);
        Ok(true)
    }

    /// A connection with the daemon's greeting read, or `None` if no daemon
    /// is reachable
    async fn open(&self) -> Result<Option<(Channel<UnixStream>, String)>, FrontendError> {
        let mut channel = match Channel::connect(self.config.socket_path()).await {
            Ok(channel) => channel,
            Err(e) if e.is_unreachable() => {
                debug!("No daemon: {e}");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match channel.receive().await? {
            Packet::ConfigRequest { version } => Ok(Some((channel, version))),
            other => Err(ChannelError::Unexpected(other.name().to_string()).into()),
        }
    }

    /// Connect to the daemon, launching it first if necessary
    async fn ensure_daemon(&mut self) -> Result<Channel<UnixStream>, FrontendError> {
        if !self.connect().await? {
            self.launcher.launch(&self.config).await?;
            self.connect().await?;
        }

        self.channel
            .take()
            .ok_or_else(|| ChannelError::Unavailable.into())
    }

    /// Connect to a running daemon, launching one if the configuration
    /// insists on always using it.
    ///
    /// # Errors
    ///
    /// See [`Frontend::connect`].
    pub async fn prepare(&mut self) -> Result<(), FrontendError> {
        if !self.connect().await? && self.config.general.force_daemon {
            self.launcher.launch(&self.config).await?;
            self.connect().await?;
        }
        Ok(())
    }

    /// Make sure a daemon is running and answering.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon cannot be started or reached.
    pub async fn start_daemon(&mut self) -> Result<(), FrontendError> {
        let mut channel = self.ensure_daemon().await?;
        match channel.request(&Packet::Probe).await? {
            Packet::CloseRequest => {}
            other => debug!("Daemon answered probe with {}", other.name()),
        }
        channel.close().await;
        Ok(())
    }

    /// Ask a running daemon, whatever its version, to stop accepting
    /// connections. Does nothing if no daemon is running.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon cannot be told.
    pub async fn shutdown(&mut self) -> Result<(), FrontendError> {
        let channel = match self.channel.take() {
            Some(channel) => Some(channel),
            None => self.open().await?.map(|(channel, _)| channel),
        };

        if let Some(mut channel) = channel {
            channel.send(&Packet::ShutdownRequest).await?;
            channel.close().await;
            info!("Daemon asked to shut down");
        }
        Ok(())
    }

    /// Whether `submission` should go through the daemon
    fn wants_daemon(&self, submission: &Submission) -> Result<bool, FrontendError> {
        if self.channel.is_some() {
            return Ok(true);
        }
        if self.interface.as_ref().is_some_and(|ui| ui.stores_passwords()) {
            return Ok(false);
        }
        if submission.is_unlock() {
            return Ok(true);
        }

        for entry in submission.plan(&self.config).entries() {
            if self
                .factory
                .create(&self.config, &entry.method)?
                .needs_authentication()
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Deliver a message or unlock delivery methods.
    ///
    /// Failures the user caused are shown through the interface and reported
    /// as [`Outcome::Failure`].
    ///
    /// # Errors
    ///
    /// Returns an error for failures that are not the user's doing.
    pub async fn deliver(&mut self, submission: Submission) -> Result<Outcome, FrontendError> {
        if self.wants_daemon(&submission)? {
            self.deliver_daemon(submission).await
        } else {
            self.deliver_directly(&submission).await
        }
    }

    async fn deliver_daemon(&mut self, submission: Submission) -> Result<Outcome, FrontendError> {
        let mut channel = self.ensure_daemon().await?;
        channel
            .send(&Packet::Config(Box::new(self.config.clone())))
            .await?;

        let mut request = Some(match submission {
            Submission::Message(message) => Packet::Message(message),
            Submission::Unlock { method } => Packet::UnlockRequest { method },
        });
        let mut unavailable = false;

        let outcome = loop {
            match channel.receive().await? {
                Packet::MessageRequest => {
                    let packet = request
                        .take()
                        .ok_or_else(|| ChannelError::Unexpected("MessageRequest".to_string()))?;
                    channel.send(&packet).await?;
                }
                Packet::PasswordRequest {
                    method,
                    key,
                    prompt,
                    first,
                } => {
                    let secret = match self.ask_password(&method, &key, &prompt, first).await {
                        Ok(secret) => secret,
                        Err(e) => {
                            debug!("Unable to ask for a password: {e}");
                            unavailable = true;
                            None
                        }
                    };
                    channel.send(&Packet::password_response(secret)).await?;
                }
                Packet::UserError(error) => {
                    // Without an interface the error only says that the user
                    // cancelled, which is not what happened.
                    if !unavailable {
                        self.show_error(&error);
                    }
                    break Outcome::Failure;
                }
                Packet::InternalError { cause } => return Err(FrontendError::Internal(cause)),
                Packet::DeliverySuccess | Packet::CloseRequest => break Outcome::Success,
                other => return Err(ChannelError::Unexpected(other.name().to_string()).into()),
            }
        };

        channel.close().await;
        Ok(outcome)
    }

    async fn deliver_directly(&self, submission: &Submission) -> Result<Outcome, FrontendError> {
        let mut query = FrontendQuery {
            frontend: self,
            unavailable: false,
        };

        let result = execute(
            &self.config,
            submission,
            &FreshStores,
            self.factory.as_ref(),
            &mut query,
        )
        .await;
        let unavailable = query.unavailable;

        match result {
            Ok(()) => Ok(Outcome::Success),
            Err(_) if unavailable => Ok(Outcome::Failure),
            Err(e) => match e.into_user_error() {
                Ok(error) => {
                    self.show_error(&error);
                    Ok(Outcome::Failure)
                }
                Err(e) => Err(e.into()),
            },
        }
    }

    /// Ask the interface for a password on a blocking thread; terminal
    /// prompts hold it until the user answers.
    async fn ask_password(
        &self,
        method: &str,
        key: &str,
        prompt: &str,
        first: bool,
    ) -> Result<Option<Secret>, InterfaceError> {
        let Some(interface) = self.interface.clone() else {
            eprintln!("{NO_INTERFACE}");
            return Err(InterfaceError::Unavailable("no user interface".to_string()));
        };

        let (method, key, prompt) = (method.to_string(), key.to_string(), prompt.to_string());
        tokio::task::spawn_blocking(move || interface.ask_password(&method, &key, &prompt, first))
            .await
            .map_err(|e| InterfaceError::Unavailable(format!("password prompt failed: {e}")))?
    }

    fn show_error(&self, error: &UserError) {
        match &self.interface {
            Some(interface) => interface.show_error(error),
            None => eprintln!("{error}"),
        }
    }
}

/// Asks the frontend's interface for passwords when delivering directly
struct FrontendQuery<'a> {
    frontend: &'a Frontend,
    unavailable: bool,
}

#[async_trait]
impl QueryPassword for FrontendQuery<'_> {
    async fn query_password(
        &mut self,
        method: &str,
        key: &str,
        prompt: &str,
        first: bool,
    ) -> Result<Credential, AuthError> {
        match self.frontend.ask_password(method, key, prompt, first).await {
            Ok(secret) => Ok(secret.into()),
            Err(e) => {
                self.unavailable = true;
                Err(AuthError::query(e))
            }
        }
    }
}
