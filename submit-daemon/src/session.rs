//! One conversation with a frontend
//!
//! The daemon announces its version and asks for a configuration. A probe
//! or a shutdown request ends the conversation right there. Otherwise it asks
//! for the message (or unlock request), carries it out with passwords
//! proxied through the channel, and reports the outcome.

use std::sync::Arc;

use async_trait::async_trait;
use submit_auth::{AuthError, Credential, QueryPassword};
use submit_channel::{Channel, ChannelError, PROTOCOL_VERSION, Packet};
use submit_common::internal;
use submit_delivery::{Submission, execute};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::{DaemonContext, DaemonError};

/// Asks the frontend on the other end of a channel for passwords.
///
/// Any answer other than a password counts as the user cancelling.
pub struct ChannelQuery<'a, S> {
    channel: &'a mut Channel<S>,
}

impl<'a, S> ChannelQuery<'a, S> {
    pub const fn new(channel: &'a mut Channel<S>) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl<S> QueryPassword for ChannelQuery<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn query_password(
        &mut self,
        method: &str,
        key: &str,
        prompt: &str,
        first: bool,
    ) -> Result<Credential, AuthError> {
        let request = Packet::PasswordRequest {
            method: method.to_string(),
            key: key.to_string(),
            prompt: prompt.to_string(),
            first,
        };

        match self
            .channel
            .request(&request)
            .await
            .map_err(AuthError::query)?
        {
            Packet::PasswordResponse { secret } => Ok(Credential::Secret(secret)),
            other => {
                debug!("Password request for {method} answered with {}", other.name());
                Ok(Credential::Cancelled)
            }
        }
    }
}

pub struct Session<S> {
    channel: Channel<S>,
    context: Arc<DaemonContext>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub const fn new(channel: Channel<S>, context: Arc<DaemonContext>) -> Self {
        Self { channel, context }
    }

    /// Hold the conversation and report its outcome. The channel is closed
    /// afterwards in every case.
    pub async fn run(mut self) {
        let reply = match self.converse().await {
            Ok(reply) => reply,
            Err(e) if e.is_disconnect() => {
                debug!("Frontend disconnected: {e}");
                None
            }
            Err(DaemonError::Delivery(e)) => Some(match e.into_user_error() {
                Ok(error) => Packet::UserError(error),
                Err(e) => internal_error(&e),
            }),
            Err(e) => Some(internal_error(&e)),
        };

        if let Some(reply) = reply {
            self.reply(&reply).await;
        }

        self.channel.close().await;
    }

    /// Send the final packet; the frontend may already be gone.
    async fn reply(&mut self, packet: &Packet) {
        if let Err(e) = self.channel.send(packet).await {
            debug!("Unable to send {}: {e}", packet.name());
        }
    }

    /// The conversation up to the final reply, if one is due
    async fn converse(&mut self) -> Result<Option<Packet>, DaemonError> {
        let config = match self
            .channel
            .request(&Packet::ConfigRequest {
                version: PROTOCOL_VERSION.to_string(),
            })
            .await?
        {
            Packet::Probe => return Ok(Some(Packet::CloseRequest)),
            Packet::ShutdownRequest => {
                internal!(level = INFO, "Shutdown requested");
                self.context.shutdown();
                return Ok(None);
            }
            Packet::Config(config) => *config,
            other => return Err(ChannelError::Unexpected(other.name().to_string()).into()),
        };

        let submission = match self.channel.request(&Packet::MessageRequest).await? {
            Packet::Message(message) => Submission::Message(message),
            Packet::UnlockRequest { method } => Submission::Unlock { method },
            other => return Err(ChannelError::Unexpected(other.name().to_string()).into()),
        };

        let mut query = ChannelQuery::new(&mut self.channel);
        execute(
            &config,
            &submission,
            self.context.as_ref(),
            self.context.factory(),
            &mut query,
        )
        .await?;

        Ok(Some(if submission.is_unlock() {
            Packet::CloseRequest
        } else {
            Packet::DeliverySuccess
        }))
    }
}

fn internal_error(error: &dyn std::error::Error) -> Packet {
    warn!("Internal error: {error}");
    Packet::InternalError {
        cause: error.to_string(),
    }
}
